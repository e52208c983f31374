use serde::{Deserialize, Serialize};

/// GST slab for hotel accommodation under the Indian slab rules, keyed
/// on the per-night tariff (not the stay total).
pub fn gst_rate(price_per_night: i64) -> f64 {
    if price_per_night <= 1000 {
        0.0
    } else if price_per_night <= 7500 {
        0.12
    } else {
        0.18
    }
}

/// All amounts in whole rupees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub base_amount: i64,
    pub tax_amount: i64,
    pub total_amount: i64,
}

/// `base = price_per_night * rooms * max(nights, 1)`; tax rounded to the
/// nearest rupee. Pure function of its inputs.
pub fn quote(price_per_night: i64, rooms_count: i32, total_nights: i64) -> Quote {
    let base_amount = price_per_night * i64::from(rooms_count) * total_nights.max(1);
    let tax_amount = (base_amount as f64 * gst_rate(price_per_night)).round() as i64;
    Quote {
        base_amount,
        tax_amount,
        total_amount: base_amount + tax_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_tariff_is_untaxed() {
        assert_eq!(gst_rate(800), 0.0);
        let q = quote(800, 1, 3);
        assert_eq!(q.base_amount, 2400);
        assert_eq!(q.tax_amount, 0);
        assert_eq!(q.total_amount, 2400);
    }

    #[test]
    fn mid_slab_two_nights() {
        let q = quote(5000, 1, 2);
        assert_eq!(q.base_amount, 10000);
        assert_eq!(q.tax_amount, 1200);
        assert_eq!(q.total_amount, 11200);
    }

    #[test]
    fn top_slab_two_rooms() {
        let q = quote(9000, 2, 1);
        assert_eq!(q.base_amount, 18000);
        assert_eq!(q.tax_amount, 3240);
        assert_eq!(q.total_amount, 21240);
    }

    #[test]
    fn slab_boundaries() {
        assert_eq!(gst_rate(1000), 0.0);
        assert_eq!(gst_rate(1001), 0.12);
        assert_eq!(gst_rate(7500), 0.12);
        assert_eq!(gst_rate(7501), 0.18);
    }

    #[test]
    fn zero_nights_charges_one() {
        let q = quote(2000, 1, 0);
        assert_eq!(q.base_amount, 2000);
    }
}
