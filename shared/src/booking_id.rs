use rand::Rng;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SUFFIX_LEN: usize = 6;

/// Strategy seam for booking identifiers. The default draws 6 random
/// characters, which is a 36^6 keyspace with no uniqueness guarantee; a
/// collision shows up as a primary-key violation on the bookings table
/// and fails the create step.
pub trait BookingIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomBookingId;

impl BookingIdGenerator for RandomBookingId {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect();
        format!("BK-{}", suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_has_prefix_and_six_char_suffix() {
        let id = RandomBookingId.generate();
        assert_eq!(id.len(), 9);
        let suffix = id.strip_prefix("BK-").expect("missing BK- prefix");
        assert!(suffix.bytes().all(|b| CHARSET.contains(&b)));
    }

    #[test]
    fn ids_vary() {
        let ids: std::collections::HashSet<_> =
            (0..32).map(|_| RandomBookingId.generate()).collect();
        assert!(ids.len() > 1);
    }
}
