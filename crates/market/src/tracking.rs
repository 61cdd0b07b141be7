//! Collision-free tracking code generation.
//!
//! Stores draw a batch of random candidates, look up which of them are
//! already taken in one query, and keep the first free one.

use std::collections::HashSet;

use rand::Rng;
use rubuy_core::{TRACKING_NUMBER_MAX, TRACKING_NUMBER_MIN, TrackingCode, TrackingNamespace};

/// Candidates drawn before giving up.
pub const MAX_ATTEMPTS: usize = 32;

/// Draw `MAX_ATTEMPTS` random candidate codes in `namespace`.
#[must_use]
pub fn candidates(namespace: TrackingNamespace) -> Vec<TrackingCode> {
    let mut rng = rand::rng();
    (0..MAX_ATTEMPTS)
        .filter_map(|_| {
            let number = rng.random_range(TRACKING_NUMBER_MIN..=TRACKING_NUMBER_MAX);
            TrackingCode::compose(namespace, number)
        })
        .collect()
}

/// First candidate not in `taken`, in draw order.
#[must_use]
pub fn first_unused(
    candidates: Vec<TrackingCode>,
    taken: &HashSet<TrackingCode>,
) -> Option<TrackingCode> {
    candidates.into_iter().find(|code| !taken.contains(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(raw: &str) -> TrackingCode {
        TrackingCode::from_stored(raw.to_string())
    }

    #[test]
    fn test_candidates_are_in_namespace_and_range() {
        let drawn = candidates(TrackingNamespace::Shipment);
        assert_eq!(drawn.len(), MAX_ATTEMPTS);
        for candidate in drawn {
            assert_eq!(candidate.namespace(), Some(TrackingNamespace::Shipment));
            let number: u64 = candidate
                .as_str()
                .strip_prefix("RUBOX")
                .and_then(|digits| digits.parse().ok())
                .unwrap_or(0);
            assert!((TRACKING_NUMBER_MIN..=TRACKING_NUMBER_MAX).contains(&number));
        }
    }

    #[test]
    fn test_first_unused_skips_collisions() {
        let taken: HashSet<_> = [code("RUB100000001"), code("RUB100000002")].into();
        let picked = first_unused(
            vec![code("RUB100000001"), code("RUB100000002"), code("RUB100000003")],
            &taken,
        );
        assert_eq!(picked, Some(code("RUB100000003")));
    }

    #[test]
    fn test_first_unused_exhausted() {
        let taken: HashSet<_> = [code("RUB100000001")].into();
        assert_eq!(first_unused(vec![code("RUB100000001")], &taken), None);
    }
}
