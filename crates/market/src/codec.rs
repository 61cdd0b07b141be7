//! Persisted order-id sets of shipments.
//!
//! Writes always use the canonical JSON array form (`[3,17,42]`). Reads accept
//! that form or a plain comma-separated list (`3,17,42`). When strict parsing
//! finds nothing in a non-blank value, [`repair`] recovers ids from the raw
//! digits using the owner's known order ids as a membership oracle.

use std::collections::{BTreeSet, HashSet};

use rubuy_core::OrderId;

/// Longest window tried by [`repair`], in digits.
pub const MAX_REPAIR_WINDOW: usize = 6;

/// Result of decoding a stored id set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedIds {
    pub ids: Vec<OrderId>,
    /// Strict parsing failed and the ids were recovered by [`repair`].
    pub repaired: bool,
}

/// Encode ids in canonical form. Duplicates are dropped, first occurrence wins.
#[must_use]
pub fn encode(ids: &[OrderId]) -> String {
    let parts: Vec<String> = dedup(ids.iter().copied())
        .iter()
        .map(ToString::to_string)
        .collect();
    format!("[{}]", parts.join(","))
}

/// Parse either accepted encoding.
///
/// Any malformed element makes the whole value unparseable and yields an
/// empty list.
#[must_use]
pub fn parse_strict(raw: &str) -> Vec<OrderId> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<i32>>(trimmed)
            .map(|ids| dedup(ids.into_iter().filter(|id| *id >= 0).map(OrderId::new)))
            .unwrap_or_default();
    }

    let mut ids = Vec::new();
    for part in trimmed.split(',') {
        let part = part.trim();
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Vec::new();
        }
        match part.parse::<i32>() {
            Ok(id) => ids.push(OrderId::new(id)),
            Err(_) => return Vec::new(),
        }
    }
    dedup(ids)
}

/// Recover ids from a corrupted value.
///
/// All digits of `raw` are joined into one run, then scanned left to right.
/// At each position windows from the longest valid id length (capped at
/// [`MAX_REPAIR_WINDOW`]) down to one digit are tried and the first window
/// naming a valid id is consumed. A position where no window matches is
/// skipped. The longest match wins, so a digit run where a shorter valid
/// prefix was meant can resolve to a different valid id.
#[must_use]
pub fn repair(raw: &str, valid: &BTreeSet<OrderId>) -> Vec<OrderId> {
    let digits: Vec<u8> = raw.bytes().filter(u8::is_ascii_digit).collect();
    let max_len = valid
        .iter()
        .map(|id| id.to_string().len())
        .max()
        .unwrap_or(0)
        .min(MAX_REPAIR_WINDOW);

    let mut found = Vec::new();
    let mut pos = 0;
    while pos < digits.len() {
        let longest = max_len.min(digits.len() - pos);
        let hit = (1..=longest).rev().find_map(|len| {
            let window = digits.get(pos..pos + len)?;
            let id = window_value(window)?;
            valid.contains(&id).then_some((id, len))
        });

        match hit {
            Some((id, len)) => {
                found.push(id);
                pos += len;
            }
            None => pos += 1,
        }
    }

    dedup(found)
}

/// Strict parse, falling back to [`repair`] for non-blank values that yield nothing.
#[must_use]
pub fn decode(raw: &str, valid: &BTreeSet<OrderId>) -> DecodedIds {
    let ids = parse_strict(raw);
    if !ids.is_empty() || raw.trim().is_empty() {
        return DecodedIds {
            ids,
            repaired: false,
        };
    }

    DecodedIds {
        ids: repair(raw, valid),
        repaired: true,
    }
}

fn window_value(window: &[u8]) -> Option<OrderId> {
    std::str::from_utf8(window)
        .ok()?
        .parse::<i32>()
        .ok()
        .map(OrderId::new)
}

fn dedup(ids: impl IntoIterator<Item = OrderId>) -> Vec<OrderId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[i32]) -> Vec<OrderId> {
        raw.iter().copied().map(OrderId::new).collect()
    }

    fn valid(raw: &[i32]) -> BTreeSet<OrderId> {
        raw.iter().copied().map(OrderId::new).collect()
    }

    #[test]
    fn test_encode_is_canonical_json() {
        assert_eq!(encode(&ids(&[3, 17, 42])), "[3,17,42]");
        assert_eq!(encode(&ids(&[5, 5, 2])), "[5,2]");
        assert_eq!(encode(&[]), "[]");
    }

    #[test]
    fn test_encoded_value_parses_back_in_order() {
        let original = ids(&[42, 3, 17]);
        assert_eq!(parse_strict(&encode(&original)), original);
    }

    #[test]
    fn test_parse_accepts_both_forms() {
        assert_eq!(parse_strict("[1, 2, 3]"), ids(&[1, 2, 3]));
        assert_eq!(parse_strict("1,2, 3"), ids(&[1, 2, 3]));
        assert_eq!(parse_strict(" 7 "), ids(&[7]));
    }

    #[test]
    fn test_parse_rejects_malformed_values() {
        assert!(parse_strict("").is_empty());
        assert!(parse_strict("[1,2").is_empty());
        assert!(parse_strict("1,,2").is_empty());
        assert!(parse_strict("12;13").is_empty());
        assert!(parse_strict("[\"1\"]").is_empty());
    }

    #[test]
    fn test_repair_splits_concatenated_ids() {
        let owned = valid(&[12, 13, 14, 101]);
        assert_eq!(repair("121314", &owned), ids(&[12, 13, 14]));
        assert_eq!(repair("[12;101;;14]", &owned), ids(&[12, 101, 14]));
    }

    #[test]
    fn test_repair_skips_unknown_digits_and_dedups() {
        let owned = valid(&[4, 5]);
        assert_eq!(repair("94x5x4x5", &owned), ids(&[4, 5]));
    }

    #[test]
    fn test_repair_prefers_longest_window() {
        // "123" with both 1, 12 and 23 valid: 12 wins at position 0, then 3 is unknown.
        let owned = valid(&[1, 12, 23]);
        assert_eq!(repair("123", &owned), ids(&[12]));
    }

    #[test]
    fn test_repair_without_valid_ids_finds_nothing() {
        assert!(repair("123", &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_repair_caps_window() {
        let owned = valid(&[1_234_567, 1]);
        // 7-digit id cannot be matched through a 6-digit window.
        assert_eq!(repair("1234567", &owned), ids(&[1]));
    }

    #[test]
    fn test_decode_only_repairs_when_strict_fails() {
        let owned = valid(&[21, 22]);

        let clean = decode("[21,22]", &owned);
        assert_eq!(clean.ids, ids(&[21, 22]));
        assert!(!clean.repaired);

        let broken = decode("21;22", &owned);
        assert_eq!(broken.ids, ids(&[21, 22]));
        assert!(broken.repaired);

        // A lone digit run is a valid single-id list and is not second-guessed.
        let single = decode("2122", &owned);
        assert_eq!(single.ids, ids(&[2122]));
        assert!(!single.repaired);

        let blank = decode("  ", &owned);
        assert!(blank.ids.is_empty());
        assert!(!blank.repaired);
    }

    #[test]
    fn test_separator_loss_is_recovered() {
        let original = ids(&[101, 102, 205]);
        let owned = valid(&[100, 101, 102, 205, 300]);
        let corrupted: String = encode(&original)
            .chars()
            .filter(char::is_ascii_digit)
            .collect();

        let decoded = decode(&format!("[{corrupted}"), &owned);
        assert!(decoded.repaired);
        assert_eq!(decoded.ids, original);
    }
}
