//! Canonical encoding of (name, term) pairs into feature keys.

use serde::{Deserialize, Serialize};

pub use crate::constants::feature_key::{INTERCEPT_NAME, INTERCEPT_TERM};
use crate::constants::feature_key::{ESCAPED_DELIMITER_CODE, KEY_DELIMITER, KEY_ESCAPE};
use crate::types::{FeatureKey, FeatureName, FeatureTerm};

/// A raw feature identifier before encoding.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NameAndTerm {
    /// Feature name.
    pub name: FeatureName,
    /// Feature term (empty for features without one).
    pub term: FeatureTerm,
}

impl NameAndTerm {
    /// Create a name/term pair.
    pub fn new(name: impl Into<FeatureName>, term: impl Into<FeatureTerm>) -> Self {
        Self {
            name: name.into(),
            term: term.into(),
        }
    }

    /// The synthetic intercept feature.
    pub fn intercept() -> Self {
        Self::new(INTERCEPT_NAME, INTERCEPT_TERM)
    }

    /// Encoded feature key for this pair.
    pub fn key(&self) -> FeatureKey {
        encode(&self.name, &self.term)
    }
}

/// Encode a (name, term) pair into its feature key.
///
/// Escape characters and delimiters inside either component are escaped, so
/// distinct pairs never share a key and the original pair can be recovered
/// with [`decode`].
pub fn encode(name: &str, term: &str) -> FeatureKey {
    let mut key = String::with_capacity(name.len() + term.len() + 1);
    push_escaped(&mut key, name);
    key.push(KEY_DELIMITER);
    push_escaped(&mut key, term);
    key
}

/// Recover the (name, term) pair from a feature key.
///
/// Returns `None` for strings that `encode` could not have produced.
pub fn decode(key: &str) -> Option<NameAndTerm> {
    let mut name = String::new();
    let mut term = String::new();
    let mut in_term = false;
    let mut chars = key.chars();
    while let Some(ch) = chars.next() {
        let target = if in_term { &mut term } else { &mut name };
        match ch {
            KEY_ESCAPE => match chars.next()? {
                KEY_ESCAPE => target.push(KEY_ESCAPE),
                ESCAPED_DELIMITER_CODE => target.push(KEY_DELIMITER),
                _ => return None,
            },
            KEY_DELIMITER if !in_term => in_term = true,
            KEY_DELIMITER => return None,
            other => target.push(other),
        }
    }
    in_term.then_some(NameAndTerm { name, term })
}

/// Feature key of the synthetic intercept feature.
pub fn intercept_key() -> FeatureKey {
    encode(INTERCEPT_NAME, INTERCEPT_TERM)
}

fn push_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            KEY_ESCAPE => {
                out.push(KEY_ESCAPE);
                out.push(KEY_ESCAPE);
            }
            KEY_DELIMITER => {
                out.push(KEY_ESCAPE);
                out.push(ESCAPED_DELIMITER_CODE);
            }
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn encode_is_deterministic() {
        assert_eq!(encode("age", "25-34"), encode("age", "25-34"));
        assert_eq!(encode("age", "25-34"), "age\u{1}25-34");
        assert_eq!(NameAndTerm::new("age", "25-34").key(), encode("age", "25-34"));
    }

    #[test]
    fn encode_separates_pairs_that_concatenate_identically() {
        let tricky = [
            ("a", "bc"),
            ("ab", "c"),
            ("a\u{1}b", "c"),
            ("a", "b\u{1}c"),
            ("a\\", "b"),
            ("a", "\\b"),
            ("a\\d", ""),
            ("a\u{1}", ""),
            ("", "a\u{1}"),
            ("", ""),
            ("\\", "\\"),
            ("\\\\", ""),
        ];
        let mut seen: HashMap<FeatureKey, (&str, &str)> = HashMap::new();
        for (name, term) in tricky {
            let key = encode(name, term);
            if let Some(previous) = seen.insert(key.clone(), (name, term)) {
                panic!("{previous:?} and {:?} both encode to {key:?}", (name, term));
            }
        }
    }

    #[test]
    fn decode_recovers_escaped_components() {
        for (name, term) in [("a\u{1}b", "c\\d"), ("plain", ""), ("", "x"), ("\\", "\u{1}")] {
            let decoded = decode(&encode(name, term)).unwrap();
            assert_eq!(decoded, NameAndTerm::new(name, term));
        }
    }

    #[test]
    fn decode_rejects_strings_encode_never_produces() {
        assert_eq!(decode("no-delimiter"), None);
        assert_eq!(decode("a\u{1}b\u{1}c"), None);
        assert_eq!(decode("a\\x\u{1}b"), None);
        assert_eq!(decode("dangling\u{1}\\"), None);
    }

    #[test]
    fn intercept_key_matches_intercept_pair() {
        assert_eq!(intercept_key(), NameAndTerm::intercept().key());
        assert_eq!(intercept_key(), "(INTERCEPT)\u{1}");
    }
}
