//! Key Codec Module
//!
//! Turns query arguments into deterministic cache keys.

use std::fmt;

use serde::Serialize;

use crate::cache::QueryId;
use crate::error::Result;

// == Argument Key ==
/// Serialized form of a query's arguments.
///
/// Arguments are first converted into a `serde_json::Value` and then written
/// as compact JSON. Sequences and tuples keep their order, struct fields keep
/// declaration order and map keys come out sorted, so two maps with the same
/// content always produce the same key regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ArgKey(String);

impl ArgKey {
    // == Encode ==
    /// Encodes an argument value into its key.
    pub fn encode<A: Serialize + ?Sized>(args: &A) -> Result<Self> {
        let value = serde_json::to_value(args)?;
        Ok(Self(value.to_string()))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// == Slot Key ==
/// Stable address of one cache entry: the query identity plus its argument key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey {
    pub query: QueryId,
    pub key: ArgKey,
}

impl SlotKey {
    pub fn new(query: QueryId, key: ArgKey) -> Self {
        Self { query, key }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.query, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Serialize)]
    struct Filter {
        page: u32,
        tag: &'static str,
    }

    #[test]
    fn test_tuple_encoding() {
        assert_eq!(ArgKey::encode(&(15,)).unwrap().as_str(), "[15]");
        assert_eq!(ArgKey::encode(&(1, "a", true)).unwrap().as_str(), r#"[1,"a",true]"#);
        assert_eq!(ArgKey::encode(&()).unwrap().as_str(), "null");
    }

    #[test]
    fn test_encoding_is_repeatable() {
        let args = (vec![3, 1, 2], "users", Some(4.5));
        let first = ArgKey::encode(&args).unwrap();
        let second = ArgKey::encode(&args).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_tuple_order_is_significant() {
        assert_ne!(
            ArgKey::encode(&(1, 2)).unwrap(),
            ArgKey::encode(&(2, 1)).unwrap()
        );
    }

    #[test]
    fn test_map_keys_are_sorted() {
        let mut hashed = HashMap::new();
        for (k, v) in [("zeta", 1), ("alpha", 2), ("mid", 3)] {
            hashed.insert(k.to_string(), v);
        }
        let sorted: BTreeMap<_, _> = hashed.clone().into_iter().collect();

        let key = ArgKey::encode(&(hashed,)).unwrap();
        assert_eq!(key, ArgKey::encode(&(sorted,)).unwrap());
        assert_eq!(key.as_str(), r#"[{"alpha":2,"mid":3,"zeta":1}]"#);
    }

    #[test]
    fn test_struct_fields_normalize_like_maps() {
        let key = ArgKey::encode(&Filter { page: 2, tag: "new" }).unwrap();
        assert_eq!(key.as_str(), r#"{"page":2,"tag":"new"}"#);
    }

    #[test]
    fn test_non_string_map_keys_fail() {
        let mut args = HashMap::new();
        args.insert((1, 2), "pair");
        assert!(ArgKey::encode(&args).is_err());
    }

    #[test]
    fn test_slot_key_display() {
        let slot = SlotKey::new(QueryId::from_raw(3), ArgKey::encode(&(15,)).unwrap());
        assert_eq!(slot.to_string(), "q3[15]");
    }
}
