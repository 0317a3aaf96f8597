//! # Serde module for the sketch
//!
//! The sketch crosses serde boundaries as its persisted byte encoding, so
//! any serde format transports exactly the bytes the storage layer would
//! write, and a value serialized on one node deserializes bit-compatibly on
//! another regardless of the format in between.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec;
use crate::HyperLogLog;

impl Serialize for HyperLogLog {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(&codec::to_bytes(self))
    }
}

impl<'de> Deserialize<'de> for HyperLogLog {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        HyperLogLog::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn hash64(x: u64) -> u64 {
        let mut z = x.wrapping_add(0x9e3779b97f4a7c15);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    #[test_case(0; "empty sketch")]
    #[test_case(1; "single hash")]
    #[test_case(100; "explicit range")]
    #[test_case(1000; "sparse wire form")]
    #[test_case(10000; "dense registers")]
    fn test_serde_round_trip(n: u64) {
        let mut original = HyperLogLog::new();
        for i in 0..n {
            original.update(hash64(i));
        }

        let serialized = serde_json::to_string(&original).expect("serialization failed");
        let deserialized: HyperLogLog =
            serde_json::from_str(&serialized).expect("deserialization failed");

        assert_eq!(
            deserialized.estimate_cardinality(),
            original.estimate_cardinality()
        );
        assert_eq!(deserialized.to_bytes(), original.to_bytes());
    }

    #[test]
    fn test_deserialize_rejects_invalid_payload() {
        let result: Result<HyperLogLog, _> = serde_json::from_str("{ not json }");
        assert!(result.is_err());

        // Well-formed JSON, malformed sketch bytes.
        let result: Result<HyperLogLog, _> = serde_json::from_str("[7]");
        assert!(result.is_err());
    }
}
