//! JSON encoding of records.

use crate::error::EncodeError;
use serde::Serialize;

/// The canonical record shape: string keys mapping to arbitrary JSON values.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Turns a record into the JSON text stored in the `payload` column.
///
/// Implementations must include every entry of the record. Key order is not
/// part of the contract.
pub trait JsonEncoder {
    fn encode<R: Serialize + ?Sized>(&self, record: &R) -> Result<String, EncodeError>;
}

/// Compact encoding through `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerdeJsonEncoder;

impl JsonEncoder for SerdeJsonEncoder {
    fn encode<R: Serialize + ?Sized>(&self, record: &R) -> Result<String, EncodeError> {
        Ok(serde_json::to_string(record)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn encodes_compact_json() {
        let record = json!({"id": 1, "name": "item-\"1\""});
        let encoded = SerdeJsonEncoder.encode(&record).unwrap();

        assert!(!encoded.contains('\n'));
        let decoded: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn non_string_map_keys_fail() {
        let mut record = HashMap::new();
        record.insert(vec![1u8, 2], "value");

        assert!(SerdeJsonEncoder.encode(&record).is_err());
    }
}
