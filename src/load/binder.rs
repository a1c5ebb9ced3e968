//! Per-row binding of records to `(id, payload)` pairs.

use crate::encoder::JsonEncoder;
use crate::error::EncodeError;
use crate::store::JsonRows;
use serde::Serialize;

/// A record bound for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundRow {
    pub id: i64,
    pub payload: String,
}

/// Supplies the rows of one chunk by chunk-local index.
pub trait RowBinder {
    /// Rows in the chunk.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind the row at `index`, which callers keep below [`len`](Self::len).
    fn bind_row(&self, index: usize) -> Result<BoundRow, EncodeError>;
}

/// Binds a slice of records whose first element has id `first_id`.
pub struct ChunkBinder<'a, R, E> {
    records: &'a [R],
    first_id: usize,
    encoder: &'a E,
}

impl<'a, R, E> ChunkBinder<'a, R, E> {
    pub fn new(records: &'a [R], first_id: usize, encoder: &'a E) -> Self {
        Self {
            records,
            first_id,
            encoder,
        }
    }
}

impl<R: Serialize, E: JsonEncoder> RowBinder for ChunkBinder<'_, R, E> {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn bind_row(&self, index: usize) -> Result<BoundRow, EncodeError> {
        let record = self.records.get(index).ok_or_else(|| {
            EncodeError::invalid(format!(
                "row {index} is outside a chunk of {} records",
                self.records.len()
            ))
        })?;
        let id = self
            .first_id
            .checked_add(index)
            .and_then(|id| i64::try_from(id).ok())
            .ok_or_else(|| {
                EncodeError::invalid(format!("id {} + {index} does not fit in BIGINT", self.first_id))
            })?;

        Ok(BoundRow {
            id,
            payload: self.encoder.encode(record)?,
        })
    }
}

/// Bind every row of a chunk into columnar form.
///
/// Stops at the first row that fails to encode and returns its chunk-local
/// index; no partial chunk is produced.
pub fn bind_chunk<B: RowBinder + ?Sized>(binder: &B) -> Result<JsonRows, (usize, EncodeError)> {
    let mut rows = JsonRows::with_capacity(binder.len());

    for index in 0..binder.len() {
        let row = binder.bind_row(index).map_err(|err| (index, err))?;
        rows.push(row.id, row.payload);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::SerdeJsonEncoder;
    use crate::test_support::TestRecord;
    use serde_json::json;

    #[test]
    fn ids_are_offset_by_chunk_start() {
        let records = vec![json!({"a": 1}), json!({"a": 2})];
        let binder = ChunkBinder::new(&records, 5_000, &SerdeJsonEncoder);

        let rows = bind_chunk(&binder).unwrap();
        assert_eq!(rows.ids, vec![5_000, 5_001]);
        assert_eq!(rows.payloads, vec![r#"{"a":1}"#, r#"{"a":2}"#]);
    }

    #[test]
    fn first_failing_row_is_reported() {
        let records = vec![
            TestRecord::valid(json!({"a": 1})),
            TestRecord::unencodable(),
            TestRecord::unencodable(),
        ];
        let binder = ChunkBinder::new(&records, 0, &SerdeJsonEncoder);

        let (index, _) = bind_chunk(&binder).unwrap_err();
        assert_eq!(index, 1);
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let records = vec![json!({"a": 1})];
        let binder = ChunkBinder::new(&records, 0, &SerdeJsonEncoder);

        assert!(binder.bind_row(1).is_err());
    }

    #[test]
    fn id_overflow_is_an_error() {
        let records = vec![json!({"a": 1}), json!({"a": 2})];
        let binder = ChunkBinder::new(&records, i64::MAX as usize, &SerdeJsonEncoder);

        assert_eq!(binder.bind_row(0).unwrap().id, i64::MAX);
        let (index, _) = bind_chunk(&binder).unwrap_err();
        assert_eq!(index, 1);
    }

    #[test]
    fn custom_binder_satisfies_contract() {
        struct Constant;

        impl RowBinder for Constant {
            fn len(&self) -> usize {
                3
            }

            fn bind_row(&self, index: usize) -> Result<BoundRow, EncodeError> {
                Ok(BoundRow {
                    id: index as i64 * 10,
                    payload: "{}".to_string(),
                })
            }
        }

        let rows = bind_chunk(&Constant).unwrap();
        assert_eq!(rows.ids, vec![0, 10, 20]);
        assert!(!Constant.is_empty());
    }
}
