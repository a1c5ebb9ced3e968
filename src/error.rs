use crate::load::LoadStrategy;
use thiserror::Error;

/// A record could not be serialized to JSON.
#[derive(Debug, Error)]
#[error("record is not JSON-encodable: {0}")]
pub struct EncodeError(#[from] pub serde_json::Error);

impl EncodeError {
    /// An error for a row that cannot be bound at all.
    pub fn invalid(message: impl std::fmt::Display) -> Self {
        Self(<serde_json::Error as serde::ser::Error>::custom(message))
    }
}

/// Why a chunk was rejected.
#[derive(Debug, Error)]
pub enum LoadFailure {
    #[error("record at position {position} failed to encode: {source}")]
    Encode {
        position: usize,
        #[source]
        source: EncodeError,
    },
    #[error("store rejected the chunk: {0}")]
    Store(#[from] sqlx::Error),
}

/// A load stopped at a chunk boundary.
///
/// `offset` is the id of the failing chunk's first record and `first_id` the
/// id the failed call started at. Every chunk before `offset` was committed;
/// the chunk starting at `offset` and everything after it was not. Callers
/// retrying the load re-submit [`LoadError::remaining`] of the slice they
/// passed in, with ids starting at `offset`.
#[derive(Debug, Error)]
#[error("{strategy} load failed for chunk at offset {offset} ({len} records): {cause}")]
pub struct LoadError {
    pub strategy: LoadStrategy,
    pub first_id: usize,
    pub offset: usize,
    pub len: usize,
    #[source]
    pub cause: LoadFailure,
}

impl LoadError {
    pub fn new(
        strategy: LoadStrategy,
        first_id: usize,
        offset: usize,
        len: usize,
        cause: LoadFailure,
    ) -> Self {
        Self {
            strategy,
            first_id,
            offset,
            len,
            cause,
        }
    }

    /// Records of the failed call that were durably stored before the failure.
    pub fn committed_rows(&self) -> usize {
        self.offset.saturating_sub(self.first_id)
    }

    /// The uncommitted suffix of the slice passed to the failed call.
    pub fn remaining<'a, R>(&self, records: &'a [R]) -> &'a [R] {
        &records[self.committed_rows().min(records.len())..]
    }

    pub fn is_encode_failure(&self) -> bool {
        matches!(self.cause, LoadFailure::Encode { .. })
    }
}

/// Missing or malformed configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} not set")]
    MissingVar(&'static str),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_error(offset: usize) -> LoadError {
        resumed_store_error(0, offset)
    }

    fn resumed_store_error(first_id: usize, offset: usize) -> LoadError {
        LoadError::new(
            LoadStrategy::Batched,
            first_id,
            offset,
            5,
            LoadFailure::Store(sqlx::Error::Protocol("duplicate key".to_string())),
        )
    }

    #[test]
    fn remaining_is_suffix_from_failing_chunk() {
        let records: Vec<u32> = (0..12).collect();
        let err = store_error(10);

        assert_eq!(err.committed_rows(), 10);
        assert_eq!(err.remaining(&records), &[10, 11]);
        assert!(!err.is_encode_failure());
    }

    #[test]
    fn remaining_saturates_past_end() {
        let records = [1, 2, 3];
        assert!(store_error(7).remaining(&records).is_empty());
    }

    #[test]
    fn resumed_failure_is_relative_to_the_call() {
        let suffix: Vec<u32> = (16..30).collect();

        let err = resumed_store_error(16, 16);
        assert_eq!(err.committed_rows(), 0);
        assert_eq!(err.remaining(&suffix).len(), 14);

        let err = resumed_store_error(16, 26);
        assert_eq!(err.committed_rows(), 10);
        assert_eq!(err.remaining(&suffix), &[26, 27, 28, 29]);
    }

    #[test]
    fn display_names_strategy_and_offset() {
        let message = store_error(5000).to_string();
        assert!(message.contains("batched"));
        assert!(message.contains("offset 5000"));
    }
}
