//! Grouped-statement loader.
//!
//! Each chunk becomes one `INSERT ... SELECT FROM UNNEST(...)` statement, so a
//! chunk costs a single round trip and is committed or rejected as a unit.

use super::binder::{ChunkBinder, bind_chunk};
use super::stats::{LoadReport, LoadStrategy};
use crate::config::BATCH_SIZE;
use crate::encoder::{JsonEncoder, SerdeJsonEncoder};
use crate::error::{LoadError, LoadFailure};
use crate::store::{Store, StoreConnection, TargetTable};
use serde::Serialize;

/// Loads records with grouped parameterized inserts of `batch_size` rows.
#[derive(Debug, Clone)]
pub struct BatchLoader<S, E = SerdeJsonEncoder> {
    store: S,
    encoder: E,
    batch_size: usize,
}

impl<S: Store> BatchLoader<S> {
    pub fn new(store: S) -> Self {
        Self::with_encoder(store, SerdeJsonEncoder, BATCH_SIZE)
    }
}

impl<S: Store, E: JsonEncoder> BatchLoader<S, E> {
    pub fn with_encoder(store: S, encoder: E, batch_size: usize) -> Self {
        Self {
            store,
            encoder,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Insert `records` with ids `0..records.len()`.
    pub async fn insert_all<R: Serialize>(&self, records: &[R]) -> Result<LoadReport, LoadError> {
        self.insert_all_at(records, 0).await
    }

    /// Insert `records` with ids starting at `first_id`.
    ///
    /// Used to resume a failed load from [`LoadError::offset`] with the
    /// uncommitted suffix of the original input.
    pub async fn insert_all_at<R: Serialize>(
        &self,
        records: &[R],
        first_id: usize,
    ) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::new(LoadStrategy::Batched);
        if records.is_empty() {
            return Ok(report);
        }

        let mut conn = self.store.acquire().await.map_err(|err| {
            LoadError::new(
                LoadStrategy::Batched,
                first_id,
                first_id,
                records.len().min(self.batch_size),
                LoadFailure::Store(err),
            )
        })?;

        let statement = insert_statement(self.store.target());
        let total_chunks = records.len().div_ceil(self.batch_size);

        for (chunk_index, chunk) in records.chunks(self.batch_size).enumerate() {
            let offset = first_id + chunk_index * self.batch_size;
            let fail = |cause: LoadFailure| {
                log::warn!(
                    "batched chunk {}/{} at offset {} ({} records) failed: {}",
                    chunk_index + 1,
                    total_chunks,
                    offset,
                    chunk.len(),
                    cause
                );
                LoadError::new(LoadStrategy::Batched, first_id, offset, chunk.len(), cause)
            };

            let binder = ChunkBinder::new(chunk, offset, &self.encoder);
            let rows = bind_chunk(&binder).map_err(|(index, source)| {
                fail(LoadFailure::Encode {
                    position: offset + index,
                    source,
                })
            })?;

            let affected = conn
                .insert_rows(&statement, &rows)
                .await
                .map_err(|err| fail(LoadFailure::Store(err)))?;

            log::trace!(
                "batched chunk {}/{}: {} rows at offset {}, {} affected",
                chunk_index + 1,
                total_chunks,
                rows.len(),
                offset,
                affected
            );
            report.record_chunk(chunk.len(), affected);
        }

        log::debug!(
            "batched load complete: {} records in {} chunks",
            report.records,
            report.chunks
        );
        Ok(report)
    }
}

pub(crate) fn insert_statement(table: &TargetTable) -> String {
    format!(
        r#"INSERT INTO {} (id, payload)
           SELECT id, payload::jsonb
           FROM UNNEST($1::bigint[], $2::text[]) AS t(id, payload)"#,
        table.qualified_name()
    )
}
