//! Bulk-copy loader.
//!
//! Each chunk is framed as CSV text and streamed through
//! `COPY ... FROM STDIN`, avoiding per-row parameter binding. The frame is
//! built completely before the stream opens, so a record that fails to
//! encode never leaves a half-sent chunk behind.

use super::binder::ChunkBinder;
use super::frame::CopyFormat;
use super::stats::{LoadReport, LoadStrategy};
use crate::config::COPY_BATCH_SIZE;
use crate::encoder::{JsonEncoder, SerdeJsonEncoder};
use crate::error::{LoadError, LoadFailure};
use crate::store::{Store, StoreConnection};
use serde::Serialize;

/// Loads records through CSV-framed COPY streams of `copy_batch_size` rows.
#[derive(Debug, Clone)]
pub struct CopyLoader<S, E = SerdeJsonEncoder> {
    store: S,
    encoder: E,
    copy_batch_size: usize,
    format: CopyFormat,
}

impl<S: Store> CopyLoader<S> {
    pub fn new(store: S) -> Self {
        Self::with_encoder(store, SerdeJsonEncoder, COPY_BATCH_SIZE)
    }
}

impl<S: Store, E: JsonEncoder> CopyLoader<S, E> {
    pub fn with_encoder(store: S, encoder: E, copy_batch_size: usize) -> Self {
        Self {
            store,
            encoder,
            copy_batch_size: copy_batch_size.max(1),
            format: CopyFormat::default(),
        }
    }

    pub fn with_format(mut self, format: CopyFormat) -> Self {
        self.format = format;
        self
    }

    pub fn copy_batch_size(&self) -> usize {
        self.copy_batch_size
    }

    pub fn format(&self) -> CopyFormat {
        self.format
    }

    /// Copy `records` with ids `0..records.len()`.
    pub async fn copy_insert_all_in_batches<R: Serialize>(
        &self,
        records: &[R],
    ) -> Result<LoadReport, LoadError> {
        self.copy_insert_all_in_batches_at(records, 0).await
    }

    /// Copy `records` with ids starting at `first_id`.
    pub async fn copy_insert_all_in_batches_at<R: Serialize>(
        &self,
        records: &[R],
        first_id: usize,
    ) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::new(LoadStrategy::Copy);
        if records.is_empty() {
            return Ok(report);
        }

        let mut conn = self.store.acquire().await.map_err(|err| {
            LoadError::new(
                LoadStrategy::Copy,
                first_id,
                first_id,
                records.len().min(self.copy_batch_size),
                LoadFailure::Store(err),
            )
        })?;

        let statement = self.format.statement(self.store.target());
        let total_chunks = records.len().div_ceil(self.copy_batch_size);

        for (chunk_index, chunk) in records.chunks(self.copy_batch_size).enumerate() {
            let offset = first_id + chunk_index * self.copy_batch_size;
            let fail = |cause: LoadFailure| {
                log::warn!(
                    "COPY chunk {}/{} at offset {} ({} records) failed: {}",
                    chunk_index + 1,
                    total_chunks,
                    offset,
                    chunk.len(),
                    cause
                );
                LoadError::new(LoadStrategy::Copy, first_id, offset, chunk.len(), cause)
            };

            let binder = ChunkBinder::new(chunk, offset, &self.encoder);
            let frame = self.format.build_frame(&binder).map_err(|(index, source)| {
                fail(LoadFailure::Encode {
                    position: offset + index,
                    source,
                })
            })?;

            log::trace!(
                "COPY chunk {}/{}: streaming {} bytes",
                chunk_index + 1,
                total_chunks,
                frame.len()
            );

            let inserted = conn
                .copy_in(&statement, frame.as_bytes())
                .await
                .map_err(|err| fail(LoadFailure::Store(err)))?;

            log::info!("COPY batch inserted: {}", inserted);
            report.record_chunk(chunk.len(), inserted);
        }

        log::debug!(
            "copy load complete: {} records in {} chunks",
            report.records,
            report.chunks
        );
        Ok(report)
    }
}
