//! Strategy selection between the batched and bulk-copy loaders.

use super::batch::BatchLoader;
use super::copy::CopyLoader;
use super::stats::{LoadReport, LoadStrategy};
use crate::config::LoaderConfig;
use crate::encoder::{JsonEncoder, SerdeJsonEncoder};
use crate::error::LoadError;
use crate::store::Store;
use serde::Serialize;

/// Routes a load to the batched loader up to `threshold` records and to the
/// bulk-copy loader above it.
#[derive(Debug, Clone)]
pub struct InsertDispatcher<S, E = SerdeJsonEncoder> {
    batch: BatchLoader<S, E>,
    copy: CopyLoader<S, E>,
    threshold: usize,
}

impl<S: Store + Clone> InsertDispatcher<S> {
    pub fn new(store: S, config: LoaderConfig) -> Self {
        Self::with_encoder(store, SerdeJsonEncoder, config)
    }
}

impl<S: Store + Clone, E: JsonEncoder + Clone> InsertDispatcher<S, E> {
    pub fn with_encoder(store: S, encoder: E, config: LoaderConfig) -> Self {
        Self::from_loaders(
            BatchLoader::with_encoder(store.clone(), encoder.clone(), config.batch_size),
            CopyLoader::with_encoder(store, encoder, config.copy_batch_size),
            config.threshold,
        )
    }
}

impl<S: Store, E: JsonEncoder> InsertDispatcher<S, E> {
    pub fn from_loaders(batch: BatchLoader<S, E>, copy: CopyLoader<S, E>, threshold: usize) -> Self {
        Self {
            batch,
            copy,
            threshold,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn strategy_for(&self, len: usize) -> LoadStrategy {
        if len <= self.threshold {
            LoadStrategy::Batched
        } else {
            LoadStrategy::Copy
        }
    }

    pub async fn insert<R: Serialize>(&self, records: &[R]) -> Result<LoadReport, LoadError> {
        self.insert_at(records, 0).await
    }

    /// Like [`insert`](Self::insert) with ids starting at `first_id`.
    pub async fn insert_at<R: Serialize>(
        &self,
        records: &[R],
        first_id: usize,
    ) -> Result<LoadReport, LoadError> {
        let strategy = self.strategy_for(records.len());
        log::info!(
            "loading {} records via {} strategy (threshold {})",
            records.len(),
            strategy,
            self.threshold
        );

        match strategy {
            LoadStrategy::Batched => self.batch.insert_all_at(records, first_id).await,
            LoadStrategy::Copy => {
                self.copy
                    .copy_insert_all_in_batches_at(records, first_id)
                    .await
            }
        }
    }
}
