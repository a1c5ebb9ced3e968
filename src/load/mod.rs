//! Bulk JSON loading.
//!
//! Records are stored as `(id, payload)` rows where `id` is the record's
//! position in the input and `payload` its JSON encoding. Two loaders share
//! that contract and differ only in how rows reach the store:
//!
//! 1. **Binding** (`binder`) - encodes each record of a chunk into a
//!    [`BoundRow`] through the [`RowBinder`] contract
//! 2. **Batched statements** (`batch`) - one grouped `UNNEST` insert per
//!    chunk, for moderate volumes
//! 3. **Bulk copy** (`copy`, `frame`) - one CSV-framed `COPY FROM STDIN`
//!    stream per chunk, for large volumes
//! 4. **Dispatch** (`dispatcher`) - picks a loader from the input size
//! 5. **Reporting** (`stats`) - what a successful load did
//!
//! # Failure model
//!
//! Chunks are submitted one after another over a single connection. A
//! failing chunk stops the load; every earlier chunk stays committed and
//! nothing from the failing chunk onward is stored. The returned
//! [`LoadError`](crate::error::LoadError) names the failing chunk's offset.
//!
//! # Identifiers
//!
//! Ids are derived from input position only. Two independent loads into the
//! same table must not cover overlapping id ranges; the store rejects the
//! colliding chunk when they do.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use json_bulk_loader::{InsertDispatcher, LoaderConfig, PgStore, DatabaseConfig};
//!
//! let store = PgStore::connect(&DatabaseConfig::from_env()?).await?;
//! let dispatcher = InsertDispatcher::new(store, LoaderConfig::from_env());
//!
//! let report = dispatcher.insert(&records).await?;
//! println!("loaded {} records via {}", report.records, report.strategy);
//! ```

pub mod batch;
pub mod binder;
pub mod copy;
pub mod dispatcher;
pub mod frame;
pub mod stats;

pub use batch::BatchLoader;
pub use binder::{BoundRow, ChunkBinder, RowBinder};
pub use copy::CopyLoader;
pub use dispatcher::InsertDispatcher;
pub use frame::CopyFormat;
pub use stats::{LoadReport, LoadStrategy};
