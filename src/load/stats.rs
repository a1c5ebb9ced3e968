//! Load statistics.

use std::fmt;

/// Which loader handled a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStrategy {
    /// Grouped parameterized insert statements.
    Batched,
    /// CSV-framed `COPY FROM STDIN` streams.
    Copy,
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::Batched => f.write_str("batched"),
            LoadStrategy::Copy => f.write_str("copy"),
        }
    }
}

/// Outcome of a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub strategy: LoadStrategy,
    /// Records submitted, which is the input length on success.
    pub records: usize,
    /// Chunks submitted to the store.
    pub chunks: usize,
    /// Row counts the store acknowledged. Informational only: loaders never
    /// compare it against `records`.
    pub acknowledged_rows: u64,
}

impl LoadReport {
    pub fn new(strategy: LoadStrategy) -> Self {
        Self {
            strategy,
            records: 0,
            chunks: 0,
            acknowledged_rows: 0,
        }
    }

    pub fn record_chunk(&mut self, records: usize, acknowledged: u64) {
        self.records += records;
        self.chunks += 1;
        self.acknowledged_rows += acknowledged;
    }

    /// Fold a resumed load into this one.
    ///
    /// The strategy of `self` is kept; a resumed suffix may have been routed
    /// differently.
    pub fn merge(&mut self, other: LoadReport) {
        self.records += other.records;
        self.chunks += other.chunks;
        self.acknowledged_rows += other.acknowledged_rows;
    }
}
