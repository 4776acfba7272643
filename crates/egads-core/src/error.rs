//! Error types for the pool and the generator.

use thiserror::Error;

/// Failures surfaced by [`EntropyPool`](crate::EntropyPool).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("source id {0} is not registered")]
    InvalidSource(usize),

    #[error("source table is full ({0} slots)")]
    SourceTableFull(usize),

    #[error("state i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("saved state too short: expected {expected} bytes, read {actual}")]
    ShortState { expected: usize, actual: usize },

    #[error("pool is already keyed")]
    AlreadyKeyed,
}

/// Failures surfaced by [`Prng`](crate::Prng).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrngError {
    #[error("seed must be {expected} bytes, got {actual}")]
    SeedLength { expected: usize, actual: usize },

    #[error("empty range: min {min} > max {max}")]
    InvalidRange { min: i64, max: i64 },

    #[error("entropy gatherer returned no data")]
    GatherFailed,
}
