//! # egads-core
//!
//! Core of the EGADS entropy daemon: an in-process entropy pool fed by
//! system-noise gatherers, plus a counter-mode generator that reseeds itself
//! from the pool.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use egads_core::{Collector, EntropyPool, Prng, sources};
//!
//! let pool = Arc::new(EntropyPool::new());
//! let mut collector = Collector::new(Arc::clone(&pool)).unwrap();
//! collector.start(sources::all_sources(), Duration::from_secs(1));
//!
//! let mut seed = [0u8; egads_core::SEED_LEN];
//! pool.output(&mut seed, true);
//!
//! let mut prng = Prng::new(&seed, Duration::from_secs(300)).unwrap();
//! println!("{}", prng.rand_range(1, 6).unwrap());
//! ```
//!
//! ## Architecture
//!
//! Sources → Pool (UMAC extractor) → Output ring → Readers / PRNG seeds
//!
//! - [`cipher`]: AES block encryption, the only primitive everything else
//!   is built from.
//! - [`kdf`], [`uhash`], [`pdf`], [`mac`]: a UMAC-style keyed MAC. The pool
//!   runs it as an extractor: tags become output bytes.
//! - [`pool`]: per-source credit accounting, extraction, the rekey spool
//!   and state persistence.
//! - [`prng`], [`randlib`]: the counter-mode generator and the
//!   distributions layered on it.
//! - [`source`], [`sources`], [`collector`]: gatherers and the threads that
//!   drive them.

pub mod cipher;
pub mod collector;
pub mod error;
pub mod kdf;
pub mod mac;
pub mod pdf;
pub mod pool;
pub mod prng;
pub mod randlib;
pub mod ring;
pub mod source;
pub mod sources;
pub mod uhash;

pub use cipher::{ExpandedKey, encrypt_block, key_schedule};
pub use collector::{Collector, SourceTable};
pub use error::{PoolError, PrngError};
pub use mac::{KEY_LEN, MacEngine, TAG_LEN, mac};
pub use pool::{EntropyPool, PoolStats, SourceId};
pub use prng::{EntropyGatherer, Prng, SEED_LEN};
pub use source::{EntropySource, Sample, SourceInfo, SourceKind};
