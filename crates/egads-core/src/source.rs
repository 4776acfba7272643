//! Entropy source trait and metadata.
//!
//! Every gatherer implements [`EntropySource`]. A source describes itself
//! with a static [`SourceInfo`] and yields [`Sample`]s: raw bytes plus the
//! number of bits of entropy the source is willing to vouch for. Most
//! sources credit nothing for the payload itself and instead follow it
//! with a wall-clock [`Sample::timestamp`] carrying the per-kind estimate.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

/// The fixed set of gatherer kinds. Each kind owns one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Time taken by a burst of `sched_yield` calls.
    Scheduler,
    /// Time taken to spawn and join a batch of threads.
    Thread,
    /// Counter increments between timer expiries.
    TrueRand,
    /// Fresh lines appended to system log files.
    LogFile,
    /// Differences between successive `ps`/`df` snapshots.
    Commands,
    /// Bytes read from the kernel random device.
    Device,
    /// Bytes submitted by clients over the wire.
    External,
}

impl SourceKind {
    /// All kinds in pool-registration order.
    pub const ALL: [SourceKind; 7] = [
        Self::Scheduler,
        Self::Thread,
        Self::TrueRand,
        Self::LogFile,
        Self::Commands,
        Self::Device,
        Self::External,
    ];

    /// Position in [`SourceKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Bits credited to the timestamp that follows a collection.
    pub fn timestamp_estimate(self) -> u32 {
        match self {
            Self::Scheduler => 2,
            Self::Thread => 3,
            Self::TrueRand => 2,
            Self::LogFile => 1,
            Self::Commands | Self::Device | Self::External => 0,
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduler => write!(f, "scheduler"),
            Self::Thread => write!(f, "thread"),
            Self::TrueRand => write!(f, "truerand"),
            Self::LogFile => write!(f, "logfile"),
            Self::Commands => write!(f, "commands"),
            Self::Device => write!(f, "device"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Static description of a source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    /// Unique identifier (e.g. `"sched_timing"`).
    pub name: &'static str,
    /// One-line human-readable description.
    pub description: &'static str,
    /// Pool slot this source feeds.
    pub kind: SourceKind,
}

/// One submission to the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub data: Vec<u8>,
    pub estimated_bits: u32,
}

impl Sample {
    pub fn new(data: Vec<u8>, estimated_bits: u32) -> Self {
        Self {
            data,
            estimated_bits,
        }
    }

    /// Current wall-clock time as seconds and microseconds, native endian.
    pub fn timestamp(estimated_bits: u32) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        let mut data = Vec::with_capacity(16);
        data.extend_from_slice(&now.as_secs().to_ne_bytes());
        data.extend_from_slice(&u64::from(now.subsec_micros()).to_ne_bytes());
        Self::new(data, estimated_bits)
    }
}

/// Trait every gatherer implements.
pub trait EntropySource: Send {
    fn info(&self) -> &SourceInfo;

    /// Check if this source can operate on the current machine.
    fn is_available(&self) -> bool;

    /// Run one collection round.
    fn collect(&mut self) -> Vec<Sample>;

    /// `Some(period)` if the source runs on its own polling thread instead
    /// of the main collection loop.
    fn poll_interval(&self) -> Option<Duration> {
        None
    }

    fn name(&self) -> &'static str {
        self.info().name
    }

    fn kind(&self) -> SourceKind {
        self.info().kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_indices_follow_order() {
        for (i, kind) in SourceKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[test]
    fn test_timestamp_estimates() {
        assert_eq!(SourceKind::Scheduler.timestamp_estimate(), 2);
        assert_eq!(SourceKind::Thread.timestamp_estimate(), 3);
        assert_eq!(SourceKind::TrueRand.timestamp_estimate(), 2);
        assert_eq!(SourceKind::LogFile.timestamp_estimate(), 1);
        assert_eq!(SourceKind::Commands.timestamp_estimate(), 0);
    }

    #[test]
    fn test_timestamp_sample() {
        let a = Sample::timestamp(3);
        assert_eq!(a.data.len(), 16);
        assert_eq!(a.estimated_bits, 3);
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(SourceKind::TrueRand.to_string(), "truerand");
        assert_eq!(SourceKind::External.to_string(), "external");
    }
}
