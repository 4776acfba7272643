//! ThreadTiming: how long it takes to spawn and join a batch of threads.

use crate::source::{EntropySource, Sample, SourceInfo, SourceKind};

use super::helpers::time_micros;

/// Threads spawned per collection round.
pub const THREAD_ITERS: usize = 100;

static THREAD_INFO: SourceInfo = SourceInfo {
    name: "thread_timing",
    description: "Elapsed time of repeated thread spawn and join",
    kind: SourceKind::Thread,
};

pub struct ThreadTiming {
    iterations: usize,
}

impl ThreadTiming {
    pub fn new() -> Self {
        Self {
            iterations: THREAD_ITERS,
        }
    }

    pub fn with_iterations(iterations: usize) -> Self {
        Self { iterations }
    }
}

impl Default for ThreadTiming {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for ThreadTiming {
    fn info(&self) -> &SourceInfo {
        &THREAD_INFO
    }

    fn is_available(&self) -> bool {
        true
    }

    fn collect(&mut self) -> Vec<Sample> {
        let n = self.iterations;
        let elapsed = time_micros(|| {
            for _ in 0..n {
                // A failed spawn just shortens the round.
                if let Ok(handle) = std::thread::Builder::new().spawn(|| {}) {
                    let _ = handle.join();
                }
            }
        });
        vec![
            Sample::new(elapsed.to_ne_bytes().to_vec(), 0),
            Sample::timestamp(SourceKind::Thread.timestamp_estimate()),
        ]
    }
}
