//! SchedulerTiming: how long a burst of `sched_yield` calls takes.

use crate::source::{EntropySource, Sample, SourceInfo, SourceKind};

use super::helpers::time_micros;

/// Yields per collection round.
pub const SCHED_ITERS: usize = 10_000;

static SCHED_INFO: SourceInfo = SourceInfo {
    name: "sched_timing",
    description: "Elapsed time of repeated sched_yield calls",
    kind: SourceKind::Scheduler,
};

pub struct SchedulerTiming {
    iterations: usize,
}

impl SchedulerTiming {
    pub fn new() -> Self {
        Self {
            iterations: SCHED_ITERS,
        }
    }

    pub fn with_iterations(iterations: usize) -> Self {
        Self { iterations }
    }
}

impl Default for SchedulerTiming {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn yield_now() {
    // SAFETY: sched_yield() takes no arguments and only relinquishes the CPU.
    unsafe {
        libc::sched_yield();
    }
}

#[cfg(not(unix))]
fn yield_now() {
    std::thread::yield_now();
}

impl EntropySource for SchedulerTiming {
    fn info(&self) -> &SourceInfo {
        &SCHED_INFO
    }

    fn is_available(&self) -> bool {
        true
    }

    fn collect(&mut self) -> Vec<Sample> {
        let n = self.iterations;
        let elapsed = time_micros(|| {
            for _ in 0..n {
                yield_now();
            }
        });
        vec![
            Sample::new(elapsed.to_ne_bytes().to_vec(), 0),
            Sample::timestamp(SourceKind::Scheduler.timestamp_estimate()),
        ]
    }
}
