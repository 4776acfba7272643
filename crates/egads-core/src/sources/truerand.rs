//! TrueRand: count how far a busy loop gets before a short timer expires.
//!
//! The count depends on interrupt latency and scheduling noise. A helper
//! thread plays the role of the interval timer and flips a shared flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::source::{EntropySource, Sample, SourceInfo, SourceKind};

/// Timer runs per collection round.
pub const TRUERAND_ITERS: usize = 8;

/// Length of one timer run.
pub const TRUERAND_TICK: Duration = Duration::from_micros(33_333);

static TRUERAND_INFO: SourceInfo = SourceInfo {
    name: "truerand",
    description: "Busy-loop counts between timer expiries",
    kind: SourceKind::TrueRand,
};

pub struct TrueRand {
    iterations: usize,
    tick: Duration,
}

impl TrueRand {
    pub fn new() -> Self {
        Self {
            iterations: TRUERAND_ITERS,
            tick: TRUERAND_TICK,
        }
    }

    pub fn with_timing(iterations: usize, tick: Duration) -> Self {
        Self { iterations, tick }
    }
}

impl Default for TrueRand {
    fn default() -> Self {
        Self::new()
    }
}

fn count_until_tick(tick: Duration) -> u32 {
    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    let timer = std::thread::spawn(move || {
        std::thread::sleep(tick);
        flag.store(true, Ordering::Release);
    });

    let mut count = 0u32;
    while !done.load(Ordering::Acquire) {
        count = count.wrapping_add(1);
        std::hint::spin_loop();
    }
    let _ = timer.join();
    count
}

impl EntropySource for TrueRand {
    fn info(&self) -> &SourceInfo {
        &TRUERAND_INFO
    }

    fn is_available(&self) -> bool {
        true
    }

    fn collect(&mut self) -> Vec<Sample> {
        let mut data = Vec::with_capacity(self.iterations * 4);
        for _ in 0..self.iterations {
            data.extend_from_slice(&count_until_tick(self.tick).to_ne_bytes());
        }
        vec![
            Sample::new(data, 0),
            Sample::timestamp(SourceKind::TrueRand.timestamp_estimate()),
        ]
    }
}
