//! Gatherer implementations.

pub mod helpers;

pub mod commands;
pub mod device;
pub mod logfile;
pub mod sched;
pub mod thread;
pub mod truerand;

use std::path::PathBuf;

use crate::source::EntropySource;

/// Which gatherers to run. Mirrors the daemon's command-line switches.
#[derive(Debug, Clone)]
pub struct SourceSelection {
    pub scheduler: bool,
    pub threads: bool,
    pub truerand: bool,
    pub commands: bool,
    pub system_logs: bool,
    /// Logs tailed in addition to (or instead of) the system ones.
    pub extra_logs: Vec<PathBuf>,
    pub device: bool,
}

impl Default for SourceSelection {
    fn default() -> Self {
        Self {
            scheduler: true,
            threads: true,
            truerand: false,
            commands: true,
            system_logs: true,
            extra_logs: Vec::new(),
            device: true,
        }
    }
}

/// Construct the selected gatherers. Each returns a boxed source.
pub fn build_sources(sel: &SourceSelection) -> Vec<Box<dyn EntropySource>> {
    let mut out: Vec<Box<dyn EntropySource>> = Vec::new();
    if sel.scheduler {
        out.push(Box::new(sched::SchedulerTiming::new()));
    }
    if sel.threads {
        out.push(Box::new(thread::ThreadTiming::new()));
    }
    if sel.truerand {
        out.push(Box::new(truerand::TrueRand::new()));
    }
    if sel.commands {
        out.push(Box::new(commands::CommandDiff::new()));
    }
    let logs = if sel.system_logs {
        logfile::LogFileTail::with_defaults(&sel.extra_logs)
    } else {
        logfile::LogFileTail::open(&sel.extra_logs)
    };
    if logs.file_count() > 0 {
        out.push(Box::new(logs));
    }
    if sel.device {
        out.push(Box::new(device::DeviceRandom::new()));
    }
    out
}

/// Every gatherer with default settings.
pub fn all_sources() -> Vec<Box<dyn EntropySource>> {
    build_sources(&SourceSelection {
        truerand: true,
        ..SourceSelection::default()
    })
}
