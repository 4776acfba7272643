//! CommandDiff: entropy from how system tables change between snapshots.
//!
//! `ps -elf` and `df -i` are run every round. Every output row is mixed in
//! uncredited. The rows are then matched against the previous snapshot by an
//! identity key, and each appeared, vanished or changed row counts as one
//! event. A timestamp is credited with `events / divisor` bits.

use std::collections::BTreeMap;

use crate::source::{EntropySource, Sample, SourceInfo, SourceKind};

use super::helpers::{command_exists, run_command_lines};

static COMMANDS_INFO: SourceInfo = SourceInfo {
    name: "command_diff",
    description: "Row changes between successive ps and df snapshots",
    kind: SourceKind::Commands,
};

/// One table-producing command and how to diff it.
#[derive(Debug, Clone)]
pub struct TableCommand {
    pub program: &'static str,
    pub args: &'static [&'static str],
    /// Leading lines to drop (column headers).
    pub header_lines: usize,
    /// Whitespace-separated fields forming the row identity.
    pub key_fields: std::ops::Range<usize>,
    /// Events per credited bit.
    pub divisor: u32,
}

/// Process table. Rows are identified by UID and PID.
pub const PS: TableCommand = TableCommand {
    program: "ps",
    args: &["-elf"],
    header_lines: 1,
    key_fields: 2..4,
    divisor: 5,
};

/// Column holding the mount point in `df -i` output.
#[cfg(target_os = "macos")]
const DF_MOUNT_FIELD: usize = 8;
#[cfg(not(target_os = "macos"))]
const DF_MOUNT_FIELD: usize = 5;

/// Inode usage per filesystem. Rows are identified by mount point.
pub const DF: TableCommand = TableCommand {
    program: "df",
    args: &["-i"],
    header_lines: 1,
    key_fields: DF_MOUNT_FIELD..usize::MAX,
    divisor: 8,
};

type Snapshot = BTreeMap<String, String>;

/// Index rows by identity key. Rows too short to carry a key are dropped.
fn index_rows<'a, I>(rows: I, key_fields: &std::ops::Range<usize>) -> Snapshot
where
    I: IntoIterator<Item = &'a str>,
{
    let mut table = Snapshot::new();
    for row in rows {
        let fields: Vec<&str> = row.split_whitespace().collect();
        if fields.len() <= key_fields.start {
            continue;
        }
        let end = key_fields.end.min(fields.len());
        let key = fields[key_fields.start..end].join(" ");
        table.insert(key, row.to_string());
    }
    table
}

/// Rows present in only one snapshot, plus rows whose content changed.
pub fn count_changes(last: &Snapshot, cur: &Snapshot) -> u32 {
    let mut events = 0u32;
    for (key, row) in last {
        match cur.get(key) {
            Some(now) if now == row => {}
            _ => events += 1,
        }
    }
    events + cur.keys().filter(|k| !last.contains_key(*k)).count() as u32
}

struct Tracked {
    command: TableCommand,
    last: Option<Snapshot>,
}

pub struct CommandDiff {
    tracked: Vec<Tracked>,
}

impl CommandDiff {
    pub fn new() -> Self {
        Self::with_commands(vec![PS, DF])
    }

    pub fn with_commands(commands: Vec<TableCommand>) -> Self {
        Self {
            tracked: commands
                .into_iter()
                .map(|command| Tracked {
                    command,
                    last: None,
                })
                .collect(),
        }
    }

    /// Mix in one snapshot and diff it against the previous one.
    fn ingest(tracked: &mut Tracked, lines: &[String], samples: &mut Vec<Sample>) {
        let rows: Vec<&str> = lines
            .iter()
            .skip(tracked.command.header_lines)
            .map(String::as_str)
            .filter(|l| !l.trim().is_empty())
            .collect();
        for row in &rows {
            samples.push(Sample::new(row.as_bytes().to_vec(), 0));
        }

        let snapshot = index_rows(rows.iter().copied(), &tracked.command.key_fields);
        if let Some(last) = &tracked.last {
            let events = count_changes(last, &snapshot);
            samples.push(Sample::timestamp(events / tracked.command.divisor));
        }
        tracked.last = Some(snapshot);
    }
}

impl Default for CommandDiff {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for CommandDiff {
    fn info(&self) -> &SourceInfo {
        &COMMANDS_INFO
    }

    fn is_available(&self) -> bool {
        self.tracked.iter().any(|t| command_exists(t.command.program))
    }

    fn collect(&mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        for tracked in &mut self.tracked {
            match run_command_lines(tracked.command.program, tracked.command.args) {
                Some(lines) => Self::ingest(tracked, &lines, &mut samples),
                None => log::debug!("{} produced no output", tracked.command.program),
            }
        }
        samples
    }
}
