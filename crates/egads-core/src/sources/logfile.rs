//! LogFileTail: new bytes appended to system log files.
//!
//! Each file is opened at its current end. On every poll the first chunk of
//! fresh data is mixed in (uncredited), the rest is skipped, and a credited
//! timestamp follows. Files that cannot be opened are logged and ignored.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::{EntropySource, Sample, SourceInfo, SourceKind};

/// Logs tailed by default.
pub const DEFAULT_LOGS: &[&str] = &["/var/log/messages", "/var/log/maillog"];

/// Bytes mixed in per file per poll.
pub const LOG_CHUNK: usize = 1024;

pub const LOG_POLL: Duration = Duration::from_secs(1);

static LOGFILE_INFO: SourceInfo = SourceInfo {
    name: "logfile_tail",
    description: "Fresh data appended to system log files",
    kind: SourceKind::LogFile,
};

pub struct LogFileTail {
    files: Vec<(PathBuf, File)>,
}

impl LogFileTail {
    /// Open every path at its end. Unopenable paths are skipped.
    pub fn open<P: AsRef<Path>>(paths: &[P]) -> Self {
        let mut files = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match open_at_end(path) {
                Ok(f) => files.push((path.to_path_buf(), f)),
                Err(e) => log::warn!("{}: {e}", path.display()),
            }
        }
        Self { files }
    }

    pub fn with_defaults(extra: &[PathBuf]) -> Self {
        let mut paths: Vec<PathBuf> = DEFAULT_LOGS.iter().map(PathBuf::from).collect();
        paths.extend(extra.iter().cloned());
        Self::open(&paths)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

fn open_at_end(path: &Path) -> std::io::Result<File> {
    let mut f = File::open(path)?;
    f.seek(SeekFrom::End(0))?;
    Ok(f)
}

/// Read one chunk and skip whatever else has accumulated.
fn read_fresh(file: &mut File) -> std::io::Result<Vec<u8>> {
    let mut chunk = vec![0u8; LOG_CHUNK];
    let n = loop {
        match file.read(&mut chunk) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    };
    chunk.truncate(n);
    if n > 0 {
        file.seek(SeekFrom::End(0))?;
    }
    Ok(chunk)
}

impl EntropySource for LogFileTail {
    fn info(&self) -> &SourceInfo {
        &LOGFILE_INFO
    }

    fn is_available(&self) -> bool {
        !self.files.is_empty()
    }

    fn collect(&mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        for (path, file) in &mut self.files {
            match read_fresh(file) {
                Ok(data) if !data.is_empty() => {
                    samples.push(Sample::new(data, 0));
                    samples.push(Sample::timestamp(SourceKind::LogFile.timestamp_estimate()));
                }
                Ok(_) => {}
                Err(e) => log::debug!("{}: {e}", path.display()),
            }
        }
        samples
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(LOG_POLL)
    }
}
