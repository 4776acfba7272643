//! DeviceRandom: a trickle of bytes from the kernel random device.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::{EntropySource, Sample, SourceInfo, SourceKind};

pub const DEFAULT_DEVICE: &str = "/dev/random";

/// Bytes read per poll.
pub const DEVICE_CHUNK: usize = 4;

pub const DEVICE_POLL: Duration = Duration::from_secs(1);

static DEVICE_INFO: SourceInfo = SourceInfo {
    name: "device_random",
    description: "Small periodic reads from the kernel random device",
    kind: SourceKind::Device,
};

pub struct DeviceRandom {
    path: PathBuf,
    file: Option<File>,
}

impl DeviceRandom {
    pub fn new() -> Self {
        Self::with_path(DEFAULT_DEVICE)
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let file = match File::open(&path) {
            Ok(f) => Some(f),
            Err(e) => {
                log::warn!("{}: {e}", path.display());
                None
            }
        };
        Self { path, file }
    }
}

impl Default for DeviceRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl EntropySource for DeviceRandom {
    fn info(&self) -> &SourceInfo {
        &DEVICE_INFO
    }

    fn is_available(&self) -> bool {
        self.file.is_some()
    }

    /// Credited at one bit per eight bytes read.
    fn collect(&mut self) -> Vec<Sample> {
        let Some(file) = self.file.as_mut() else {
            return Vec::new();
        };
        let mut buf = [0u8; DEVICE_CHUNK];
        match file.read(&mut buf) {
            Ok(n) if n > 0 => vec![Sample::new(buf[..n].to_vec(), (n / 8) as u32)],
            Ok(_) => Vec::new(),
            Err(e) => {
                log::debug!("{}: {e}", self.path.display());
                Vec::new()
            }
        }
    }

    fn poll_interval(&self) -> Option<Duration> {
        Some(DEVICE_POLL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_small_chunks() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[1, 2, 3, 4, 5, 6]).unwrap();
        tmp.flush().unwrap();

        let mut src = DeviceRandom::with_path(tmp.path());
        assert!(src.is_available());
        let first = src.collect();
        assert_eq!(first[0].data, vec![1, 2, 3, 4]);
        assert_eq!(first[0].estimated_bits, 0);
        assert_eq!(src.collect()[0].data, vec![5, 6]);
        assert!(src.collect().is_empty());
    }

    #[test]
    fn test_missing_device() {
        let mut src = DeviceRandom::with_path("/nonexistent/egads/random");
        assert!(!src.is_available());
        assert!(src.collect().is_empty());
    }
}
