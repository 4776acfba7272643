//! Data directory checks and pid-file ownership.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

const GROUP_OTHER_WRITE: u32 = 0o022;
const STICKY: u32 = 0o1000;

/// Attempts to displace a running daemon before giving up.
const PID_ATTEMPTS: usize = 3;

/// Refuse directories other users could tamper with.
///
/// The directory itself must not be a symlink or group/other-writable.
/// Each ancestor must not be a symlink, must be owned by root or by the
/// directory's owner, and may be group/other-writable only if sticky.
pub fn check_safe_dir(dir: &Path) -> Result<(), String> {
    let meta = std::fs::symlink_metadata(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    if meta.file_type().is_symlink() {
        return Err(format!("`{}' is a symbolic link", dir.display()));
    }
    if !meta.is_dir() {
        return Err(format!("`{}' is not a directory", dir.display()));
    }
    if meta.mode() & GROUP_OTHER_WRITE != 0 {
        return Err(format!("`{}' is writable by group or others", dir.display()));
    }
    let owner = meta.uid();

    let abs = std::fs::canonicalize(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    for ancestor in abs.ancestors().skip(1) {
        let m = std::fs::symlink_metadata(ancestor)
            .map_err(|e| format!("{}: {e}", ancestor.display()))?;
        if m.file_type().is_symlink() {
            return Err(format!("`{}' is a symbolic link", ancestor.display()));
        }
        if m.mode() & GROUP_OTHER_WRITE != 0 && m.mode() & STICKY == 0 {
            return Err(format!("`{}' is writable by group or others", ancestor.display()));
        }
        if m.uid() != 0 && m.uid() != owner {
            return Err(format!("`{}' is owned by another user", ancestor.display()));
        }
    }
    Ok(())
}

/// Exclusive pid file, removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Create `path` holding our pid. If it already exists, signal the
    /// recorded process to exit and retry, at most three times.
    pub fn acquire(path: &Path) -> io::Result<Self> {
        Self::acquire_with_pause(path, Duration::from_secs(1))
    }

    fn acquire_with_pause(path: &Path, pause: Duration) -> io::Result<Self> {
        for _ in 0..PID_ATTEMPTS {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(0o600)
                .open(path)
            {
                Ok(mut f) => {
                    write!(f, "{}", std::process::id())?;
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    displace(path)?;
                }
                Err(e) => return Err(e),
            }
            std::thread::sleep(pause);
        }
        Err(io::Error::new(
            io::ErrorKind::AddrInUse,
            "another egads process is already running",
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub fn read_pid(path: &Path) -> Option<i32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Ask the owner of a pid file to exit; clear the file if it is gone.
fn displace(path: &Path) -> io::Result<()> {
    let Some(pid) = read_pid(path) else {
        log::warn!("unreadable pid file {}, removing", path.display());
        return std::fs::remove_file(path);
    };
    if pid <= 0 || pid as u32 == std::process::id() {
        return std::fs::remove_file(path);
    }
    // SAFETY: kill() with a positive pid only sends a signal.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
        log::info!("removing stale pid file for exited process {pid}");
        std::fs::remove_file(path)?;
    } else {
        log::warn!("sent SIGTERM to running egads process {pid}");
    }
    Ok(())
}

/// Detach from the terminal. The parent exits; the child continues.
pub fn daemonize() -> io::Result<()> {
    // SAFETY: called before any threads are spawned.
    match unsafe { libc::fork() } {
        -1 => Err(io::Error::last_os_error()),
        0 => {
            // SAFETY: setsid() has no memory-safety preconditions.
            unsafe {
                libc::setsid();
            }
            Ok(())
        }
        _ => std::process::exit(0),
    }
}
