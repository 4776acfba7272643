//! Daemon configuration: JSON file defaults overridden by command-line flags.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use egads_core::sources::SourceSelection;

pub const DEFAULT_DATA_DIR: &str = "/var/run/egads";
pub const PID_FILE: &str = "egads.pid";
pub const SEED_FILE: &str = "egads.seed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Directory holding the pid file, seed file and EGADS socket.
    pub data_dir: PathBuf,
    /// Seconds between collection passes once the pool is full.
    pub delay_secs: u64,
    /// Optional EGD-compatible socket.
    pub egd_socket: Option<PathBuf>,
    /// Logs tailed in addition to the system ones.
    pub log_files: Vec<PathBuf>,
    pub foreground: bool,
    pub use_commands: bool,
    pub use_system_logs: bool,
    pub use_scheduler: bool,
    pub use_threads: bool,
    pub use_truerand: bool,
    pub use_device: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            delay_secs: 1,
            egd_socket: None,
            log_files: Vec::new(),
            foreground: false,
            use_commands: true,
            use_system_logs: true,
            use_scheduler: true,
            use_threads: true,
            use_truerand: false,
            use_device: true,
        }
    }
}

impl DaemonConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
        serde_json::from_str(&text).map_err(|e| format!("invalid config {}: {e}", path.display()))
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }

    pub fn pid_path(&self) -> PathBuf {
        self.data_dir.join(PID_FILE)
    }

    pub fn seed_path(&self) -> PathBuf {
        self.data_dir.join(SEED_FILE)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.data_dir.join(egads_server::SOCKET_FILE)
    }

    pub fn selection(&self) -> SourceSelection {
        SourceSelection {
            scheduler: self.use_scheduler,
            threads: self.use_threads,
            truerand: self.use_truerand,
            commands: self.use_commands,
            system_logs: self.use_system_logs,
            extra_logs: self.log_files.clone(),
            device: self.use_device,
        }
    }
}

/// Default socket location for client commands.
pub fn default_socket() -> PathBuf {
    Path::new(DEFAULT_DATA_DIR).join(egads_server::SOCKET_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_historical_daemon() {
        let c = DaemonConfig::default();
        assert_eq!(c.delay(), Duration::from_secs(1));
        assert!(!c.use_truerand);
        assert!(c.use_scheduler && c.use_threads && c.use_commands);
        assert_eq!(c.seed_path(), Path::new("/var/run/egads/egads.seed"));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let c: DaemonConfig =
            serde_json::from_str(r#"{"delay_secs": 5, "use_truerand": true}"#).unwrap();
        assert_eq!(c.delay_secs, 5);
        assert!(c.use_truerand);
        assert_eq!(c.data_dir, PathBuf::from(DEFAULT_DATA_DIR));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(serde_json::from_str::<DaemonConfig>(r#"{"delay": 5}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("egads.json");
        std::fs::write(&path, r#"{"log_files": ["/tmp/a.log"], "foreground": true}"#).unwrap();
        let c = DaemonConfig::load(&path).unwrap();
        assert!(c.foreground);
        assert_eq!(c.selection().extra_logs, vec![PathBuf::from("/tmp/a.log")]);
        assert!(DaemonConfig::load(&dir.path().join("missing.json")).is_err());
    }
}
