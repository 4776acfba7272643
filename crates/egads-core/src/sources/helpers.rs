//! Shared helpers used by multiple gatherers.

use std::time::Instant;

// ---------------------------------------------------------------------------
// Timing
// ---------------------------------------------------------------------------

/// Run `f` and return how long it took in microseconds, truncated to 32 bits.
pub fn time_micros<F: FnOnce()>(f: F) -> u32 {
    let start = Instant::now();
    f();
    start.elapsed().as_micros() as u32
}

// ---------------------------------------------------------------------------
// Shared command utilities
// ---------------------------------------------------------------------------

/// Check if a command exists by running `which`.
pub fn command_exists(name: &str) -> bool {
    std::process::Command::new("which")
        .arg(name)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Run a subprocess and return its stdout split into lines.
///
/// Returns `None` if the command fails to execute or exits with a non-zero
/// status.
pub fn run_command_lines(program: &str, args: &[&str]) -> Option<Vec<String>> {
    let output = std::process::Command::new(program)
        .args(args)
        .stderr(std::process::Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        log::debug!("{program} exited with {}", output.status);
        return None;
    }

    Some(
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_owned)
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_micros_measures_sleep() {
        let us = time_micros(|| std::thread::sleep(std::time::Duration::from_millis(2)));
        assert!(us >= 2000);
    }

    #[test]
    fn test_missing_command() {
        assert!(run_command_lines("/nonexistent/egads-test-binary", &[]).is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_run_command_lines() {
        let lines = run_command_lines("echo", &["a"]).unwrap();
        assert_eq!(lines, vec!["a".to_string()]);
    }
}
