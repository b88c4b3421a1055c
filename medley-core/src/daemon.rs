//! Detaching from the controlling terminal

use crate::error::{EngineError, Result};
use std::path::Path;
use tracing::{info, warn};

/// Process detachment
pub trait Detacher: Send + Sync {
    /// Detach the process; returns only in the surviving child
    fn detach(&self) -> Result<()>;
}

/// Detacher using `daemon(3)`, keeping the working directory
#[derive(Debug, Default)]
pub struct SystemDetacher;

impl Detacher for SystemDetacher {
    #[cfg(unix)]
    fn detach(&self) -> Result<()> {
        // SAFETY: daemon(3) forks; the parent exits inside the call and only
        // the child returns here
        let rc = unsafe { libc::daemon(1, 0) };
        if rc != 0 {
            return Err(EngineError::Daemonize(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        info!("Detached from controlling terminal");
        Ok(())
    }

    #[cfg(not(unix))]
    fn detach(&self) -> Result<()> {
        Err(EngineError::Daemonize(
            "daemon mode is not supported on this platform".into(),
        ))
    }
}

/// Write the current process id to `path`
///
/// Failures are logged; the pid file is informational only.
pub fn write_pid_file(path: &Path) -> bool {
    let pid = std::process::id();
    info!("Writing pid {} to {}", pid, path.display());

    match std::fs::write(path, pid.to_string()) {
        Ok(()) => true,
        Err(e) => {
            warn!("Cannot write pid file {}: {}", path.display(), e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_pid_file_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("medley.pid");

        assert!(write_pid_file(&path));
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, std::process::id().to_string());
    }

    #[test]
    fn test_pid_file_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("medley.pid");
        assert!(!write_pid_file(&path));
    }
}
