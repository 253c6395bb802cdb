//! Daemon liveness marker.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

/// Holds `daemon.pid` for the life of the daemon. Removed on
/// [`PidFile::remove`] or drop, whichever comes first.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    removed: AtomicBool,
}

impl PidFile {
    /// Write the current process id to `path`, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, std::process::id().to_string())?;
        debug!(path = %path.display(), pid = std::process::id(), "pid file written");
        Ok(Self {
            path,
            removed: AtomicBool::new(false),
        })
    }

    /// Pid stored at `path`, if the file exists and parses.
    pub fn read(path: &Path) -> Option<u32> {
        std::fs::read_to_string(path).ok()?.trim().parse().ok()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file. Later calls do nothing.
    pub fn remove(&self) {
        if self.removed.swap(true, Ordering::SeqCst) {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "pid file removed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove pid file"),
        }
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Whether a process with `pid` exists.
#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // Signal 0 performs the permission and existence check only.
    unsafe { libc::kill(pid, 0) == 0 }
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    false
}

/// Ask the process `pid` to shut down.
#[cfg(unix)]
pub fn terminate(pid: u32) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "daemon stop is only supported on unix",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_read_remove() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("state/daemon.pid");

        let pid = PidFile::create(&path).unwrap();
        assert_eq!(PidFile::read(&path), Some(std::process::id()));

        pid.remove();
        pid.remove();
        assert!(!path.exists());
        assert_eq!(PidFile::read(&path), None);
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("daemon.pid");
        {
            let _pid = PidFile::create(&path).unwrap();
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_garbage_pid_reads_as_none() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("daemon.pid");
        std::fs::write(&path, "not-a-pid").unwrap();
        assert_eq!(PidFile::read(&path), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_current_process_is_alive() {
        assert!(process_alive(std::process::id()));
    }
}
