//! Single-instance guard.
//!
//! Only one copy of the program may run per machine; two writers on the
//! same serial port would interleave frames. A lock file carrying the owner
//! pid stands in for the named mutex the original used; a lock left behind
//! by a dead process is reclaimed.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};
use tracing::debug;

#[derive(Debug)]
pub enum InstanceError {
    /// A live process already holds the lock.
    AlreadyRunning { pid: u32 },
    IoError(io::Error),
}

impl fmt::Display for InstanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRunning { pid } => write!(
                f,
                "another instance of PC Meter is already running (pid {})",
                pid
            ),
            Self::IoError(e) => write!(f, "instance lock IO error: {}", e),
        }
    }
}

impl Error for InstanceError {}

impl From<io::Error> for InstanceError {
    fn from(e: io::Error) -> Self {
        Self::IoError(e)
    }
}

/// Holds the instance lock for the lifetime of the process; dropping it
/// releases the lock.
#[derive(Debug)]
pub struct InstanceGuard {
    path: PathBuf,
}

impl InstanceGuard {
    /// Acquire the machine-wide lock, reclaiming it when the recorded
    /// owner is no longer alive.
    pub fn acquire() -> Result<Self, InstanceError> {
        Self::acquire_at(std::env::temp_dir().join("pcmeter.lock"))
    }

    pub fn acquire_at(path: PathBuf) -> Result<Self, InstanceError> {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                write!(file, "{}", std::process::id())?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let owner = fs::read_to_string(&path)
                    .ok()
                    .and_then(|s| s.trim().parse::<u32>().ok());

                if let Some(pid) = owner {
                    if pid != std::process::id() && pid_alive(pid) {
                        return Err(InstanceError::AlreadyRunning { pid });
                    }
                }

                // Stale or unreadable lock; take it over.
                debug!(path = %path.display(), "reclaiming stale instance lock");
                let mut file = fs::OpenOptions::new()
                    .write(true)
                    .truncate(true)
                    .open(&path)?;
                write!(file, "{}", std::process::id())?;
                Ok(Self { path })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn pid_alive(pid: u32) -> bool {
    let system = System::new_with_specifics(
        RefreshKind::new().with_processes(ProcessRefreshKind::new()),
    );
    system.process(Pid::from_u32(pid)).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pcmeter-lock-test-{}-{}", name, std::process::id()))
    }

    #[cfg(unix)]
    #[test]
    fn lock_held_by_live_process_is_refused() {
        let path = lock_path("contended");
        // Pid 1 is always alive on unix.
        fs::write(&path, "1").unwrap();

        let err = InstanceGuard::acquire_at(path.clone()).unwrap_err();
        assert!(matches!(err, InstanceError::AlreadyRunning { pid: 1 }));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn stale_lock_is_reclaimed() {
        let path = lock_path("stale");
        // Pid::MAX is never a live process.
        fs::write(&path, format!("{}", u32::MAX - 1)).unwrap();

        let guard = InstanceGuard::acquire_at(path.clone()).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap().trim(),
            std::process::id().to_string()
        );
        drop(guard);
    }

    #[test]
    fn drop_releases_the_lock() {
        let path = lock_path("release");
        let guard = InstanceGuard::acquire_at(path.clone()).unwrap();
        assert!(path.exists());
        drop(guard);
        assert!(!path.exists());
    }
}
