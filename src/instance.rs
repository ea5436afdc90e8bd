//! Single-instance guard backed by a PID lock file
//!
//! The file holds the owning process id as decimal text. A record whose PID
//! is not a running process is stale (left behind by a crash) and is taken
//! over. The guard removes the file on drop.

use log::{debug, info, warn};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use sysinfo::{Pid, ProcessesToUpdate, System};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Answers whether a PID belongs to a running process.
pub trait ProcessProbe {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Process table lookup through `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    fn is_alive(&self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        system.process(pid).is_some()
    }
}

/// Held for the process lifetime.
#[derive(Debug)]
pub struct SingleInstanceGuard {
    path: PathBuf,
    pid: u32,
}

impl SingleInstanceGuard {
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, InstanceError> {
        Self::acquire_with(path, &SystemProbe, std::process::id())
    }

    pub fn acquire_with(
        path: impl Into<PathBuf>,
        probe: &dyn ProcessProbe,
        pid: u32,
    ) -> Result<Self, InstanceError> {
        let path = path.into();
        claim(&path, probe, pid)?;
        Ok(Self { path, pid })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for SingleInstanceGuard {
    fn drop(&mut self) {
        // Never delete a record someone else took over
        match read_record(&self.path) {
            Ok(Record::Owner(owner)) if owner == self.pid => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!("failed to remove instance lock: {}", e);
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Record {
    Missing,
    Owner(u32),
    /// Unparseable contents; treated as stale
    Garbage,
}

/// Read, reclaim, create: enough rounds to lose one race and see the winner
const CLAIM_ATTEMPTS: usize = 3;

fn claim(path: &Path, probe: &dyn ProcessProbe, pid: u32) -> Result<(), InstanceError> {
    let io_err = |source| InstanceError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    // Stale records are removed and then re-created exclusively like a
    // missing one, so two launches racing for the same stale file cannot
    // both win. A competitor may beat us between any two steps.
    for _ in 0..CLAIM_ATTEMPTS {
        let record = read_record(path).map_err(io_err)?;
        match record {
            Record::Owner(owner) if owner != pid && probe.is_alive(owner) => {
                info!("instance lock held by running pid {}", owner);
                return Err(InstanceError::AlreadyRunning { pid: owner });
            }
            Record::Owner(owner) if owner == pid => {
                return Ok(());
            }
            Record::Owner(owner) => {
                warn!("reclaiming stale instance lock from pid {}", owner);
                remove_stale(path, &record).map_err(io_err)?;
            }
            Record::Garbage => {
                warn!("replacing unreadable instance lock");
                remove_stale(path, &record).map_err(io_err)?;
            }
            Record::Missing => match create_record(path, pid) {
                Ok(()) => {
                    debug!("instance lock created at {}", path.display());
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(io_err(e)),
            },
        }
    }

    match read_record(path).map_err(io_err)? {
        Record::Owner(owner) => Err(InstanceError::AlreadyRunning { pid: owner }),
        _ => Err(io_err(io::Error::new(
            io::ErrorKind::Other,
            "lock file kept changing",
        ))),
    }
}

fn read_record(path: &Path) -> io::Result<Record> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text
            .trim()
            .parse::<u32>()
            .map_or(Record::Garbage, Record::Owner)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Record::Missing),
        Err(e) => Err(e),
    }
}

/// Remove `path` only if it still holds `seen`; a record someone wrote since
/// is left alone. Already gone is fine.
fn remove_stale(path: &Path, seen: &Record) -> io::Result<()> {
    if read_record(path)? != *seen {
        return Ok(());
    }
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Publish a complete record at `path`, failing with `AlreadyExists` if one
/// is there. The PID is written to a private file first and then hard-linked
/// into place, so nobody ever reads a half-written record.
fn create_record(path: &Path, pid: u32) -> io::Result<()> {
    let staging = path.with_extension(format!("{}.tmp", pid));
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)?;
        file.write_all(pid.to_string().as_bytes())?;
    }
    let linked = fs::hard_link(&staging, path);
    if let Err(e) = fs::remove_file(&staging) {
        debug!("leaving staging file {}: {}", staging.display(), e);
    }
    linked
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct FakeProbe(HashSet<u32>);

    impl ProcessProbe for FakeProbe {
        fn is_alive(&self, pid: u32) -> bool {
            self.0.contains(&pid)
        }
    }

    fn probe(alive: &[u32]) -> FakeProbe {
        FakeProbe(alive.iter().copied().collect())
    }

    fn lock_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("nested").join("instance.lock")
    }

    #[test]
    fn fresh_acquire_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        let guard = SingleInstanceGuard::acquire_with(&path, &probe(&[]), 4242).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "4242");
        assert_eq!(guard.pid(), 4242);
    }

    #[test]
    fn create_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        let _guard = SingleInstanceGuard::acquire_with(&path, &probe(&[]), 55).unwrap();
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("instance.lock")]);
        assert_eq!(
            create_record(&path, 56).unwrap_err().kind(),
            io::ErrorKind::AlreadyExists
        );
    }

    #[test]
    fn stale_record_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "9999").unwrap();

        let _guard = SingleInstanceGuard::acquire_with(&path, &probe(&[]), 12345).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "12345");
    }

    #[test]
    fn only_one_launch_reclaims_a_stale_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "9999").unwrap();

        let first = SingleInstanceGuard::acquire_with(&path, &probe(&[]), 100).unwrap();
        let err = SingleInstanceGuard::acquire_with(&path, &probe(&[100]), 200).unwrap_err();
        assert!(matches!(err, InstanceError::AlreadyRunning { pid: 100 }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "100");
        drop(first);
        assert!(!path.exists());
    }

    #[test]
    fn late_stale_removal_leaves_a_fresh_record_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "9999").unwrap();

        // A competitor read the dead record before we reclaimed it
        let seen = read_record(&path).unwrap();
        let _guard = SingleInstanceGuard::acquire_with(&path, &probe(&[]), 100).unwrap();
        remove_stale(&path, &seen).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "100");
    }

    #[test]
    fn live_record_means_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "9999\n").unwrap();

        let err = SingleInstanceGuard::acquire_with(&path, &probe(&[9999]), 12345).unwrap_err();
        assert!(matches!(err, InstanceError::AlreadyRunning { pid: 9999 }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "9999\n");
    }

    #[test]
    fn garbage_record_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "not a pid").unwrap();

        let _guard = SingleInstanceGuard::acquire_with(&path, &probe(&[]), 7).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "7");
    }

    #[test]
    fn own_pid_record_is_reacquired() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "77").unwrap();
        assert!(SingleInstanceGuard::acquire_with(&path, &probe(&[77]), 77).is_ok());
    }

    #[test]
    fn drop_removes_only_our_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);

        let guard = SingleInstanceGuard::acquire_with(&path, &probe(&[]), 1).unwrap();
        drop(guard);
        assert!(!path.exists());

        let guard = SingleInstanceGuard::acquire_with(&path, &probe(&[]), 1).unwrap();
        fs::write(&path, "2").unwrap();
        drop(guard);
        assert_eq!(fs::read_to_string(&path).unwrap(), "2");
    }

    #[test]
    fn system_probe_sees_this_process() {
        assert!(SystemProbe.is_alive(std::process::id()));
        assert!(!SystemProbe.is_alive(4_000_000_000));
    }

    #[test]
    fn real_probe_blocks_second_acquire_from_live_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = lock_path(&dir);
        let _first = SingleInstanceGuard::acquire(&path).unwrap();

        // Pretend to be another process id while the real owner is alive
        let err = SingleInstanceGuard::acquire_with(&path, &SystemProbe, 4_000_000_001).unwrap_err();
        assert!(matches!(err, InstanceError::AlreadyRunning { .. }));
    }
}
