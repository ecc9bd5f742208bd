use crate::HarvestError;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

pub const LOCK_FILE_NAME: &str = ".harvest.lock";

/// A lock without a readable PID may belong to an instance that has not
/// finished writing it yet. It only counts as abandoned after this long.
pub const UNREADABLE_LOCK_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq)]
enum LockState {
    Held,
    /// Abandoned; the contents observed when the judgement was made, or
    /// `None` if the lock vanished before it could be read
    Stale(Option<Vec<u8>>),
}

/// Refuses a second harvest over the same output directory while one is
/// running. Released when dropped.
#[derive(Debug)]
pub struct InstanceGuard {
    path: PathBuf,
}

impl InstanceGuard {
    pub fn acquire(output_dir: &Path) -> Result<Self, HarvestError> {
        fs::create_dir_all(output_dir).map_err(|e| {
            HarvestError::FilesystemError(format!("creating {}: {e}", output_dir.display()))
        })?;
        let path = output_dir.join(LOCK_FILE_NAME);

        if Self::publish(output_dir, &path)? {
            return Ok(Self { path });
        }

        match lock_state(&path) {
            LockState::Held => Err(HarvestError::AlreadyRunning(path)),
            LockState::Stale(observed) => {
                warn!("Replacing stale lock {}", path.display());
                if !retire_stale(output_dir, &path, observed.as_deref())? {
                    return Err(HarvestError::AlreadyRunning(path));
                }
                if Self::publish(output_dir, &path)? {
                    Ok(Self { path })
                } else {
                    Err(HarvestError::AlreadyRunning(path))
                }
            }
        }
    }

    /// Write our PID to a private file, then hard-link it into place. The
    /// link either fails or exposes a lock that already holds the PID.
    /// Returns `false` if another lock is in the way.
    fn publish(output_dir: &Path, path: &Path) -> Result<bool, HarvestError> {
        let staging = output_dir.join(format!("{LOCK_FILE_NAME}.{}", uuid::Uuid::new_v4()));
        let result = write_pid(&staging).and_then(|_| fs::hard_link(&staging, path));
        crate::silent_remove(&staging);

        match result {
            Ok(()) => {
                debug!("Acquired {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(HarvestError::FilesystemError(format!(
                "{}: {e}",
                path.display()
            ))),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        crate::silent_remove(&self.path);
    }
}

fn write_pid(path: &Path) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()
}

/// A lock is stale when its PID no longer names a live process (checked
/// through `/proc` where it exists), or when it has no readable PID and is
/// older than [`UNREADABLE_LOCK_GRACE`].
fn lock_state(path: &Path) -> LockState {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        // Released between our link attempt and this read.
        Err(e) if e.kind() == ErrorKind::NotFound => return LockState::Stale(None),
        Err(_) => return LockState::Held,
    };

    let pid = std::str::from_utf8(&contents)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());

    let stale = match pid {
        Some(pid) => {
            let proc_root = Path::new("/proc");
            proc_root.is_dir() && !proc_root.join(pid.to_string()).exists()
        }
        None => fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age >= UNREADABLE_LOCK_GRACE)
            .unwrap_or(false),
    };

    if stale {
        LockState::Stale(Some(contents))
    } else {
        LockState::Held
    }
}

/// Move a stale lock out of the way by renaming it, so only one contender
/// can take it. If the renamed file is no longer the one judged stale,
/// another instance got there first: its lock is put back and `false` is
/// returned.
fn retire_stale(
    output_dir: &Path,
    path: &Path,
    observed: Option<&[u8]>,
) -> Result<bool, HarvestError> {
    let retired = output_dir.join(format!("{LOCK_FILE_NAME}.{}.stale", uuid::Uuid::new_v4()));

    match fs::rename(path, &retired) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => {
            return Err(HarvestError::FilesystemError(format!(
                "{}: {e}",
                path.display()
            )))
        }
    }

    let taken = fs::read(&retired).ok();
    if taken.is_some() && taken.as_deref() == observed {
        crate::silent_remove(&retired);
        return Ok(true);
    }

    if let Err(e) = fs::hard_link(&retired, path) {
        warn!("Could not restore lock {}: {}", path.display(), e);
    }
    crate::silent_remove(&retired);
    Ok(false)
}
