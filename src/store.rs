//! Per-camera frame storage with duplicate suppression
//!
//! Each camera owns one directory under the output root. Frame names are UTC
//! timestamps, so the lexicographically last regular file is always the most
//! recent frame; no separate index is kept.

use crate::{sanitize_camera_name, HarvestError};
use md5::{Digest, Md5};
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const FINGERPRINT_CHUNK: usize = 4096;

/// Whole-file MD5 digest. Two frames are the same iff their bytes are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn of_file(path: &Path) -> Result<Self, HarvestError> {
        let mut file = fs::File::open(path)?;
        let mut hasher = Md5::new();
        let mut chunk = [0u8; FINGERPRINT_CHUNK];

        loop {
            let read = file.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            hasher.update(&chunk[..read]);
        }

        Ok(Self(hasher.finalize().into()))
    }

    pub fn of_bytes(data: &[u8]) -> Self {
        Self(Md5::digest(data).into())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Result of offering a verified frame to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreDecision {
    /// Kept under this filename
    Stored(String),
    /// Byte-identical to this existing frame; the new file was discarded
    Duplicate(String),
}

/// Downloaded bytes waiting for verification and deduplication.
///
/// The file is hidden from frame listings and removed on drop unless it was
/// persisted, so every failure path cleans up after itself.
#[derive(Debug)]
pub struct StagedFrame {
    path: Option<PathBuf>,
}

impl StagedFrame {
    pub fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    fn persist(mut self, destination: &Path) -> Result<(), HarvestError> {
        if let Some(path) = self.path.take() {
            if let Err(e) = fs::rename(&path, destination) {
                silent_remove(&path);
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl Drop for StagedFrame {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            silent_remove(&path);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupStore {
    root: PathBuf,
}

impl DedupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn camera_dir(&self, unique_name: &str) -> PathBuf {
        self.root.join(sanitize_camera_name(unique_name))
    }

    /// Idempotent; safe to call repeatedly for the same camera.
    pub fn ensure_camera_dir(&self, unique_name: &str) -> Result<PathBuf, HarvestError> {
        let dir = self.camera_dir(unique_name);
        fs::create_dir_all(&dir).map_err(|e| {
            HarvestError::FilesystemError(format!("creating {}: {e}", dir.display()))
        })?;
        Ok(dir)
    }

    /// Write bytes to a hidden staging file inside `dir`.
    pub fn stage(&self, dir: &Path, data: &[u8]) -> Result<StagedFrame, HarvestError> {
        let path = dir.join(format!(".{}.part", uuid::Uuid::new_v4()));
        let staged = StagedFrame {
            path: Some(path.clone()),
        };

        let mut file = fs::File::create(&path).map_err(|e| {
            HarvestError::FilesystemError(format!("writing {}: {e}", path.display()))
        })?;
        file.write_all(data)?;
        file.sync_all()?;

        Ok(staged)
    }

    /// Compare the staged frame with the newest stored one and either
    /// discard it or persist it as `filename`.
    pub fn deduplicate(
        &self,
        dir: &Path,
        staged: StagedFrame,
        filename: &str,
    ) -> Result<StoreDecision, HarvestError> {
        if let Some(previous) = list_frames(dir)?.pop() {
            let previous_print = Fingerprint::of_file(&dir.join(&previous))?;
            let staged_print = Fingerprint::of_file(staged.path())?;
            debug!(%previous, %previous_print, %staged_print, "Comparing fingerprints");

            if previous_print == staged_print {
                drop(staged);
                return Ok(StoreDecision::Duplicate(previous));
            }
        }

        let destination = dir.join(filename);
        if destination.exists() {
            warn!(path = %destination.display(), "Frame name already taken");
            return Err(HarvestError::FilesystemError(format!(
                "frame {} already exists",
                destination.display()
            )));
        }

        staged.persist(&destination)?;
        Ok(StoreDecision::Stored(filename.to_string()))
    }
}

/// Regular, non-hidden files in `dir`, sorted by name. The last one is the
/// most recent frame.
pub fn list_frames(dir: &Path) -> Result<Vec<String>, HarvestError> {
    let mut frames = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(frames),
        Err(e) => return Err(e.into()),
    };

    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if !name.starts_with('.') {
                frames.push(name.to_string());
            }
        }
    }

    frames.sort();
    Ok(frames)
}

pub fn latest_frame(dir: &Path) -> Result<Option<String>, HarvestError> {
    Ok(list_frames(dir)?.pop())
}

/// Remove a file, ignoring "not found".
pub fn silent_remove(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden_files(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|n| n.starts_with('.'))
            .collect()
    }

    #[test]
    fn test_fingerprint_matches_bytes_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();

        let from_file = Fingerprint::of_file(&path).unwrap();
        assert_eq!(from_file, Fingerprint::of_bytes(&data));
        assert_eq!(
            Fingerprint::of_bytes(b"").to_string(),
            "d41d8cd98f00b204e9800998ecf8427e"
        );
    }

    #[test]
    fn test_ensure_camera_dir_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let store = DedupStore::new(root.path());

        let first = store.ensure_camera_dir("000.Αθήνα").unwrap();
        let second = store.ensure_camera_dir("000.Αθήνα").unwrap();
        assert_eq!(first, second);
        assert_eq!(first, root.path().join("000.Athina"));
        assert!(first.is_dir());
    }

    #[test]
    fn test_list_frames_ignores_hidden_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("20240102000000.jpg"), b"b").unwrap();
        fs::write(dir.path().join("20240101000000.jpg"), b"a").unwrap();
        fs::write(dir.path().join(".abc.part"), b"staged").unwrap();
        fs::create_dir(dir.path().join("zzz")).unwrap();

        assert_eq!(
            list_frames(dir.path()).unwrap(),
            vec!["20240101000000.jpg", "20240102000000.jpg"]
        );
        assert_eq!(
            latest_frame(dir.path()).unwrap().as_deref(),
            Some("20240102000000.jpg")
        );
        assert!(list_frames(&dir.path().join("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_first_frame_is_stored() {
        let root = tempfile::tempdir().unwrap();
        let store = DedupStore::new(root.path());
        let dir = store.ensure_camera_dir("000.Port").unwrap();

        let staged = store.stage(&dir, b"frame-1").unwrap();
        let decision = store
            .deduplicate(&dir, staged, "20240101000000.jpg")
            .unwrap();

        assert_eq!(decision, StoreDecision::Stored("20240101000000.jpg".to_string()));
        assert_eq!(fs::read(dir.join("20240101000000.jpg")).unwrap(), b"frame-1");
        assert!(hidden_files(&dir).is_empty());
    }

    #[test]
    fn test_identical_frame_is_discarded() {
        let root = tempfile::tempdir().unwrap();
        let store = DedupStore::new(root.path());
        let dir = store.ensure_camera_dir("000.Port").unwrap();
        fs::write(dir.join("20240101000000.jpg"), b"same").unwrap();

        let staged = store.stage(&dir, b"same").unwrap();
        let decision = store
            .deduplicate(&dir, staged, "20240101000500.jpg")
            .unwrap();

        assert_eq!(decision, StoreDecision::Duplicate("20240101000000.jpg".to_string()));
        assert_eq!(list_frames(&dir).unwrap(), vec!["20240101000000.jpg"]);
        assert!(hidden_files(&dir).is_empty());
    }

    #[test]
    fn test_only_latest_frame_is_compared() {
        let root = tempfile::tempdir().unwrap();
        let store = DedupStore::new(root.path());
        let dir = store.ensure_camera_dir("000.Port").unwrap();
        fs::write(dir.join("20240101000000.jpg"), b"old").unwrap();
        fs::write(dir.join("20240101000100.jpg"), b"newer").unwrap();

        // Matches an older frame, not the latest one.
        let staged = store.stage(&dir, b"old").unwrap();
        let decision = store
            .deduplicate(&dir, staged, "20240101000200.jpg")
            .unwrap();
        assert_eq!(decision, StoreDecision::Stored("20240101000200.jpg".to_string()));
    }

    #[test]
    fn test_existing_name_is_never_overwritten() {
        let root = tempfile::tempdir().unwrap();
        let store = DedupStore::new(root.path());
        let dir = store.ensure_camera_dir("000.Port").unwrap();
        fs::write(dir.join("20240101000000.jpg"), b"first").unwrap();

        let staged = store.stage(&dir, b"second").unwrap();
        let err = store
            .deduplicate(&dir, staged, "20240101000000.jpg")
            .unwrap_err();

        assert!(matches!(err, HarvestError::FilesystemError(_)));
        assert_eq!(fs::read(dir.join("20240101000000.jpg")).unwrap(), b"first");
        assert!(hidden_files(&dir).is_empty());
    }

    #[test]
    fn test_dropped_staged_frame_is_removed() {
        let root = tempfile::tempdir().unwrap();
        let store = DedupStore::new(root.path());
        let dir = store.ensure_camera_dir("000.Port").unwrap();

        let staged = store.stage(&dir, b"bytes").unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }
}
