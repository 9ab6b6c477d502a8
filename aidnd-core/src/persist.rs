//! Encounter snapshot persistence.
//!
//! One pretty-printed JSON file per session under the store directory. Saves
//! replace the whole snapshot: the bytes go to a uniquely named temp file,
//! are fsynced, then renamed over the target, so a reader sees either the old
//! snapshot or the new one and never a torn write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::encounter::Encounter;

/// Schema tag written into every snapshot.
pub const SNAPSHOT_SCHEMA: &str = "aidnd.encounter";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Marker in the names of in-progress writes.
const TEMP_MARKER: &str = ".tmp-";

const MAX_SESSION_ID_LEN: usize = 128;

/// Temp files younger than this may still belong to a save in progress and
/// are left alone by [`SnapshotStore::sweep_temp_files`].
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60);

/// Errors from snapshot storage.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No snapshot for session {0}")]
    NotFound(SessionId),

    #[error("Snapshot for session {session} is corrupt: {reason}")]
    Corrupt { session: SessionId, reason: String },

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Refusing to save inconsistent encounter: {0}")]
    Inconsistent(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Session identifier: 1 to 128 characters of `[A-Za-z0-9_-]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn parse(id: &str) -> Result<Self, StoreError> {
        let valid = !id.is_empty()
            && id.len() <= MAX_SESSION_ID_LEN
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(id.to_string()))
        } else {
            Err(StoreError::InvalidSessionId(id.to_string()))
        }
    }

    /// A fresh random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl std::str::FromStr for SessionId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A snapshot as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedEncounter {
    pub schema: String,
    pub version: u32,
    pub session_id: SessionId,
    pub saved_at: DateTime<Utc>,
    pub encounter: Encounter,
}

/// Directory of per-session encounter snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Create the store and sweep temp files abandoned by crashed saves.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(dir);
        store.sweep_temp_files().await?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session: &SessionId) -> PathBuf {
        self.dir.join(format!("{session}.json"))
    }

    /// Replace the session's snapshot. Inconsistent encounters are rejected
    /// before anything touches the disk.
    pub async fn save(&self, session: &SessionId, encounter: &Encounter) -> Result<(), StoreError> {
        encounter.validate().map_err(StoreError::Inconsistent)?;

        let saved = SavedEncounter {
            schema: SNAPSHOT_SCHEMA.to_string(),
            version: SNAPSHOT_VERSION,
            session_id: session.clone(),
            saved_at: Utc::now(),
            encounter: encounter.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&saved)?;

        write_atomic(&self.path_for(session), &bytes).await?;
        debug!(session = %session, round = encounter.round(), "saved encounter snapshot");
        Ok(())
    }

    /// Load and validate the session's snapshot.
    pub async fn load(&self, session: &SessionId) -> Result<Encounter, StoreError> {
        Ok(self.load_saved(session).await?.encounter)
    }

    /// Load the full saved wrapper, including `saved_at`.
    pub async fn load_saved(&self, session: &SessionId) -> Result<SavedEncounter, StoreError> {
        let content = match fs::read_to_string(self.path_for(session)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: String| StoreError::Corrupt {
            session: session.clone(),
            reason,
        };

        // Check the header before trusting the rest of the document.
        #[derive(Deserialize)]
        struct Header {
            schema: String,
            version: u32,
        }

        let header: Header = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        if header.schema != SNAPSHOT_SCHEMA {
            return Err(corrupt(format!("unexpected schema {:?}", header.schema)));
        }
        if header.version != SNAPSHOT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: header.version,
            });
        }

        let saved: SavedEncounter = serde_json::from_str(&content).map_err(|e| corrupt(e.to_string()))?;
        if &saved.session_id != session {
            return Err(corrupt(format!("file belongs to session {}", saved.session_id)));
        }
        saved.encounter.validate().map_err(corrupt)?;
        Ok(saved)
    }

    /// Remove the session's snapshot.
    pub async fn delete(&self, session: &SessionId) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(session)).await {
            Ok(()) => {
                info!(session = %session, "deleted encounter snapshot");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(session.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the snapshot to `archive/<session>-<timestamp>.json` and return
    /// the new path.
    pub async fn archive(&self, session: &SessionId) -> Result<PathBuf, StoreError> {
        let source = self.path_for(session);
        if !fs::try_exists(&source).await? {
            return Err(StoreError::NotFound(session.clone()));
        }

        let archive_dir = self.dir.join("archive");
        fs::create_dir_all(&archive_dir).await?;
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let target = archive_dir.join(format!("{session}-{stamp}.json"));
        fs::rename(&source, &target).await?;

        info!(session = %session, path = %target.display(), "archived encounter snapshot");
        Ok(target)
    }

    /// Sessions with a live snapshot, sorted.
    pub async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.contains(TEMP_MARKER) {
                continue;
            }
            if let Some(stem) = name.strip_suffix(".json") {
                if let Ok(session) = SessionId::parse(stem) {
                    sessions.push(session);
                }
            }
        }
        sessions.sort();
        Ok(sessions)
    }

    /// Delete temp files left by interrupted saves, skipping any younger
    /// than [`STALE_TEMP_AGE`]. Returns how many went.
    pub async fn sweep_temp_files(&self) -> Result<usize, StoreError> {
        self.sweep_temp_files_older_than(STALE_TEMP_AGE).await
    }

    /// Delete temp files whose last write is at least `min_age` old. With a
    /// zero age this also removes files of saves still running.
    pub async fn sweep_temp_files_older_than(&self, min_age: Duration) -> Result<usize, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let is_temp = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.contains(TEMP_MARKER));
            if !is_temp {
                continue;
            }

            // A save can rename its temp file away at any point here.
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }
            let age = metadata
                .modified()?
                .elapsed()
                .unwrap_or_default();
            if age < min_age {
                continue;
            }

            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed > 0 {
            warn!(dir = %self.dir.display(), removed, "swept orphaned temp files");
        }
        Ok(removed)
    }
}

/// Write `bytes` to `path` via a unique temp file, fsync and rename, then
/// fsync the directory so the rename itself is durable. Creates the parent
/// directory if needed.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).await?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"))?;
    let temp = parent.join(format!("{file_name}{TEMP_MARKER}{}", uuid::Uuid::new_v4().simple()));

    let written = async {
        let mut file = fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temp, path).await
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&temp).await;
        return written;
    }
    sync_dir(parent).await
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir).await?.sync_all().await
}

// Directories cannot be opened as files here; the rename is as durable as
// the platform makes it.
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_encounter;

    #[test]
    fn test_session_id_validation() {
        assert!(SessionId::parse("table-7_night").is_ok());
        assert!(SessionId::parse(&"a".repeat(128)).is_ok());

        let too_long = "a".repeat(129);
        for bad in ["", "../etc", "a/b", "has space", "dot.json", too_long.as_str()] {
            assert!(
                matches!(SessionId::parse(bad), Err(StoreError::InvalidSessionId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_session_id_serde_validates() {
        let id: SessionId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.as_str(), "abc");
        assert!(serde_json::from_str::<SessionId>("\"../x\"").is_err());
    }

    #[test]
    fn test_generated_ids_are_valid() {
        let id = SessionId::generate();
        assert!(SessionId::parse(id.as_str()).is_ok());
        assert_ne!(id, SessionId::generate());
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let session = SessionId::parse("s1").unwrap();
        let encounter = sample_encounter();

        store.save(&session, &encounter).await.unwrap();
        let loaded = store.load(&session).await.unwrap();
        assert_eq!(loaded, encounter);

        let raw = std::fs::read_to_string(dir.path().join("s1.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schema"], SNAPSHOT_SCHEMA);
        assert_eq!(value["version"], SNAPSHOT_VERSION);
        assert_eq!(value["encounter"]["round"], 1);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let session = SessionId::parse("nobody").unwrap();

        assert!(matches!(store.load(&session).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete(&session).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("entry.json");

        write_atomic(&path, b"{}").await.unwrap();
        write_atomic(&path, b"[]").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[tokio::test]
    async fn test_directory_sync_after_rename() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).await.unwrap();

        let path = dir.path().join("entry.json");
        write_atomic(&path, b"{}").await.unwrap();
        assert!(sync_dir(&dir.path().join("missing")).await.is_err() || cfg!(not(unix)));
    }
}
