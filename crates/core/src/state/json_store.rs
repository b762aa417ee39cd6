//! Crash-consistent JSON map persistence.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::identity::IdentityHash;

/// Records keyed by identity hash.
pub type RecordMap<R> = BTreeMap<IdentityHash, R>;

/// Errors from the durable state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode records for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A JSON document holding one record map.
///
/// `load` tolerates a missing file (empty map) and a corrupt file (backed up
/// as `<file>.<unix-ts>.bak`, then empty map). `save` writes a sibling temp
/// file and renames it over the target.
#[derive(Debug, Clone)]
pub struct JsonStore<R> {
    path: PathBuf,
    _records: PhantomData<fn() -> R>,
}

impl<R> JsonStore<R>
where
    R: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _records: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record map.
    pub fn load(&self) -> Result<RecordMap<R>, StoreError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No record file at {}, starting empty", self.path.display());
                return Ok(RecordMap::new());
            }
            Err(e) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source: e,
                })
            }
        };

        match serde_json::from_slice::<RecordMap<R>>(&data) {
            Ok(map) => Ok(map),
            Err(e) => {
                error!("Error parsing {}: {}", self.path.display(), e);
                match self.backup_corrupt() {
                    Ok(backup) => {
                        info!("Created backup of corrupted file: {}", backup.display())
                    }
                    Err(backup_err) => error!(
                        "Failed to create backup of corrupted file {}: {}",
                        self.path.display(),
                        backup_err
                    ),
                }
                Ok(RecordMap::new())
            }
        }
    }

    /// Persist the record map atomically.
    pub fn save(&self, records: &RecordMap<R>) -> Result<(), StoreError> {
        let body = serde_json::to_vec_pretty(records).map_err(|e| StoreError::Encode {
            path: self.path.clone(),
            source: e,
        })?;
        atomic_write(&self.path, &body).map_err(|e| StoreError::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    fn backup_corrupt(&self) -> io::Result<PathBuf> {
        let ts = chrono::Utc::now().timestamp();
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "records.json".to_string());

        let mut backup = self.path.with_file_name(format!("{}.{}.bak", file_name, ts));
        let mut n = 1;
        while backup.exists() {
            backup = self
                .path
                .with_file_name(format!("{}.{}-{}.bak", file_name, ts, n));
            n += 1;
        }
        fs::copy(&self.path, &backup)?;
        Ok(backup)
    }
}

/// Write `body` to `path` via a uniquely named sibling temp file that is
/// flushed to disk and then renamed over the target.
pub fn atomic_write(path: &Path, body: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!(
        ".{}.{}.tmp",
        file_name.to_string_lossy(),
        uuid::Uuid::new_v4().simple()
    ));

    let result = (|| {
        let mut file = File::create(&tmp)?;
        file.write_all(body)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    fn note(text: &str) -> Note {
        Note {
            text: text.to_string(),
        }
    }

    fn backups_in(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().map(|e| e == "bak").unwrap_or(false))
            .collect()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Note> = JsonStore::new(dir.path().join("records.json"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Note> = JsonStore::new(dir.path().join("records.json"));

        let mut map = RecordMap::new();
        map.insert(IdentityHash::of("a"), note("first"));
        store.save(&map).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.get(&IdentityHash::of("a")), Some(&note("first")));
    }

    #[test]
    fn test_corrupt_file_recovers_with_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        fs::write(&path, "{ not json").unwrap();

        let store: JsonStore<Note> = JsonStore::new(&path);
        let loaded = store.load().unwrap();
        assert!(loaded.is_empty());

        let backups = backups_in(dir.path());
        assert_eq!(backups.len(), 1);
        let name = backups[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("records.json."));
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "{ not json");
    }

    #[test]
    fn test_repeated_corruption_keeps_every_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let store: JsonStore<Note> = JsonStore::new(&path);

        fs::write(&path, "[1,").unwrap();
        store.load().unwrap();
        fs::write(&path, "[2,").unwrap();
        store.load().unwrap();

        assert_eq!(backups_in(dir.path()).len(), 2);
    }

    #[test]
    fn test_interrupted_save_leaves_prior_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("records.json");
        let store: JsonStore<Note> = JsonStore::new(&path);

        let mut map = RecordMap::new();
        map.insert(IdentityHash::of("a"), note("committed"));
        store.save(&map).unwrap();

        // A temp file written by a save that never reached the rename.
        fs::write(dir.path().join(".records.json.deadbeef.tmp"), "{\"partial").unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get(&IdentityHash::of("a")), Some(&note("committed")));
        assert!(backups_in(dir.path()).is_empty());
    }

    #[test]
    fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let store: JsonStore<Note> = JsonStore::new(dir.path().join("records.json"));
        store.save(&RecordMap::new()).unwrap();
        store.save(&RecordMap::new()).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_atomic_write_creates_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/file.txt");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello");
    }
}
