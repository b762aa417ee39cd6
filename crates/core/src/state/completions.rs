use std::path::PathBuf;

use tracing::debug;

use super::json_store::{JsonStore, RecordMap, StoreError};
use super::records::CompletionRecord;
use crate::identity::IdentityHash;

/// Durable set of completed items.
pub struct CompletionLog {
    store: JsonStore<CompletionRecord>,
    records: RecordMap<CompletionRecord>,
}

impl CompletionLog {
    /// Open the log, loading whatever is on disk.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = JsonStore::new(path);
        let records = store.load()?;
        debug!(
            "Loaded {} completion records from {}",
            records.len(),
            store.path().display()
        );
        Ok(Self { store, records })
    }

    pub fn contains(&self, hash: &IdentityHash) -> bool {
        self.records.contains_key(hash)
    }

    pub fn get(&self, hash: &IdentityHash) -> Option<&CompletionRecord> {
        self.records.get(hash)
    }

    /// Record a completion and persist it.
    ///
    /// Returns `Ok(false)` without touching disk if the item was already
    /// recorded; completion records are never overwritten.
    pub fn record(
        &mut self,
        hash: IdentityHash,
        record: CompletionRecord,
    ) -> Result<bool, StoreError> {
        if self.records.contains_key(&hash) {
            return Ok(false);
        }
        self.records.insert(hash, record);
        self.store.save(&self.records)?;
        Ok(true)
    }

    /// Remove a completion so the item becomes eligible again.
    pub fn remove(&mut self, hash: &IdentityHash) -> Result<Option<CompletionRecord>, StoreError> {
        let removed = self.records.remove(hash);
        if removed.is_some() {
            self.store.save(&self.records)?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityHash, &CompletionRecord)> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn completion(identity: &str) -> CompletionRecord {
        CompletionRecord {
            identity: identity.to_string(),
            completed_at: Utc::now(),
            local_path: PathBuf::from("/tmp/x"),
            group: "Videos".to_string(),
        }
    }

    #[test]
    fn test_record_is_durable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("completions.json");
        let hash = IdentityHash::of("https://a.example/v");

        let mut log = CompletionLog::open(&path).unwrap();
        assert!(log.record(hash.clone(), completion("https://a.example/v")).unwrap());

        let reopened = CompletionLog::open(&path).unwrap();
        assert!(reopened.contains(&hash));
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_record_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let mut log = CompletionLog::open(dir.path().join("c.json")).unwrap();
        let hash = IdentityHash::of("u");

        let mut first = completion("u");
        first.group = "First".to_string();
        assert!(log.record(hash.clone(), first).unwrap());

        let mut second = completion("u");
        second.group = "Second".to_string();
        assert!(!log.record(hash.clone(), second).unwrap());

        assert_eq!(log.get(&hash).unwrap().group, "First");
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("c.json");
        let hash = IdentityHash::of("u");

        let mut log = CompletionLog::open(&path).unwrap();
        log.record(hash.clone(), completion("u")).unwrap();
        assert!(log.remove(&hash).unwrap().is_some());
        assert!(log.remove(&hash).unwrap().is_none());

        assert!(CompletionLog::open(&path).unwrap().is_empty());
    }
}
