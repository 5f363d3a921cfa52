//! Whole-file JSON ledger
//!
//! Append-only ordered sequence of entries persisted as one pretty-printed
//! JSON array. Every mutation is a read-modify-write of the whole file,
//! serialized through a per-ledger mutex so concurrent appends against the
//! same ledger cannot lose an update. Cross-process writers are out of
//! scope.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RosterError;

pub struct Ledger<E> {
    path: PathBuf,
    write_guard: Mutex<()>,
    _entry: PhantomData<E>,
}

impl<E> Ledger<E>
where
    E: Serialize + DeserializeOwned,
{
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_guard: Mutex::new(()),
            _entry: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<E>, RosterError> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, entries: &[E]) -> Result<(), RosterError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Read the full entry sequence. Missing file reads as empty.
    pub async fn list(&self) -> Result<Vec<E>, RosterError> {
        self.read().await
    }

    /// Append one entry and rewrite the ledger file.
    pub async fn append(&self, entry: E) -> Result<(), RosterError> {
        let _guard = self.write_guard.lock().await;
        let mut entries = self.read().await?;
        entries.push(entry);
        self.write(&entries).await?;
        debug!(path = %self.path.display(), len = entries.len(), "Ledger appended");
        Ok(())
    }

    /// Remove the first entry matching the predicate, returning it.
    ///
    /// When nothing matches, the ledger file is left untouched and `None`
    /// is returned.
    pub async fn remove_where<F>(&self, mut matches: F) -> Result<Option<E>, RosterError>
    where
        F: FnMut(&E) -> bool,
    {
        let _guard = self.write_guard.lock().await;
        let mut entries = self.read().await?;
        let Some(index) = entries.iter().position(|e| matches(e)) else {
            return Ok(None);
        };
        let removed = entries.remove(index);
        self.write(&entries).await?;
        Ok(Some(removed))
    }

    /// Remove every entry, returning them, and persist an empty sequence.
    pub async fn take_all(&self) -> Result<Vec<E>, RosterError> {
        let _guard = self.write_guard.lock().await;
        let entries = self.read().await?;
        self.write(&[]).await?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        id: String,
    }

    fn entry(id: &str) -> Entry {
        Entry { id: id.to_string() }
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger: Ledger<Entry> = Ledger::new(dir.path().join("ledger.json"));
        assert!(ledger.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_list_preserve_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("ledger.json"));
        ledger.append(entry("a")).await.unwrap();
        ledger.append(entry("b")).await.unwrap();
        assert_eq!(ledger.list().await.unwrap(), vec![entry("a"), entry("b")]);
    }

    #[tokio::test]
    async fn test_remove_unknown_leaves_file_untouched() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = Ledger::new(&path);
        ledger.append(entry("a")).await.unwrap();
        let before = std::fs::read(&path).unwrap();

        let removed = ledger.remove_where(|e| e.id == "missing").await.unwrap();
        assert!(removed.is_none());
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn test_remove_takes_exactly_one() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = Ledger::new(dir.path().join("ledger.json"));
        for id in ["a", "b", "c"] {
            ledger.append(entry(id)).await.unwrap();
        }
        let removed = ledger.remove_where(|e| e.id == "b").await.unwrap();
        assert_eq!(removed, Some(entry("b")));
        assert_eq!(ledger.list().await.unwrap(), vec![entry("a"), entry("c")]);
    }

    #[tokio::test]
    async fn test_take_all_empties_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = Ledger::new(&path);
        ledger.append(entry("a")).await.unwrap();
        let taken = ledger.take_all().await.unwrap();
        assert_eq!(taken.len(), 1);
        assert!(ledger.list().await.unwrap().is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_concurrent_appends_both_survive() {
        let dir = tempfile::TempDir::new().unwrap();
        let ledger = Arc::new(Ledger::new(dir.path().join("ledger.json")));
        ledger.append(entry("seed")).await.unwrap();

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.append(entry("x")).await })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.append(entry("y")).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(ledger.list().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_ledger_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        std::fs::write(&path, b"{not json").unwrap();
        let ledger: Ledger<Entry> = Ledger::new(&path);
        assert!(matches!(ledger.list().await, Err(RosterError::Json(_))));
    }
}
