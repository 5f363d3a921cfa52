//! Archive ledger for uploaded source files
//!
//! Every upload transaction bundles the raw uploaded bytes into one zip
//! under a timestamp-derived id, indexes the access codes each file
//! contains, refreshes the upload workspace the rewriter reads from, and
//! appends one entry to the archive ledger.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;

use crate::config::{Config, GROUP_CONFIG_NAME, THUMBNAIL_SETTINGS_NAME};
use crate::error::RosterError;
use crate::ledger::Ledger;
use crate::parse::extract_access_codes;

pub const ARCHIVE_METADATA: &str = "archive_metadata.json";

/// Per-file metadata recorded on a ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub original_name: String,
    pub access_codes: Vec<String>,
}

/// One upload transaction. Immutable once written, except via
/// whole-entry deletion. `id` is the primary key; two uploads within the
/// same second collide, a known limitation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub id: String,
    pub timestamp: String,
    pub zip_filename: String,
    pub files: BTreeMap<String, FileRecord>,
}

/// One uploaded file handed in by the caller, already read in full.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Form slot, `file1` (group config) or `file2` (thumbnail settings)
    pub slot: String,
    pub original_name: String,
    pub bytes: Vec<u8>,
}

/// Timestamp-derived entry id, monotonically increasing at second
/// resolution.
pub fn new_entry_id() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Human-readable entry timestamp.
pub fn new_entry_timestamp() -> String {
    Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Validate an upload against its fixed expected name
/// (case-insensitive). Empty names are rejected.
pub fn validate_upload_name(actual: &str, expected: &str) -> Result<(), RosterError> {
    if actual.is_empty() {
        return Err(RosterError::RejectedUpload("missing filename".into()));
    }
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(RosterError::RejectedUpload(format!(
            "file must be named {expected}"
        )));
    }
    Ok(())
}

/// Canonical workspace filename for a form slot.
fn workspace_name(slot: &str, original_name: &str) -> String {
    match slot {
        "file1" => GROUP_CONFIG_NAME.to_string(),
        "file2" => THUMBNAIL_SETTINGS_NAME.to_string(),
        _ => sanitize_filename(original_name),
    }
}

/// Strip any path components from a client-supplied filename.
pub fn sanitize_filename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Bundle named members into an in-memory zip.
pub fn build_zip(members: &[(String, &[u8])]) -> Result<Vec<u8>, RosterError> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, bytes) in members {
        writer.start_file(name.as_str(), options)?;
        writer.write_all(bytes).map_err(RosterError::Io)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Archive store: zip bundles on disk plus the JSON ledger describing
/// them.
pub struct ArchiveStore {
    archive_dir: PathBuf,
    upload_dir: PathBuf,
    ledger: Ledger<ArchiveEntry>,
}

impl ArchiveStore {
    /// Open (and bootstrap) the archive store for the given layout.
    pub async fn new(config: &Config) -> Result<Self, RosterError> {
        fs::create_dir_all(&config.archive_dir).await?;
        fs::create_dir_all(&config.upload_dir).await?;
        info!(path = %config.archive_dir.display(), "Initialized archive store");
        Ok(Self {
            archive_dir: config.archive_dir.clone(),
            upload_dir: config.upload_dir.clone(),
            ledger: Ledger::new(config.archive_dir.join(ARCHIVE_METADATA)),
        })
    }

    fn zip_path(&self, zip_filename: &str) -> PathBuf {
        self.archive_dir.join(zip_filename)
    }

    /// Archive one upload transaction and refresh the upload workspace.
    ///
    /// Access codes are extracted from every file before anything is
    /// persisted, so a malformed upload rejects the whole transaction
    /// with no partial state.
    pub async fn append_archive(&self, files: &[UploadFile]) -> Result<ArchiveEntry, RosterError> {
        let id = new_entry_id();
        let mut entry = ArchiveEntry {
            id: id.clone(),
            timestamp: new_entry_timestamp(),
            zip_filename: format!("{id}_config_files.zip"),
            files: BTreeMap::new(),
        };

        let mut members = Vec::with_capacity(files.len());
        for file in files {
            let access_codes = extract_access_codes(&file.bytes)?;
            let original_name = sanitize_filename(&file.original_name);
            members.push((original_name.clone(), file.bytes.as_slice()));
            entry.files.insert(
                file.slot.clone(),
                FileRecord {
                    original_name,
                    access_codes,
                },
            );
        }

        let zip_bytes = build_zip(&members)?;
        fs::write(self.zip_path(&entry.zip_filename), zip_bytes).await?;

        // The workspace copies become the current documents for editing.
        for file in files {
            let name = workspace_name(&file.slot, &file.original_name);
            fs::write(self.upload_dir.join(name), &file.bytes).await?;
        }

        self.ledger.append(entry.clone()).await?;
        info!(id = %entry.id, files = files.len(), "Archived upload");
        Ok(entry)
    }

    /// Read the current workspace copy of an uploaded file.
    ///
    /// Absent file means no upload happened yet; the caller is told to
    /// upload first.
    pub async fn read_current(&self, name: &str) -> Result<Vec<u8>, RosterError> {
        let path = self.upload_dir.join(name);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RosterError::MissingSource(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list(&self) -> Result<Vec<ArchiveEntry>, RosterError> {
        self.ledger.list().await
    }

    /// Zip bytes for download, addressed by entry id.
    pub async fn open_bundle(&self, id: &str) -> Result<(String, Vec<u8>), RosterError> {
        let entries = self.ledger.list().await?;
        let entry = entries
            .iter()
            .find(|e| e.id == id)
            .ok_or_else(|| RosterError::NotFound(id.to_string()))?;
        let path = self.zip_path(&entry.zip_filename);
        match fs::read(&path).await {
            Ok(bytes) => Ok((entry.zip_filename.clone(), bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(
                RosterError::StorageInconsistency(entry.zip_filename.clone()),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete one entry and its bundle. Missing bundle files are
    /// tolerated; an unknown id leaves the ledger untouched.
    pub async fn delete(&self, id: &str) -> Result<ArchiveEntry, RosterError> {
        let removed = self
            .ledger
            .remove_where(|e| e.id == id)
            .await?
            .ok_or_else(|| RosterError::NotFound(id.to_string()))?;
        remove_file_idempotent(&self.zip_path(&removed.zip_filename)).await;
        info!(id = %removed.id, "Deleted archive entry");
        Ok(removed)
    }

    /// Delete every entry and every referenced bundle.
    pub async fn delete_all(&self) -> Result<usize, RosterError> {
        let removed = self.ledger.take_all().await?;
        for entry in &removed {
            remove_file_idempotent(&self.zip_path(&entry.zip_filename)).await;
        }
        info!(count = removed.len(), "Deleted all archive entries");
        Ok(removed.len())
    }
}

/// Remove a storage artifact, tolerating files already gone.
pub(crate) async fn remove_file_idempotent(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove artifact"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tests::{GROUP_XML, THUMB_XML};
    use std::io::Read;

    fn upload(slot: &str, name: &str, bytes: &str) -> UploadFile {
        UploadFile {
            slot: slot.to_string(),
            original_name: name.to_string(),
            bytes: bytes.as_bytes().to_vec(),
        }
    }

    async fn store(dir: &Path) -> ArchiveStore {
        ArchiveStore::new(&Config::under(dir)).await.unwrap()
    }

    #[test]
    fn test_validate_upload_name() {
        assert!(validate_upload_name("group_config.xml", GROUP_CONFIG_NAME).is_ok());
        assert!(validate_upload_name("GROUP_CONFIG.XML", GROUP_CONFIG_NAME).is_ok());
        assert!(matches!(
            validate_upload_name("other.xml", GROUP_CONFIG_NAME),
            Err(RosterError::RejectedUpload(_))
        ));
        assert!(validate_upload_name("", GROUP_CONFIG_NAME).is_err());
    }

    #[test]
    fn test_sanitize_filename_strips_paths() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("group_config.xml"), "group_config.xml");
    }

    #[tokio::test]
    async fn test_append_archive_indexes_access_codes() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(dir.path()).await;
        let entry = store
            .append_archive(&[
                upload("file1", "group_config.xml", GROUP_XML),
                upload("file2", "thumbnail_settings.xml", THUMB_XML),
            ])
            .await
            .unwrap();

        assert_eq!(
            entry.files["file1"].access_codes,
            vec!["QQ9A".to_string(), "XA1Z".to_string()]
        );
        assert_eq!(entry.zip_filename, format!("{}_config_files.zip", entry.id));
        assert_eq!(store.list().await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_append_archive_refreshes_workspace() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(dir.path()).await;
        store
            .append_archive(&[upload("file1", "GROUP_CONFIG.XML", GROUP_XML)])
            .await
            .unwrap();
        let current = store.read_current(GROUP_CONFIG_NAME).await.unwrap();
        assert_eq!(current, GROUP_XML.as_bytes());
    }

    #[tokio::test]
    async fn test_malformed_upload_persists_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(dir.path()).await;
        let result = store
            .append_archive(&[upload("file1", "group_config.xml", "<broken")])
            .await;
        assert!(matches!(result, Err(RosterError::MalformedXml(_))));
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.read_current(GROUP_CONFIG_NAME).await.is_err());
    }

    #[tokio::test]
    async fn test_bundle_holds_original_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(dir.path()).await;
        let entry = store
            .append_archive(&[upload("file1", "group_config.xml", GROUP_XML)])
            .await
            .unwrap();

        let (name, bytes) = store.open_bundle(&entry.id).await.unwrap();
        assert_eq!(name, entry.zip_filename);
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        let mut member = zip.by_name("group_config.xml").unwrap();
        let mut contents = String::new();
        member.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, GROUP_XML);
    }

    #[tokio::test]
    async fn test_delete_removes_entry_and_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(dir.path()).await;
        let entry = store
            .append_archive(&[upload("file1", "group_config.xml", GROUP_XML)])
            .await
            .unwrap();
        let zip_path = dir.path().join("archives").join(&entry.zip_filename);
        assert!(zip_path.exists());

        store.delete(&entry.id).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
        assert!(!zip_path.exists());

        assert!(matches!(
            store.delete(&entry.id).await,
            Err(RosterError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_download_with_missing_artifact_is_inconsistency() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = store(dir.path()).await;
        let entry = store
            .append_archive(&[upload("file1", "group_config.xml", GROUP_XML)])
            .await
            .unwrap();
        std::fs::remove_file(dir.path().join("archives").join(&entry.zip_filename)).unwrap();

        assert!(matches!(
            store.open_bundle(&entry.id).await,
            Err(RosterError::StorageInconsistency(_))
        ));
        // Ledger unchanged.
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}
