//! Version ledger for generated config files
//!
//! Records every generated output: the staged rewriter artifact is
//! published into a zip bundle under its canonical name, indexed by the
//! access codes it still contains, and linked back to the upload it was
//! derived from by original filename. Publishing is at-most-once: the
//! staged file is removed only after the canonical copy exists, so a
//! crash in between can leave a stray staged file but never lose the
//! published one.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::archive::{build_zip, remove_file_idempotent, FileRecord};
use crate::config::Config;
use crate::error::RosterError;
use crate::ledger::Ledger;
use crate::parse::extract_access_codes;

pub const VERSIONS_METADATA: &str = "new_configs_metadata.json";

/// One generation transaction. `based_on` links back to upload
/// provenance by original filename only, a human-inspectable reference
/// rather than a structural foreign key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    pub timestamp: String,
    pub zip_filename: String,
    pub files: BTreeMap<String, FileRecord>,
    pub based_on: BTreeMap<String, String>,
}

/// A staged rewriter output awaiting publish.
#[derive(Debug, Clone)]
pub struct GeneratedFile {
    /// Form slot the artifact corresponds to (`file1` / `file2`)
    pub slot: String,
    pub staged_path: PathBuf,
}

/// Version store: generated-config zip bundles plus their JSON ledger.
pub struct VersionStore {
    versions_dir: PathBuf,
    ledger: Ledger<VersionEntry>,
}

impl VersionStore {
    /// Open (and bootstrap) the version store for the given layout.
    pub async fn new(config: &Config) -> Result<Self, RosterError> {
        fs::create_dir_all(&config.versions_dir).await?;
        info!(path = %config.versions_dir.display(), "Initialized version store");
        Ok(Self {
            versions_dir: config.versions_dir.clone(),
            ledger: Ledger::new(config.versions_dir.join(VERSIONS_METADATA)),
        })
    }

    fn zip_path(&self, zip_filename: &str) -> PathBuf {
        self.versions_dir.join(zip_filename)
    }

    /// Publish staged artifacts as one version entry.
    ///
    /// `based_on` maps each slot to the original uploaded filename the
    /// artifact was derived from.
    pub async fn append_version(
        &self,
        generated: &[GeneratedFile],
        based_on: BTreeMap<String, String>,
    ) -> Result<VersionEntry, RosterError> {
        let id = crate::archive::new_entry_id();
        let mut entry = VersionEntry {
            id: id.clone(),
            timestamp: crate::archive::new_entry_timestamp(),
            zip_filename: format!("{id}_new_config_files.zip"),
            files: BTreeMap::new(),
            based_on,
        };

        let mut contents = Vec::with_capacity(generated.len());
        for artifact in generated {
            let bytes = match fs::read(&artifact.staged_path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(RosterError::MissingSource(
                        artifact.staged_path.display().to_string(),
                    ));
                }
                Err(e) => return Err(e.into()),
            };
            let access_codes = extract_access_codes(&bytes)?;
            let canonical_name = artifact
                .staged_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            entry.files.insert(
                artifact.slot.clone(),
                FileRecord {
                    original_name: canonical_name.clone(),
                    access_codes,
                },
            );
            contents.push((canonical_name, bytes));
        }

        let members: Vec<(String, &[u8])> = contents
            .iter()
            .map(|(name, bytes)| (name.clone(), bytes.as_slice()))
            .collect();
        let zip_bytes = build_zip(&members)?;
        fs::write(self.zip_path(&entry.zip_filename), zip_bytes).await?;

        self.ledger.append(entry.clone()).await?;

        // Canonical copies exist; drop the staged names.
        for artifact in generated {
            remove_file_idempotent(&artifact.staged_path).await;
        }

        info!(id = %entry.id, files = generated.len(), "Published generated configs");
        Ok(entry)
    }

    pub async fn list(&self) -> Result<Vec<VersionEntry>, RosterError> {
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
    pub async fn delete(&self, id: &str) -> Result<VersionEntry, RosterError> {
        let removed = self
            .ledger
            .remove_where(|e| e.id == id)
            .await?
            .ok_or_else(|| RosterError::NotFound(id.to_string()))?;
        remove_file_idempotent(&self.zip_path(&removed.zip_filename)).await;
        info!(id = %removed.id, "Deleted version entry");
        Ok(removed)
    }

    /// Delete every entry and every referenced bundle.
    pub async fn delete_all(&self) -> Result<usize, RosterError> {
        let removed = self.ledger.take_all().await?;
        for entry in &removed {
            remove_file_idempotent(&self.zip_path(&entry.zip_filename)).await;
        }
        info!(count = removed.len(), "Deleted all version entries");
        Ok(removed.len())
    }
}
