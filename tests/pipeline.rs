//! End-to-end pipeline tests: upload, select, rewrite, publish, delete.

use std::collections::BTreeMap;
use std::path::Path;

use labroster::archive::{ArchiveStore, UploadFile};
use labroster::config::{Config, GROUP_CONFIG_NAME};
use labroster::dom::Document;
use labroster::parse::{normalize_group_config, parse_group_config};
use labroster::rewrite::{rewrite_group_config, write_staged};
use labroster::selection::{apply_selection, default_selection};
use labroster::versions::{GeneratedFile, VersionStore};

const GROUP_XML: &str = r#"<config>
  <group>
    <group_id>1</group_id>
    <group_name>Red</group_name>
    <students>
      <student>
        <access_code>A1</access_code>
        <systems>
          <system><name>vm1</name><ip>10.0.0.1</ip></system>
          <system><name>vm2</name><ip>10.0.0.2</ip></system>
        </systems>
      </student>
      <student>
        <access_code>B2</access_code>
        <systems>
          <system><name>vm3</name><ip>10.0.0.3</ip></system>
        </systems>
      </student>
    </students>
  </group>
</config>"#;

fn group_upload() -> UploadFile {
    UploadFile {
        slot: "file1".to_string(),
        original_name: "group_config.xml".to_string(),
        bytes: GROUP_XML.as_bytes().to_vec(),
    }
}

async fn stores(dir: &Path) -> (Config, ArchiveStore, VersionStore) {
    let config = Config::under(dir);
    let archive = ArchiveStore::new(&config).await.unwrap();
    let versions = VersionStore::new(&config).await.unwrap();
    (config, archive, versions)
}

/// Upload A1+B2, generate an output retaining only A1's vm1, and check
/// the archive/version linkage the ledgers record.
#[tokio::test]
async fn archive_version_linkage() {
    let dir = tempfile::TempDir::new().unwrap();
    let (config, archive, versions) = stores(dir.path()).await;

    let archived = archive.append_archive(&[group_upload()]).await.unwrap();
    assert_eq!(archived.files["file1"].access_codes, vec!["A1", "B2"]);

    // Retain vm1 for A1, nothing for B2.
    let bytes = archive.read_current(GROUP_CONFIG_NAME).await.unwrap();
    let mut doc = Document::parse(&bytes).unwrap();
    let model = normalize_group_config(&doc);
    let submitted = BTreeMap::from([("A1".to_string(), vec!["vm1".to_string()])]);
    let selection = apply_selection(&model, &submitted);
    rewrite_group_config(&mut doc, &selection);

    let staged = config.staging_dir().join("new_group_config.xml");
    write_staged(&doc, &staged).await.unwrap();
    let entry = versions
        .append_version(
            &[GeneratedFile {
                slot: "file1".to_string(),
                staged_path: staged,
            }],
            BTreeMap::from([("file1".to_string(), "group_config.xml".to_string())]),
        )
        .await
        .unwrap();

    assert_eq!(entry.files["file1"].access_codes, vec!["A1"]);
    assert_eq!(entry.based_on["file1"], "group_config.xml");
    assert_eq!(versions.list().await.unwrap().len(), 1);
}

/// Serialize a rewritten tree, re-parse it with the normalizer, and check
/// the retained systems match the in-memory computation exactly.
#[tokio::test]
async fn rewrite_round_trip_matches_memory() {
    let mut doc = Document::parse(GROUP_XML.as_bytes()).unwrap();
    let model = normalize_group_config(&doc);

    let submitted = BTreeMap::from([
        ("A1".to_string(), vec!["vm2".to_string()]),
        ("B2".to_string(), vec!["vm3".to_string()]),
    ]);
    let selection = apply_selection(&model, &submitted);
    rewrite_group_config(&mut doc, &selection);

    let reparsed = parse_group_config(&doc.serialize_bytes()).unwrap();
    for (code, systems) in reparsed.iter() {
        let retained = selection.retained(code).unwrap();
        let names: Vec<&str> = systems.iter().map(|s| s.identity()).collect();
        assert_eq!(names.len(), retained.len(), "code {code}");
        for name in names {
            assert!(retained.contains(name), "code {code} kept {name}");
        }
    }
}

/// The default selection narrowed by an allow-list keeps exactly the
/// systems whose IP is listed.
#[tokio::test]
async fn default_selection_respects_allow_list() {
    let model = parse_group_config(GROUP_XML.as_bytes()).unwrap();
    let selection = default_selection(&model, true, &["10.0.0.1".to_string()]);
    let retained = selection.retained("A1").unwrap();
    assert_eq!(retained.iter().collect::<Vec<_>>(), vec!["vm1"]);
    assert!(selection.retained("B2").unwrap().is_empty());
}

/// Deleting by id removes exactly one entry and its bundle; an unknown
/// id changes nothing.
#[tokio::test]
async fn deletion_scenarios() {
    let dir = tempfile::TempDir::new().unwrap();
    let (_, archive, _) = stores(dir.path()).await;

    let entry = archive.append_archive(&[group_upload()]).await.unwrap();
    let before = archive.list().await.unwrap();
    assert_eq!(before.len(), 1);

    assert!(archive.delete("19700101_000000").await.is_err());
    assert_eq!(archive.list().await.unwrap(), before);

    archive.delete(&entry.id).await.unwrap();
    assert!(archive.list().await.unwrap().is_empty());
    assert!(!dir
        .path()
        .join("archives")
        .join(&entry.zip_filename)
        .exists());
}

/// Two concurrent uploads both survive the archive ledger.
#[tokio::test]
async fn concurrent_archive_appends_both_survive() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = Config::under(dir.path());
    let archive = std::sync::Arc::new(ArchiveStore::new(&config).await.unwrap());

    let a = {
        let archive = archive.clone();
        tokio::spawn(async move { archive.append_archive(&[group_upload()]).await })
    };
    let b = {
        let archive = archive.clone();
        tokio::spawn(async move { archive.append_archive(&[group_upload()]).await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(archive.list().await.unwrap().len(), 2);
}
