//! Public-API tests for SyncVault
//!
//! Exercises the crate the way a downstream user would, through the exported
//! types only: a full encrypted backup/restore cycle and the sidecar store
//! contract against both implementations.

use std::fs;
use std::path::Path;
use syncvault::signature::SignatureRecord;
use syncvault::*;
use tempfile::TempDir;

fn secure_config(src: &Path, dst: &Path, key: &Path) -> SyncConfig {
    SyncConfig {
        source: EndpointConfig::local(src),
        destination: EndpointConfig::local(dst),
        transform: TransformKind::Secure,
        crypto_key: Some(key.to_path_buf()),
        check_level: CheckLevel::LocalMd5,
        no_cleaning: false,
        wide_display: false,
    }
}

#[test]
fn encrypted_backup_and_file_recovery() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let key_path = out.path().join("backup.key");

    CipherKey::generate().save(&key_path).unwrap();
    fs::create_dir_all(src.path().join("projects/alpha")).unwrap();
    fs::write(src.path().join("projects/alpha/notes.md"), b"remember this").unwrap();
    fs::write(src.path().join("top.txt"), b"top-level").unwrap();

    let config = secure_config(src.path(), dst.path(), &key_path);
    let stats = SyncEngine::from_config(&config).unwrap().run().unwrap();
    assert_eq!(stats.synchronized, 2);
    assert_eq!(stats.errors, 0);

    // Nothing readable without the key
    let stored = fs::read(dst.path().join("projects/alpha/notes.md.encrypted")).unwrap();
    assert_ne!(stored, b"remember this");

    // Recover one file through the restore subsystem
    let key = CipherKey::load(&key_path).unwrap();
    let repo = LocalDestination::new(dst.path(), Some(&key)).unwrap();
    let versions = repo.get_versions("projects/alpha/notes.md").unwrap();
    let restorer = Restorer::new(&repo, &key).unwrap();
    let target = out.path().join("notes.md");
    restorer
        .restore("projects/alpha/notes.md", &versions[0], Some(&target), &|_| true)
        .unwrap();
    assert_eq!(fs::read(&target).unwrap(), b"remember this");
}

#[test]
fn signature_store_contract_holds_for_both_hives() {
    let dir = TempDir::new().unwrap();
    let fs_hive = FsHive::new(dir.path());
    let mem_hive = MemoryHive::new();

    let stores: [&dyn SignatureStore; 2] = [&fs_hive, &mem_hive];
    for store in stores {
        let record = SignatureRecord::new("meta-digest", "data-digest");
        assert!(store.signature("/x/y.txt").unwrap().is_none());

        store.put_signature("/x/y.txt", &record).unwrap();
        assert_eq!(store.signature("/x/y.txt").unwrap().unwrap(), record);
        assert!(store.signature_mtime("/x/y.txt").unwrap().is_some());

        store.put_metadata("/x/y.txt", b"blob", true).unwrap();
        assert_eq!(store.metadata("/x/y.txt", true).unwrap().unwrap(), b"blob");

        store.delete_signature("/x/y.txt").unwrap();
        store.delete_metadata("/x/y.txt").unwrap();
        assert!(store.signature("/x/y.txt").unwrap().is_none());
        assert!(store.metadata("/x/y.txt", true).unwrap().is_none());
    }
}

#[test]
fn engine_reports_description_through_source_trait() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    fs::write(src.path().join("a.txt"), b"a").unwrap();

    let config = SyncConfig {
        source: EndpointConfig::local(src.path()),
        destination: EndpointConfig::local(dst.path()),
        transform: TransformKind::None,
        crypto_key: None,
        check_level: CheckLevel::LocalMd5,
        no_cleaning: true,
        wide_display: false,
    };

    let mut engine = SyncEngine::from_config(&config).unwrap();
    assert!(Source::description(&engine).contains("Check level"));
    assert!(Source::process(&mut engine).unwrap());
    assert_eq!(engine.stats().synchronized, 1);
}
