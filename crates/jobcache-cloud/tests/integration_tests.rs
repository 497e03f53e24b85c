//! Integration tests for jobcache-cloud

use jobcache_cloud::{CloudConfig, ObjectPath, ObjectStore, ObjectStoreFs};
use jobcache_core::{load, CacheLoadRequest, ClusterConfig, Error, FileSystem, FileSystemPath, FsPath};
use object_store::memory::InMemory;
use std::io;
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

fn small_buffers() -> CloudConfig {
    CloudConfig {
        write_buffer_size: 64,
        worker_threads: 1,
    }
}

fn read(store: &InMemory, key: &str) -> Vec<u8> {
    tokio_test::block_on(async {
        store
            .get(&ObjectPath::from(key))
            .await
            .unwrap()
            .bytes()
            .await
            .unwrap()
            .to_vec()
    })
}

fn present(store: &InMemory, key: &str) -> bool {
    tokio_test::block_on(store.head(&ObjectPath::from(key))).is_ok()
}

fn fs_path(path: &str) -> FsPath {
    FsPath::new(path).unwrap()
}

#[test]
fn test_copy_small_and_large_files() {
    let temp_dir = TempDir::new().unwrap();
    let small = temp_dir.path().join("config.xml");
    let large = temp_dir.path().join("app.jar");
    std::fs::write(&small, b"<configuration/>").unwrap();
    let data: Vec<u8> = (0..1000).map(|i| (i % 251) as u8).collect();
    std::fs::write(&large, &data).unwrap();

    let store = Arc::new(InMemory::new());
    let fs = ObjectStoreFs::new("memory:///cache", store.clone(), small_buffers()).unwrap();

    assert_eq!(
        fs.copy_from_local(&small, &fs_path("/cache/staging/config.xml")).unwrap(),
        16
    );
    assert_eq!(
        fs.copy_from_local(&large, &fs_path("/cache/staging/app.jar")).unwrap(),
        1000
    );

    assert_eq!(read(&store, "cache/staging/config.xml"), b"<configuration/>");
    assert_eq!(read(&store, "cache/staging/app.jar"), data);
    assert!(!present(&store, "cache/staging/app.jar._COPYING_"));
    assert!(!present(&store, "cache/other"));
}

#[test]
fn test_missing_local_file_leaves_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(InMemory::new());
    let fs = ObjectStoreFs::new("memory:///cache", store.clone(), small_buffers()).unwrap();

    let err = fs
        .copy_from_local(&temp_dir.path().join("missing.jar"), &fs_path("/cache/missing.jar"))
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);
    assert!(!present(&store, "cache/missing.jar"));
}

#[test]
fn test_replication_is_not_managed() {
    let store = Arc::new(InMemory::new());
    let fs = ObjectStoreFs::new("memory:///cache", store, small_buffers()).unwrap();
    let path = fs_path("/cache/app.jar");

    assert!(!fs.set_replication(&path, 3).unwrap());
    assert_eq!(fs.replication(&path).unwrap(), None);
}

#[test]
fn test_promotion_writes_pointer() {
    let temp_dir = TempDir::new().unwrap();
    let local = temp_dir.path().join("app.jar");
    std::fs::write(&local, b"jar").unwrap();

    let store = Arc::new(InMemory::new());
    let fs = ObjectStoreFs::new("memory:///cache", store.clone(), small_buffers()).unwrap();
    let first = fs_path("/cache/jobCache_20240101000000");
    let second = fs_path("/cache/jobCache_20240102000000");
    let alias = fs_path("/cache/current");

    fs.copy_from_local(&local, &first.join("app.jar").unwrap()).unwrap();
    fs.copy_from_local(&local, &second.join("app.jar").unwrap()).unwrap();

    fs.promote(&first, &alias).unwrap();
    assert_eq!(read(&store, "cache/current"), b"/cache/jobCache_20240101000000\n");

    fs.promote(&second, &alias).unwrap();
    assert_eq!(read(&store, "cache/current"), b"/cache/jobCache_20240102000000\n");
    // the previous version stays in place
    assert!(present(&store, "cache/jobCache_20240101000000/app.jar"));
}

#[test]
fn test_promotion_errors() {
    let temp_dir = TempDir::new().unwrap();
    let local = temp_dir.path().join("app.jar");
    std::fs::write(&local, b"jar").unwrap();

    let store = Arc::new(InMemory::new());
    let fs = ObjectStoreFs::new("memory:///cache", store, small_buffers()).unwrap();
    let staging = fs_path("/cache/jobCache_20240101000000");
    let alias = fs_path("/cache/current");

    let err = fs.promote(&staging, &alias).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotFound);

    fs.copy_from_local(&local, &staging.join("app.jar").unwrap()).unwrap();
    fs.copy_from_local(&local, &alias.join("app.jar").unwrap()).unwrap();
    let err = fs.promote(&staging, &alias).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
}

#[test]
fn test_closed_connection_rejects_operations() {
    let store = Arc::new(InMemory::new());
    let fs = ObjectStoreFs::new("memory:///cache", store, small_buffers()).unwrap();
    fs.close().unwrap();
    fs.close().unwrap();

    let err = fs.mkdirs(&fs_path("/cache")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);
}

#[test]
fn test_load_into_object_store() {
    let temp_dir = TempDir::new().unwrap();
    let app = temp_dir.path().join("app.jar");
    let conf = temp_dir.path().join("config.xml");
    std::fs::write(&app, vec![1u8; 300]).unwrap();
    std::fs::write(&conf, b"<configuration/>").unwrap();

    let store = Arc::new(InMemory::new());
    let fs = Arc::new(ObjectStoreFs::new("memory:///cache", store.clone(), small_buffers()).unwrap());
    let target = FileSystemPath::with_filesystem(
        Url::parse("memory:///cache").unwrap(),
        ClusterConfig::default(),
        fs.clone(),
    )
    .unwrap();

    let mut request = CacheLoadRequest::new("jobCache_20240101000000");
    request.workers = 2;
    let targets = vec![target];
    let report = load(&targets, &[app, conf], &request).unwrap();

    assert_eq!(report.copied, 2);
    assert_eq!(report.bytes, 316);
    assert_eq!(report.promoted, vec!["memory:///cache".to_string()]);
    assert_eq!(read(&store, "cache/jobCache_20240101000000/app.jar"), vec![1u8; 300]);
    assert_eq!(read(&store, "cache/current"), b"/cache/jobCache_20240101000000\n");

    drop(targets);
    let err = fs.mkdirs(&fs_path("/cache")).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::NotConnected);
}

#[test]
fn test_promotion_failure_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let app = temp_dir.path().join("app.jar");
    std::fs::write(&app, b"jar").unwrap();

    let store = Arc::new(InMemory::new());
    let fs: Arc<dyn FileSystem> =
        Arc::new(ObjectStoreFs::new("memory:///cache", store.clone(), small_buffers()).unwrap());
    // a real prefix already sits where the alias should go
    fs.copy_from_local(&app, &fs_path("/cache/current/old.jar")).unwrap();

    let target = FileSystemPath::with_filesystem(
        Url::parse("memory:///cache").unwrap(),
        ClusterConfig::default(),
        fs,
    )
    .unwrap();
    let request = CacheLoadRequest::new("jobCache_20240101000000");

    match load(&[target], &[app], &request) {
        Err(Error::Load(composite)) => {
            assert!(composite.transfers.is_empty());
            assert_eq!(composite.promotions.len(), 1);
            assert!(composite.promoted.is_empty());
        }
        other => panic!("expected a composite load error, got {:?}", other),
    }
}
