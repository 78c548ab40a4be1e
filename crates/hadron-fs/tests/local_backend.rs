//! The filesystem handle over the local-disk backend.

#![cfg(unix)]

use std::os::unix::fs::MetadataExt;

use tempfile::TempDir;

use hadron_fs::{
    Chunk, Configuration, ConnectParams, FileSystem, FsError, LocalConnector, MemoryConnector,
    OpenFlags, OpenParams,
};

fn setup() -> (FileSystem, TempDir) {
    let dir = TempDir::new().unwrap();
    let fs = FileSystem::connect(ConnectParams::local(), Configuration::new(), &LocalConnector::new()).unwrap();
    fs.set_working_directory(&dir.path().to_string_lossy()).unwrap();
    (fs, dir)
}

#[test]
fn test_round_trip_on_disk() {
    let (fs, dir) = setup();
    let data: Vec<u8> = (0..=255).rev().collect();

    let mut f = fs.open_file("blob", OpenFlags::WRONLY, OpenParams::default()).unwrap();
    assert_eq!(f.write(&data).unwrap(), 256);
    f.close().unwrap();
    assert_eq!(std::fs::read(dir.path().join("blob")).unwrap(), data);

    let mut f = fs.open_file("blob", OpenFlags::RDONLY, OpenParams::default()).unwrap();
    let mut chunk = Chunk::with_capacity(100);
    let mut back = Vec::new();
    while f.read_chunk(&mut chunk).unwrap() > 0 {
        back.extend_from_slice(chunk.data());
    }
    assert_eq!(back, data);
    assert!(f.read(1).unwrap().is_empty());
}

#[test]
fn test_path_info_reports_numeric_owner() {
    let (fs, dir) = setup();
    std::fs::write(dir.path().join("f.txt"), b"abc").unwrap();

    let info = fs.get_path_info("f.txt").unwrap();
    let meta = std::fs::metadata(dir.path().join("f.txt")).unwrap();
    assert!(info.is_file());
    assert_eq!(info.size, 3);
    assert_eq!(info.replication, 1);
    assert_eq!(info.owner, meta.uid().to_string());
    assert_eq!(info.group, meta.gid().to_string());
    assert_eq!(info.fs_uri, "file:///");
    assert!(info.name.starts_with("file:/"));
}

#[test]
fn test_listing_and_hosts() {
    let (fs, dir) = setup();
    std::fs::create_dir(dir.path().join("d")).unwrap();
    std::fs::write(dir.path().join("d/a"), b"0123456789").unwrap();
    std::fs::write(dir.path().join("d/b"), b"").unwrap();

    let infos = fs.list_directory("d").unwrap();
    assert_eq!(infos.len(), 2);
    assert!(matches!(fs.list_directory("nope"), Err(FsError::NotFound(_))));

    assert_eq!(fs.get_hosts("d/a", 0, 10).unwrap(), vec![vec!["localhost".to_string()]]);
    assert!(fs.get_hosts("d/b", 0, 10).unwrap().is_empty());
}

#[test]
fn test_chown_needs_numeric_ids() {
    let (fs, dir) = setup();
    std::fs::write(dir.path().join("f"), b"x").unwrap();
    let uid = std::fs::metadata(dir.path().join("f")).unwrap().uid().to_string();

    // Re-asserting the current owner is always allowed.
    fs.chown("f", &uid, "").unwrap();
    assert!(fs.chown("f", "not-a-number", "").is_err());
}

#[test]
fn test_capacity_and_used() {
    let (fs, _dir) = setup();
    let capacity = fs.get_capacity().unwrap();
    assert!(capacity > 0);
    assert!(fs.get_used().unwrap() <= capacity);
}

#[test]
fn test_reads_past_file_length() {
    let (fs, dir) = setup();
    std::fs::write(dir.path().join("short"), b"hello").unwrap();

    let mut f = fs.open_file("short", OpenFlags::RDONLY, OpenParams::default()).unwrap();
    assert_eq!(f.pread(1, 1 << 20).unwrap(), b"ello");
    assert_eq!(f.read(1 << 20).unwrap(), b"hello");
    assert!(f.read(1 << 20).unwrap().is_empty());
    assert!(matches!(f.read(i64::MAX), Err(FsError::BackendIo(_))));
}

#[test]
fn test_copy_file_onto_itself() {
    let (fs, dir) = setup();
    std::fs::write(dir.path().join("keep"), b"precious").unwrap();

    assert!(fs.copy("keep", &fs, "keep").is_err());
    assert!(fs.move_to("keep", &fs, "keep").is_err());
    assert_eq!(std::fs::read(dir.path().join("keep")).unwrap(), b"precious");
}

#[test]
fn test_copy_from_memory_cluster_to_disk() {
    let (local, dir) = setup();
    let connector = MemoryConnector::new();
    let remote = FileSystem::connect(ConnectParams::new("nn", 9000), Configuration::new(), &connector).unwrap();

    let mut f = remote.open_file("/report.csv", OpenFlags::WRONLY, OpenParams::default()).unwrap();
    f.write(b"a,b\n1,2\n").unwrap();
    f.close().unwrap();

    let target = dir.path().join("report.csv");
    remote.copy("/report.csv", &local, &target.to_string_lossy()).unwrap();
    assert_eq!(std::fs::read(&target).unwrap(), b"a,b\n1,2\n");
}

#[test]
fn test_other_schemes_fail_to_connect() {
    let result = FileSystem::connect(ConnectParams::new("nn", 9000), Configuration::new(), &LocalConnector::new());
    assert!(matches!(result, Err(FsError::Connection(_))));
}
