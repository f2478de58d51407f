//! Integration tests for tree archives
//!
//! Covers round trips, entry naming, space and emptiness checks, traversal
//! protection, derived-asset filtering and symlink handling.

mod common;

use common::*;
use filetime::FileTime;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use webpak_archive::{ExclusionPredicate, TreeArchiver};
use webpak_core::{Error, FixedSpaceProbe};

#[test]
fn test_round_trip_restores_content() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");
    let restore = work.path().join("restore");

    let archiver = TreeArchiver::default();
    let packed = archiver.compress(&assets, &archive).unwrap();
    assert_eq!(packed.files as usize, ORIGINALS.len() + DERIVED.len() + 1);

    let unpacked = archiver.extract(&archive, &restore).unwrap();
    assert_eq!(unpacked.files, packed.files);
    assert_eq!(unpacked.bytes, packed.bytes);

    for (name, content) in ORIGINALS {
        let restored = fs::read_to_string(restore.join("assets").join(name)).unwrap();
        assert_eq!(&restored, content);
    }
}

#[test]
fn test_entry_names_are_relative_to_the_tree() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");

    // trailing separator must not change the archive root
    let input = format!("{}/", assets.display());
    TreeArchiver::default()
        .compress(Path::new(&input), &archive)
        .unwrap();

    let names = tar_gz_names(&archive);
    assert_eq!(names[0], "assets");
    assert!(names.contains(&"assets/Uploads/photo.jpg".to_string()));
    assert!(names.iter().all(|n| n == "assets" || n.starts_with("assets/")));
}

#[cfg(unix)]
#[test]
fn test_symlinked_root_does_not_leak_host_paths() {
    let site = TempDir::new().unwrap();
    let real = site.path().join("storage/real-assets");
    write_file(&real.join("Uploads/a.txt"), b"a");
    let link = site.path().join("assets");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");
    TreeArchiver::default().compress(&link, &archive).unwrap();

    let names = tar_gz_names(&archive);
    assert_eq!(
        names,
        vec!["assets", "assets/Uploads", "assets/Uploads/a.txt"]
    );
}

#[test]
fn test_empty_input_creates_nothing() {
    let site = TempDir::new().unwrap();
    let empty = site.path().join("assets");
    fs::create_dir(&empty).unwrap();

    let work = TempDir::new().unwrap();
    let archive = work.path().join("new/parent/assets.tar.gz");

    let err = TreeArchiver::default().compress(&empty, &archive).unwrap_err();
    assert!(matches!(err, Error::EmptyInput { .. }));
    assert!(!archive.exists());
    // the pre-created parent chain is rolled back
    assert!(!work.path().join("new").exists());
}

#[test]
fn test_missing_input() {
    let work = TempDir::new().unwrap();
    let err = TreeArchiver::default()
        .compress(&work.path().join("missing"), &work.path().join("out.tar.gz"))
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_insufficient_space_fails_before_writing() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let work = TempDir::new().unwrap();
    let archive = work.path().join("out/assets.tar.gz");

    let archiver = TreeArchiver::default().with_probe(Arc::new(FixedSpaceProbe(1)));
    let err = archiver.compress(&assets, &archive).unwrap_err();
    assert!(matches!(err, Error::InsufficientSpace { .. }));
    assert!(err.to_string().contains("does not have enough space available"));
    assert!(!work.path().join("out").exists());
}

#[test]
fn test_extract_checks_space() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");
    TreeArchiver::default().compress(&assets, &archive).unwrap();

    let restore = work.path().join("restore");
    let err = TreeArchiver::default()
        .with_probe(Arc::new(FixedSpaceProbe(0)))
        .extract(&archive, &restore)
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientSpace { .. }));
    assert!(!restore.exists());
}

#[test]
fn test_extract_missing_archive() {
    let work = TempDir::new().unwrap();
    let err = TreeArchiver::default()
        .extract(&work.path().join("nope.tar.gz"), work.path())
        .unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_traversal_entries_are_skipped() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("evil.tar.gz");
    forge_tar_gz(
        &archive,
        &[
            ("../../evil.txt", b"pwned"),
            ("assets/../../evil2.txt", b"pwned"),
            ("assets/ok.txt", b"fine"),
        ],
    );

    let restore = work.path().join("a/b/restore");
    let stats = TreeArchiver::default().extract(&archive, &restore).unwrap();

    assert_eq!(stats.files, 1);
    assert_eq!(stats.skipped, 2);
    assert_eq!(fs::read_to_string(restore.join("assets/ok.txt")).unwrap(), "fine");
    assert!(!work.path().join("evil.txt").exists());
    assert!(!work.path().join("a/evil.txt").exists());
    assert!(!work.path().join("a/evil2.txt").exists());
}

#[test]
fn test_absolute_entry_names_land_inside_output() {
    let work = TempDir::new().unwrap();
    let archive = work.path().join("abs.tar.gz");
    forge_tar_gz(&archive, &[("/assets/abs.txt", b"inside")]);

    let restore = work.path().join("restore");
    TreeArchiver::default().extract(&archive, &restore).unwrap();
    assert_eq!(
        fs::read_to_string(restore.join("assets/abs.txt")).unwrap(),
        "inside"
    );
}

#[test]
fn test_derived_assets_excluded_when_compressing() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");

    let archiver = TreeArchiver::new(ExclusionPredicate::derived_assets().unwrap());
    let stats = archiver.compress(&assets, &archive).unwrap();
    assert_eq!(stats.skipped as usize, DERIVED.len());

    let names = tar_gz_names(&archive);
    for derived in DERIVED {
        assert!(!names.contains(&format!("assets/{}", derived)), "{}", derived);
    }
    assert!(names.contains(&format!("assets/{}", CMS_PREVIEW)));
    assert!(names.contains(&"assets/Uploads/photo.jpg".to_string()));
}

#[test]
fn test_derived_assets_excluded_when_extracting() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");
    TreeArchiver::default().compress(&assets, &archive).unwrap();

    let restore = work.path().join("restore");
    TreeArchiver::new(ExclusionPredicate::derived_assets().unwrap())
        .extract(&archive, &restore)
        .unwrap();

    for derived in DERIVED {
        assert!(!restore.join("assets").join(derived).exists(), "{}", derived);
    }
    assert!(restore.join("assets").join(CMS_PREVIEW).exists());
    assert!(restore.join("assets/Uploads/photo.jpg").exists());
}

#[test]
fn test_directory_mtimes_survive_extraction() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let uploads = assets.join("Uploads");
    let stamp = FileTime::from_unix_time(1_500_000_000, 0);
    filetime::set_file_times(&uploads, stamp, stamp).unwrap();

    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");
    let restore = work.path().join("restore");
    let archiver = TreeArchiver::default();
    archiver.compress(&assets, &archive).unwrap();
    archiver.extract(&archive, &restore).unwrap();

    let restored = fs::metadata(restore.join("assets/Uploads")).unwrap();
    assert_eq!(FileTime::from_last_modification_time(&restored), stamp);
}

#[cfg(unix)]
#[test]
fn test_file_mode_and_mtime_restored() {
    use std::os::unix::fs::PermissionsExt;

    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let script = assets.join("Uploads/run.sh");
    write_file(&script, b"#!/bin/sh\n");
    fs::set_permissions(&script, fs::Permissions::from_mode(0o751)).unwrap();
    let stamp = FileTime::from_unix_time(1_400_000_000, 0);
    filetime::set_file_mtime(&script, stamp).unwrap();

    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");
    let restore = work.path().join("restore");
    let archiver = TreeArchiver::default();
    archiver.compress(&assets, &archive).unwrap();
    archiver.extract(&archive, &restore).unwrap();

    let restored = fs::metadata(restore.join("assets/Uploads/run.sh")).unwrap();
    assert_eq!(restored.permissions().mode() & 0o777, 0o751);
    assert_eq!(FileTime::from_last_modification_time(&restored), stamp);
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_archived_as_links() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let outside = site.path().join("shared.txt");
    write_file(&outside, b"shared");

    std::os::unix::fs::symlink("../photo.jpg", assets.join("Uploads/docs/photo-link.jpg")).unwrap();
    std::os::unix::fs::symlink(&outside, assets.join("shared.txt")).unwrap();
    std::os::unix::fs::symlink("does-not-exist", assets.join("dangling")).unwrap();

    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");
    let restore = work.path().join("restore");
    let archiver = TreeArchiver::default();
    let stats = archiver.compress(&assets, &archive).unwrap();
    assert_eq!(stats.symlinks, 3);

    archiver.extract(&archive, &restore).unwrap();
    let restored = restore.join("assets");

    assert_eq!(
        fs::read_link(restored.join("Uploads/docs/photo-link.jpg")).unwrap(),
        Path::new("../photo.jpg")
    );
    assert_eq!(
        fs::read_to_string(restored.join("Uploads/docs/photo-link.jpg")).unwrap(),
        "jpeg bytes"
    );
    assert_eq!(
        fs::read_link(restored.join("shared.txt")).unwrap(),
        fs::canonicalize(&outside).unwrap()
    );
    assert_eq!(
        fs::read_link(restored.join("dangling")).unwrap(),
        Path::new("does-not-exist")
    );
}

#[cfg(unix)]
#[test]
fn test_writes_through_escaping_symlink_are_refused() {
    let work = TempDir::new().unwrap();
    let outside = work.path().join("outside");
    fs::create_dir(&outside).unwrap();

    let restore = work.path().join("restore");
    fs::create_dir_all(restore.join("assets")).unwrap();
    std::os::unix::fs::symlink(&outside, restore.join("assets/escape")).unwrap();

    let archive = work.path().join("escape.tar.gz");
    forge_tar_gz(&archive, &[("assets/escape/planted.txt", b"x")]);

    let stats = TreeArchiver::default().extract(&archive, &restore).unwrap();
    assert_eq!(stats.files, 0);
    assert_eq!(stats.skipped, 1);
    assert!(!outside.join("planted.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_directories_through_archived_symlink_are_refused() {
    use std::os::unix::fs::PermissionsExt;

    let work = TempDir::new().unwrap();
    let outside = work.path().join("outside");
    fs::create_dir_all(outside.join("existing")).unwrap();
    fs::set_permissions(outside.join("existing"), fs::Permissions::from_mode(0o700)).unwrap();

    let archive = work.path().join("redirect.tar.gz");
    forge_link_then_dirs(
        &archive,
        "assets/link",
        &outside,
        &["assets/link/newdir", "assets/link/existing"],
    );

    let restore = work.path().join("restore");
    let stats = TreeArchiver::default().extract(&archive, &restore).unwrap();
    assert_eq!(stats.symlinks, 1);
    assert_eq!(stats.directories, 0);
    assert_eq!(stats.skipped, 2);

    assert!(!outside.join("newdir").exists());
    let mode = fs::metadata(outside.join("existing")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
}

#[test]
fn test_compress_input_ending_in_parent_component() {
    let site = TempDir::new().unwrap();
    let assets = create_assets(site.path());
    let work = TempDir::new().unwrap();
    let archive = work.path().join("assets.tar.gz");

    let stats = TreeArchiver::default()
        .compress(&assets.join("Uploads").join(".."), &archive)
        .unwrap();
    assert_eq!(stats.files as usize, ORIGINALS.len() + DERIVED.len() + 1);

    let names = tar_gz_names(&archive);
    assert_eq!(names[0], "assets");
    assert!(names.contains(&"assets/Uploads/photo.jpg".to_string()));
}
