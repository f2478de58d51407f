//! Common test utilities for webpak-archive
//!
//! Builds small project trees on disk and inspects or forges archives.

#![allow(dead_code)]

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};

/// Original uploads that must always survive a round trip.
pub const ORIGINALS: &[(&str, &str)] = &[
    ("Uploads/photo.jpg", "jpeg bytes"),
    ("Uploads/docs/report.pdf", "pdf bytes"),
    (".htaccess", "Deny from all"),
];

/// Regenerable variants matched by the derived-asset patterns.
pub const DERIVED: &[&str] = &[
    "Uploads/photo__FillWzEwMCwxMDBd.jpg",
    "Uploads/photo__ScaleWidthWzMwMF0.jpg",
    "Uploads/_resampled/SetWidth300-photo.jpg",
];

/// The CMS preview variant kept despite matching the patterns.
pub const CMS_PREVIEW: &str = "Uploads/photo__FitMaxWzM1MiwyNjRd.jpg";

/// Creates `<root>/assets` with originals, derived variants and the CMS preview.
pub fn create_assets(root: &Path) -> PathBuf {
    let assets = root.join("assets");
    for (name, content) in ORIGINALS {
        write_file(&assets.join(name), content.as_bytes());
    }
    for name in DERIVED {
        write_file(&assets.join(name), b"variant");
    }
    write_file(&assets.join(CMS_PREVIEW), b"preview");
    assets
}

pub fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Entry names of a gzip tar archive, in archive order.
pub fn tar_gz_names(path: &Path) -> Vec<String> {
    let mut archive = Archive::new(GzDecoder::new(File::open(path).unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string()
        })
        .collect()
}

/// Entry names of an uncompressed tar archive, in archive order.
pub fn tar_names(path: &Path) -> Vec<String> {
    let mut archive = Archive::new(File::open(path).unwrap());
    archive
        .entries()
        .unwrap()
        .map(|entry| entry.unwrap().path().unwrap().to_string_lossy().into_owned())
        .collect()
}

/// Appends a regular file entry without any validation of `name`.
///
/// `tar::Builder` refuses `..` in names, so the raw header bytes are written directly.
pub fn append_raw<W: Write>(builder: &mut Builder<W>, name: &str, content: &[u8]) {
    let mut header = Header::new_old();
    let raw = &mut header.as_old_mut().name;
    raw[..name.len()].copy_from_slice(name.as_bytes());
    header.set_entry_type(EntryType::Regular);
    header.set_mode(0o644);
    header.set_size(content.len() as u64);
    header.set_mtime(1_600_000_000);
    header.set_cksum();
    builder.append(&header, content).unwrap();
}

/// Writes a gzip tar whose entries are `(name, content)` pairs, unvalidated.
pub fn forge_tar_gz(path: &Path, entries: &[(&str, &[u8])]) {
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = Builder::new(encoder);
    for (name, content) in entries {
        append_raw(&mut builder, name, content);
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// Writes an uncompressed tar whose entries are `(name, content)` pairs, unvalidated.
pub fn forge_tar(path: &Path, entries: &[(&str, &[u8])]) {
    let mut builder = Builder::new(File::create(path).unwrap());
    for (name, content) in entries {
        append_raw(&mut builder, name, content);
    }
    builder.into_inner().unwrap().flush().unwrap();
}

/// Writes a gzip tar holding the symlink `link_name -> link_target` followed by
/// directory entries `dirs`, all with mode 0777.
pub fn forge_link_then_dirs(path: &Path, link_name: &str, link_target: &Path, dirs: &[&str]) {
    let encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut builder = Builder::new(encoder);

    let mut link = Header::new_gnu();
    link.set_entry_type(EntryType::Symlink);
    link.set_mode(0o777);
    link.set_size(0);
    builder.append_link(&mut link, link_name, link_target).unwrap();

    for name in dirs {
        let mut dir = Header::new_gnu();
        dir.set_entry_type(EntryType::Directory);
        dir.set_mode(0o777);
        dir.set_size(0);
        builder.append_data(&mut dir, name, std::io::empty()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap();
}
