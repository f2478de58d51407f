//! Gzip helpers for single files.
//!
//! Used when an existing plain SQL dump has to be stored as `database.sql.gz`,
//! and when a compressed dump is unpacked for inspection.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};
use webpak_core::{IoResultExt, Result};

/// Default compression level (6 = balanced speed/ratio).
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Statistics about a compression operation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionStats {
    /// Original uncompressed size in bytes
    pub original_size: u64,

    /// Compressed size in bytes
    pub compressed_size: u64,

    /// Compression ratio (compressed / original)
    pub compression_ratio: f64,
}

impl CompressionStats {
    /// Creates new compression statistics.
    pub fn new(original_size: u64, compressed_size: u64) -> Self {
        let compression_ratio = if original_size > 0 {
            compressed_size as f64 / original_size as f64
        } else {
            0.0
        };

        Self {
            original_size,
            compressed_size,
            compression_ratio,
        }
    }

    /// Returns compression percentage saved.
    pub fn compression_percentage(&self) -> u8 {
        ((1.0 - self.compression_ratio).clamp(0.0, 1.0) * 100.0) as u8
    }
}

/// Compresses `source` into a new gzip file at `dest`.
///
/// A partially written `dest` is removed on failure.
pub fn gzip_file(source: &Path, dest: &Path, level: Option<u32>) -> Result<CompressionStats> {
    let result = write_gzip(source, dest, level.unwrap_or(DEFAULT_COMPRESSION_LEVEL));
    if result.is_err() && dest.exists() {
        debug!("Removing partial output '{}'", dest.display());
        let _ = fs::remove_file(dest);
    }
    result
}

fn write_gzip(source: &Path, dest: &Path, level: u32) -> Result<CompressionStats> {
    let source_file = File::open(source).with_path("failed to open", source)?;
    let original_size = source_file
        .metadata()
        .with_path("failed to stat", source)?
        .len();

    let dest_file = File::create(dest).with_path("failed to create", dest)?;
    let mut encoder = GzEncoder::new(BufWriter::new(dest_file), Compression::new(level));

    io::copy(&mut BufReader::new(source_file), &mut encoder).with_path("failed to compress", source)?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .with_path("failed to finish", dest)?;

    let compressed_size = fs::metadata(dest).with_path("failed to stat", dest)?.len();
    let stats = CompressionStats::new(original_size, compressed_size);
    info!(
        "Compressed '{}' into '{}' ({} -> {} bytes)",
        source.display(),
        dest.display(),
        stats.original_size,
        stats.compressed_size
    );
    Ok(stats)
}

/// Decompresses the gzip file `source` into `dest`, returning the bytes written.
pub fn gunzip_file(source: &Path, dest: &Path) -> Result<u64> {
    let source_file = File::open(source).with_path("failed to open", source)?;
    let mut decoder = GzDecoder::new(BufReader::new(source_file));

    let mut dest_file = BufWriter::new(File::create(dest).with_path("failed to create", dest)?);
    let bytes_written =
        io::copy(&mut decoder, &mut dest_file).with_path("failed to decompress", source)?;
    dest_file.flush().with_path("failed to write", dest)?;

    Ok(bytes_written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_gzip_file() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"INSERT INTO `SiteTree` VALUES (1,'Home');\n".repeat(5000);
        let source_path = create_test_file(temp_dir.path(), "dump.sql", &content);
        let dest_path = temp_dir.path().join("database.sql.gz");

        let stats = gzip_file(&source_path, &dest_path, None).unwrap();

        assert_eq!(stats.original_size, content.len() as u64);
        assert!(
            stats.compressed_size < stats.original_size / 2,
            "Expected compressed size {} < half of original size {}",
            stats.compressed_size,
            stats.original_size
        );
        assert!(stats.compression_ratio < 0.5);
    }

    #[test]
    fn test_compression_levels() {
        let temp_dir = TempDir::new().unwrap();
        let content = b"Repeated content! ".repeat(1000);
        let source_path = create_test_file(temp_dir.path(), "source.sql", &content);

        let dest_fast = temp_dir.path().join("fast.gz");
        let stats_fast = gzip_file(&source_path, &dest_fast, Some(1)).unwrap();

        let dest_best = temp_dir.path().join("best.gz");
        let stats_best = gzip_file(&source_path, &dest_best, Some(9)).unwrap();

        assert!(stats_best.compressed_size <= stats_fast.compressed_size);
    }

    #[test]
    fn test_gunzip_file() {
        let temp_dir = TempDir::new().unwrap();
        let original_content = b"CREATE TABLE `Member` (`ID` int);\n";
        let source_path = create_test_file(temp_dir.path(), "dump.sql", original_content);
        let compressed_path = temp_dir.path().join("dump.sql.gz");
        let decompressed_path = temp_dir.path().join("restored.sql");

        gzip_file(&source_path, &compressed_path, None).unwrap();
        let bytes_written = gunzip_file(&compressed_path, &decompressed_path).unwrap();

        assert_eq!(bytes_written, original_content.len() as u64);
        assert_eq!(fs::read(&decompressed_path).unwrap(), original_content);
    }

    #[test]
    fn test_gzip_missing_source_leaves_no_output() {
        let temp_dir = TempDir::new().unwrap();
        let dest_path = temp_dir.path().join("database.sql.gz");

        let err = gzip_file(&temp_dir.path().join("missing.sql"), &dest_path, None).unwrap_err();
        assert!(err.to_string().contains("failed to open"));
        assert!(!dest_path.exists());
    }

    #[test]
    fn test_compression_stats() {
        let stats = CompressionStats::new(1000, 500);
        assert_eq!(stats.compression_ratio, 0.5);
        assert_eq!(stats.compression_percentage(), 50);

        let stats = CompressionStats::new(1000, 700);
        assert_eq!(stats.compression_percentage(), 30);

        let stats = CompressionStats::new(0, 20);
        assert_eq!(stats.compression_ratio, 0.0);
    }
}
