//! Derived-asset filtering for archive operations.
//!
//! Image variants generated by the CMS (crops, fits, resampled copies) can be
//! recreated on demand, so they may be left out of backups. The predicate holds
//! two case-insensitive pattern sets:
//! - keep patterns, consulted first: a match is never excluded
//! - exclude patterns: a match is skipped while packing and unpacking

use regex::{RegexBuilder, RegexSet, RegexSetBuilder};
use std::path::{Path, MAIN_SEPARATOR};
use webpak_core::{Error, Result};

/// Naming conventions of regenerable image variants.
pub const DERIVED_ASSET_PATTERNS: &[&str] = &[
    // Silverstripe 4 and 5 variant suffixes, e.g. `photo__FillWzEwMCwxMDBd.jpg`
    r"__(Crop|ExtRewrite|Fill|Fit|Focus|Pad|Quality|Resampled|Scale)([a-z0-9_]*)\.[a-z0-9]{1,4}$",
    // Silverstripe 3 `_resampled` folders
    r"/_resampled/(Pad|CMSThumbnail|stripthumbnail|Cropped|Set|Fit|Fill|Scale|Resampled).*\.(jpg|png|jpeg|tiff)",
];

/// Variants kept even though they match [`DERIVED_ASSET_PATTERNS`].
///
/// The asset admin preview (`FitMax(352, 264)`) is shown for every file in the
/// CMS and is not regenerated without a republish.
pub const DERIVED_ASSET_KEEP: &[&str] = &[r"__FitMaxWzM1MiwyNjRd\.[a-z0-9]{1,4}$"];

/// Ordered path filter applied to every file while packing and unpacking.
#[derive(Debug, Clone)]
pub struct ExclusionPredicate {
    keep: RegexSet,
    exclude: RegexSet,
}

impl Default for ExclusionPredicate {
    fn default() -> Self {
        Self::none()
    }
}

impl ExclusionPredicate {
    /// A predicate that excludes nothing.
    pub fn none() -> Self {
        Self {
            keep: RegexSet::empty(),
            exclude: RegexSet::empty(),
        }
    }

    /// Builds a predicate from exclude patterns and keep (override) patterns.
    pub fn new<S: AsRef<str>>(exclude: &[S], keep: &[S]) -> Result<Self> {
        Ok(Self {
            keep: build_set(keep)?,
            exclude: build_set(exclude)?,
        })
    }

    /// The derived-asset predicate: image variants out, CMS previews in.
    pub fn derived_assets() -> Result<Self> {
        Self::new(DERIVED_ASSET_PATTERNS, DERIVED_ASSET_KEEP)
    }

    /// Derived-asset filtering when `ignore_derived` is set, otherwise no filtering.
    pub fn for_flag(ignore_derived: bool) -> Result<Self> {
        if ignore_derived {
            Self::derived_assets()
        } else {
            Ok(Self::none())
        }
    }

    /// Returns true if any exclude pattern is configured.
    pub fn is_enabled(&self) -> bool {
        !self.exclude.is_empty()
    }

    /// Checks if a path should be left out.
    pub fn is_excluded(&self, path: &Path) -> bool {
        if !self.is_enabled() {
            return false;
        }

        let mut candidate = path.to_string_lossy().into_owned();
        if MAIN_SEPARATOR != '/' {
            candidate = candidate.replace(MAIN_SEPARATOR, "/");
        }

        !self.keep.is_match(&candidate) && self.exclude.is_match(&candidate)
    }
}

fn build_set<S: AsRef<str>>(patterns: &[S]) -> Result<RegexSet> {
    // compile individually first so the error names the offending pattern
    for pattern in patterns {
        RegexBuilder::new(pattern.as_ref())
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::InvalidPattern {
                pattern: pattern.as_ref().to_string(),
                message: e.to_string(),
            })?;
    }

    RegexSetBuilder::new(patterns.iter().map(|p| p.as_ref()))
        .case_insensitive(true)
        .build()
        .map_err(|e| Error::InvalidPattern {
            pattern: patterns
                .iter()
                .map(|p| p.as_ref())
                .collect::<Vec<_>>()
                .join(" | "),
            message: e.to_string(),
        })
}
