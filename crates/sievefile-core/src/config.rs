//! Scan configuration types.

use std::path::{Path, PathBuf};

use derive_builder::Builder;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};

use crate::error::ScanError;

/// Configuration for scanning operations.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Cross filesystem boundaries.
    #[builder(default = "false")]
    #[serde(default)]
    pub cross_filesystems: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Glob patterns matched against entry names; matches are not scanned.
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Number of threads for scanning (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Entries between two progress updates.
    #[builder(default = "1000")]
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_progress_interval() -> u64 {
    1000
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if let Some(ref patterns) = self.ignore_patterns {
            for pattern in patterns {
                Glob::new(pattern).map_err(|e| format!("Bad ignore pattern {pattern:?}: {e}"))?;
            }
        }
        if self.progress_interval == Some(0) {
            return Err("Progress interval must be positive".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cross_filesystems: false,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            threads: 0,
            progress_interval: default_progress_interval(),
        }
    }

    /// Load a config from a TOML file. A missing `root` defaults to `.`.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ScanError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ScanError> {
        let config: Self = toml::from_str(text).map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.ignore_matcher()?;
        Ok(config)
    }

    /// Compile the ignore patterns.
    pub fn ignore_matcher(&self) -> Result<IgnoreMatcher, ScanError> {
        IgnoreMatcher::new(&self.ignore_patterns, self.include_hidden)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

/// Compiled name filter for a scan.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    globs: GlobSet,
    include_hidden: bool,
}

impl IgnoreMatcher {
    fn new(patterns: &[String], include_hidden: bool) -> Result<Self, ScanError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|e| ScanError::InvalidConfig {
                message: format!("Bad ignore pattern {pattern:?}: {e}"),
            })?;
            builder.add(glob);
        }
        let globs = builder.build().map_err(|e| ScanError::InvalidConfig {
            message: e.to_string(),
        })?;
        Ok(Self {
            globs,
            include_hidden,
        })
    }

    /// Check if an entry name should be left out of the scan.
    pub fn is_ignored(&self, name: &str) -> bool {
        (!self.include_hidden && name.starts_with('.')) || self.globs.is_match(name)
    }
}
