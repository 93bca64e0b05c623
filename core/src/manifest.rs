use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub benchmark: String,
    pub image: String,
    pub bytes: u64,
    pub files: Vec<String>,
    pub args: Vec<String>,
}

/// Summary of the images produced by one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: String,
    pub dts_file: String,
    pub dts_line: usize,
    pub images: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(timestamp: DateTime<Utc>, dts_file: &Path, dts_line: usize) -> Self {
        Self {
            generated_at: timestamp.to_rfc3339(),
            dts_file: dts_file.to_string_lossy().into_owned(),
            dts_line,
            images: Vec::new(),
        }
    }

    pub fn write_to(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).context("serialize manifest")?;
        fs::write(&path, json).with_context(|| format!("Failed to write manifest {}", path.display()))?;
        Ok(path)
    }

    pub fn read_from(output_dir: &Path) -> Result<Self> {
        let path = output_dir.join(MANIFEST_FILE);
        let raw = fs::read_to_string(&path).with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse manifest {}", path.display()))
    }
}
