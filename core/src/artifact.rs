use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

const DEFAULT_EXTENSION: &str = "bin";

/// A built image copied into the output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectedArtifact {
    pub path: PathBuf,
    pub bytes: u64,
}

/// Destination directory for per-benchmark images.
#[derive(Debug, Clone)]
pub struct ArtifactSink {
    output_dir: PathBuf,
}

impl ArtifactSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create output directory {}", self.output_dir.display()))
    }

    /// Where the image for `name` lands: `<output_dir>/<name>.<ext of source>`.
    pub fn destination(&self, source: &Path, name: &str) -> PathBuf {
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let stem = sanitize_filename::sanitize(name);
        self.output_dir.join(format!("{stem}.{ext}"))
    }

    pub fn collect(&self, source: &Path, name: &str) -> Result<CollectedArtifact> {
        if !source.is_file() {
            bail!("build artifact {} was not produced", source.display());
        }
        self.ensure_dir()?;
        let dest = self.destination(source, name);
        let bytes = fs::copy(source, &dest)
            .with_context(|| format!("Failed to copy {} to {}", source.display(), dest.display()))?;
        info!(benchmark = name, dest = %dest.display(), bytes, "collected image");
        Ok(CollectedArtifact { path: dest, bytes })
    }
}
