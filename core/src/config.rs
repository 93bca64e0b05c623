use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::catalog::{BUILTIN_BENCHMARKS, Benchmark, Catalog};

pub const DEFAULT_CONFIG_FILE: &str = "sdbins.toml";

/// On-disk configuration. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SdBinsConfig {
    /// Bootloader project, passed to `make -C`.
    pub project_dir: PathBuf,
    /// Device-tree include, relative to `project_dir` unless absolute.
    pub dts_file: PathBuf,
    /// 1-based line holding the benchmark selector.
    pub dts_line: usize,
    pub make: PathBuf,
    pub jobs: usize,
    /// Built image, relative to `project_dir` unless absolute.
    pub artifact: PathBuf,
    pub output_dir: PathBuf,
    pub restore_dts: bool,
    pub keep_going: bool,
    pub manifest: bool,
    pub benchmarks: Vec<Benchmark>,
}

impl Default for SdBinsConfig {
    fn default() -> Self {
        Self {
            project_dir: PathBuf::from("riscv-pk"),
            dts_file: PathBuf::from("dts/noop.dtsi"),
            dts_line: 25,
            make: PathBuf::from("make"),
            jobs: 16,
            artifact: PathBuf::from("build/bbl.bin"),
            output_dir: PathBuf::from("cpt_bins/tailbench-withsd"),
            restore_dts: false,
            keep_going: false,
            manifest: true,
            benchmarks: BUILTIN_BENCHMARKS.iter().map(|name| Benchmark::new(*name)).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Yaml,
}

fn format_for(path: &Path) -> Format {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => Format::Yaml,
        _ => Format::Toml,
    }
}

impl SdBinsConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).context("invalid TOML configuration")
    }

    pub fn from_yaml_str(src: &str) -> Result<Self> {
        serde_yaml::from_str(src).context("invalid YAML configuration")
    }

    /// Loads `path` and anchors relative directories at the file's parent.
    pub fn load(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let parsed = match format_for(path) {
            Format::Toml => Self::from_toml_str(&src),
            Format::Yaml => Self::from_yaml_str(&src),
        }
        .with_context(|| format!("in {}", path.display()))?;
        let base = path.parent().filter(|p| !p.as_os_str().is_empty());
        let config = match base {
            Some(dir) => parsed.anchored_at(dir),
            None => parsed,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit` if given, otherwise `sdbins.toml` in `cwd` when it
    /// exists, otherwise defaults anchored at `cwd`.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = cwd.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            return Self::load(&candidate);
        }
        let config = Self::default().anchored_at(cwd);
        config.validate()?;
        Ok(config)
    }

    fn anchored_at(mut self, base: &Path) -> Self {
        if self.project_dir.is_relative() {
            self.project_dir = base.join(&self.project_dir);
        }
        if self.output_dir.is_relative() {
            self.output_dir = base.join(&self.output_dir);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dts_line == 0 {
            bail!("dts_line starts at 1");
        }
        if self.jobs == 0 {
            bail!("jobs must be at least 1");
        }
        self.catalog().map(|_| ())
    }

    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::new(self.benchmarks.clone()).context("invalid benchmark list")
    }

    pub fn dts_path(&self) -> PathBuf {
        self.project_dir.join(&self.dts_file)
    }

    pub fn artifact_path(&self) -> PathBuf {
        self.project_dir.join(&self.artifact)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serialize configuration")
    }
}
