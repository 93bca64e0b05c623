//! The per-benchmark loop: select, clean, build, collect.
//!
//! Benchmarks run strictly one after another. The device-tree file and the
//! build tree are shared between iterations, so there is nothing to overlap;
//! the only parallelism is the `-j` handed to the build system.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use crate::artifact::{ArtifactSink, CollectedArtifact};
use crate::catalog::{Benchmark, Catalog};
use crate::config::SdBinsConfig;
use crate::dts::DtsFile;
use crate::make::{BuildSystem, Make};
use crate::manifest::{Manifest, ManifestEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Log what would happen without touching files or spawning anything.
    pub dry_run: bool,
    /// Record a failed benchmark and move on instead of aborting.
    pub keep_going: bool,
    /// Put the original selector line back once the loop finishes.
    pub restore_dts: bool,
    pub write_manifest: bool,
}

impl RunOptions {
    pub fn from_config(config: &SdBinsConfig) -> Self {
        Self {
            dry_run: false,
            keep_going: config.keep_going,
            restore_dts: config.restore_dts,
            write_manifest: config.manifest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Built(CollectedArtifact),
    /// Dry run: the command lines that would have been executed.
    Planned(Vec<String>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchResult {
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub results: Vec<BenchResult>,
    pub manifest: Option<PathBuf>,
}

impl RunReport {
    pub fn built(&self) -> impl Iterator<Item = (&str, &CollectedArtifact)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            Outcome::Built(artifact) => Some((r.name.as_str(), artifact)),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.results.iter().filter_map(|r| match &r.outcome {
            Outcome::Failed(msg) => Some((r.name.as_str(), msg.as_str())),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

pub struct Pipeline<B: BuildSystem> {
    dts: DtsFile,
    build: B,
    artifact: PathBuf,
    sink: ArtifactSink,
    options: RunOptions,
}

impl Pipeline<Make> {
    pub fn from_config(config: &SdBinsConfig, options: RunOptions) -> Self {
        let make = Make::new(&config.make, &config.project_dir, config.jobs);
        Pipeline::new(
            DtsFile::new(config.dts_path(), config.dts_line),
            make,
            config.artifact_path(),
            ArtifactSink::new(&config.output_dir),
            options,
        )
    }
}

impl<B: BuildSystem> Pipeline<B> {
    pub fn new(dts: DtsFile, build: B, artifact: impl Into<PathBuf>, sink: ArtifactSink, options: RunOptions) -> Self {
        Self {
            dts,
            build,
            artifact: artifact.into(),
            sink,
            options,
        }
    }

    pub fn build_system(&self) -> &B {
        &self.build
    }

    pub fn output_dir(&self) -> &Path {
        self.sink.output_dir()
    }

    pub fn run(&mut self, catalog: &Catalog) -> Result<RunReport> {
        if self.options.dry_run {
            return Ok(self.plan(catalog));
        }

        let original = if self.options.restore_dts {
            Some(self.dts.current_line()?)
        } else {
            None
        };

        let outcome = self.run_all(catalog);

        if let Some(line) = original {
            match (&outcome, self.dts.restore(&line)) {
                (_, Ok(())) => info!(path = %self.dts.path().display(), "restored selector line"),
                (Ok(_), Err(err)) => return Err(err),
                (Err(_), Err(err)) => warn!("could not restore selector line: {:#}", err),
            }
        }

        outcome
    }

    fn plan(&self, catalog: &Catalog) -> RunReport {
        let mut report = RunReport::default();
        for bench in catalog {
            let dest = self.sink.destination(&self.artifact, &bench.name);
            let mut steps = vec![format!(
                "select '{}' at {}:{}",
                bench.name,
                self.dts.path().display(),
                self.dts.line()
            )];
            steps.extend(self.build.describe());
            steps.push(format!("copy {} -> {}", self.artifact.display(), dest.display()));
            for step in &steps {
                info!(benchmark = %bench.name, "[dry-run] {}", step);
            }
            report.results.push(BenchResult {
                name: bench.name.clone(),
                outcome: Outcome::Planned(steps),
            });
        }
        report
    }

    fn run_all(&mut self, catalog: &Catalog) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut manifest = Manifest::new(Utc::now(), self.dts.path(), self.dts.line());

        for (idx, bench) in catalog.iter().enumerate() {
            info!(benchmark = %bench.name, "[{}/{}] building", idx + 1, catalog.len());
            match self.build_one(bench) {
                Ok(artifact) => {
                    manifest.images.push(manifest_entry(bench, &artifact));
                    report.results.push(BenchResult {
                        name: bench.name.clone(),
                        outcome: Outcome::Built(artifact),
                    });
                }
                Err(err) if self.options.keep_going => {
                    warn!(benchmark = %bench.name, "skipping after failure: {:#}", err);
                    report.results.push(BenchResult {
                        name: bench.name.clone(),
                        outcome: Outcome::Failed(format!("{err:#}")),
                    });
                }
                Err(err) => {
                    // Images collected before the failure still get listed.
                    if let Err(manifest_err) = self.write_manifest(&manifest) {
                        warn!("could not write manifest: {:#}", manifest_err);
                    }
                    return Err(err);
                }
            }
        }

        report.manifest = self.write_manifest(&manifest)?;
        Ok(report)
    }

    fn write_manifest(&self, manifest: &Manifest) -> Result<Option<PathBuf>> {
        if !self.options.write_manifest {
            return Ok(None);
        }
        self.sink.ensure_dir()?;
        manifest.write_to(self.sink.output_dir()).map(Some)
    }

    fn build_one(&mut self, bench: &Benchmark) -> Result<CollectedArtifact> {
        let name = bench.name.as_str();
        self.dts.select(name)?;
        self.build.clean().with_context(|| format!("benchmark '{name}'"))?;
        self.build.build().with_context(|| format!("benchmark '{name}'"))?;
        self.sink.ensure_dir()?;
        self.sink
            .collect(&self.artifact, name)
            .with_context(|| format!("benchmark '{name}'"))
    }
}

fn manifest_entry(bench: &Benchmark, artifact: &CollectedArtifact) -> ManifestEntry {
    ManifestEntry {
        benchmark: bench.name.clone(),
        image: artifact
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        bytes: artifact.bytes,
        files: bench.files.clone(),
        args: bench.args.clone(),
    }
}
