use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Clean and build steps of the external build system.
pub trait BuildSystem {
    fn clean(&mut self) -> Result<()>;
    fn build(&mut self) -> Result<()>;
    /// Human readable command lines for dry runs and logs.
    fn describe(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Drives `make` in the bootloader project directory.
#[derive(Debug, Clone)]
pub struct Make {
    program: PathBuf,
    project_dir: PathBuf,
    jobs: usize,
}

impl Make {
    pub fn new(program: impl Into<PathBuf>, project_dir: impl Into<PathBuf>, jobs: usize) -> Self {
        Self {
            program: program.into(),
            project_dir: project_dir.into(),
            jobs: jobs.max(1),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn clean_args(&self) -> Vec<OsString> {
        vec!["clean".into(), "-C".into(), self.project_dir.clone().into_os_string()]
    }

    pub fn build_args(&self) -> Vec<OsString> {
        vec![
            "-j".into(),
            self.jobs.to_string().into(),
            "-C".into(),
            self.project_dir.clone().into_os_string(),
        ]
    }

    fn render(&self, args: &[OsString]) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }

    fn run(&self, step: &str, args: Vec<OsString>) -> Result<()> {
        debug!(command = %self.render(&args), "running {} step", step);
        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .with_context(|| format!("failed to spawn {} for {} step", self.program.display(), step))?;
        if !status.success() {
            bail!("{} step `{}` failed with {}", step, self.render(&args), status);
        }
        Ok(())
    }
}

impl BuildSystem for Make {
    fn clean(&mut self) -> Result<()> {
        self.run("clean", self.clean_args())
    }

    fn build(&mut self) -> Result<()> {
        self.run("build", self.build_args())
    }

    fn describe(&self) -> Vec<String> {
        vec![self.render(&self.clean_args()), self.render(&self.build_args())]
    }
}
