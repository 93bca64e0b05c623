#![cfg(unix)]

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{TempDir, tempdir};

const DTSI: &str = "/ {\n  chosen {\n    bootargs = \"console=hvc0 init=/xapian\";\n  };\n};\n";

// Stand-in for make: `clean` wipes build/, a build copies the selector line
// into build/bbl.bin and fails when it matches the name in fail-on.
const FAKE_MAKE: &str = r#"#!/bin/sh
dir=""
clean=0
while [ $# -gt 0 ]; do
  case "$1" in
    clean) clean=1 ;;
    -C) shift; dir="$1" ;;
    -j) shift ;;
  esac
  shift
done
if [ "$clean" = 1 ]; then
  rm -rf "$dir/build"
  exit 0
fi
if [ -f "$dir/fail-on" ] && grep -q "$(cat "$dir/fail-on")\";" "$dir/dts/noop.dtsi"; then
  echo "fake make: refusing to build" >&2
  exit 2
fi
mkdir -p "$dir/build"
sed -n 3p "$dir/dts/noop.dtsi" > "$dir/build/bbl.bin"
"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(extra_config: &str) -> Result<Self, Box<dyn Error>> {
        let dir = tempdir()?;
        let root = dir.path();
        fs::create_dir_all(root.join("pk/dts"))?;
        fs::write(root.join("pk/dts/noop.dtsi"), DTSI)?;

        let make = root.join("fake-make.sh");
        fs::write(&make, FAKE_MAKE)?;
        fs::set_permissions(&make, fs::Permissions::from_mode(0o755))?;

        let config = format!(
            "project_dir = \"pk\"\ndts_line = 3\njobs = 2\noutput_dir = \"out\"\nmake = {:?}\n{}",
            make.display().to_string(),
            extra_config
        );
        fs::write(root.join("sdbins.toml"), config)?;
        Ok(Self { dir })
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn out(&self, name: &str) -> PathBuf {
        self.root().join("out").join(name)
    }

    fn cmd(&self) -> Result<Command, Box<dyn Error>> {
        let mut cmd = Command::cargo_bin("sd-bins")?;
        cmd.current_dir(self.root()).env_remove("RUST_LOG").env_remove("SDBINS_LOG");
        Ok(cmd)
    }

    fn selector_line(&self) -> Result<String, Box<dyn Error>> {
        let text = fs::read_to_string(self.root().join("pk/dts/noop.dtsi"))?;
        Ok(text.lines().nth(2).unwrap_or_default().to_string())
    }
}

#[test]
fn run_builds_every_benchmark_into_output_dir() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("")?;
    ws.cmd()?
        .arg("run")
        .assert()
        .success()
        .stderr(predicate::str::contains("built  moses"))
        .stderr(predicate::str::contains("Wrote manifest"));

    for name in ["xapian", "img-dnn", "moses", "specjbb"] {
        let image = fs::read_to_string(ws.out(&format!("{name}.bin")))?;
        assert!(image.contains(&format!("console=hvc0 {name}\";")), "{name}: {image}");
    }
    let manifest = fs::read_to_string(ws.out("manifest.json"))?;
    assert!(manifest.contains("\"benchmark\": \"specjbb\""));
    assert!(ws.selector_line()?.contains("specjbb\";"));
    Ok(())
}

#[test]
fn bare_invocation_runs_with_restore() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("restore_dts = true\nmanifest = false\n")?;
    let before = ws.selector_line()?;
    ws.cmd()?.assert().success();

    assert!(ws.out("img-dnn.bin").exists());
    assert!(!ws.out("manifest.json").exists());
    assert_eq!(ws.selector_line()?, before);
    Ok(())
}

#[test]
fn dry_run_leaves_tree_untouched() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("")?;
    let before = ws.selector_line()?;
    ws.cmd()?
        .args(["run", "--dry-run", "--only", "moses"])
        .assert()
        .success()
        .stderr(predicate::str::contains("plan   moses"))
        .stderr(predicate::str::contains("fake-make.sh -j 2 -C"));

    assert!(!ws.root().join("out").exists());
    assert!(!ws.root().join("pk/build").exists());
    assert_eq!(ws.selector_line()?, before);
    Ok(())
}

#[test]
fn keep_going_reports_failures_and_exits_non_zero() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("")?;
    fs::write(ws.root().join("pk/fail-on"), "img-dnn")?;
    ws.cmd()?
        .args(["run", "--keep-going"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed img-dnn"))
        .stderr(predicate::str::contains("1 of 4 benchmarks failed"));

    assert!(ws.out("xapian.bin").exists());
    assert!(!ws.out("img-dnn.bin").exists());
    assert!(ws.out("specjbb.bin").exists());
    Ok(())
}

#[test]
fn failure_without_keep_going_stops_the_loop() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("")?;
    fs::write(ws.root().join("pk/fail-on"), "img-dnn")?;
    ws.cmd()?
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("benchmark 'img-dnn'"));

    assert!(ws.out("xapian.bin").exists());
    assert!(!ws.out("moses.bin").exists());
    Ok(())
}

#[test]
fn list_prints_catalog_in_order() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("")?;
    ws.cmd()?
        .arg("list")
        .assert()
        .success()
        .stdout("xapian\nimg-dnn\nmoses\nspecjbb\n");
    Ok(())
}

#[test]
fn list_long_shows_tuples_from_config() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("[[benchmarks]]\nname = \"silo\"\nfiles = [\"silo_integrated\"]\nargs = [\"-t\", \"4\"]\n")?;
    ws.cmd()?
        .args(["list", "--long"])
        .assert()
        .success()
        .stdout("silo\tfiles=[silo_integrated]\targs=[-t 4]\n");
    Ok(())
}

#[test]
fn select_patches_only_the_selector_line() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("")?;
    ws.cmd()?.args(["select", "moses"]).assert().success();
    assert_eq!(ws.selector_line()?, "    bootargs = \"console=hvc0 moses\";");
    assert!(!ws.root().join("out").exists());

    ws.cmd()?
        .args(["select", "silo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown benchmark 'silo'"));
    Ok(())
}

#[test]
fn config_prints_effective_values() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("")?;
    ws.cmd()?
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("dts_line = 3"))
        .stdout(predicate::str::contains("jobs = 2"));
    Ok(())
}

#[test]
fn missing_explicit_config_is_an_error() -> Result<(), Box<dyn Error>> {
    let ws = Workspace::new("")?;
    ws.cmd()?
        .args(["list", "--config", "absent.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read config file"));
    Ok(())
}
