use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sdbins_core::{
    Catalog, Pipeline, RunOptions, RunReport, SdBinsConfig,
    dts::DtsFile,
    pipeline::Outcome,
};
use tracing::info;

static LOG_INIT: Once = Once::new();
const DEFAULT_LOG_FILTER: &str = "sdbins_core=info,sd_bins=info";
const VERBOSE_LOG_FILTER: &str = "sdbins_core=debug,sd_bins=debug";


#[derive(Debug, Parser)]
#[command(
    name = "sd-bins",
    author,
    version,
    about = "Build one bootloader image per benchmark",
    long_about = None
)]
struct CliArgs {
    /// Subcommand; `run` when omitted
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML, or YAML by extension). Defaults to ./sdbins.toml when present
    #[arg(long, short = 'c', global = true, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,

    /// Log external commands and file edits
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Debug, Default, Args)]
struct RunArgs {
    /// Only build these benchmarks (repeatable); catalog order is kept
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,
    /// Print the planned steps without editing files or running make
    #[arg(long)]
    dry_run: bool,
    /// Continue with the next benchmark when one fails
    #[arg(long)]
    keep_going: bool,
    /// Restore the original device-tree line afterwards
    #[arg(long)]
    restore_dts: bool,
    /// Skip writing manifest.json
    #[arg(long)]
    no_manifest: bool,
    /// Parallel jobs for the build step
    #[arg(long, short = 'j')]
    jobs: Option<usize>,
    /// Where images are collected
    #[arg(long, value_name = "DIR", value_parser = parse_sanitized_path)]
    output_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Select, clean, build and collect every benchmark.
    Run(RunArgs),
    /// List catalog benchmarks in build order.
    List {
        /// Also show the file and argument lists
        #[arg(long, short = 'l')]
        long: bool,
    },
    /// Point the device-tree selector line at one benchmark without building.
    Select {
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            return Err(anyhow::anyhow!(
                "Parent directory components ('..') are not allowed in file paths."
            ));
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn filter_expr(verbose: bool) -> String {
    let from_env = std::env::var("SDBINS_LOG")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty());
    match from_env {
        Some(expr) => expr,
        None if verbose => VERBOSE_LOG_FILTER.to_string(),
        None => DEFAULT_LOG_FILTER.to_string(),
    }
}

fn init_logging(verbose: bool) {
    LOG_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let builder = fmt().with_writer(std::io::stderr).with_target(false);
        let builder = match EnvFilter::try_new(filter_expr(verbose)) {
            Ok(filter) => builder.with_env_filter(filter),
            Err(_) => builder.with_env_filter(DEFAULT_LOG_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn load_config(explicit: Option<&Path>) -> anyhow::Result<SdBinsConfig> {
    let cwd = std::env::current_dir().context("Failed to determine working directory")?;
    SdBinsConfig::discover(explicit, &cwd)
}

fn apply_overrides(config: &mut SdBinsConfig, args: &RunArgs) -> anyhow::Result<()> {
    if let Some(jobs) = args.jobs {
        if jobs == 0 {
            anyhow::bail!("--jobs must be at least 1");
        }
        config.jobs = jobs;
    }
    if let Some(dir) = &args.output_dir {
        config.output_dir = if dir.is_absolute() {
            dir.clone()
        } else {
            std::env::current_dir()
                .context("Failed to determine working directory")?
                .join(dir)
        };
    }
    Ok(())
}

fn run_options(config: &SdBinsConfig, args: &RunArgs) -> RunOptions {
    let base = RunOptions::from_config(config);
    RunOptions {
        dry_run: args.dry_run,
        keep_going: base.keep_going || args.keep_going,
        restore_dts: base.restore_dts || args.restore_dts,
        write_manifest: base.write_manifest && !args.no_manifest,
    }
}

fn selected_catalog(config: &SdBinsConfig, only: &[String]) -> anyhow::Result<Catalog> {
    let catalog = config.catalog()?;
    if only.is_empty() {
        Ok(catalog)
    } else {
        catalog.select(only)
    }
}

fn print_summary(report: &RunReport) {
    for result in &report.results {
        match &result.outcome {
            Outcome::Built(artifact) => {
                eprintln!("built  {:<12} {} ({} bytes)", result.name, artifact.path.display(), artifact.bytes)
            }
            Outcome::Planned(steps) => {
                eprintln!("plan   {}", result.name);
                for step in steps {
                    eprintln!("         {step}");
                }
            }
            Outcome::Failed(msg) => eprintln!("failed {:<12} {}", result.name, msg),
        }
    }
    if let Some(path) = &report.manifest {
        eprintln!("Wrote manifest to {}", path.display());
    }
}

fn run(config_path: Option<&Path>, args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, &args)?;
    let catalog = selected_catalog(&config, &args.only)?;
    let options = run_options(&config, &args);
    info!(
        benchmarks = catalog.len(),
        output = %config.output_dir.display(),
        dry_run = options.dry_run,
        "starting run"
    );

    let mut pipeline = Pipeline::from_config(&config, options);
    let report = pipeline.run(&catalog)?;
    print_summary(&report);

    let failed = report.failures().count();
    if failed > 0 {
        anyhow::bail!("{} of {} benchmarks failed", failed, report.results.len());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let CliArgs {
        command,
        config,
        verbose,
    } = CliArgs::parse();
    init_logging(verbose);
    let config_path = config.as_deref();

    match command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(config_path, args),
        Commands::List { long } => {
            let config = load_config(config_path)?;
            for bench in &config.catalog()? {
                if long {
                    println!(
                        "{}\tfiles=[{}]\targs=[{}]",
                        bench.name,
                        bench.files.join(", "),
                        bench.args.join(" ")
                    );
                } else {
                    println!("{}", bench.name);
                }
            }
            Ok(())
        }
        Commands::Select { name } => {
            let config = load_config(config_path)?;
            config.catalog()?.select(std::slice::from_ref(&name))?;
            let dts = DtsFile::new(config.dts_path(), config.dts_line);
            dts.select(&name)?;
            eprintln!("Selected '{}' in {}:{}", name, dts.path().display(), dts.line());
            Ok(())
        }
        Commands::Config => {
            let config = load_config(config_path)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
