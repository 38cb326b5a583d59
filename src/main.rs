use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{error, info};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tflint::config::{self, Config as TflintConfig};
use tflint::terraform::CallModuleType;
use tflint::{inspect, Diagnostic, FsLoader, Issue, Options};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "tflint")]
#[command(about = "Static analysis for Terraform configuration", long_about = None)]
struct Cli {
    /// Switch to a different working directory before inspecting
    #[arg(long)]
    chdir: Option<PathBuf>,

    /// Configuration file (default: .tflint.toml in the inspected directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Set a variable: --var key=value (repeatable)
    #[arg(long)]
    var: Vec<String>,

    /// Load variables from a values file. Can repeat.
    #[arg(long)]
    var_file: Vec<PathBuf>,

    /// Module calls to follow: all|local|none
    #[arg(long)]
    call_module_type: Option<CallModuleType>,

    /// Inspect every directory below the working directory that holds .tf files
    #[arg(long)]
    recursive: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "default")]
    format: Format,
}

#[derive(Copy, Clone, ValueEnum)]
enum Format {
    Default,
    Json,
}

#[derive(Default, Serialize)]
struct Report {
    issues: Vec<Issue>,
    errors: Vec<Diagnostic>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let original_working_dir = std::env::current_dir().context("reading the working directory")?;
    let base = cli.chdir.clone().unwrap_or_else(|| PathBuf::from("."));

    let dirs = if cli.recursive {
        module_dirs(&base)?
    } else {
        vec![base.clone()]
    };

    let mut report = Report::default();
    for dir in &dirs {
        let tflint_config = load_tflint_config(&cli, &base, dir)?;
        let opts = options(&cli, &tflint_config, &original_working_dir);
        info!("inspecting {}", dir.display());
        let inspection = inspect(dir, &FsLoader, &opts).with_context(|| format!("inspecting {}", dir.display()))?;
        report.issues.extend(inspection.issues);
        report.errors.extend(inspection.diagnostics.into_vec());
    }

    match cli.format {
        Format::Default => print_default(&report),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.errors.iter().any(Diagnostic::is_error) {
        std::process::exit(1);
    }
    if !report.issues.is_empty() {
        std::process::exit(2);
    }
    Ok(())
}

/// `--config` wins; otherwise each inspected directory may carry its own
/// `.tflint.toml`.
fn load_tflint_config(cli: &Cli, base: &Path, dir: &Path) -> Result<TflintConfig> {
    if let Some(path) = &cli.config {
        let path = if path.is_relative() { base.join(path) } else { path.clone() };
        return match config::load_config_from_path(&path)? {
            Some(cfg) => Ok(cfg),
            None => bail!("failed to load config file {}: no such file", path.display()),
        };
    }
    Ok(config::load_config(dir)?.unwrap_or_default())
}

fn options(cli: &Cli, cfg: &TflintConfig, original_working_dir: &Path) -> Options {
    let var_files = cfg
        .settings
        .varfile
        .iter()
        .map(PathBuf::from)
        .chain(cli.var_file.iter().cloned())
        .collect();
    let variables = cfg.settings.variables.iter().chain(&cli.var).cloned().collect();

    Options {
        call_module_type: cli
            .call_module_type
            .or(cfg.settings.call_module_type)
            .unwrap_or_default(),
        var_files,
        variables,
        ignored_modules: cfg.ignored_modules().map(str::to_string).collect(),
        lint: cfg.lint_settings(),
        workspace: std::env::var("TF_WORKSPACE").ok(),
        env: std::env::vars().collect(),
        original_working_dir: Some(original_working_dir.to_path_buf()),
    }
}

/// Directories below `base` holding at least one `.tf` file, skipping hidden
/// directories such as `.terraform`.
fn module_dirs(base: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = BTreeSet::new();
    let walker = WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|s| s == "tf")
                .unwrap_or(false)
        {
            if let Some(parent) = entry.path().parent() {
                dirs.insert(parent.to_path_buf());
            }
        }
    }
    Ok(dirs.into_iter().collect())
}

fn print_default(report: &Report) {
    for diag in &report.errors {
        error!("{diag}");
    }
    for issue in &report.issues {
        println!("{issue}");
    }
    if !report.issues.is_empty() {
        println!("{} issue(s) found", report.issues.len());
    }
}
