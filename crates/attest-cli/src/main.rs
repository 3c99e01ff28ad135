//! attest command line.
//!
//! Provides the `attest` binary. Input files are module syntax trees in the
//! JSON shape of `attest_core::ast::ModuleAst`, as written by a front-end
//! adapter. All files are loaded before analysis starts.
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use attest_check::report::{render_json, render_text};
use attest_check::{
    analyze_module, analyze_modules, AnalysisConfig, ConfigError, ModuleReport, UnresolvedPolicy,
};
use attest_core::{Diagnostic, ModuleAst};

/// No error-severity diagnostics.
const EXIT_CLEAN: i32 = 0;
/// At least one error-severity diagnostic.
const EXIT_ERRORS: i32 = 1;
/// Unreadable input, bad configuration, or a module the analyzer rejected.
const EXIT_INPUT: i32 = 2;

/// Static contract and effect verifier.
#[derive(Debug, Parser)]
#[command(name = "attest", about = "Static contract and effect verifier")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, clap::Args)]
struct AnalysisArgs {
    /// Configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Treat calls whose exceptions cannot be determined as raising nothing.
    #[arg(long)]
    permissive: bool,

    /// Do not report `raises` declarations that are never raised.
    #[arg(long)]
    no_unused: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check declared contracts against inferred effects.
    Check {
        /// Module files to check.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format.
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Print the inferred effects of every function in a module as JSON.
    Facts {
        file: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Print contract metadata of a module as JSON (for type-checker plugins).
    Metadata {
        file: PathBuf,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

/// Anything that stops the CLI before analysis.
#[derive(Debug, Error)]
enum InputError {
    #[error("failed to read module '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid module '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Check {
            files,
            format,
            analysis,
        } => run_check(&files, format, &analysis),
        Commands::Facts { file, analysis } => {
            run_single(&file, &analysis, |report| render_json(&report.facts))
        }
        Commands::Metadata { file, analysis } => {
            run_single(&file, &analysis, |report| render_json(&report.metadata))
        }
    };
    process::exit(exit_code);
}

/// Execute the check subcommand.
fn run_check(files: &[PathBuf], format: Format, args: &AnalysisArgs) -> i32 {
    let config = match load_config(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_INPUT;
        }
    };
    let modules = match files
        .iter()
        .map(|path| load_module(path))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(modules) => modules,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_INPUT;
        }
    };

    let reports = analyze_modules(&modules, &config);
    for report in &reports {
        if let Some(failure) = &report.failure {
            eprintln!("Error: analysis of '{}' aborted: {}", report.module_id, failure);
        }
    }

    match format {
        Format::Text => {
            let diagnostics: Vec<Diagnostic> = reports
                .iter()
                .flat_map(|r| r.diagnostics.iter().cloned())
                .collect();
            print!("{}", render_text(&diagnostics));
        }
        Format::Json => match render_json(&reports) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: failed to serialize report: {}", e);
                return EXIT_INPUT;
            }
        },
    }

    let errors: usize = reports.iter().map(ModuleReport::error_count).sum();
    tracing::info!(modules = reports.len(), errors, "check finished");
    exit_code(&reports)
}

/// Execute a subcommand that analyzes one module and prints part of its
/// report as JSON.
fn run_single<F>(path: &Path, args: &AnalysisArgs, render: F) -> i32
where
    F: FnOnce(&ModuleReport) -> Result<String, serde_json::Error>,
{
    let loaded = load_config(args).and_then(|config| Ok((config, load_module(path)?)));
    let (config, module) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_INPUT;
        }
    };

    let report = analyze_module(&module, &config);
    if let Some(failure) = &report.failure {
        eprintln!("Error: analysis of '{}' aborted: {}", report.module_id, failure);
        return EXIT_INPUT;
    }
    match render(&report) {
        Ok(json) => {
            println!("{}", json);
            EXIT_CLEAN
        }
        Err(e) => {
            eprintln!("Error: failed to serialize report: {}", e);
            EXIT_INPUT
        }
    }
}

/// Configuration file (or defaults) with command-line overrides applied.
fn load_config(args: &AnalysisArgs) -> Result<AnalysisConfig, InputError> {
    let mut config = match &args.config {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if args.permissive {
        config.unresolved_policy = UnresolvedPolicy::Permissive;
    }
    if args.no_unused {
        config.report_unused_raises = false;
    }
    Ok(config)
}

fn load_module(path: &Path) -> Result<ModuleAst, InputError> {
    let text = fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| InputError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Exit code for a finished check: aborted modules outrank diagnostics.
fn exit_code(reports: &[ModuleReport]) -> i32 {
    if reports.iter().any(|r| r.failure.is_some()) {
        EXIT_INPUT
    } else if reports.iter().any(|r| r.error_count() > 0) {
        EXIT_ERRORS
    } else {
        EXIT_CLEAN
    }
}
