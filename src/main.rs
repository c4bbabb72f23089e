use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use sugar_validate::{Registry, Report};

mod check;
mod config;

#[derive(Parser)]
#[command(name = "sugarlint", version, about = "Static checks for compiled SugarCube stories")]
struct Cli {
    /// Suppress non-essential output (only errors are printed)
    #[arg(long, global = true)]
    quiet: bool,

    /// Log discovery and per-passage progress (overridden by RUST_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    /// Config file (default: ./sugarlint.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate story file(s) or directories of them
    Check {
        /// Story HTML files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value = "terminal")]
        format: check::OutputFormat,

        /// Re-check whenever a story file changes
        #[arg(long)]
        watch: bool,
    },

    /// Print the macros known for a story as an override table
    Macros {
        /// Story HTML file
        file: PathBuf,
    },
}

fn init_logging(cli: &Cli) {
    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check {
            paths,
            format,
            watch,
        } => {
            let opts = check::CheckOpts {
                format,
                quiet: cli.quiet,
            };
            if watch {
                check::watch_and_recheck(&paths, &config, &opts)?;
            } else if check::run_check(&paths, &config, &opts)? {
                std::process::exit(1);
            }
        }
        Commands::Macros { file } => {
            handle_macros(&file, &config)?;
        }
    }

    Ok(())
}

/// Built-ins, user-script macros, config overrides and widgets, as JSON.
fn handle_macros(file: &Path, config: &config::LintConfig) -> Result<()> {
    let document = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read '{}'", file.display()))?;

    let mut report = Report::default();
    let story = sugar_validate::extract::extract_story(&document, &mut report)?;
    let mut registry = Registry::discover(&document, &config.macros, &mut report);
    for passage in &story.passages {
        if let Err(fault) = sugar_validate::widgets::discover(passage, &mut registry, &mut report) {
            log::warn!("{}: {}", check::describe_key(&passage.header), fault);
        }
    }

    println!("{}", serde_json::to_string_pretty(&registry.to_overrides())?);
    Ok(())
}
