//! `sugarlint check`: validate story files and print their reports.
//!
//! Paths may be files or directories; directories are walked for files with
//! one of the configured extensions. With `--watch` the check re-runs
//! whenever one of those files changes.

use anyhow::{Context, Result};
use colored::Colorize;
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use sugar_validate::{Report, Severity};
use walkdir::WalkDir;

use crate::config::LintConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Terminal,
    Json,
}

pub struct CheckOpts {
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Expand the given paths into the story files to check, in a stable order.
pub fn collect_files(paths: &[PathBuf], config: &LintConfig) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file() && config.accepts(entry.path()))
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            anyhow::bail!("No such file or directory: '{}'", path.display());
        }
    }
    Ok(files)
}

/// Validate one file. A malformed story container becomes a one-error report.
pub fn check_file(path: &Path, config: &LintConfig) -> Result<Report> {
    let document = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read '{}'", path.display()))?;
    let mut report = sugar_validate::validate(&document, &config.macros)
        .unwrap_or_else(|err| Report::from_document_error(&err));
    if config.suppress_when_unresolved && (report.unresolved_macros || report.unresolved_widgets) {
        suppress_unrecognized(&mut report);
    }
    Ok(report)
}

fn suppress_unrecognized(report: &mut Report) {
    for errors in report.errors.values_mut() {
        errors.retain(|e| !e.starts_with("Unrecognized macro"));
    }
    report.errors.retain(|_, errors| !errors.is_empty());
}

/// Check every file once. Returns `true` if any report has errors.
pub fn run_check(paths: &[PathBuf], config: &LintConfig, opts: &CheckOpts) -> Result<bool> {
    let files = collect_files(paths, config)?;
    log::debug!("checking {} files", files.len());

    let mut has_errors = false;
    let mut reports = BTreeMap::new();
    for file in &files {
        let report = check_file(file, config)?;
        has_errors |= report.has_errors();
        match opts.format {
            OutputFormat::Terminal => print_terminal(file, &report, config, opts.quiet),
            OutputFormat::Json => {
                reports.insert(file.display().to_string(), report);
            }
        }
    }

    match opts.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Terminal if !opts.quiet && files.len() > 1 => {
            let status = if has_errors {
                "errors found".red().bold()
            } else {
                "ok".green().bold()
            };
            println!("{} {} files: {}", "Checked".bold(), files.len(), status);
        }
        OutputFormat::Terminal => {}
    }
    Ok(has_errors)
}

fn print_terminal(file: &Path, report: &Report, config: &LintConfig, quiet: bool) {
    let file = file.display();
    if report.is_clean() && !quiet {
        println!("{}: {}", file, "OK".green());
    }
    for diag in report.diagnostics() {
        let severity_str = match diag.severity {
            Severity::Error => format!("{}", "error".red().bold()),
            Severity::Warning if quiet => continue,
            Severity::Warning => format!("{}", "warning".yellow().bold()),
            Severity::Info if quiet || !config.show_infos => continue,
            Severity::Info => format!("{}", "info".cyan().bold()),
        };
        println!("{file}: {severity_str}: [{}] {}", describe_key(&diag.key), diag.message);
    }
}

/// Passage headers are long; show them as `passage 'Name'`.
pub fn describe_key(key: &str) -> String {
    if !key.starts_with("<tw-passagedata") {
        return key.to_string();
    }
    let name = key
        .split_once(" name=\"")
        .and_then(|(_, rest)| rest.split_once('"'))
        .map(|(name, _)| name);
    match name {
        Some(name) => format!("passage '{name}'"),
        None => key.to_string(),
    }
}

/// Watch the given paths and re-check on each save.
///
/// Debounces rapid events (e.g. editors that write in stages) with a 200ms window.
/// Ctrl+C exits cleanly.
pub fn watch_and_recheck(paths: &[PathBuf], config: &LintConfig, opts: &CheckOpts) -> Result<()> {
    if let Err(e) = run_check(paths, config, opts) {
        eprintln!("{} {}", "Check error:".red().bold(), e);
    }

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            let _ = tx.send(event);
        }
    })?;
    for path in paths {
        watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Cannot watch '{}'", path.display()))?;
    }

    println!("{} for changes (Ctrl+C to stop)", "Watching".cyan().bold());

    let mut last_check = Instant::now();
    let debounce = Duration::from_millis(200);

    loop {
        match rx.recv_timeout(Duration::from_secs(1)) {
            Ok(event) => {
                let relevant = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    && event.paths.iter().any(|p| config.accepts(p));

                if relevant && last_check.elapsed() > debounce {
                    // Small delay to let the editor finish writing
                    std::thread::sleep(Duration::from_millis(50));
                    log::debug!("change detected in {:?}", event.paths);

                    if let Err(e) = run_check(paths, config, opts) {
                        eprintln!("{} {}", "Check error:".red().bold(), e);
                    }
                    last_check = Instant::now();
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    Ok(())
}
