//! # Backstop CLI - mirroring that never deletes
//!
//! Command-line front end for the Backstop library.
//!
//! ## Usage
//! ```bash
//! # Mirror once
//! backstop -s /data/misc -b /backup/misc -t /backup/deleted sync
//!
//! # See what the next cycle would do
//! backstop -s /data/misc -b /backup/misc -t /backup/deleted plan
//!
//! # Save the roots to a config file, then mirror every hour until Ctrl-C
//! backstop -s /data/misc -b /backup/misc -t /backup/deleted init-config misc.json
//! backstop --config misc.json watch --interval 1h
//! ```

use anyhow::{anyhow, Context};
use backstop::{
    format_bytes, Action, BackstopError, Mirror, MirrorBuilder, MirrorConfig, Plan, ProgressInfo,
    SyncReport,
};
use clap::{Parser, Subcommand};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Backstop CLI - incremental mirroring with a tombstone area
#[derive(Parser)]
#[command(name = "backstop")]
#[command(version)]
#[command(about = "Mirror a directory; removed and overwritten files go to a tombstone area")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file (JSON); flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory being backed up
    #[arg(short, long, global = true)]
    source: Option<PathBuf>,

    /// Backup directory
    #[arg(short, long, global = true)]
    backup: Option<PathBuf>,

    /// Tombstone directory
    #[arg(short, long, global = true)]
    tombstones: Option<PathBuf>,

    /// Number of parallel workers
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    /// Ignore pattern (repeatable)
    #[arg(short, long, global = true)]
    ignore: Vec<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync cycle
    Sync {
        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },

    /// Show the actions the next cycle would take
    Plan,

    /// Run sync cycles periodically until interrupted
    Watch {
        /// Time between cycles, e.g. "30m" or "1h"
        #[arg(long)]
        interval: Option<String>,
    },

    /// Write a configuration file from the given flags
    InitConfig {
        /// Where to write the configuration
        path: PathBuf,

        /// Time between cycles for `watch`
        #[arg(long)]
        interval: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so that --json output stays parseable
    let filter = if cli.verbose {
        EnvFilter::new("backstop=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(cli) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            let message = match e.downcast_ref::<BackstopError>() {
                Some(err) => err.user_message(),
                None => format!("{:#}", e),
            };
            eprintln!("{}: {}", "Error".red().bold(), message);
            std::process::exit(1);
        }
    }
}

/// Main command runner; `Ok(false)` means the command ran but some files failed
fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Sync { quiet } => cmd_sync(&config, cli.json, quiet || cli.json),
        Commands::Plan => cmd_plan(&config, cli.json),
        Commands::Watch { interval } => cmd_watch(config, interval, cli.json),
        Commands::InitConfig { path, interval, force } => {
            cmd_init_config(config, path, interval, force)
        }
    }
}

/// Merge the config file (if any) with the command-line flags
fn resolve_config(cli: &Cli) -> anyhow::Result<MirrorConfig> {
    let mut config = match &cli.config {
        Some(path) => MirrorConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => {
            let source = cli.source.clone().ok_or_else(|| missing_flag("--source"))?;
            let backup = cli.backup.clone().ok_or_else(|| missing_flag("--backup"))?;
            let tombstones = cli.tombstones.clone().ok_or_else(|| missing_flag("--tombstones"))?;
            MirrorConfig::new(source, backup, tombstones)
        }
    };

    if let Some(source) = &cli.source {
        config.source_root = source.clone();
    }
    if let Some(backup) = &cli.backup {
        config.backup_root = backup.clone();
    }
    if let Some(tombstones) = &cli.tombstones {
        config.tombstone_root = tombstones.clone();
    }
    if let Some(jobs) = cli.jobs {
        config.parallel_workers = jobs;
    }
    config.ignore_patterns.extend(cli.ignore.iter().cloned());

    config.validate()?;
    Ok(config)
}

fn missing_flag(flag: &str) -> anyhow::Error {
    anyhow!("{} is required unless --config is given", flag)
}

/// Run one cycle and print its report
fn cmd_sync(config: &MirrorConfig, json: bool, hide_progress: bool) -> anyhow::Result<bool> {
    let progress = if hide_progress {
        None
    } else {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map_err(|e| anyhow!("invalid progress template: {}", e))?
                .progress_chars("#>-"),
        );
        Some(pb)
    };

    let mut builder = MirrorBuilder::new()
        .parallel_workers(config.parallel_workers)
        .ignore_patterns(config.ignore_patterns.clone())
        .preserve_mtime(config.preserve_mtime);
    if let Some(pb) = &progress {
        let pb = pb.clone();
        builder = builder.progress_callback(Arc::new(move |info: ProgressInfo| {
            if let Some(total) = info.total {
                pb.set_length(total as u64);
            }
            pb.set_position(info.processed as u64);
            if let Some(item) = info.current_item {
                pb.set_message(item);
            }
        }));
    }
    let mirror = builder.build(
        config.source_root.clone(),
        config.backup_root.clone(),
        config.tombstone_root.clone(),
    );

    let result = mirror.sync();
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.is_clean())
}

/// Print the plan of the next cycle
fn cmd_plan(config: &MirrorConfig, json: bool) -> anyhow::Result<bool> {
    let mirror = Mirror::from_config(config)?;
    let plan = mirror.plan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(true);
    }

    if plan.is_empty() {
        println!("{} Backup is up to date", "✓".green().bold());
        return Ok(true);
    }

    for action in &plan {
        print_action(action);
    }
    print_plan_summary(&plan);
    Ok(true)
}

/// Run cycles every interval until Ctrl-C
fn cmd_watch(
    mut config: MirrorConfig,
    interval: Option<String>,
    json: bool,
) -> anyhow::Result<bool> {
    if let Some(interval) = interval {
        config.interval = interval;
    }
    let interval = config.interval()?;
    let mirror = Arc::new(Mirror::from_config(&config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    if !json {
        println!(
            "{} Mirroring {} every {} (Ctrl-C to stop)",
            "▶".blue().bold(),
            config.source_root.display().to_string().cyan(),
            format_duration(interval).to_string().cyan()
        );
    }

    let cycles = runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });

        backstop::scheduler::run_periodic(mirror, interval, shutdown_rx, |outcome| match outcome {
            Ok(report) if json => match serde_json::to_string(&report) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("{}: {}", "Error".red().bold(), e),
            },
            Ok(report) => {
                let stamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
                print!("[{}] ", stamp.dimmed());
                print_report(&report);
            }
            Err(e) => eprintln!("{}: {}", "Cycle failed".red().bold(), e.user_message()),
        })
        .await
    });

    if !json {
        println!("{} Stopped after {} cycles", "■".blue().bold(), cycles);
    }
    Ok(true)
}

/// Write the resolved configuration to a file
fn cmd_init_config(
    mut config: MirrorConfig,
    path: PathBuf,
    interval: Option<String>,
    force: bool,
) -> anyhow::Result<bool> {
    if path.exists() && !force {
        return Err(anyhow!("{} already exists. Use --force to overwrite.", path.display()));
    }
    if let Some(interval) = interval {
        config.interval = interval;
    }
    config.save(&path)?;

    println!("{} Wrote {}", "✓".green().bold(), path.display().to_string().cyan());
    println!("  Source: {}", config.source_root.display().to_string().cyan());
    println!("  Backup: {}", config.backup_root.display().to_string().cyan());
    println!("  Tombstones: {}", config.tombstone_root.display().to_string().cyan());
    println!("  Interval: {}", config.interval.cyan());
    Ok(true)
}

fn print_report(report: &SyncReport) {
    let mark = if report.is_clean() { "✓".green().bold() } else { "!".yellow().bold() };
    println!(
        "{} Synced {} files in {}: {} copied, {} replaced, {} tombstoned ({})",
        mark,
        report.source_files,
        format_duration(Duration::from_millis(report.duration_ms)),
        report.copied.to_string().green(),
        report.replaced.to_string().yellow(),
        report.tombstoned.to_string().red(),
        format_bytes(report.bytes_copied)
    );

    if !report.errors.is_empty() {
        println!("  {} files failed:", report.errors.len().to_string().red().bold());
        for error in &report.errors {
            println!("    {} {}", "✗".red(), error);
        }
    }
}

fn print_action(action: &Action) {
    let path = action.path().display().to_string();
    match action {
        Action::Copy { .. } => println!("  {} {}", "+".green().bold(), path.green()),
        Action::Replace { .. } => println!("  {} {}", "~".yellow().bold(), path.yellow()),
        Action::Tombstone { .. } => println!("  {} {}", "-".red().bold(), path.red()),
    }
}

fn print_plan_summary(plan: &Plan) {
    let counts = plan.counts();
    println!(
        "\n{} actions: {} to copy, {} to replace, {} to tombstone",
        plan.len().to_string().bold(),
        counts.copies.to_string().green(),
        counts.replaces.to_string().yellow(),
        counts.tombstones.to_string().red()
    );
}
