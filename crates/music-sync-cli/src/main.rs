mod commands;
mod logging;
mod progress;

use std::io::{self, Write};
use std::process;

use anyhow::Context;
use clap::Parser;
use colored::*;
use commands::{Cli, Commands};
use dotenv::dotenv;
use music_sync_core::config::load_configuration;
use music_sync_core::{FfmpegTool, Ledger, SyncConfig, SyncEngine};
use progress::CliReporter;
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let args = Cli::parse();
    let _guard = logging::init_logger(args.verbose);

    let config = match load_configuration(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let result = match args.command.unwrap_or(Commands::Sync) {
        Commands::Sync => run_sync(&config),
        Commands::Status => run_status(&config),
        Commands::History { limit, path } => run_history(&config, limit, path.as_deref()),
        Commands::Plugins => run_plugins(&config),
        Commands::CheckTools => run_check_tools(&config),
        Commands::PrintConfig => {
            println!("Configuration: {:#?}", config);
            Ok(())
        }
        Commands::ForgetFailures => run_forget_failures(&config),
        Commands::ResetLedger => run_reset_ledger(&config),
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

fn open_ledger(config: &SyncConfig) -> anyhow::Result<Ledger> {
    Ledger::open(&config.database_file)
        .with_context(|| format!("cannot open ledger {}", config.database_file))
}

fn run_sync(config: &SyncConfig) -> anyhow::Result<()> {
    let engine = SyncEngine::new(config.clone());
    let reporter = CliReporter::new();
    let report = engine.sync(&reporter)?;

    println!();
    info!(
        "{} files in {}",
        report.files_seen,
        format!("{:.2}s", report.duration.as_secs_f64()).green(),
    );
    info!(
        "{} copied, {} decrypted, {} unchanged, {} duplicates",
        format!("{}", report.copied).green(),
        format!("{}", report.decrypted).green(),
        format!("{}", report.skipped_unchanged).cyan(),
        format!("{}", report.duplicates).cyan(),
    );
    info!(
        "{} unsupported, {} failed, {} missing sources",
        format!("{}", report.unsupported).yellow(),
        format!("{}", report.failed).red(),
        format!("{}", report.missing_sources).red(),
    );

    Ok(())
}

fn run_status(config: &SyncConfig) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let summary = ledger.summary()?;

    println!(
        "{} ingested hashes, {} processing records",
        format!("{}", summary.ingested_hashes).green(),
        format!("{}", summary.processing_records).cyan(),
    );
    for (result, count) in &summary.by_result {
        let label = if music_sync_core::outcome::is_success_tag(result) {
            result.green()
        } else {
            result.red()
        };
        println!("  {:<40} {}", label, count);
    }
    Ok(())
}

fn run_history(config: &SyncConfig, limit: i64, path: Option<&str>) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let records = match path {
        Some(path) => ledger.records_for_path(path)?,
        None => ledger.recent_records(limit)?,
    };
    if records.is_empty() {
        println!("No processing records");
    }
    for record in records {
        println!(
            "{}  {:<28} {} (mtime {})",
            record.logged_at.dimmed(),
            record.result,
            record.original_path,
            record.mtime
        );
    }
    Ok(())
}

fn run_plugins(config: &SyncConfig) -> anyhow::Result<()> {
    let registry = SyncEngine::new(config.clone()).resolve_plugins();

    if registry.is_empty() {
        println!("No DRM plugins loaded");
    }
    for plugin in registry.plugins() {
        let extensions: Vec<&str> = plugin.extensions.iter().map(String::as_str).collect();
        println!(
            "{} {} → {}",
            plugin.name.green(),
            extensions.join(", "),
            plugin.executable.display()
        );
    }
    for name in registry.unresolved() {
        warn!("Plugin '{}' is enabled but no executable was found", name);
    }
    Ok(())
}

fn run_check_tools(config: &SyncConfig) -> anyhow::Result<()> {
    let tool = FfmpegTool::new(&config.ffmpeg_path, &config.ffprobe_path);
    let banners = tool
        .check_available()
        .context("ffmpeg/ffprobe check failed")?;
    for banner in banners {
        println!("{} {}", "✓".green(), banner);
    }
    Ok(())
}

fn run_forget_failures(config: &SyncConfig) -> anyhow::Result<()> {
    let ledger = open_ledger(config)?;
    let removed = ledger.forget_failures()?;
    println!("Removed {} failed records", removed);
    Ok(())
}

fn run_reset_ledger(config: &SyncConfig) -> anyhow::Result<()> {
    if !prompt_confirm(
        "Are you SURE you want to COMPLETELY RESET the ledger?",
        Some(false),
    )? {
        return Ok(());
    }
    let ledger = open_ledger(config)?;
    ledger.truncate_all()?;
    println!("All tables truncated");
    Ok(())
}

fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
