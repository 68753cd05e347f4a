//! modsync - Entry Point
//!
//! Deploys merged moderation configuration to remote moderation servers,
//! retries and queues deployments, and reconciles drift.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use chrono::Utc;
use colored::Colorize;
use tracing::{error, info};

use modsync::app::options::AppOptions;
use modsync::app::run::run;
use modsync::app::state::AppState;
use modsync::errors::EngineError;
use modsync::logs::{init_logging, LogOptions};
use modsync::models::drift::{DriftLogEntry, Severity};
use modsync::storage::layout::StorageLayout;
use modsync::storage::settings::Settings;
use modsync::utils::version_info;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let mut cli_args: HashMap<String, String> = HashMap::new();
    for arg in env::args().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("{}", e),
        }
        return ExitCode::SUCCESS;
    }

    let layout = match cli_args.get("data-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file
    let settings = match Settings::load(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "Error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        json_format: settings.log_json,
        to_file: settings.log_to_file,
        log_dir: layout.logs_dir().path().to_path_buf(),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout);

    if cli_args.contains_key("sweep") {
        return report(sweep_once(&options).await);
    }

    if let Some(site) = cli_args.get("check-drift") {
        let site_id = match site.parse::<u64>() {
            Ok(id) => id,
            Err(_) => {
                eprintln!("{} invalid site id '{}'", "Error".red().bold(), site);
                return ExitCode::FAILURE;
            }
        };
        return report(check_drift_once(&options, site_id).await);
    }

    info!("Running modsync {} with options: {:?}", version_info().version, options);
    match run(options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run the engine: {e}");
            ExitCode::FAILURE
        }
    }
}

fn report(result: Result<(), EngineError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn sweep_once(options: &AppOptions) -> Result<(), EngineError> {
    let state = AppState::init(options).await?;
    let report = state.queue.sweep(Utc::now()).await?;

    println!("{}", "Queue sweep".bold().cyan());
    println!("  examined:    {}", report.examined);
    println!("  claimed:     {}", report.claimed);
    println!("  completed:   {}", report.completed.to_string().green());
    println!("  rescheduled: {}", report.rescheduled.to_string().yellow());
    println!("  failed:      {}", report.failed.to_string().red());
    println!("  errored:     {}", report.errored.to_string().red());
    Ok(())
}

async fn check_drift_once(options: &AppOptions, site_id: u64) -> Result<(), EngineError> {
    let state = AppState::init(options).await?;
    let entry = state.reconciler.check_site(site_id).await?;
    print_drift(&entry);
    Ok(())
}

fn print_drift(entry: &DriftLogEntry) {
    let severity = match entry.severity {
        Severity::None => entry.severity.as_str().green(),
        Severity::Low | Severity::Medium => entry.severity.as_str().yellow(),
        Severity::High | Severity::Critical => entry.severity.as_str().red().bold(),
    };

    println!(
        "{} site {} on server {} (config v{})",
        "Drift check".bold().cyan(),
        entry.site_id,
        entry.server_id,
        entry.config_version
    );
    println!("  severity: {}", severity);
    for (name, matched) in [("nudenet", entry.nudenet_match), ("blip", entry.blip_match)] {
        let mark = if matched { "match".green() } else { "drift".red() };
        println!("  {}: {}", name.bold(), mark);
    }
    if entry.known_limitation {
        println!("  {}", "keyword endpoint does not implement writes".dimmed());
    }
    for diff in &entry.differences {
        println!("  - {:?} {}: {}", diff.kind, diff.path.bold(), diff.message.dimmed());
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(term), Ok(int)) => (term, int),
            _ => {
                error!("Failed to install signal handlers; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
