//! Symbol rotator - main entry point
//!
//! This binary provides two subcommands:
//! - watch: keep the symbol cache fresh and log every change to the list
//! - once: run a single refresh and print the filtered symbols

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "symbol-rotator")]
#[command(about = "Rate-limited, self-refreshing rotator symbol cache", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Keep refreshing the symbol list until Ctrl+C
    Watch {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/rotator.json")]
        config: String,
    },

    /// Fetch, filter and print the symbol list once
    Once {
        /// Path to configuration file
        #[arg(short, long, default_value = "configs/rotator.json")]
        config: String,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // logs/{command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Keep the HTTP stack quiet
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Watch { .. } => "watch",
        Commands::Once { .. } => "once",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Watch { config } => commands::watch::run(config),
        Commands::Once { config } => commands::once::run(config),
    }
}
