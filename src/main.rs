//! M365 User Management Tool
//!
//! A terminal application that signs an administrator in to Microsoft 365,
//! reports user/group memberships from Microsoft Graph, and exports or
//! emails the report.

#![deny(clippy::all)]

mod app;
mod auth;
mod config;
mod console;
mod error;
mod graph;
mod present;
mod report;
mod settings;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use app::App;
use config::Config;
use console::{ListKind, ReportRequest};

/// Report Microsoft 365 user and group memberships.
#[derive(Parser, Debug)]
#[command(name = "m365report")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive console (default)
    Shell,

    /// Sign in, search once and print the report
    Report {
        /// User principal name to report memberships for
        #[arg(long, conflicts_with = "group", required_unless_present = "group")]
        user: Option<String>,

        /// Group display name to report members of
        #[arg(long)]
        group: Option<String>,

        /// Also save the report as CSV
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,

        /// Also email the report to this address
        #[arg(long, value_name = "ADDRESS")]
        mail_to: Option<String>,
    },

    /// Sign in and print all users or groups
    List {
        #[arg(value_enum)]
        kind: ListKind,
    },
}

fn main() -> ExitCode {
    // Load .env file (if present) before anything else
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    let args = Args::parse();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            eprintln!("\nPlease set the following environment variables:");
            eprintln!("  AZURE_CLIENT_ID=<your-azure-ad-client-id>");
            eprintln!("  AZURE_TENANT_ID=<your-tenant-id>");
            return ExitCode::FAILURE;
        }
    };

    init_logging(&args, &config);
    info!("Starting m365report v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args.command, &config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Option<Command>, config: &Config) -> anyhow::Result<()> {
    let mut app = App::new(config)?;

    match command.unwrap_or(Command::Shell) {
        Command::Shell => console::run(&mut app, &config.app.name).await,
        Command::Report {
            user,
            group,
            csv,
            mail_to,
        } => {
            let request = ReportRequest {
                user,
                group,
                csv,
                mail_to,
            };
            console::report_once(&mut app, request).await
        }
        Command::List { kind } => console::list_once(&mut app, kind).await,
    }
}

/// Initialize tracing with a terminal layer and, when enabled, a log file layer.
///
/// Terminal: --debug > --verbose > RUST_LOG > "warn". File: `logging.level`.
fn init_logging(args: &Args, config: &Config) {
    let terminal_filter = if args.debug {
        EnvFilter::new("debug,hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let log_file = if config.logging.file {
        match settings::open_log_file() {
            Ok(file) => Some(file),
            Err(e) => {
                eprintln!("Warning: Could not open log file: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    if let Some(file) = log_file {
        let file_filter = EnvFilter::try_new(&config.logging.level)
            .unwrap_or_else(|_| EnvFilter::new("info"));
        let file_layer = fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file));

        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .with(file_layer.with_filter(file_filter))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(terminal_layer.with_filter(terminal_filter))
            .init();
    }
}
