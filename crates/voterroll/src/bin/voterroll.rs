//! voterroll command-line entry point
//!
//! Run with: cargo run -p voterroll -- serve --config voterroll.json

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use voterroll::config::{load_config, validate_config, Config, LoggingConfig};
use voterroll::{Database, ImportService, SubprocessExtractor};

#[derive(Parser)]
#[command(name = "voterroll", version, about = "Voter-roll import pipeline")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file (overrides the configuration)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server with the background queue and recovery scan
    Serve {
        /// Listen address as host:port (overrides the configuration)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Put a job back into the queue regardless of its state
    ResetJob {
        /// Job id
        id: i64,
    },
    /// Drain the queue once in the foreground and exit
    Process,
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("invalid log filter")?;

    let fmt_layer = if logging.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let subscriber = tracing_subscriber::registry().with(fmt_layer).with(filter);

    tracing_log::LogTracer::init().context("failed to bridge log records")?;
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    Ok(())
}

fn load(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(database) = &cli.database {
        config.database_path = Some(database.clone());
    }
    Ok(config)
}

fn apply_bind(config: &mut Config, bind: &str) -> anyhow::Result<()> {
    let (host, port) = bind
        .rsplit_once(':')
        .with_context(|| format!("--bind expects host:port, got '{}'", bind))?;
    config.server.host = host.trim_matches(['[', ']']).to_string();
    config.server.port = port
        .parse()
        .with_context(|| format!("invalid port in --bind '{}'", bind))?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load(&cli)?;
    init_tracing(&config.logging)?;

    if let Command::Serve { bind: Some(bind) } = &cli.command {
        apply_bind(&mut config, bind)?;
    }
    validate_config(&config)?;

    let db_path = config.resolved_database_path();
    let db = Database::open(&db_path)
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    let extractor = Arc::new(SubprocessExtractor::from_config(&config.ocr));
    let service = ImportService::from_config(&config, db, extractor);

    match cli.command {
        Command::Serve { .. } => {
            tracing::info!(
                uploads = %config.upload_directory.display(),
                ocr = %config.ocr.program,
                "Starting voterroll server"
            );

            let recovery = service.recovery().clone();
            let scan = recovery.start();

            voterroll::server::serve(service, &config.server, shutdown_signal()).await?;

            recovery.stop();
            scan.await.context("recovery scan task failed")?;
            tracing::info!("Server stopped");
        }
        Command::ResetJob { id } => {
            let job = service.requeue_job(id)?;
            println!(
                "Job {} ({}) reset to {}; a running server or `voterroll process` will pick it up",
                job.id, job.file_name, job.status
            );
        }
        Command::Process => match service.processor().run_now().await {
            Some(report) => println!(
                "Processed queue: {} completed, {} failed, {} recovered",
                report.completed(),
                report.failed(),
                report.recovered
            ),
            None => println!("Queue processor already running"),
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::parse_from(["voterroll", "--database", "/tmp/v.db", "reset-job", "9"]);
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/v.db")));
        assert!(matches!(cli.command, Command::ResetJob { id: 9 }));

        let cli = Cli::parse_from(["voterroll", "serve", "--bind", "0.0.0.0:9000"]);
        assert!(matches!(cli.command, Command::Serve { bind: Some(_) }));
    }

    #[test]
    fn test_apply_bind() {
        let mut config = Config::default();
        apply_bind(&mut config, "0.0.0.0:9000").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);

        apply_bind(&mut config, "[::1]:8081").unwrap();
        assert_eq!(config.server.host, "::1");

        assert!(apply_bind(&mut config, "localhost").is_err());
        assert!(apply_bind(&mut config, "localhost:http").is_err());
    }
}
