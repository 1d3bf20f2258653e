/*!
 * Duplex CLI - Command Line Interface
 *
 * Version: 0.1.0
 * Author: Shane Wall <shaneawall@gmail.com>
 */

use clap::{Parser, Subcommand, ValueEnum};
use duplex::{
    adapters::TcpConnector,
    config::{BackendKind, DuplexConfig, LogLevel},
    error::{DuplexError, Result, EXIT_SUCCESS},
    logging,
};
use duplex_core_failover::{
    ConnectionFactory, ConnectionHandle, Connector, FailoverError, ManagerConfig, RoleGuard, Side,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "duplex")]
#[command(version, about = "Primary/replica connection manager with automatic failover", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides the configuration file)
    #[arg(long = "log-level", value_enum, global = true)]
    log_level: Option<LogLevelArg>,

    /// Verbose logging (shorthand for --log-level debug)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration and print the effective settings
    Check,

    /// Connect to each configured endpoint once and report the result
    Probe,

    /// Run the manager and print its status until interrupted
    Watch {
        /// Status print interval in milliseconds
        #[arg(long = "interval-ms", default_value_t = 5000)]
        interval_ms: u64,

        /// Print one status snapshot and exit
        #[arg(long)]
        once: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(arg: LogLevelArg) -> Self {
        match arg {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

#[tokio::main]
async fn main() {
    let code = match run().await {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .ok_or_else(|| DuplexError::Config("--config <FILE> is required".to_string()))?;
    let config = DuplexConfig::from_file(&config_path)?;

    let mut log_config = config.logging.clone();
    if let Some(level) = cli.log_level {
        log_config.level = level.into();
    }
    if let Err(e) = logging::init_logging(&log_config, cli.verbose) {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let manager = config.validate()?;

    match cli.command {
        Commands::Check => check(&config, &manager),
        command => match config.backend {
            BackendKind::Tcp => execute(TcpConnector::new(), command, manager).await,
            #[cfg(feature = "postgres")]
            BackendKind::Postgres => {
                execute(duplex::adapters::PostgresConnector::new(), command, manager).await
            }
            #[cfg(not(feature = "postgres"))]
            BackendKind::Postgres => Err(DuplexError::Backend("postgres".to_string())),
        },
    }
}

fn check(config: &DuplexConfig, manager: &ManagerConfig) -> Result<()> {
    print!("{}", config.to_redacted_toml()?);
    println!();
    println!(
        "Configuration is valid: backend={}, replica={}, auto_failover={}",
        config.backend,
        manager.replica_enabled(),
        manager.policy.auto_failover
    );
    Ok(())
}

async fn execute<C: Connector>(
    connector: C,
    command: Commands,
    config: ManagerConfig,
) -> Result<()> {
    match command {
        Commands::Check => Ok(()),
        Commands::Probe => probe(connector, &config).await,
        Commands::Watch { interval_ms, once } => {
            watch(connector, config, Duration::from_millis(interval_ms), once).await
        }
    }
}

async fn probe<C: Connector>(connector: C, config: &ManagerConfig) -> Result<()> {
    let factory = ConnectionFactory::new(connector);
    let mut first_failure = None;

    for side in [Side::Primary, Side::Replica] {
        let Some(endpoint) = config.endpoint(side) else {
            continue;
        };

        let started = Instant::now();
        match factory.attempt(endpoint).await {
            Ok(handle) => {
                println!(
                    "{:<8} {:<30} ok      {} ms",
                    side,
                    endpoint.label(),
                    started.elapsed().as_millis()
                );
                if let Err(e) = handle.close().await {
                    warn!(%side, error = %e, "Failed to close probe connection");
                }
            }
            Err(e) => {
                println!("{:<8} {:<30} FAILED  {}", side, endpoint.label(), e);
                if first_failure.is_none() {
                    first_failure = Some(FailoverError::ProbeFailed {
                        side,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    match first_failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

async fn watch<C: Connector>(
    connector: C,
    config: ManagerConfig,
    interval: Duration,
    once: bool,
) -> Result<()> {
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
        });
    }

    let guard = RoleGuard::new(connector, config);
    guard.connect(&shutdown).await?;

    loop {
        let status = guard.status().await;
        let json = serde_json::to_string_pretty(&status).map_err(std::io::Error::other)?;
        println!("{}", json);

        if once {
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!(summary = %guard.metrics().summary(), "Stopping");
    guard.close().await?;
    Ok(())
}
