//! TaskQ subscriber binary.
//!
//! Loads the configuration, binds the pipeline and consumes the queue until
//! interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use taskq::config::{LoggingOptions, SubscriberConfig};
use taskq::logging::init_logging;
use taskq::{RedisQueue, StageRegistry, SubscriberRuntime, constants};

#[derive(Parser, Debug)]
#[command(name = "taskq-subscriber")]
#[command(about = constants::APPLICATION_DESCRIPTION, long_about = None)]
#[command(disable_version_flag = true)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "subscriber.conf")]
    config: PathBuf,

    /// Queue address (host:port), overrides the configuration file
    #[arg(short = 'a', long)]
    redis_address: Option<String>,

    /// Debug logging and periodic metrics reports
    #[arg(short, long)]
    verbose: bool,

    /// Print version information and exit
    #[arg(short = 'V', long)]
    version: bool,
}

fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", constants::APPLICATION_DESCRIPTION);
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(cli)) {
        tracing::error!(error = %format!("{:#}", e), "Fatal error, exiting");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Logging options live in the configuration file; fall back to stdout
    // only so a broken file can still be reported.
    let loaded = SubscriberConfig::from_file(&cli.config);
    let logging = match &loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingOptions::default(),
    };
    let _guard = init_logging(&logging, cli.verbose).context("failed to initialize logging")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "Starting {}",
        constants::APPLICATION_DESCRIPTION
    );

    let mut config = loaded.context("failed to load configuration")?;
    config.apply_queue_defaults(cli.redis_address.clone());

    let address = config
        .queue
        .resolve_address()
        .await
        .context("invalid queue address")?;
    let channel = config.queue.channel().to_string();
    let queue = Arc::new(RedisQueue::new(address, channel.as_str())?);

    let registry = StageRegistry::with_builtins();
    tracing::debug!(kinds = ?registry.kinds(), "Stage kinds available");
    let subscriber = SubscriberRuntime::new(&config, &registry, queue)
        .context("failed to load pipeline")?;

    tracing::info!(%channel, %address, "Subscribed to queue");

    let _reporter = cli.verbose.then(|| subscriber.start_reporter());

    subscriber.run_until(shutdown_signal()).await?;

    let snapshot = subscriber.metrics().snapshot();
    tracing::info!(%snapshot, "Subscriber stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::warn!("Received SIGINT, shutting down"),
        _ = terminate => tracing::warn!("Received SIGTERM, shutting down"),
    }
}
