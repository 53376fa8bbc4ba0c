mod cli;
mod config;
mod error;

use std::process;
use std::sync::Arc;

use chat_relay::{BatchAccumulator, Dispatcher, PollLoop, spawn_flusher};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{
    cli::{Args, LogFormat},
    config::AppConfig,
    error::{CliError, Result},
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet, args.log_format)?;

    let config = AppConfig::load(&args)?;
    info!(
        platform = %config.platform,
        channel = %config.channel,
        transport = config.transport.name(),
        "Starting chat relay"
    );

    let source = config
        .platform
        .create_source(config.timing.poll.fetch_timeout)?;
    let transport = config.transport.build()?;

    let accumulator = Arc::new(BatchAccumulator::new(config.timing.backlog_warn_threshold));
    let dispatcher = Arc::new(Dispatcher::new(transport, config.platform.batch_style()));
    let cancel = CancellationToken::new();

    let flusher = spawn_flusher(
        accumulator.clone(),
        dispatcher,
        config.timing.flush_interval,
        cancel.clone(),
    );

    let mut poll_loop = PollLoop::new(
        source,
        config.channel.clone(),
        accumulator.clone(),
        config.timing.poll.clone(),
        config.timing.watchdog.clone(),
    );
    if let Some(policy) = config.identity_policy {
        poll_loop = poll_loop.with_identity_policy(policy);
    }
    let poller = tokio::spawn(poll_loop.run(cancel.clone()));

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
    cancel.cancel();

    for (name, handle) in [("poll loop", poller), ("flusher", flusher)] {
        if let Err(e) = handle.await {
            error!("{} task failed: {}", name, e);
        }
    }

    info!(
        relayed = accumulator.total_drained(),
        pending = accumulator.len(),
        "Chat relay stopped"
    );
    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, format: LogFormat) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(verbose))
            .try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };

    result.map_err(|e| CliError::Logging(e.to_string()))
}
