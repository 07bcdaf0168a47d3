mod cli;
mod commands;
mod config;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args.
    let cli = Cli::parse();

    // 2. Load config, then merge CLI overrides.
    let loaded = config::load(&cli.config)?;
    let config_found = loaded.is_some();
    let mut cfg = loaded.unwrap_or_default();

    match &cli.command {
        Command::Proxy(policy) | Command::Report { policy, .. } => cfg.apply_overrides(policy),
        Command::Attribute(_) => {}
    }

    // 3. Init tracing-subscriber with JSON format. Subcommand output owns
    //    stdout, so logs go to stderr.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.logging.level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    if !config_found {
        warn!(
            path = %cli.config.display(),
            "configuration file not found; using defaults"
        );
    }

    info!(
        config_file = %cli.config.display(),
        version = env!("CARGO_PKG_VERSION"),
        "egress-warden starting"
    );

    // 4. Dispatch.
    match cli.command {
        Command::Proxy(_) => commands::proxy(&cfg, shutdown_signal()).await,
        Command::Report { decisions, .. } => {
            let path = decisions.unwrap_or_else(|| cfg.logging.decisions_path.clone());
            print_json(&commands::report(&cfg, &path)?)
        }
        Command::Attribute(args) => print_json(&commands::attribute(&cfg, &args)?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("received SIGINT (ctrl-c)"),
                    _ = sigterm.recv() => info!("received SIGTERM"),
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler; waiting for ctrl-c only");
                let _ = ctrl_c.await;
                info!("received SIGINT (ctrl-c)");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
        info!("received SIGINT (ctrl-c)");
    }
}
