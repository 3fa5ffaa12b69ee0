use anyhow::{Context, Result};
use clap::Parser;
use cgroup_sentinel::ingress;
use cgroup_sentinel::settings::{AgentConfig, Cli};
use cgroup_sentinel::telemetry;
use cgroup_sentinel::SentinelEngine;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AgentConfig::from_cli(cli).context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if config.debug { "debug" } else { "info" })),
        )
        .init();

    if !is_root() {
        tracing::warn!("not running as root; some cgroup/procfs lookups may be unreadable");
    }

    telemetry::init_metrics().context("failed to initialize telemetry")?;

    let self_pid = std::process::id() as i32;
    let engine = SentinelEngine::start(config, self_pid).context("failed to start pipeline")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if let Some(event) = ingress::parse_line(&line) {
                            engine.submit(event);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "error reading ingress line");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received shutdown signal");
                break;
            }
        }
    }

    engine.shutdown().await;
    telemetry::shutdown_metrics();
    Ok(())
}

#[cfg(unix)]
fn is_root() -> bool {
    // SAFETY: geteuid takes no arguments and has no failure mode.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn is_root() -> bool {
    true
}
