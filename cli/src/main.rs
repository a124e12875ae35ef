//! Relay host driver.
//!
//! Plays the part of the host process: it owns the privileged thread (this
//! one), ticks the roster once per frame and lets the roster's worker thread
//! publish to a logging transport. State comes from [`sim::SimWorld`].
//!
//! ```text
//! main() -> RelayContext + Roster -> spawn_worker()
//!              |
//!              v
//!      every frame: roster.tick()      (drain, reconcile, observed)
//!      until ctrl-c or [host] run_seconds
//! ```

mod sim;

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::time::{Instant, MissedTickBehavior};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use relay_config::{RelayConfig, config_path};
use relay_engine::{RelayContext, RelaySettings, Roster};

use crate::sim::{LogTransport, SimWorld};

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (log_file, init_warnings) = open_relay_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_relay_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in relay_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn relay_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: next to the config file, ~/.relay/logs/relay.log
    if let Some(path) = config_path()
        && let Some(config_dir) = path.parent()
    {
        candidates.push(config_dir.join("logs").join("relay.log"));
    }

    candidates.push(PathBuf::from(".relay").join("logs").join("relay.log"));

    candidates
}

fn load_settings() -> Result<RelaySettings> {
    let config = RelayConfig::load().context("failed to load relay config")?;
    RelaySettings::from_config(config.as_ref()).context("invalid relay config")
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let settings = load_settings()?;
    let host = settings.host.clone();
    tracing::info!(
        entities = host.entities,
        frame_ms = host.frame.as_millis(),
        mode = settings.publish.mode.as_str(),
        "starting relay"
    );

    // The current-thread runtime keeps every tick on this thread, which the
    // context binds as privileged.
    let world = Arc::new(SimWorld::new(host.entities));
    let transport = Arc::new(LogTransport::default());
    let ctx = RelayContext::with_system_clock(world, settings);
    let roster = Roster::new(ctx, transport.clone());

    roster.tick();
    let worker = roster
        .spawn_worker()
        .context("failed to spawn worker thread")?;

    let deadline = host.run_for.map(|run_for| Instant::now() + run_for);
    let mut frames = tokio::time::interval(host.frame);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = frames.tick() => {
                roster.tick();
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    tracing::info!("run time elapsed");
                    break;
                }
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::warn!("Failed to listen for ctrl-c: {e}");
                }
                tracing::info!("interrupted");
                break;
            }
        }
    }

    worker.shutdown();

    let (positions, speakers) = transport.counts();
    tracing::info!(
        records = roster.records().len(),
        positions,
        speakers,
        "relay stopped"
    );
    Ok(())
}
