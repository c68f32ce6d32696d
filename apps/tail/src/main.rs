//! CreatorGuard tail entry point.
//!
//! Connects to the dashboard event stream, registers the configured
//! subscriptions and logs what arrives until Ctrl-C.

mod config;
mod report;

use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use creatorguard_realtime::{ConnectionManager, ConnectionState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config comes first: it decides the default log level.
    let loaded = config::TailConfig::load();
    let default_level = match &loaded {
        Ok((c, _)) if c.debug => "debug",
        _ => "info",
    };

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting CreatorGuard tail");

    let config = match loaded {
        Ok((c, path)) => {
            info!(path = %path.display(), endpoint = %c.endpoint, "configuration loaded");
            c
        }
        Err(e) => {
            warn!(error = %e, "failed to load config, using defaults");
            config::TailConfig::default()
        }
    };

    let mut manager = ConnectionManager::new(config.client_options());
    let mut events = manager
        .take_events()
        .context("notification receiver already taken")?;

    for entry in &config.subscriptions {
        let id = entry.id.clone();
        manager.subscribe(entry.id.clone(), entry.to_config(), move |message| {
            info!(
                subscription = %id,
                msg_type = ?message.msg_type,
                payload = %message.payload,
                "event"
            );
        });
    }
    info!(count = config.subscriptions.len(), "subscriptions registered");

    manager.connect();

    let summary_period = Duration::from_millis(config.summary_interval_ms);
    let mut summary = tokio::time::interval(summary_period.max(Duration::from_secs(1)));
    summary.tick().await; // Skip immediate first tick.

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        while let Ok(event) = events.try_recv() {
            report::log_event(&event);
        }

        if manager.state() == ConnectionState::Failed {
            report::log_summary(&manager);
            let reason = manager
                .health()
                .last_error
                .unwrap_or_else(|| "unknown error".into());
            anyhow::bail!("event stream unavailable: {reason}");
        }

        tokio::select! {
            res = &mut shutdown => {
                res.context("failed to listen for Ctrl-C")?;
                info!("shutting down");
                manager.disconnect();
                break;
            }
            _ = summary.tick(), if !summary_period.is_zero() => report::log_summary(&manager),
            () = manager.step() => {}
        }
    }

    report::log_summary(&manager);
    Ok(())
}
