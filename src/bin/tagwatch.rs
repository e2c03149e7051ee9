//! tagwatch daemon
//!
//! Reads newline-delimited detector payloads from stdin and tracks tag
//! presence. The subscribe transport is bridged externally, e.g.
//!
//! ```text
//! mosquitto_sub -h broker -t tags/detected | tagwatch --config tagwatch.json
//! ```

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tagwatch::{
    Config, EventProcessor, IngestSettings, LogNotifier, Notifier, PresenceMonitor, QueuedNotifier, SystemClock,
    TagRegistry, WebhookNotifier,
};

#[derive(Debug, Parser)]
#[command(name = "tagwatch", version, about = "Track RFID/BLE tag presence and notify a webhook on arrival/departure")]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, default_value = "tagwatch.json")]
    config: PathBuf,

    /// Tag snapshot file; overrides monitor.tags_path
    #[arg(short, long)]
    tags: Option<PathBuf>,

    /// Presence timeout in seconds; overrides monitor.timeout_sec
    #[arg(long)]
    timeout_sec: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log notifications instead of calling the webhook
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = Config::from_path(&cli.config)?;
    if let Some(tags) = cli.tags {
        config.monitor.tags_path = tags;
    }
    if let Some(timeout_sec) = cli.timeout_sec {
        config.monitor.timeout_sec = timeout_sec;
        config.monitor.sweep_interval_sec = config.monitor.sweep_interval_sec.map(|s| s.min(timeout_sec));
    }
    config.validate()?;

    let registry = TagRegistry::from_path(&config.monitor.tags_path)?;
    info!(
        count = registry.len(),
        tags = ?registry.ids().collect::<Vec<_>>(),
        "initialized tags"
    );

    let queued = if cli.dry_run {
        QueuedNotifier::new(
            LogNotifier::new(config.webhook.message_formats()?),
            config.ingest.delivery_queue_capacity,
        )?
    } else {
        config.webhook.require_credentials()?;
        let webhook = WebhookNotifier::new(&config.webhook)?;
        info!(url_format = %config.webhook.url_format, event = %config.webhook.event, "webhook configured");
        QueuedNotifier::new(webhook, config.ingest.delivery_queue_capacity)?
    };
    let queued = Arc::new(queued);
    let notifier: Arc<dyn Notifier> = queued.clone();

    let processor = EventProcessor::new(registry.into_shared(), notifier);
    let monitor = PresenceMonitor::start(processor, IngestSettings::from_config(&config), Arc::new(SystemClock))?;
    let ingest = monitor.handle();

    info!("reading detector payloads from stdin");
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(error) => {
                warn!(%error, "stdin read failed");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Err(error) = ingest.send(trimmed.as_bytes()) {
            warn!(%error, "ingest worker stopped, no longer reading stdin");
            break;
        }
    }

    // The worker owned the only other reference to the queue, so joining it
    // lets the delivery thread be drained before exit.
    let ingest_stats = monitor.shutdown();
    let delivery_stats = match Arc::try_unwrap(queued) {
        Ok(queued) => queued.shutdown(),
        Err(queued) => {
            warn!("delivery queue still shared, exiting without draining it");
            queued.stats()
        }
    };
    info!(
        messages = ingest_stats.messages_received,
        payload_errors = ingest_stats.payload_errors,
        dropped = ingest_stats.dropped_messages,
        sweeps = ingest_stats.sweeps,
        notifications = ingest_stats.notifications,
        delivered = delivery_stats.delivered,
        delivery_failures = delivery_stats.failed,
        delivery_dropped = delivery_stats.dropped,
        "shut down"
    );
    Ok(())
}
