mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use overlay_core::{run_session, Outbox, RemoteChannel, State};
use overlay_protocol::{
    decode_event, encode_call,
    protocol::{ChannelEvent, ClientCall},
};
use tokio::sync::{broadcast::error::TryRecvError, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EVENT_BUFFER: usize = 256;

/// Replays a JSON-lines log of channel events into a fresh replica and prints
/// the resulting state.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "replay.toml")]
    config: PathBuf,
    #[arg(long)]
    log_filter: Option<String>,
}

/// Logs every outbound call instead of sending it anywhere.
struct LoggingChannel;

#[async_trait]
impl RemoteChannel for LoggingChannel {
    async fn call(&self, call: ClientCall) -> Result<()> {
        let frame = encode_call(&call)?;
        info!(method = call.method(), %frame, "replay: outbound call");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = config::load_settings(&args.config)?;
    if let Some(filter) = args.log_filter {
        settings.log_filter = filter;
    }
    if let Some(events) = args.events {
        settings.events_path = Some(events);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log_filter))
        .with_writer(std::io::stderr)
        .init();

    let registry = Arc::new(
        settings
            .registry()
            .context("component registry could not be built")?,
    );
    let path = settings
        .events_path
        .context("no event log given; pass --events or set events_path")?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let events = parse_event_log(&raw);
    info!(events = events.len(), path = %path.display(), "replay: loaded event log");

    let state = State::new(registry);
    let mut domain_events = state.subscribe_events();
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let (_outbox, outbox_rx) = Outbox::channel();
    let session = tokio::spawn(run_session(state, rx, outbox_rx, Arc::new(LoggingChannel)));

    for event in events {
        if tx.send(event).await.is_err() {
            // The session stopped early; its result carries the reason.
            break;
        }
    }
    drop(tx);

    let state = session.await.context("replay session panicked")??;

    loop {
        match domain_events.try_recv() {
            Ok(event) => info!(?event, "replay: domain event"),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "replay: domain events overflowed the buffer");
            }
            Err(_) => break,
        }
    }

    println!("{}", serde_json::to_string_pretty(&state.dump())?);
    Ok(())
}

/// Decodes one event per non-blank line. Lines starting with `#` are comments;
/// undecodable lines are logged and skipped.
fn parse_event_log(raw: &str) -> Vec<ChannelEvent> {
    raw.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            match decode_event(line) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(line = index + 1, %err, "replay: skipped undecodable frame");
                    None
                }
            }
        })
        .collect()
}
