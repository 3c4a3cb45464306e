//! Seam between the replica and the remote channel.
//!
//! Inbound events arrive on an `mpsc` receiver and are applied strictly in
//! order. Outbound calls are queued through an [`Outbox`] without waiting and
//! forwarded by the same task that applies events.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use overlay_protocol::protocol::{ChannelEvent, ClientCall};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{error::StateError, state::State};

#[async_trait]
pub trait RemoteChannel: Send + Sync {
    async fn call(&self, call: ClientCall) -> Result<()>;
}

pub struct MissingRemoteChannel;

#[async_trait]
impl RemoteChannel for MissingRemoteChannel {
    async fn call(&self, call: ClientCall) -> Result<()> {
        Err(anyhow!(
            "remote channel is unavailable; dropped {} call",
            call.method()
        ))
    }
}

#[derive(Debug, Error)]
#[error("outbound channel closed; dropped {method} call")]
pub struct OutboxClosed {
    pub method: &'static str,
}

pub type OutboxReceiver = mpsc::UnboundedReceiver<ClientCall>;

/// Cloneable fire-and-forget handle for outbound calls.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<ClientCall>,
}

impl Outbox {
    pub fn channel() -> (Self, OutboxReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, call: ClientCall) -> Result<(), OutboxClosed> {
        let method = call.method();
        self.tx.send(call).map_err(|_| OutboxClosed { method })
    }
}

/// Drives `state` until `inbound` closes, then flushes any queued outbound
/// calls and hands the state back.
///
/// Precondition violations are dropped inside [`State::apply`]; a
/// configuration error stops the session and is returned. Failed outbound
/// calls are logged and otherwise ignored.
pub async fn run_session(
    mut state: State,
    mut inbound: mpsc::Receiver<ChannelEvent>,
    mut outbound: OutboxReceiver,
    channel: Arc<dyn RemoteChannel>,
) -> Result<State, StateError> {
    let mut outbound_open = true;
    let mut applied = 0_u64;

    loop {
        tokio::select! {
            event = inbound.recv() => {
                let Some(event) = event else {
                    break;
                };
                state.apply(event)?;
                applied += 1;
            }
            call = outbound.recv(), if outbound_open => {
                match call {
                    Some(call) => forward(channel.as_ref(), call).await,
                    None => outbound_open = false,
                }
            }
        }
    }

    while let Ok(call) = outbound.try_recv() {
        forward(channel.as_ref(), call).await;
    }

    info!(applied, "session: inbound channel closed");
    Ok(state)
}

async fn forward(channel: &dyn RemoteChannel, call: ClientCall) {
    let method = call.method();
    debug!(method, "session: forwarding outbound call");
    if let Err(err) = channel.call(call).await {
        warn!(method, "session: outbound call failed: {err:#}");
    }
}
