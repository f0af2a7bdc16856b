//! Ring-buffered framed link between the assistant (client role) and the
//! editor-side peer (server role).
//!
//! Frames go through a fixed send queue and a fixed receive buffer. A pump
//! called once per scheduler tick writes at most one queued frame and moves
//! everything the link delivered into the receive buffer.

mod channel;
pub mod client;
pub mod frame;
pub mod link;
pub mod memory;
pub mod ring;
pub mod server;
pub mod tcp;

use std::sync::Arc;
use std::time::Duration;

pub use channel::{RECEIVE_BUFFER_SLOTS, SEND_QUEUE_SLOTS};
pub use client::ClientTransport;
pub use frame::{Frame, FrameKind};
pub use link::ConnectionState;
pub use server::ServerTransport;

use crate::settings::LinkSettings;
use crate::util::CancelToken;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub send_slots: usize,
    pub receive_slots: usize,
    pub connect_poll: Duration,
    pub connect_timeout: Option<Duration>,
    pub auto_reconnect: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::from_settings(&LinkSettings::default())
    }
}

impl TransportConfig {
    pub fn from_settings(link: &LinkSettings) -> Self {
        Self {
            send_slots: SEND_QUEUE_SLOTS,
            receive_slots: RECEIVE_BUFFER_SLOTS,
            connect_poll: Duration::from_millis(link.connect_poll_ms.max(1)),
            connect_timeout: link.connect_timeout_ms.map(Duration::from_millis),
            auto_reconnect: link.auto_reconnect,
        }
    }
}

/// Anything with a per-tick pump.
pub trait Pump: Send + Sync {
    fn pump(&self);
}

/// Drive `transport.pump()` every `tick` until `cancel` fires.
pub fn spawn_pump<T: Pump + 'static>(
    transport: Arc<T>,
    tick: Duration,
    cancel: CancelToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        while !cancel.is_cancelled() {
            interval.tick().await;
            transport.pump();
        }
    })
}
