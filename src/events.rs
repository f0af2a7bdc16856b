//! Named transport signals and the sink they are fired into.
//!
//! Signals fire synchronously from the transport (inside `connect`,
//! `disconnect` and the per-tick pump), so sinks must not block.

use parking_lot::Mutex;

use crate::transport::frame::FrameKind;

pub const CONNECTED: &str = "connected";
pub const FAILED_TO_CONNECT: &str = "failed-to-connect";
pub const DISCONNECTING: &str = "disconnecting";
pub const DISCONNECTED: &str = "disconnected";
pub const SENT: &str = "sent";
pub const RECEIVED: &str = "received";
pub const ERROR: &str = "error";

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    FailedToConnect { reason: String },
    Disconnecting,
    Disconnected,
    Sent { kind: FrameKind, message: String },
    Received { kind: FrameKind, message: String },
    Error { message: String },
}

impl LinkEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LinkEvent::Connected => CONNECTED,
            LinkEvent::FailedToConnect { .. } => FAILED_TO_CONNECT,
            LinkEvent::Disconnecting => DISCONNECTING,
            LinkEvent::Disconnected => DISCONNECTED,
            LinkEvent::Sent { .. } => SENT,
            LinkEvent::Received { .. } => RECEIVED,
            LinkEvent::Error { .. } => ERROR,
        }
    }
}

// ── LinkEmitter trait ────────────────────────────────────────────

/// Abstraction over signal delivery so the transport works without a host UI.
pub trait LinkEmitter: Send + Sync {
    fn emit(&self, event: &LinkEvent);
}

/// Forwards every signal to `tracing`.
pub struct TracingEmitter;

impl LinkEmitter for TracingEmitter {
    fn emit(&self, event: &LinkEvent) {
        match event {
            LinkEvent::Connected | LinkEvent::Disconnecting | LinkEvent::Disconnected => {
                tracing::info!(event = event.name(), "link state changed");
            }
            LinkEvent::FailedToConnect { reason } => {
                tracing::warn!(event = event.name(), %reason, "connect failed");
            }
            LinkEvent::Sent { kind, message } => {
                tracing::debug!(event = event.name(), ?kind, len = message.len(), "frame sent");
            }
            LinkEvent::Received { kind, message } => {
                tracing::debug!(event = event.name(), ?kind, len = message.len(), "frame received");
            }
            LinkEvent::Error { message } => {
                tracing::warn!(event = event.name(), %message, "link error");
            }
        }
    }
}

/// Discards every signal.
pub struct NoopEmitter;

impl LinkEmitter for NoopEmitter {
    fn emit(&self, _event: &LinkEvent) {}
}

/// Keeps every signal in order. Useful for hosts that poll, and for tests.
#[derive(Default)]
pub struct RecordingEmitter {
    events: Mutex<Vec<LinkEvent>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<LinkEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(LinkEvent::name).collect()
    }
}

impl LinkEmitter for RecordingEmitter {
    fn emit(&self, event: &LinkEvent) {
        self.events.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_emitter_keeps_order() {
        let sink = RecordingEmitter::new();
        sink.emit(&LinkEvent::Disconnecting);
        sink.emit(&LinkEvent::Disconnected);
        assert_eq!(sink.names(), vec![DISCONNECTING, DISCONNECTED]);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.names().is_empty());
    }

    #[test]
    fn event_names_are_distinct() {
        let names = [
            CONNECTED,
            FAILED_TO_CONNECT,
            DISCONNECTING,
            DISCONNECTED,
            SENT,
            RECEIVED,
            ERROR,
        ];
        let unique: std::collections::HashSet<_> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
    }
}
