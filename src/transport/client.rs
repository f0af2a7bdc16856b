use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::channel::{Channel, Health};
use super::frame::{Frame, FrameKind};
use super::link::{ConnectionState, Connector, LinkPoll};
use super::{Pump, TransportConfig};
use crate::error::AppError;
use crate::events::{LinkEmitter, LinkEvent};
use crate::util::CancelToken;

struct ClientInner {
    state: ConnectionState,
    channel: Channel,
    /// Bumped every time a live or pending connection goes away.
    disconnects: u64,
    /// Queued right after every successful connect.
    greeting: Option<Frame>,
    attempt_started: Option<Instant>,
    /// When the last attempt failed. The pump waits `connect_poll` after it.
    last_failure: Option<Instant>,
}

/// Client side of the link. One live connection at most.
pub struct ClientTransport {
    inner: Mutex<ClientInner>,
    connector: Arc<dyn Connector>,
    emitter: Arc<dyn LinkEmitter>,
    config: TransportConfig,
}

impl ClientTransport {
    pub fn new(
        connector: Arc<dyn Connector>,
        emitter: Arc<dyn LinkEmitter>,
        config: TransportConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(ClientInner {
                state: ConnectionState::Disconnected,
                channel: Channel::new(config.send_slots, config.receive_slots),
                disconnects: 0,
                greeting: None,
                attempt_started: None,
                last_failure: None,
            }),
            connector,
            emitter,
            config,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn peer(&self) -> String {
        self.connector.describe()
    }

    /// Number of connections lost or closed so far. A waiter compares this
    /// before and after to notice a disconnect in between.
    pub fn disconnect_count(&self) -> u64 {
        self.inner.lock().disconnects
    }

    pub fn set_greeting(&self, frame: Option<Frame>) {
        self.inner.lock().greeting = frame;
    }

    /// Queue a frame for the pump. Rejected frames leave the queue untouched.
    pub fn enqueue_send(&self, kind: FrameKind, payload: impl Into<String>) -> Result<(), AppError> {
        let frame = Frame::new(kind, payload)?;
        self.inner.lock().channel.enqueue_send(frame)
    }

    pub fn pending_sends(&self) -> usize {
        self.inner.lock().channel.pending_sends()
    }

    pub fn dequeue_received(&self) -> Option<Frame> {
        self.inner.lock().channel.dequeue_received()
    }

    pub fn clear_received(&self) {
        self.inner.lock().channel.clear_received();
    }

    /// Connect and wait until the attempt settles.
    ///
    /// Does nothing while already connected or connecting and returns the
    /// current state. Otherwise stale resources are dropped, both buffers are
    /// reset and the attempt is polled every `connect_poll` until it connects,
    /// fails, times out (when configured) or `cancel` fires.
    pub async fn connect(&self, cancel: &CancelToken) -> ConnectionState {
        let mut events = Vec::new();
        let (started, epoch) = {
            let mut inner = self.inner.lock();
            if inner.state != ConnectionState::Disconnected {
                return inner.state;
            }
            inner.channel.reset_buffers();
            (self.begin_attempt(&mut inner, &mut events), inner.disconnects)
        };
        self.emit_all(events);
        if !started {
            return ConnectionState::Disconnected;
        }
        tracing::debug!(peer = %self.connector.describe(), "connecting");

        loop {
            let mut events = Vec::new();
            let state = {
                let mut inner = self.inner.lock();
                if inner.disconnects != epoch {
                    return inner.state;
                }
                if cancel.is_cancelled() && inner.state == ConnectionState::Connecting {
                    Self::fail_attempt(&mut inner, "connect cancelled".into(), &mut events);
                    ConnectionState::Disconnected
                } else {
                    self.poll_attempt(&mut inner, &mut events)
                }
            };
            self.emit_all(events);
            if state != ConnectionState::Connecting {
                return state;
            }
            tokio::time::sleep(self.config.connect_poll).await;
        }
    }

    /// Tear the connection down. Fires `disconnecting` then `disconnected`;
    /// does nothing when already disconnected.
    pub fn disconnect(&self) -> bool {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Disconnected {
                return false;
            }
            events.push(LinkEvent::Disconnecting);
            inner.channel.detach();
            inner.state = ConnectionState::Disconnected;
            inner.attempt_started = None;
            inner.disconnects += 1;
            events.push(LinkEvent::Disconnected);
        }
        self.emit_all(events);
        true
    }

    fn begin_attempt(&self, inner: &mut ClientInner, events: &mut Vec<LinkEvent>) -> bool {
        inner.channel.detach();
        match self.connector.connect() {
            Ok(link) => {
                inner.channel.attach(link);
                inner.state = ConnectionState::Connecting;
                inner.attempt_started = Some(Instant::now());
                true
            }
            Err(e) => {
                inner.state = ConnectionState::Disconnected;
                inner.last_failure = Some(Instant::now());
                events.push(LinkEvent::FailedToConnect {
                    reason: e.to_string(),
                });
                false
            }
        }
    }

    fn poll_attempt(&self, inner: &mut ClientInner, events: &mut Vec<LinkEvent>) -> ConnectionState {
        if inner.state != ConnectionState::Connecting {
            return inner.state;
        }
        let poll = inner
            .channel
            .link_mut()
            .map_or_else(|| LinkPoll::Failed("no link".into()), |link| link.poll_state());
        match poll {
            LinkPoll::Connected => {
                inner.state = ConnectionState::Connected;
                inner.attempt_started = None;
                inner.last_failure = None;
                events.push(LinkEvent::Connected);
                if let Some(greeting) = inner.greeting.clone() {
                    if let Err(e) = inner.channel.enqueue_send(greeting) {
                        events.push(LinkEvent::Error {
                            message: e.to_string(),
                        });
                    }
                }
            }
            LinkPoll::Failed(reason) => Self::fail_attempt(inner, reason, events),
            LinkPoll::Connecting => {
                let expired = match (self.config.connect_timeout, inner.attempt_started) {
                    (Some(limit), Some(started)) => started.elapsed() >= limit,
                    _ => false,
                };
                if expired {
                    Self::fail_attempt(inner, "connect timed out".into(), events);
                }
            }
        }
        inner.state
    }

    fn fail_attempt(inner: &mut ClientInner, reason: String, events: &mut Vec<LinkEvent>) {
        inner.channel.detach();
        inner.state = ConnectionState::Disconnected;
        inner.attempt_started = None;
        inner.last_failure = Some(Instant::now());
        inner.disconnects += 1;
        events.push(LinkEvent::FailedToConnect { reason });
    }

    fn retry_due(&self, inner: &ClientInner) -> bool {
        !matches!(inner.last_failure, Some(at) if at.elapsed() < self.config.connect_poll)
    }

    fn emit_all(&self, events: Vec<LinkEvent>) {
        for event in &events {
            self.emitter.emit(event);
        }
    }
}

impl Pump for ClientTransport {
    /// One scheduler tick: reconnect if a frame is waiting (at most once per
    /// `connect_poll` after a failure), write one frame,
    /// then collect whatever arrived. A closed link fires `disconnected`.
    fn pump(&self) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            if inner.state == ConnectionState::Disconnected
                && self.config.auto_reconnect
                && inner.channel.pending_sends() > 0
                && self.retry_due(&inner)
            {
                tracing::debug!("frame pending while disconnected, reconnecting");
                self.begin_attempt(&mut inner, &mut events);
            }
            if inner.state == ConnectionState::Connecting {
                self.poll_attempt(&mut inner, &mut events);
            }
            if inner.state == ConnectionState::Connected {
                let sent = inner.channel.transmit_one(&mut events);
                let received = inner.channel.receive_available(&mut events);
                if sent == Health::Closed || received == Health::Closed {
                    inner.channel.detach();
                    inner.state = ConnectionState::Disconnected;
                    inner.disconnects += 1;
                    events.push(LinkEvent::Disconnected);
                }
            }
        }
        self.emit_all(events);
    }
}
