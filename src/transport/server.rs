use std::sync::Arc;

use parking_lot::Mutex;

use super::channel::{Channel, Health};
use super::frame::{Frame, FrameKind};
use super::link::{Acceptor, ConnectionState};
use super::{Pump, TransportConfig};
use crate::error::AppError;
use crate::events::{LinkEmitter, LinkEvent};

struct ServerInner {
    acceptor: Option<Box<dyn Acceptor>>,
    peer_connected: bool,
    channel: Channel,
}

/// Server side of the link. Listens once started and serves one peer at a
/// time; further peers wait until the current one leaves.
pub struct ServerTransport {
    inner: Mutex<ServerInner>,
    emitter: Arc<dyn LinkEmitter>,
}

impl ServerTransport {
    pub fn new(emitter: Arc<dyn LinkEmitter>, config: &TransportConfig) -> Self {
        Self {
            inner: Mutex::new(ServerInner {
                acceptor: None,
                peer_connected: false,
                channel: Channel::new(config.send_slots, config.receive_slots),
            }),
            emitter,
        }
    }

    /// Begin accepting on an already-bound acceptor.
    pub fn start(&self, acceptor: Box<dyn Acceptor>) {
        self.stop();
        tracing::info!(address = %acceptor.describe(), "server started");
        self.inner.lock().acceptor = Some(acceptor);
    }

    /// Drop the current peer (if any) and stop accepting.
    pub fn stop(&self) {
        self.disconnect();
        if self.inner.lock().acceptor.take().is_some() {
            tracing::info!("server stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().acceptor.is_some()
    }

    pub fn state(&self) -> ConnectionState {
        if self.inner.lock().peer_connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Close the current peer connection. Fires `disconnecting` then
    /// `disconnected`; does nothing without a peer.
    pub fn disconnect(&self) -> bool {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            if !inner.peer_connected {
                return false;
            }
            events.push(LinkEvent::Disconnecting);
            inner.channel.detach();
            inner.peer_connected = false;
            events.push(LinkEvent::Disconnected);
        }
        self.emit_all(events);
        true
    }

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

    fn emit_all(&self, events: Vec<LinkEvent>) {
        for event in &events {
            self.emitter.emit(event);
        }
    }
}

impl Pump for ServerTransport {
    /// One host tick: accept a peer if none is connected, write one queued
    /// frame, collect arrivals and notice a peer that went away.
    fn pump(&self) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            if !inner.peer_connected {
                let accepted = match inner.acceptor.as_mut() {
                    Some(acceptor) => acceptor.poll_accept(),
                    None => Ok(None),
                };
                match accepted {
                    Ok(Some(link)) => {
                        inner.channel.reset_buffers();
                        inner.channel.attach(link);
                        inner.peer_connected = true;
                        events.push(LinkEvent::Connected);
                    }
                    Ok(None) => {}
                    Err(e) => events.push(LinkEvent::Error {
                        message: e.to_string(),
                    }),
                }
            }
            if inner.peer_connected {
                let sent = inner.channel.transmit_one(&mut events);
                let received = inner.channel.receive_available(&mut events);
                if sent == Health::Closed || received == Health::Closed {
                    inner.channel.detach();
                    inner.peer_connected = false;
                    events.push(LinkEvent::Disconnected);
                }
            }
        }
        self.emit_all(events);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::events::{self, RecordingEmitter};
    use crate::transport::link::{Connector, Incoming};
    use crate::transport::memory;

    #[test]
    fn accepts_one_peer_and_exchanges_frames() {
        let sink = Arc::new(RecordingEmitter::new());
        let server = ServerTransport::new(sink.clone(), &TransportConfig::default());
        let (connector, acceptor) = memory::listener();
        server.start(Box::new(acceptor));
        assert!(server.is_running());

        let mut first = connector.connect().unwrap();
        let mut second = connector.connect().unwrap();
        server.pump();
        assert_eq!(server.state(), ConnectionState::Connected);
        assert_eq!(sink.names(), vec![events::CONNECTED]);

        first
            .write(&Frame::new(FrameKind::PlainMessage, "hi").unwrap().encode())
            .unwrap();
        server
            .enqueue_send(FrameKind::ResponsePayload, "ack")
            .unwrap();
        server.pump();
        assert_eq!(server.dequeue_received().unwrap().payload(), "hi");
        assert!(matches!(first.read(), Incoming::Data(_)));
        assert_eq!(second.read(), Incoming::Idle);

        first.close();
        server.pump();
        assert_eq!(server.state(), ConnectionState::Disconnected);
        server.pump();
        assert_eq!(server.state(), ConnectionState::Connected);
        second
            .write(&Frame::new(FrameKind::PlainMessage, "me too").unwrap().encode())
            .unwrap();
        server.pump();
        assert_eq!(server.dequeue_received().unwrap().payload(), "me too");
    }

    #[test]
    fn stop_disconnects_peer_in_order() {
        let sink = Arc::new(RecordingEmitter::new());
        let server = ServerTransport::new(sink.clone(), &TransportConfig::default());
        let (connector, acceptor) = memory::listener();
        server.start(Box::new(acceptor));
        let _client = connector.connect().unwrap();
        server.pump();
        sink.take();

        server.stop();
        assert!(!server.is_running());
        assert_eq!(sink.names(), vec![events::DISCONNECTING, events::DISCONNECTED]);
        assert!(connector.connect().is_err());
    }
}
