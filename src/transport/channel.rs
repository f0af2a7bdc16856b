use super::frame::{Frame, FrameDecoder, FrameKind};
use super::link::{Incoming, Link};
use super::ring::RingBuffer;
use crate::error::AppError;
use crate::events::LinkEvent;

/// Slots in the outgoing queue (one is always kept free).
pub const SEND_QUEUE_SLOTS: usize = 8;
/// Slots in the incoming buffer (one is always kept free).
pub const RECEIVE_BUFFER_SLOTS: usize = 64;

const MAX_READS_PER_PUMP: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Health {
    Open,
    Closed,
}

/// Send queue, receive buffer and the link they drain into / fill from.
///
/// Callers hold the owning transport's lock for every call, so head/tail
/// updates never interleave.
pub(crate) struct Channel {
    link: Option<Box<dyn Link>>,
    send: RingBuffer<Frame>,
    receive: RingBuffer<Frame>,
    decoder: FrameDecoder,
}

impl Channel {
    pub fn new(send_slots: usize, receive_slots: usize) -> Self {
        Self {
            link: None,
            send: RingBuffer::with_slots(send_slots),
            receive: RingBuffer::with_slots(receive_slots),
            decoder: FrameDecoder::new(),
        }
    }

    pub fn reset_buffers(&mut self) {
        self.send.clear();
        self.receive.clear();
        self.decoder = FrameDecoder::new();
    }

    pub fn attach(&mut self, link: Box<dyn Link>) {
        self.detach();
        self.link = Some(link);
    }

    /// Close and drop the link. Returns whether one was attached.
    pub fn detach(&mut self) -> bool {
        self.decoder = FrameDecoder::new();
        match self.link.take() {
            Some(mut link) => {
                link.close();
                true
            }
            None => false,
        }
    }

    pub fn link_mut(&mut self) -> Option<&mut Box<dyn Link>> {
        self.link.as_mut()
    }

    pub fn enqueue_send(&mut self, frame: Frame) -> Result<(), AppError> {
        self.send.push(frame).map_err(|_| AppError::BufferFull {
            buffer: "sending".into(),
        })
    }

    pub fn pending_sends(&self) -> usize {
        self.send.len()
    }

    pub fn dequeue_received(&mut self) -> Option<Frame> {
        self.receive.pop()
    }

    pub fn clear_received(&mut self) {
        self.receive.clear();
    }

    /// Write at most one pending frame to the link.
    pub fn transmit_one(&mut self, events: &mut Vec<LinkEvent>) -> Health {
        let Some(link) = self.link.as_mut() else {
            return Health::Closed;
        };
        let Some(frame) = self.send.pop() else {
            return Health::Open;
        };
        if frame.kind() == FrameKind::Void {
            return Health::Open;
        }
        match link.write(&frame.encode()) {
            Ok(()) => {
                events.push(LinkEvent::Sent {
                    kind: frame.kind(),
                    message: frame.into_payload(),
                });
                Health::Open
            }
            Err(e) => {
                tracing::warn!(kind = ?frame.kind(), error = %e, "dropping frame after failed write");
                events.push(LinkEvent::Error {
                    message: e.to_string(),
                });
                Health::Closed
            }
        }
    }

    /// Read whatever the link has, decode it and fill the receive buffer.
    pub fn receive_available(&mut self, events: &mut Vec<LinkEvent>) -> Health {
        let Some(link) = self.link.as_mut() else {
            return Health::Closed;
        };
        let mut health = Health::Open;
        for _ in 0..MAX_READS_PER_PUMP {
            match link.read() {
                Incoming::Data(bytes) => self.decoder.push(&bytes),
                Incoming::Idle => break,
                Incoming::Closed => {
                    health = Health::Closed;
                    break;
                }
            }
        }

        while let Some(decoded) = self.decoder.next_frame() {
            match decoded {
                Ok(frame) if frame.kind() == FrameKind::Void => {}
                Ok(frame) => self.enqueue_received(frame, events),
                Err(e) => tracing::warn!(error = %e, "dropping malformed frame"),
            }
        }
        health
    }

    fn enqueue_received(&mut self, frame: Frame, events: &mut Vec<LinkEvent>) {
        let kind = frame.kind();
        let message = frame.payload().to_string();
        if self.receive.push(frame).is_err() {
            tracing::warn!(?kind, "receive buffer full, frame dropped");
            events.push(LinkEvent::Error {
                message: AppError::BufferFull {
                    buffer: "receiving".into(),
                }
                .to_string(),
            });
            return;
        }
        events.push(LinkEvent::Received { kind, message });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::transport::memory;

    fn frame(kind: FrameKind, text: &str) -> Frame {
        Frame::new(kind, text).unwrap()
    }

    #[test]
    fn full_send_queue_rejects_without_side_effect() {
        let mut channel = Channel::new(SEND_QUEUE_SLOTS, RECEIVE_BUFFER_SLOTS);
        for i in 0..SEND_QUEUE_SLOTS - 1 {
            channel
                .enqueue_send(frame(FrameKind::PlainMessage, &i.to_string()))
                .unwrap();
        }
        assert!(matches!(
            channel.enqueue_send(frame(FrameKind::PlainMessage, "overflow")),
            Err(AppError::BufferFull { .. })
        ));
        assert_eq!(channel.pending_sends(), SEND_QUEUE_SLOTS - 1);

        let (client, mut peer) = memory::pair();
        channel.attach(Box::new(client));
        let mut events = Vec::new();
        assert_eq!(channel.transmit_one(&mut events), Health::Open);
        assert_eq!(
            events,
            vec![LinkEvent::Sent {
                kind: FrameKind::PlainMessage,
                message: "0".into()
            }]
        );
        assert!(channel
            .enqueue_send(frame(FrameKind::PlainMessage, "fits"))
            .is_ok());
        assert!(channel
            .enqueue_send(frame(FrameKind::PlainMessage, "again"))
            .is_err());
        assert!(matches!(peer.read(), Incoming::Data(_)));
    }

    #[test]
    fn transmits_exactly_one_frame_per_call() {
        let mut channel = Channel::new(SEND_QUEUE_SLOTS, RECEIVE_BUFFER_SLOTS);
        let (client, mut peer) = memory::pair();
        channel.attach(Box::new(client));
        channel.enqueue_send(frame(FrameKind::PlainMessage, "a")).unwrap();
        channel.enqueue_send(frame(FrameKind::PlainMessage, "b")).unwrap();

        let mut events = Vec::new();
        channel.transmit_one(&mut events);
        let Incoming::Data(bytes) = peer.read() else {
            unreachable!("expected data");
        };
        assert_eq!(bytes, frame(FrameKind::PlainMessage, "a").encode());
        assert_eq!(channel.pending_sends(), 1);
    }

    #[test]
    fn full_receive_buffer_signals_and_drops() {
        let mut channel = Channel::new(SEND_QUEUE_SLOTS, 3);
        let (client, mut peer) = memory::pair();
        channel.attach(Box::new(client));
        for text in ["one", "two", "three"] {
            peer.write(&frame(FrameKind::PlainMessage, text).encode())
                .unwrap();
        }

        let mut events = Vec::new();
        assert_eq!(channel.receive_available(&mut events), Health::Open);
        assert_eq!(events.len(), 3);
        assert_eq!(
            events.last(),
            Some(&LinkEvent::Error {
                message: "The receiving buffer is full!".into()
            })
        );
        assert_eq!(channel.dequeue_received().unwrap().payload(), "one");
        assert_eq!(channel.dequeue_received().unwrap().payload(), "two");
        assert!(channel.dequeue_received().is_none());
    }

    #[test]
    fn peer_close_reports_closed_after_draining() {
        let mut channel = Channel::new(SEND_QUEUE_SLOTS, RECEIVE_BUFFER_SLOTS);
        let (client, mut peer) = memory::pair();
        channel.attach(Box::new(client));
        peer.write(&frame(FrameKind::ResponsePayload, "bye").encode())
            .unwrap();
        peer.close();

        let mut events = Vec::new();
        assert_eq!(channel.receive_available(&mut events), Health::Closed);
        assert_eq!(channel.dequeue_received().unwrap().payload(), "bye");
        assert!(channel.detach());
        assert!(!channel.detach());
    }
}
