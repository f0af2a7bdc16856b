//! Wire framing: `[kind: u8][len: u16 big-endian][payload: len bytes of UTF-8]`.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Largest payload a frame may carry, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 4096;

const HEADER_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    Void = 0,
    PlainMessage = 1,
    SettingsPayload = 2,
    InstructionPayload = 3,
    ResponsePayload = 4,
}

impl TryFrom<u8> for FrameKind {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameKind::Void),
            1 => Ok(FrameKind::PlainMessage),
            2 => Ok(FrameKind::SettingsPayload),
            3 => Ok(FrameKind::InstructionPayload),
            4 => Ok(FrameKind::ResponsePayload),
            other => Err(AppError::Protocol {
                message: format!("unknown frame type {other}"),
            }),
        }
    }
}

/// One typed message unit. The payload is owned; enqueueing moves it into
/// the transport so the producer keeps no alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    kind: FrameKind,
    payload: String,
}

impl Frame {
    /// Build an outgoing frame. Empty and oversized payloads are rejected.
    pub fn new(kind: FrameKind, payload: impl Into<String>) -> Result<Self, AppError> {
        let payload = payload.into();
        if payload.is_empty() {
            return Err(AppError::EmptyPayload);
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(AppError::PayloadTooLarge { len: payload.len() });
        }
        Ok(Self { kind, payload })
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    pub fn encode(&self) -> Vec<u8> {
        let len = u16::try_from(self.payload.len()).unwrap_or(u16::MAX);
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.kind as u8);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(self.payload.as_bytes());
        out
    }
}

/// Reassembles frames from a byte stream that may split or merge them.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Next complete frame, if one is buffered.
    ///
    /// A frame with an unknown type or invalid UTF-8 is consumed and reported
    /// as a protocol error. A length header above the limit means the stream
    /// can no longer be trusted, so everything buffered is discarded.
    pub fn next_frame(&mut self) -> Option<Result<Frame, AppError>> {
        let (&kind_byte, rest) = self.buf.split_first()?;
        let len_bytes: [u8; 2] = rest.get(..2)?.try_into().ok()?;
        let len = usize::from(u16::from_be_bytes(len_bytes));

        if len > MAX_PAYLOAD_LEN {
            self.buf.clear();
            return Some(Err(AppError::Protocol {
                message: format!("frame length {len} exceeds {MAX_PAYLOAD_LEN}"),
            }));
        }

        let total = HEADER_LEN + len;
        if self.buf.len() < total {
            return None;
        }
        let body: Vec<u8> = self.buf.drain(..total).skip(HEADER_LEN).collect();

        Some(FrameKind::try_from(kind_byte).and_then(|kind| {
            let payload = String::from_utf8(body).map_err(|e| AppError::Protocol {
                message: format!("frame payload is not UTF-8: {e}"),
            })?;
            Ok(Frame { kind, payload })
        }))
    }
}
