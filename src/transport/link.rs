//! Non-blocking byte links underneath the framed transport.
//!
//! Every method returns immediately; the transport's pump decides when to
//! call them. This keeps all buffer bookkeeping on the pump's side.

use serde::Serialize;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Where a connect attempt stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPoll {
    Connecting,
    Connected,
    Failed(String),
}

/// Result of one non-blocking read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    Data(Vec<u8>),
    Idle,
    Closed,
}

pub trait Link: Send {
    /// Drive a pending connect attempt. Open links report `Connected`.
    fn poll_state(&mut self) -> LinkPoll;
    /// Queue bytes for the peer. Bytes the socket cannot take yet stay
    /// buffered inside the link and are flushed on later calls.
    fn write(&mut self, bytes: &[u8]) -> Result<(), AppError>;
    fn read(&mut self) -> Incoming;
    fn close(&mut self);
}

/// Starts client-side connect attempts.
pub trait Connector: Send + Sync {
    fn connect(&self) -> Result<Box<dyn Link>, AppError>;
    /// Human-readable peer address for logs.
    fn describe(&self) -> String;
}

/// Hands out accepted server-side links.
pub trait Acceptor: Send {
    fn poll_accept(&mut self) -> Result<Option<Box<dyn Link>>, AppError>;
    fn describe(&self) -> String;
}
