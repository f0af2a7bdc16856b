//! TCP links on top of tokio sockets, driven without awaiting.

use std::io;
use std::net::SocketAddr;

use futures_util::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use super::link::{Acceptor, Connector, Incoming, Link, LinkPoll};
use crate::error::AppError;

const READ_CHUNK: usize = 4096;

enum Phase {
    Pending(oneshot::Receiver<io::Result<TcpStream>>),
    Open(TcpStream),
    Failed(String),
    Closed,
}

pub struct TcpLink {
    phase: Phase,
    outbox: Vec<u8>,
}

impl TcpLink {
    pub fn from_stream(stream: TcpStream) -> Self {
        let _ = stream.set_nodelay(true);
        Self {
            phase: Phase::Open(stream),
            outbox: Vec::new(),
        }
    }

    fn flush(&mut self) -> Result<(), AppError> {
        let Phase::Open(stream) = &self.phase else {
            return Err(AppError::NotConnected);
        };
        while !self.outbox.is_empty() {
            match stream.try_write(&self.outbox) {
                Ok(0) => {
                    return Err(AppError::ConnectFailed {
                        message: "peer stopped accepting data".into(),
                    })
                }
                Ok(n) => {
                    let n = n.min(self.outbox.len());
                    self.outbox.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Link for TcpLink {
    fn poll_state(&mut self) -> LinkPoll {
        match std::mem::replace(&mut self.phase, Phase::Closed) {
            Phase::Pending(mut rx) => match rx.try_recv() {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    self.phase = Phase::Open(stream);
                    LinkPoll::Connected
                }
                Ok(Err(e)) => {
                    self.phase = Phase::Failed(e.to_string());
                    LinkPoll::Failed(e.to_string())
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    self.phase = Phase::Pending(rx);
                    LinkPoll::Connecting
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    let reason = "connect task ended without a result".to_string();
                    self.phase = Phase::Failed(reason.clone());
                    LinkPoll::Failed(reason)
                }
            },
            Phase::Open(stream) => {
                self.phase = Phase::Open(stream);
                LinkPoll::Connected
            }
            Phase::Failed(reason) => {
                self.phase = Phase::Failed(reason.clone());
                LinkPoll::Failed(reason)
            }
            Phase::Closed => LinkPoll::Failed("link closed".into()),
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), AppError> {
        if !matches!(self.phase, Phase::Open(_)) {
            return Err(AppError::NotConnected);
        }
        self.outbox.extend_from_slice(bytes);
        self.flush()
    }

    fn read(&mut self) -> Incoming {
        if !self.outbox.is_empty() && self.flush().is_err() {
            return Incoming::Closed;
        }
        let Phase::Open(stream) = &self.phase else {
            return Incoming::Closed;
        };
        let mut buf = [0u8; READ_CHUNK];
        match stream.try_read(&mut buf) {
            Ok(0) => Incoming::Closed,
            Ok(n) => Incoming::Data(buf.get(..n).map(<[u8]>::to_vec).unwrap_or_default()),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Incoming::Idle,
            Err(_) => Incoming::Closed,
        }
    }

    fn close(&mut self) {
        self.outbox.clear();
        self.phase = Phase::Closed;
    }
}

/// Connects to a fixed address. Each attempt runs as a spawned task whose
/// result the link picks up on its next poll.
pub struct TcpConnector {
    address: String,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> Result<Box<dyn Link>, AppError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| AppError::ConnectFailed {
            message: format!("no async runtime: {e}"),
        })?;
        let (tx, rx) = oneshot::channel();
        let address = self.address.clone();
        handle.spawn(async move {
            let _ = tx.send(TcpStream::connect(address).await);
        });
        Ok(Box::new(TcpLink {
            phase: Phase::Pending(rx),
            outbox: Vec::new(),
        }))
    }

    fn describe(&self) -> String {
        self.address.clone()
    }
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub async fn bind(address: &str) -> Result<Self, AppError> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }
}

impl Acceptor for TcpAcceptor {
    fn poll_accept(&mut self) -> Result<Option<Box<dyn Link>>, AppError> {
        match self.listener.accept().now_or_never() {
            Some(Ok((stream, peer))) => {
                tracing::info!(%peer, "accepted peer");
                Ok(Some(Box::new(TcpLink::from_stream(stream))))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        self.listener
            .local_addr()
            .map_or_else(|_| "unbound".to_string(), |addr| addr.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn settle<F: FnMut() -> bool>(mut done: F) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn connects_and_exchanges_bytes() {
        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let address = acceptor.local_addr().unwrap().to_string();
        let mut client = TcpConnector::new(address).connect().unwrap();

        settle(|| client.poll_state() == LinkPoll::Connected).await;
        let mut server = None;
        settle(|| {
            server = acceptor.poll_accept().unwrap();
            server.is_some()
        })
        .await;
        let mut server = server.unwrap();

        client.write(b"ping").unwrap();
        let mut got = Vec::new();
        settle(|| {
            if let Incoming::Data(bytes) = server.read() {
                got.extend(bytes);
            }
            got == b"ping"
        })
        .await;

        client.close();
        settle(|| server.read() == Incoming::Closed).await;
    }

    #[tokio::test]
    async fn refused_connect_reports_failure() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let address = acceptor.local_addr().unwrap().to_string();
        drop(acceptor);

        let mut link = TcpConnector::new(address).connect().unwrap();
        settle(|| matches!(link.poll_state(), LinkPoll::Failed(_))).await;
        assert!(link.write(b"x").is_err());
    }
}
