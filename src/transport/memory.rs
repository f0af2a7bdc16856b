//! In-process links: a duplex byte pipe plus a connector/acceptor pair that
//! hands out pipe ends. Runs client and server in one process without sockets.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::link::{Acceptor, Connector, Incoming, Link, LinkPoll};
use crate::error::AppError;

#[derive(Default)]
struct Pipe {
    bytes: VecDeque<u8>,
    closed: bool,
}

pub struct MemoryLink {
    inbound: Arc<Mutex<Pipe>>,
    outbound: Arc<Mutex<Pipe>>,
    open: bool,
}

/// Two connected ends. Bytes written to one are read from the other.
pub fn pair() -> (MemoryLink, MemoryLink) {
    let a_to_b = Arc::new(Mutex::new(Pipe::default()));
    let b_to_a = Arc::new(Mutex::new(Pipe::default()));
    (
        MemoryLink {
            inbound: Arc::clone(&b_to_a),
            outbound: Arc::clone(&a_to_b),
            open: true,
        },
        MemoryLink {
            inbound: a_to_b,
            outbound: b_to_a,
            open: true,
        },
    )
}

impl Link for MemoryLink {
    fn poll_state(&mut self) -> LinkPoll {
        if self.open {
            LinkPoll::Connected
        } else {
            LinkPoll::Failed("link closed".into())
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), AppError> {
        let mut pipe = self.outbound.lock();
        if !self.open || pipe.closed {
            return Err(AppError::NotConnected);
        }
        pipe.bytes.extend(bytes);
        Ok(())
    }

    fn read(&mut self) -> Incoming {
        if !self.open {
            return Incoming::Closed;
        }
        let mut pipe = self.inbound.lock();
        if !pipe.bytes.is_empty() {
            return Incoming::Data(pipe.bytes.drain(..).collect());
        }
        if pipe.closed {
            Incoming::Closed
        } else {
            Incoming::Idle
        }
    }

    fn close(&mut self) {
        self.open = false;
        self.inbound.lock().closed = true;
        self.outbound.lock().closed = true;
    }
}

#[derive(Default)]
struct Hub {
    listening: bool,
    pending: VecDeque<MemoryLink>,
}

#[derive(Clone)]
pub struct MemoryConnector {
    hub: Arc<Mutex<Hub>>,
}

pub struct MemoryAcceptor {
    hub: Arc<Mutex<Hub>>,
}

/// A listening in-process endpoint and a connector that dials it.
pub fn listener() -> (MemoryConnector, MemoryAcceptor) {
    let hub = Arc::new(Mutex::new(Hub {
        listening: true,
        pending: VecDeque::new(),
    }));
    (
        MemoryConnector {
            hub: Arc::clone(&hub),
        },
        MemoryAcceptor { hub },
    )
}

impl Connector for MemoryConnector {
    fn connect(&self) -> Result<Box<dyn Link>, AppError> {
        let mut hub = self.hub.lock();
        if !hub.listening {
            return Err(AppError::ConnectFailed {
                message: "connection refused".into(),
            });
        }
        let (client, server) = pair();
        hub.pending.push_back(server);
        Ok(Box::new(client))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl Acceptor for MemoryAcceptor {
    fn poll_accept(&mut self) -> Result<Option<Box<dyn Link>>, AppError> {
        Ok(self
            .hub
            .lock()
            .pending
            .pop_front()
            .map(|link| Box::new(link) as Box<dyn Link>))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl Drop for MemoryAcceptor {
    fn drop(&mut self) {
        let mut hub = self.hub.lock();
        hub.listening = false;
        for mut link in hub.pending.drain(..) {
            link.close();
        }
    }
}
