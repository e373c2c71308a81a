//! Two-endpoint message pipe between the runner and the display
//!
//! Each direction is an ordered queue of encoded event frames. An endpoint
//! can send to its peer, poll for a ready frame without blocking, and receive
//! the polled frame. Dropping one endpoint closes both directions for the
//! peer: its polls return `false` and receives fail with
//! [`ChannelError::Closed`].

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

use crate::core::event::{Event, Incoming};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel closed by peer")]
    Closed,
}

/// Send-only handle into an endpoint's inbox
#[derive(Debug, Clone)]
pub struct Sender {
    tx: UnboundedSender<String>,
}

impl Sender {
    pub fn send(&self, event: &Event) -> Result<(), ChannelError> {
        self.tx.send(event.encode()).map_err(|_| ChannelError::Closed)
    }
}

/// One end of a [`pipe`]
#[derive(Debug)]
pub struct Endpoint {
    tx: UnboundedSender<String>,
    rx: UnboundedReceiver<String>,
    peeked: Option<String>,
    closed: bool,
}

/// Create a connected pair of endpoints
pub fn pipe() -> (Endpoint, Endpoint) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (
        Endpoint {
            tx: a_tx,
            rx: a_rx,
            peeked: None,
            closed: false,
        },
        Endpoint {
            tx: b_tx,
            rx: b_rx,
            peeked: None,
            closed: false,
        },
    )
}

impl Endpoint {
    /// Send an event to the peer
    pub fn send(&self, event: &Event) -> Result<(), ChannelError> {
        self.tx.send(event.encode()).map_err(|_| ChannelError::Closed)
    }

    /// Send-only handle into the peer's inbox (same queue as [`Endpoint::send`])
    pub fn sender(&self) -> Sender {
        Sender {
            tx: self.tx.clone(),
        }
    }

    /// Check whether a frame is ready without blocking
    pub fn poll(&mut self) -> bool {
        if self.peeked.is_some() {
            return true;
        }
        if self.closed {
            return false;
        }
        match self.rx.try_recv() {
            Ok(frame) => {
                self.peeked = Some(frame);
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                false
            }
        }
    }

    /// Receive the next frame.
    ///
    /// Returns immediately after a successful [`Endpoint::poll`]. Without one
    /// it blocks the current thread, so async callers must poll first.
    pub fn recv(&mut self) -> Result<Incoming, ChannelError> {
        if let Some(frame) = self.peeked.take() {
            return Ok(Incoming::decode(&frame));
        }
        if self.closed {
            return Err(ChannelError::Closed);
        }
        match self.rx.blocking_recv() {
            Some(frame) => Ok(Incoming::decode(&frame)),
            None => {
                self.closed = true;
                Err(ChannelError::Closed)
            }
        }
    }

    /// True once every peer sender is gone and no frame is left to read
    pub fn is_closed(&mut self) -> bool {
        // poll() records disconnection as a side effect
        !self.poll() && self.closed
    }

    /// Close this endpoint; the peer observes closure
    pub fn close(self) {
        drop(self);
    }
}
