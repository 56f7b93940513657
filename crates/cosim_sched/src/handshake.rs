//! Two-party baton handoff between the driver and the scheduler.
//!
//! A handshake is a pair of single-slot channels, one per direction. Each
//! party owns one [`HandshakeEnd`]. [`HandshakeEnd::signal`] hands the baton
//! over (with a message) and blocks until the other party hands it back, so
//! exactly one side runs at any moment.
//!
//! A dropped end is observed by the other side as
//! [`HandshakeError::Disconnected`] instead of a hang, and an optional
//! timeout bounds every wait.

use std::fmt;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::error::HandshakeError;

/// One party's end of a handshake: sends `S`, receives `R`.
pub struct HandshakeEnd<S, R> {
    tx: Sender<S>,
    rx: Receiver<R>,
    timeout: Option<Duration>,
}

/// Creates a connected pair of handshake ends.
///
/// Both ends start without a timeout; see [`HandshakeEnd::with_timeout`].
pub fn handshake<A, B>() -> (HandshakeEnd<A, B>, HandshakeEnd<B, A>) {
    let (a_tx, a_rx) = bounded(1);
    let (b_tx, b_rx) = bounded(1);
    (
        HandshakeEnd {
            tx: a_tx,
            rx: b_rx,
            timeout: None,
        },
        HandshakeEnd {
            tx: b_tx,
            rx: a_rx,
            timeout: None,
        },
    )
}

impl<S, R> HandshakeEnd<S, R> {
    /// Bounds how long [`signal`](Self::signal) and [`wait`](Self::wait) block.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Releases the other party with `msg`, then blocks until released in turn.
    pub fn signal(&self, msg: S) -> Result<R, HandshakeError> {
        self.release(msg)?;
        self.wait()
    }

    /// Releases the other party with `msg` without waiting for a reply.
    ///
    /// Used for the final handoff, after which this side stops participating.
    pub fn release(&self, msg: S) -> Result<(), HandshakeError> {
        self.tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => HandshakeError::Busy,
            TrySendError::Disconnected(_) => HandshakeError::Disconnected,
        })
    }

    /// Blocks until the other party releases this side.
    pub fn wait(&self) -> Result<R, HandshakeError> {
        match self.timeout {
            Some(timeout) => self.rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => HandshakeError::Timeout(timeout),
                RecvTimeoutError::Disconnected => HandshakeError::Disconnected,
            }),
            None => self.rx.recv().map_err(|_| HandshakeError::Disconnected),
        }
    }
}

impl<S, R> fmt::Debug for HandshakeEnd<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeEnd")
            .field("timeout", &self.timeout)
            .finish()
    }
}
