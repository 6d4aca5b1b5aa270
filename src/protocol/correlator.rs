//! Request/response correlation by sequence number.
//!
//! Each outgoing request registers a one-shot slot under its sequence number.
//! The receive loop resolves the slot when a frame with the same sequence
//! number arrives. Shutdown cancels every slot still waiting.
//!
//! The table lock is only held for map operations, never across I/O.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::core::serialization::Payload;
use crate::error::{ProtocolError, Result};

/// Outcome delivered to a waiting sender
pub type Response = Result<Option<Payload>>;

/// Receiving end of a pending request slot.
///
/// Resolves to the matched response, or `ConnectionClosed` if the table is
/// cancelled first. Dropping it before resolution releases the sequence number.
pub struct PendingResponse<'a> {
    table: &'a PendingRequests,
    sequence: u8,
    rx: oneshot::Receiver<Response>,
}

impl PendingResponse<'_> {
    pub fn sequence(&self) -> u8 {
        self.sequence
    }
}

impl Future for PendingResponse<'_> {
    type Output = Response;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Response> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(ProtocolError::ConnectionClosed)))
    }
}

impl Drop for PendingResponse<'_> {
    fn drop(&mut self) {
        self.rx.close();
        self.table.remove_abandoned(self.sequence);
    }
}

#[derive(Default)]
struct PendingState {
    slots: HashMap<u8, oneshot::Sender<Response>>,
    closed: bool,
}

/// Table of requests waiting for their response
#[derive(Default)]
pub struct PendingRequests {
    state: Mutex<PendingState>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PendingState> {
        // No code path panics while holding the lock, so the data is consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a slot for `sequence`.
    ///
    /// # Errors
    /// - `ProtocolError::DuplicateSequence` if `sequence` is still pending;
    ///   the existing waiter is kept
    /// - `ProtocolError::NotConnected` once [`cancel_all`](Self::cancel_all) ran
    pub fn register(&self, sequence: u8) -> Result<PendingResponse<'_>> {
        let mut state = self.state();

        if state.closed {
            return Err(ProtocolError::NotConnected);
        }

        if state.slots.contains_key(&sequence) {
            warn!(seq = sequence, pending = state.slots.len(), "Sequence number still pending");
            return Err(ProtocolError::DuplicateSequence(sequence));
        }

        let (tx, rx) = oneshot::channel();
        state.slots.insert(sequence, tx);
        Ok(PendingResponse {
            table: self,
            sequence,
            rx,
        })
    }

    /// Fulfil and remove the slot for `sequence`.
    ///
    /// Returns `false` if nobody was waiting, in which case the response is dropped.
    pub fn resolve(&self, sequence: u8, payload: Option<Payload>) -> bool {
        let waiter = self.state().slots.remove(&sequence);

        match waiter {
            Some(tx) => {
                if tx.send(Ok(payload)).is_err() {
                    debug!(seq = sequence, "Waiter went away before its response arrived");
                }
                true
            }
            None => {
                debug!(seq = sequence, "Dropping response with no pending request");
                false
            }
        }
    }

    /// Remove the slot for `sequence` if its receiver is gone.
    ///
    /// A newer registration that reused the number after wraparound has a
    /// live receiver and is left alone.
    fn remove_abandoned(&self, sequence: u8) {
        let mut state = self.state();
        if state
            .slots
            .get(&sequence)
            .is_some_and(oneshot::Sender::is_closed)
        {
            state.slots.remove(&sequence);
        }
    }

    /// Fail every waiting slot with `ConnectionClosed` and refuse new registrations.
    ///
    /// Returns the number of slots cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = {
            let mut state = self.state();
            state.closed = true;
            state.slots.drain().collect()
        };

        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(Err(ProtocolError::ConnectionClosed));
        }
        count
    }

    /// Number of requests currently waiting
    pub fn len(&self) -> usize {
        self.state().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`cancel_all`](Self::cancel_all) has run
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}
