//! Pending-request bookkeeping.
//!
//! Each request sent to a window is tracked until the RPC layer resolves it
//! or the window is torn down. Teardown rejects every waiter for that window
//! in the order the requests were tracked.

use crate::error::RequestError;
use crate::store::WindowStore;
use interframe_core::{MessageId, WindowId};
use serde_json::Value;
use tokio::sync::oneshot;

type Reply = Result<Value, RequestError>;

struct PendingEntry {
    id: MessageId,
    reply: oneshot::Sender<Reply>,
}

/// Awaitable handed to the caller of a request.
#[derive(Debug)]
pub struct PendingResponse {
    id: MessageId,
    reply: oneshot::Receiver<Reply>,
}

impl PendingResponse {
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Wait for the response, a rejection, or abandonment.
    pub async fn wait(self) -> Reply {
        self.reply.await.unwrap_or(Err(RequestError::Abandoned))
    }
}

/// In-flight requests, bucketed by target window.
#[derive(Default)]
pub struct RequestLedger {
    pending: WindowStore<Vec<PendingEntry>>,
}

impl RequestLedger {
    /// Start tracking request `id` sent to `win`.
    pub fn track(&self, win: WindowId, id: MessageId) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        self.pending.update(win, |entries| {
            entries.push(PendingEntry {
                id: id.clone(),
                reply: tx,
            })
        });
        PendingResponse { id, reply: rx }
    }

    /// Settle request `id` normally. Returns `false` if it was not pending.
    pub fn resolve(&self, win: WindowId, id: &MessageId, reply: Reply) -> bool {
        let entry = self
            .pending
            .with_mut(win, |entries| {
                let index = entries.iter().position(|entry| &entry.id == id)?;
                Some(entries.remove(index))
            })
            .flatten();

        match entry {
            // A dropped receiver means nobody is waiting anymore; nothing to do.
            Some(entry) => {
                let _ = entry.reply.send(reply);
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self, win: WindowId) -> usize {
        self.pending.with(win, Vec::len).unwrap_or(0)
    }

    /// Windows that currently have a bucket.
    pub fn windows(&self) -> Vec<WindowId> {
        self.pending.keys()
    }

    /// Reject every request still pending for `win`. Never fails.
    pub fn clean_up_window(&self, win: WindowId) {
        let entries = self.pending.remove(win).unwrap_or_default();
        if entries.is_empty() {
            return;
        }

        tracing::debug!(%win, pending = entries.len(), "rejecting pending requests");
        for entry in entries {
            if entry
                .reply
                .send(Err(RequestError::WindowCleanedUp(win)))
                .is_err()
            {
                tracing::trace!(%win, id = %entry.id, "request already abandoned");
            }
        }
    }
}
