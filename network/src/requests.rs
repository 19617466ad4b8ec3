//! Correlates outgoing requests with their eventual responses.
//!
//! Each in-flight request gets a 16-bit id (wrapping counter) and a
//! `oneshot` completion. [`RequestTable::send_and_wait`] races the
//! completion against a timeout; on timeout the entry is simply dropped —
//! no callback is invoked for a late reply that arrives afterward, it is
//! just discarded by [`RequestTable::complete`] finding no matching id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::message::{Envelope, Message};
use crate::session::Session;

pub struct RequestTable {
    next_id: AtomicU16,
    pending: Mutex<HashMap<u16, oneshot::Sender<Message>>>,
}

impl RequestTable {
    /// Ids start at 1 — 0 is reserved across the wire protocol for
    /// fire-and-forget messages that expect no correlated reply.
    pub fn new() -> Self {
        Self { next_id: AtomicU16::new(1), pending: Mutex::new(HashMap::new()) }
    }

    fn next_id(&self) -> u16 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Registers a waiter for `id`'s response without sending anything —
    /// used by callers that already computed the envelope they're about
    /// to write to the session.
    fn register(&self, id: u16) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);
        rx
    }

    /// Delivers `body` to whichever waiter registered `id`, if any. Returns
    /// `false` if no waiter was registered (an unsolicited or late message).
    pub fn complete(&self, id: u16, body: Message) -> bool {
        if let Some(tx) = self.pending.lock().unwrap().remove(&id) {
            tx.send(body).is_ok()
        } else {
            false
        }
    }

    /// Sends `body` over `session`, waits up to `timeout` for a correlated
    /// response, and returns it.
    pub async fn send_and_wait(
        &self,
        session: &Session,
        body: Message,
        timeout: Duration,
    ) -> crate::error::Result<Message> {
        let id = self.next_id();
        let rx = self.register(id);
        session.send(Envelope::new(id, body).to_bytes())?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(crate::error::Error::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_with_no_waiter_is_a_noop() {
        let table = RequestTable::new();
        assert!(!table.complete(99, Message::Ping { nonce: 1 }));
    }

    #[tokio::test]
    async fn registered_waiter_receives_completion() {
        let table = RequestTable::new();
        let rx = table.register(5);
        assert!(table.complete(5, Message::Pong { nonce: 1 }));
        assert_eq!(rx.await.unwrap(), Message::Pong { nonce: 1 });
    }
}
