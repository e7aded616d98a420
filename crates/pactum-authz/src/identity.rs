//! The identity channel: who is asking.
//!
//! A session starts with no identity; sign-in publishes a [`Subject`] and
//! every decision stream picks the change up through its watch handle. An
//! absent identity is a legitimate state — feature checks run with it and
//! get the anonymous answer — but contract operations wait for sign-in.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use pactum_contracts::subject::Subject;

/// Broadcast cell holding the current subject, if any.
///
/// Clones share the same underlying slot.
#[derive(Clone)]
pub struct IdentityChannel {
    slot: Arc<watch::Sender<Option<Subject>>>,
}

impl IdentityChannel {
    /// A channel with no identity published yet.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { slot: Arc::new(tx) }
    }

    /// Publish `subject` as the current identity.
    pub fn set(&self, subject: Subject) {
        debug!(subject = %subject.id, "identity published");
        self.slot.send_modify(|slot| *slot = Some(subject));
    }

    /// Drop the current identity (sign-out).
    pub fn clear(&self) {
        debug!("identity cleared");
        self.slot.send_modify(|slot| *slot = None);
    }

    /// The current identity, if any.
    pub fn latest(&self) -> Option<Subject> {
        self.slot.borrow().clone()
    }

    /// A receiver observing every identity change.
    pub fn watch(&self) -> watch::Receiver<Option<Subject>> {
        self.slot.subscribe()
    }

    /// Suspend until an identity is present, then return it.
    ///
    /// Used by operations that make no sense anonymously, mirroring how
    /// the sign-in gate precedes any contract view.
    pub async fn wait_for_identity(&self) -> Subject {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(subject) = rx.borrow_and_update().clone() {
                return subject;
            }
            // The sender lives in `self`, so the channel cannot close
            // while we hold it.
            if rx.changed().await.is_err() {
                unreachable!("identity channel sender dropped while waited on");
            }
        }
    }
}

impl Default for IdentityChannel {
    fn default() -> Self {
        Self::new()
    }
}
