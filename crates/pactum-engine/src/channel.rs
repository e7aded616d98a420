//! Write-once broadcast cell for the engine's persistent data context.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use pactum_contracts::policy::PolicyData;

/// A single-slot, replay-to-late-subscribers broadcast cell holding the
/// current `PolicyData`.
///
/// `set` is called exactly once at startup in normal operation; `current`
/// suspends until a value exists and resolves immediately ever after.
/// Readers may arrive before or after the write. No timeout is imposed: a
/// permanently unset channel hangs every evaluation, and callers needing
/// liveness must impose their own timeout at the boundary.
pub struct PolicyDataChannel {
    slot: watch::Sender<Option<Arc<PolicyData>>>,
}

impl PolicyDataChannel {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Publish the data context, waking every pending `current` call.
    ///
    /// Later calls are allowed by contract but unexpected; the design
    /// assumes constant data for the process lifetime.
    pub fn set(&self, data: PolicyData) {
        info!(
            roles = data.roles_hierarchy.len(),
            mapped_fields = data.input_data_mapping.len(),
            "policy data context set"
        );
        self.slot.send_modify(|slot| {
            if slot.is_some() {
                warn!("policy data context replaced after the initial set");
            }
            *slot = Some(Arc::new(data));
        });
    }

    /// The current data context, suspending until one has been set.
    pub async fn current(&self) -> Arc<PolicyData> {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(data) = rx.borrow_and_update().as_ref() {
                return Arc::clone(data);
            }
            // The sender is owned by `self`, which outlives this borrow, so
            // the channel cannot close while we wait.
            if rx.changed().await.is_err() {
                unreachable!("policy data channel closed while its sender is still held");
            }
        }
    }

    /// The current data context without waiting.
    pub fn get(&self) -> Option<Arc<PolicyData>> {
        self.slot.borrow().clone()
    }
}

impl Default for PolicyDataChannel {
    fn default() -> Self {
        Self::new()
    }
}
