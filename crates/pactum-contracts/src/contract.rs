//! The contract resource: the domain entity authorization questions are
//! asked about.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle tag of a contract.
///
/// `ALL` fixes the presentation order; the available-states rendering keeps
/// this order when mapping the engine's reply onto enabled/disabled states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    /// The contract is being crafted.
    Draft,
    /// The contract is legally binding.
    Signed,
    Archived,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 3] =
        [LifecycleState::Draft, LifecycleState::Signed, LifecycleState::Archived];
}

/// A contract document as persisted by the backend.
///
/// A single authorization question always carries a pair of snapshots:
/// `before` (current persisted state) and `after` (the proposed state),
/// either of which may be absent depending on the action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: Uuid,
    /// Subject id of the creator.
    pub author: String,
    pub lifecycle_state: LifecycleState,
    /// A title to easily find and manage the contract.
    pub title: String,
    /// The contract content.
    pub body: String,
    /// Name of the signing party, e.g. "Jane Doe". Empty until signed.
    pub signature: String,
}

impl Contract {
    /// A fresh draft authored by `author_id`.
    pub fn draft(author_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            author: author_id.into(),
            lifecycle_state: LifecycleState::Draft,
            title: title.into(),
            body: String::new(),
            signature: String::new(),
        }
    }
}
