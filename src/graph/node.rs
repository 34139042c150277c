//! Snapshot vertices

use serde::{Deserialize, Serialize};

/// A user vertex in a snapshot.
///
/// Profile attributes are owned by the profile provider; the snapshot only
/// carries the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserNode {
    /// User identifier
    pub id: String,
}

impl UserNode {
    /// Create a new vertex
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
