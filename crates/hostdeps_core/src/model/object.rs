//! Participant identity model.
//!
//! # Responsibility
//! - Give every source and target of a dependency a stable identity.
//! - Let channel-node variants recover the concrete host type of a source.
//!
//! # Invariants
//! - `ObjectId` values are never reused for another participant.
//! - Two handles to the same participant report the same `ObjectId`.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identity of one participant in the dependents graph.
///
/// Relationship keys compare sources and targets by this id, which is the
/// Rust stand-in for reference equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generates a fresh id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an id that already exists externally (e.g. a host item id).
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Anything that can appear as a source or target of a dependency.
pub trait Participant: Send + Sync + 'static {
    fn object_id(&self) -> ObjectId;
}

/// A bare id is a valid participant; useful for custom fire-only sources.
impl Participant for ObjectId {
    fn object_id(&self) -> ObjectId {
        *self
    }
}

/// Participant view handed to channel-node variants.
///
/// Variants call `as_any()` and downcast to the host type they know how to
/// wire (e.g. `ConfigStore`).
pub trait SourceObject: Participant {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Participant> SourceObject for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}
