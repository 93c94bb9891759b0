//! Entity identifiers.
//!
//! An [`EntityId`] is a positive 32-bit number with no inherent data. Zero is
//! reserved: inside a packed data block a zero tag marks a free slot, so no
//! live entity is ever issued that value.

use serde::{Deserialize, Serialize};

/// A unique entity identifier.
///
/// Entities are pure identifiers. Components attached to an entity give it
/// meaning; the id itself is only unique among currently live entities and
/// may be reissued after the entity is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    /// The "no entity" sentinel. Also the tag of a free data block.
    pub const NONE: EntityId = EntityId(0);

    /// Largest id that may ever be issued (ids stay positive as `i32`).
    pub const MAX: EntityId = EntityId(i32::MAX as u32);

    /// Create an entity id from a raw value.
    #[must_use]
    pub const fn from_raw(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw `u32` value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if this is an issuable (non-zero, in range) id.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0 && self.0 <= Self::MAX.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl From<u32> for EntityId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}
