//! Layer and canvas identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A handle to a layer stored in a [`Scene`](crate::Scene).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after a layer is deleted and its slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl LayerId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self { idx, generation }
    }

    /// Raw slot index (for diagnostics only).
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Generation counter of the slot this handle was issued for.
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LayerId({}@gen{})", self.idx, self.generation)
    }
}

/// A handle to a canvas stored in a [`Scene`](crate::Scene).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanvasId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl CanvasId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self { idx, generation }
    }

    /// Raw slot index (for diagnostics only).
    pub const fn index(self) -> u32 {
        self.idx
    }
}

impl fmt::Debug for CanvasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CanvasId({}@gen{})", self.idx, self.generation)
    }
}
