//! Composition layers: ordered containers of other layers.

use crate::id::LayerId;
use serde::{Deserialize, Serialize};

/// A container whose children draw in list order, index 0 on top.
///
/// The child list is owned here but only mutated through
/// [`Scene`](crate::Scene), which keeps parent links and
/// `index_in_parent` in sync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompositionLayer {
    pub(crate) children: Vec<LayerId>,
}

impl CompositionLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn children(&self) -> &[LayerId] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
