//! Per-canvas layer selection.

use crate::id::LayerId;
use std::collections::HashSet;

/// The delta produced by a selection operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionChange {
    pub added: Vec<LayerId>,
    pub removed: Vec<LayerId>,
}

impl SelectionChange {
    fn into_option(mut self) -> Option<Self> {
        if self.added.is_empty() && self.removed.is_empty() {
            return None;
        }
        self.added.sort();
        self.removed.sort();
        Some(self)
    }
}

/// Unordered set of selected layers.
///
/// Every mutator returns the change it made, or `None` when the set is
/// unchanged so no notification is sent.
#[derive(Debug, Clone, Default)]
pub struct SelectionManager {
    items: HashSet<LayerId>,
}

impl SelectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.items.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = LayerId> + '_ {
        self.items.iter().copied()
    }

    /// Selected layers in handle order.
    pub fn to_sorted_vec(&self) -> Vec<LayerId> {
        let mut v: Vec<_> = self.items.iter().copied().collect();
        v.sort();
        v
    }

    pub fn select(&mut self, id: LayerId) -> Option<SelectionChange> {
        self.select_many([id])
    }

    pub fn select_many(&mut self, ids: impl IntoIterator<Item = LayerId>) -> Option<SelectionChange> {
        let mut change = SelectionChange::default();
        for id in ids {
            if self.items.insert(id) {
                change.added.push(id);
            }
        }
        change.into_option()
    }

    pub fn unselect(&mut self, id: LayerId) -> Option<SelectionChange> {
        self.unselect_many([id])
    }

    pub fn unselect_many(
        &mut self,
        ids: impl IntoIterator<Item = LayerId>,
    ) -> Option<SelectionChange> {
        let mut change = SelectionChange::default();
        for id in ids {
            if self.items.remove(&id) {
                change.removed.push(id);
            }
        }
        change.into_option()
    }

    /// Replaces the selection with exactly `ids`.
    pub fn set(&mut self, ids: impl IntoIterator<Item = LayerId>) -> Option<SelectionChange> {
        let next: HashSet<LayerId> = ids.into_iter().collect();
        let change = SelectionChange {
            added: next.difference(&self.items).copied().collect(),
            removed: self.items.difference(&next).copied().collect(),
        };
        self.items = next;
        change.into_option()
    }

    pub fn clear(&mut self) -> Option<SelectionChange> {
        self.set(std::iter::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> LayerId {
        LayerId::new(n, 0)
    }

    #[test]
    fn test_select_reports_only_new_items() {
        let mut sel = SelectionManager::new();
        let change = sel.select_many([id(1), id(2)]).unwrap();
        assert_eq!(change.added, vec![id(1), id(2)]);
        assert!(change.removed.is_empty());
        assert!(sel.select(id(1)).is_none());
        assert_eq!(sel.len(), 2);
    }

    #[test]
    fn test_unselect_missing_is_silent() {
        let mut sel = SelectionManager::new();
        assert!(sel.unselect(id(5)).is_none());
    }

    #[test]
    fn test_set_computes_delta() {
        let mut sel = SelectionManager::new();
        sel.select_many([id(1), id(2)]);
        let change = sel.set([id(2), id(3)]).unwrap();
        assert_eq!(change.added, vec![id(3)]);
        assert_eq!(change.removed, vec![id(1)]);
        assert!(sel.set([id(3), id(2)]).is_none());
    }

    #[test]
    fn test_clear() {
        let mut sel = SelectionManager::new();
        assert!(sel.clear().is_none());
        sel.select(id(4));
        let change = sel.clear().unwrap();
        assert_eq!(change.removed, vec![id(4)]);
        assert!(sel.is_empty());
    }
}
