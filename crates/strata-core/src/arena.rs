//! Generational slot storage backing the scene's layers and canvases.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with free-list reuse.
///
/// Freed slots bump their generation on reuse so that handles issued for the
/// previous occupant no longer resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> Arena<T> {
    /// Stores `value` and returns `(index, generation)`.
    pub(crate) fn insert(&mut self, value: T) -> (u32, u32) {
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.value = Some(value);
            (idx, slot.generation)
        } else {
            let idx = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            assert!(idx != u32::MAX, "arena exhausted");
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            (idx, 0)
        }
    }

    pub(crate) fn get(&self, idx: u32, generation: u32) -> Option<&T> {
        self.slots
            .get(idx as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_ref())
    }

    pub(crate) fn get_mut(&mut self, idx: u32, generation: u32) -> Option<&mut T> {
        self.slots
            .get_mut(idx as usize)
            .filter(|slot| slot.generation == generation)
            .and_then(|slot| slot.value.as_mut())
    }

    pub(crate) fn remove(&mut self, idx: u32, generation: u32) -> Option<T> {
        let slot = self.slots.get_mut(idx as usize)?;
        if slot.generation != generation {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(idx);
        Some(value)
    }

    /// Iterates live entries as `(index, generation, value)`.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (u32, u32, &T)> {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            slot.value
                .as_ref()
                .map(|value| (idx as u32, slot.generation, value))
        })
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (u32, u32, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(idx, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (idx as u32, generation, value))
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }
}
