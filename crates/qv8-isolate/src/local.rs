//! Copyable references to isolate-owned value wrappers
//!
//! A [`Local`] never owns anything. It names a wrapper stored in one of
//! the isolate's tables, so using a `Local` after its scope popped is
//! detected through a generation check instead of touching freed memory.

use qv8_core::JsHandle;

use crate::roots::RootIndex;

/// Slot in a [`HandleArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId {
    index: u32,
    generation: u32,
}

/// A value reference valid while the wrapper behind it is alive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Local(pub(crate) LocalRepr);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum LocalRepr {
    /// Tracked by a handle scope
    Scoped(HandleId),
    /// One of the isolate's root singletons
    Root(RootIndex),
    /// An entry of the eternal table
    Eternal(usize),
}

impl Local {
    pub(crate) fn scoped(id: HandleId) -> Self {
        Self(LocalRepr::Scoped(id))
    }

    pub(crate) fn root(index: RootIndex) -> Self {
        Self(LocalRepr::Root(index))
    }

    pub(crate) fn eternal(index: usize) -> Self {
        Self(LocalRepr::Eternal(index))
    }

    /// True for the isolate's singleton values (undefined, null, booleans...)
    pub fn is_root(&self) -> bool {
        matches!(self.0, LocalRepr::Root(_))
    }
}

struct ArenaSlot {
    generation: u32,
    handle: Option<JsHandle>,
}

/// Generational storage for wrappers
#[derive(Default)]
pub(crate) struct HandleArena {
    slots: Vec<ArenaSlot>,
    free: Vec<u32>,
    len: usize,
}

impl HandleArena {
    pub fn insert(&mut self, handle: JsHandle) -> HandleId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.handle = Some(handle);
            return HandleId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(ArenaSlot {
            generation: 0,
            handle: Some(handle),
        });
        HandleId {
            index,
            generation: 0,
        }
    }

    pub fn get(&self, id: HandleId) -> Option<&JsHandle> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.handle.as_ref())
    }

    #[cfg(test)]
    pub fn contains(&self, id: HandleId) -> bool {
        self.get(id).is_some()
    }

    /// Take the wrapper out, invalidating every id that names it
    pub fn remove(&mut self, id: HandleId) -> Option<JsHandle> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let handle = slot.handle.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Release every wrapper still stored
    pub fn clear(&mut self) -> usize {
        let released = self.len;
        self.slots.clear();
        self.free.clear();
        self.len = 0;
        released
    }
}
