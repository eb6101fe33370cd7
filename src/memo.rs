//! Immutability memoizer.
//!
//! Maps object identity to the `(frozen value, is_immutable)` pair computed for
//! it. Each entry holds a weak anchor on the original allocation: the anchor
//! stops the address from being handed to a new object while the entry exists,
//! and lets [`Memo::purge`] drop entries whose object is gone.

use crate::frozen::FrozenValue;
use crate::value::ObjectId;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

trait Liveness {
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized> Liveness for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Weak reference that pins an allocation's address.
pub struct Anchor(Box<dyn Liveness>);

impl Anchor {
    pub(crate) fn new<T: ?Sized + 'static>(rc: &Rc<T>) -> Self {
        Anchor(Box::new(Rc::downgrade(rc)))
    }

    /// Whether the anchored object still has strong references.
    pub fn is_alive(&self) -> bool {
        self.0.is_alive()
    }
}

impl std::fmt::Debug for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Anchor").field(&self.is_alive()).finish()
    }
}

/// A memoized freeze result.
#[derive(Debug)]
pub struct MemoEntry {
    pub value: FrozenValue,
    pub is_immutable: bool,
    /// Nesting levels the original walk spanned below and including the value.
    pub height: usize,
    anchor: Anchor,
}

impl MemoEntry {
    /// Whether the entry can be served. Entries of dead objects never are.
    pub fn is_trusted(&self) -> bool {
        self.is_immutable && self.anchor.is_alive()
    }
}

/// Identity-keyed cache of freeze results. No eviction.
#[derive(Debug, Default)]
pub struct Memo {
    entries: HashMap<ObjectId, MemoEntry>,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ObjectId) -> Option<&MemoEntry> {
        self.entries.get(&id)
    }

    /// Returns the entry only if it is trusted.
    pub fn get_trusted(&self, id: ObjectId) -> Option<&MemoEntry> {
        self.entries.get(&id).filter(|entry| entry.is_trusted())
    }

    /// Returns the memoized value only if it is trusted.
    pub fn get_immutable(&self, id: ObjectId) -> Option<&FrozenValue> {
        self.get_trusted(id).map(|entry| &entry.value)
    }

    pub fn put(
        &mut self,
        id: ObjectId,
        anchor: Anchor,
        value: FrozenValue,
        is_immutable: bool,
        height: usize,
    ) {
        self.entries.insert(
            id,
            MemoEntry {
                value,
                is_immutable,
                height,
                anchor,
            },
        );
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries whose object has been deallocated. Returns how many.
    pub fn purge(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.anchor.is_alive());
        before - self.entries.len()
    }
}

/// Counters for one freezer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Top-level freeze calls.
    pub calls: u64,
    /// Values served from the memo.
    pub memo_hits: u64,
    /// Compound values that had to be decomposed.
    pub memo_misses: u64,
    /// Entries written to the memo.
    pub memo_inserts: u64,
    /// Back-reference tokens emitted for cycles.
    pub back_refs: u64,
    /// Values reused from earlier in the same call.
    pub shared_reuses: u64,
    /// Memo clears caused by a configuration change.
    pub config_invalidations: u64,
}

impl Metrics {
    /// Share of compound lookups served from the memo.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.memo_hits + self.memo_misses;
        if lookups == 0 {
            0.0
        } else {
            self.memo_hits as f64 / lookups as f64
        }
    }

    pub fn reset(&mut self) {
        *self = Metrics::default();
    }
}
