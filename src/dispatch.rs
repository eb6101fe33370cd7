//! Type dispatch registry.
//!
//! Maps a [`TypeKey`] to the [`Handler`] that freezes values of that type.
//! Lookup walks the value's method resolution order, most derived first, so a
//! handler registered for a base class applies to its subclasses until a more
//! specific one is registered.

use crate::error::{DispatchError, FreezeError};
use crate::handlers;
use crate::tracker::Node;
use crate::value::{TypeKey, Value};
use crate::walk::Walk;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Converts one value into a frozen node.
///
/// Handlers recurse into children through [`Walk::freeze`], never by calling
/// each other directly, so every child passes through cycle detection and
/// the memo.
pub trait Handler {
    fn freeze(&self, value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError>;
}

impl<F> Handler for F
where
    F: Fn(&Value, &mut Walk<'_>) -> Result<Node, FreezeError>,
{
    fn freeze(&self, value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
        self(value, walk)
    }
}

/// Handler table keyed by type.
#[derive(Clone)]
pub struct DispatchTable {
    handlers: HashMap<TypeKey, Rc<dyn Handler>>,
}

impl DispatchTable {
    /// An empty table. Every lookup fails until handlers are registered.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// The table with the built-in handlers.
    pub fn with_builtins() -> Self {
        let mut table = Self::empty();
        handlers::install(&mut table);
        table
    }

    /// Adds or replaces the handler for `key`, returning the previous one.
    pub fn register(
        &mut self,
        key: TypeKey,
        handler: impl Handler + 'static,
    ) -> Option<Rc<dyn Handler>> {
        self.register_rc(key, Rc::new(handler))
    }

    pub fn register_rc(
        &mut self,
        key: TypeKey,
        handler: Rc<dyn Handler>,
    ) -> Option<Rc<dyn Handler>> {
        self.handlers.insert(key, handler)
    }

    pub fn unregister(&mut self, key: &TypeKey) -> Option<Rc<dyn Handler>> {
        self.handlers.remove(key)
    }

    /// Restores the built-in handlers, dropping every registration.
    pub fn reset(&mut self) {
        *self = Self::with_builtins();
    }

    pub fn contains(&self, key: &TypeKey) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Handler for the first type in `value`'s resolution order that has one.
    pub fn resolve(&self, value: &Value) -> Result<&Rc<dyn Handler>, DispatchError> {
        value
            .mro()
            .iter()
            .find_map(|key| self.handlers.get(key))
            .ok_or_else(|| DispatchError {
                type_name: value.type_key().to_string(),
            })
    }
}

impl Default for DispatchTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for DispatchTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.handlers.keys().map(ToString::to_string).collect();
        keys.sort();
        f.debug_struct("DispatchTable").field("types", &keys).finish()
    }
}
