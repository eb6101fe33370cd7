//! Deepfreeze: deterministic structural fingerprints of in-memory values.
//!
//! Freezing decomposes a value, including containers, functions with their
//! closures and globals, classes, modules and arbitrary objects, into a
//! [`FrozenValue`]: an immutable, hashable, totally ordered tree that never
//! holds a live reference or a memory address. Values that differ in a
//! meaningful way freeze differently; the same logical value freezes the same
//! on every call and in every process.
//!
//! The moving parts:
//! - [`DispatchTable`] maps each [`TypeKey`] to a [`Handler`], resolving through
//!   the value's type hierarchy so handlers registered for a base type cover
//!   subclasses.
//! - [`tracker::Tracker`] follows the values currently being decomposed and turns
//!   cycles into [`FrozenValue::BackRef`] tokens.
//! - [`Memo`] caches results for values known to be immutable, keyed by
//!   identity and guarded against address reuse.
//! - [`Freezer`] owns all of the above. A per-thread default instance backs
//!   the free functions [`freeze`], [`register_handler`] and friends.
//!
//! Rust has no runtime reflection, so values are described through the
//! dynamic object model in [`value`]. Objects expose their state through the
//! [`ObjectProtocol`] of their class.
//!
//! # Example
//!
//! ```
//! use deepfreeze::prelude::*;
//!
//! let config = Config::default();
//! let a = Value::list([Value::Int(1), Value::set([Value::Int(4), Value::Int(5)])]);
//! let b = Value::list([Value::Int(1), Value::set([Value::Int(5), Value::Int(4)])]);
//! assert_eq!(freeze(&a, &config).unwrap(), freeze(&b, &config).unwrap());
//! ```
//!
//! # Limitations
//!
//! Freezing is best-effort injective. A class whose notion of equality
//! diverges from its structural state (say, equal when only one field matches)
//! still freezes by state, so equal-by-`==` instances may freeze differently.

pub mod config;
pub mod diff;
pub mod dispatch;
pub mod error;
pub mod fingerprint;
pub mod freezer;
pub mod frozen;
pub mod handlers;
pub mod memo;
pub mod protocol;
pub mod snapshot;
pub mod tracker;
pub mod value;
pub mod walk;

pub use config::{Config, ConfigError, ModulePolicy};
pub use diff::{
    iterate_diffs, iterate_diffs_of_frozen, summarize_diffs, summarize_diffs_of_frozen, Difference,
    ObjectLocation,
};
pub use dispatch::{DispatchTable, Handler};
pub use error::{ClassError, DispatchError, FreezeError, ProtocolError};
pub use fingerprint::HashValue;
pub use freezer::{
    clear_memo, freeze, register_handler, reset_handlers, unregister_handler, Freezer, Frozen,
};
pub use frozen::{FrozenFloat, FrozenValue};
pub use memo::{Memo, Metrics};
pub use protocol::{
    Constructor, DefaultProtocol, FrozenStateFn, NoRecipe, ObjectProtocol, Recipe, State,
};
pub use snapshot::{Snapshot, SnapshotError};
pub use tracker::{Node, Parts};
pub use value::{Class, Code, Function, Instance, Module, TypeKey, Value};
pub use walk::Walk;

/// Prelude for convenient usage.
pub mod prelude {
    pub use crate::config::{Config, ModulePolicy};
    pub use crate::diff::{summarize_diffs, summarize_diffs_of_frozen};
    pub use crate::dispatch::Handler;
    pub use crate::error::{FreezeError, ProtocolError};
    pub use crate::freezer::{freeze, register_handler, Freezer, Frozen};
    pub use crate::frozen::FrozenValue;
    pub use crate::protocol::{FrozenStateFn, ObjectProtocol, Recipe};
    pub use crate::tracker::{Node, Parts};
    pub use crate::value::{Class, Code, Function, Instance, Module, TypeKey, Value};
    pub use crate::walk::Walk;
}
