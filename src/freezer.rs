//! Freezer context and the per-thread default.
//!
//! A [`Freezer`] owns a dispatch table, an immutability memo and metrics. The
//! free functions [`freeze`], [`register_handler`] and friends operate on a
//! thread-local default instance that lives as long as the thread.

use crate::config::Config;
use crate::dispatch::{DispatchTable, Handler};
use crate::error::FreezeError;
use crate::fingerprint::HashValue;
use crate::frozen::FrozenValue;
use crate::memo::{Memo, Metrics};
use crate::value::{TypeKey, Value};
use crate::walk::Walk;
use std::cell::RefCell;
use std::rc::Rc;

/// Result of a freeze call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Frozen {
    /// The frozen tree.
    Value(FrozenValue),
    /// 64-bit digest of the tree, returned when `use_hash` is set.
    Hash(u64),
}

impl Frozen {
    pub fn as_value(&self) -> Option<&FrozenValue> {
        match self {
            Frozen::Value(value) => Some(value),
            Frozen::Hash(_) => None,
        }
    }

    pub fn into_value(self) -> Option<FrozenValue> {
        match self {
            Frozen::Value(value) => Some(value),
            Frozen::Hash(_) => None,
        }
    }

    pub fn as_hash(&self) -> Option<u64> {
        match self {
            Frozen::Hash(hash) => Some(*hash),
            Frozen::Value(_) => None,
        }
    }
}

/// Explicit freeze context.
#[derive(Debug, Default)]
pub struct Freezer {
    table: DispatchTable,
    memo: Memo,
    metrics: Metrics,
    /// Digest of the configuration that populated the memo.
    memo_config: Option<HashValue>,
}

impl Freezer {
    /// A freezer with the built-in handlers and an empty memo.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(table: DispatchTable) -> Self {
        Self {
            table,
            ..Self::default()
        }
    }

    /// Freezes `value`, returning the tree or, under `use_hash`, its digest.
    pub fn freeze(&mut self, value: &Value, config: &Config) -> Result<Frozen, FreezeError> {
        let tree = self.freeze_value(value, config)?;
        if config.use_hash {
            Ok(Frozen::Hash(tree.digest().to_u64()))
        } else {
            Ok(Frozen::Value(tree))
        }
    }

    /// Freezes `value` to its tree, ignoring `use_hash`.
    pub fn freeze_value(
        &mut self,
        value: &Value,
        config: &Config,
    ) -> Result<FrozenValue, FreezeError> {
        config.validate()?;
        self.sync_config(config);
        self.metrics.calls += 1;
        tracing::debug!(
            target: "deepfreeze",
            value = %value.describe(config.log_width),
            recursion_limit = ?config.recursion_limit,
            "freeze begin"
        );

        let mut walk = Walk::new(config, &self.table, &mut self.memo, &mut self.metrics);
        let result = walk.freeze(value);
        drop(walk);

        match result {
            Ok(node) => {
                tracing::debug!(
                    target: "deepfreeze",
                    memo_entries = self.memo.len(),
                    immutable = node.immutable,
                    "freeze end"
                );
                Ok(node.into_value())
            }
            Err(err) => {
                tracing::debug!(target: "deepfreeze", error = %err, "freeze failed");
                Err(err)
            }
        }
    }

    /// Clears the memo when `config` differs from the one that filled it.
    fn sync_config(&mut self, config: &Config) {
        let digest = memo_relevant(config).digest();
        if self.memo_config == Some(digest) {
            return;
        }
        if self.memo_config.is_some() && !self.memo.is_empty() {
            tracing::debug!(
                target: "deepfreeze",
                entries = self.memo.len(),
                "configuration changed, clearing memo"
            );
            self.memo.clear();
            self.metrics.config_invalidations += 1;
        }
        self.memo_config = Some(digest);
    }

    pub fn register_handler(
        &mut self,
        key: TypeKey,
        handler: impl Handler + 'static,
    ) -> Option<Rc<dyn Handler>> {
        self.invalidate("handler registered");
        self.table.register(key, handler)
    }

    pub fn unregister_handler(&mut self, key: &TypeKey) -> Option<Rc<dyn Handler>> {
        self.invalidate("handler removed");
        self.table.unregister(key)
    }

    /// Restores the built-in handlers.
    pub fn reset_handlers(&mut self) {
        self.invalidate("handlers reset");
        self.table.reset();
    }

    pub fn clear_memo(&mut self) {
        self.memo.clear();
    }

    /// Drops memo entries whose objects no longer exist.
    pub fn purge_memo(&mut self) -> usize {
        self.memo.purge()
    }

    pub fn table(&self) -> &DispatchTable {
        &self.table
    }

    pub fn memo(&self) -> &Memo {
        &self.memo
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    // Results computed under the old table may no longer hold.
    fn invalidate(&mut self, reason: &str) {
        if !self.memo.is_empty() {
            tracing::debug!(
                target: "deepfreeze",
                reason,
                entries = self.memo.len(),
                "clearing memo"
            );
            self.memo.clear();
        }
    }
}

/// The configuration minus fields that never change a frozen tree.
fn memo_relevant(config: &Config) -> Config {
    Config {
        use_hash: false,
        log_width: Config::default().log_width,
        ..config.clone()
    }
}

// ----------------------------------------------------------------------------
// Per-thread default freezer
// ----------------------------------------------------------------------------

thread_local! {
    static DEFAULT_FREEZER: RefCell<Freezer> = RefCell::new(Freezer::new());
}

/// Runs `f` on this thread's default freezer.
///
/// Fails with [`FreezeError::Reentrant`] when called from inside a handler or
/// hook that the default freezer is currently running.
pub fn with_default<R>(f: impl FnOnce(&mut Freezer) -> R) -> Result<R, FreezeError> {
    DEFAULT_FREEZER.with(|cell| {
        let mut freezer = cell.try_borrow_mut().map_err(|_| FreezeError::Reentrant)?;
        Ok(f(&mut freezer))
    })
}

/// Freezes `value` with the default freezer.
pub fn freeze(value: &Value, config: &Config) -> Result<Frozen, FreezeError> {
    with_default(|freezer| freezer.freeze(value, config))?
}

/// Registers a handler on the default freezer, returning the one it replaces.
pub fn register_handler(
    key: TypeKey,
    handler: impl Handler + 'static,
) -> Result<Option<Rc<dyn Handler>>, FreezeError> {
    with_default(|freezer| freezer.register_handler(key, handler))
}

pub fn unregister_handler(key: &TypeKey) -> Result<Option<Rc<dyn Handler>>, FreezeError> {
    with_default(|freezer| freezer.unregister_handler(key))
}

pub fn reset_handlers() -> Result<(), FreezeError> {
    with_default(Freezer::reset_handlers)
}

pub fn clear_memo() -> Result<(), FreezeError> {
    with_default(Freezer::clear_memo)
}
