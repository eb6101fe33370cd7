//! The recursive walk behind one top-level freeze call.

use crate::config::Config;
use crate::dispatch::DispatchTable;
use crate::error::FreezeError;
use crate::memo::{Memo, Metrics};
use crate::tracker::{Node, Tracker};
use crate::value::Value;

/// Traversal state handed to every handler.
///
/// Owns the call's [`Tracker`] and borrows the freezer's memo, metrics and
/// dispatch table.
pub struct Walk<'a> {
    config: &'a Config,
    table: &'a DispatchTable,
    memo: &'a mut Memo,
    metrics: &'a mut Metrics,
    tracker: Tracker,
    /// Deepest level visited inside the value currently being decomposed.
    deepest: usize,
}

impl<'a> Walk<'a> {
    pub(crate) fn new(
        config: &'a Config,
        table: &'a DispatchTable,
        memo: &'a mut Memo,
        metrics: &'a mut Metrics,
    ) -> Self {
        Self {
            config,
            table,
            memo,
            metrics,
            tracker: Tracker::new(),
            deepest: 0,
        }
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    /// Nesting level of the value currently being decomposed.
    pub fn depth(&self) -> usize {
        self.tracker.depth()
    }

    /// Freezes `value` and everything reachable from it.
    ///
    /// Compound values go through cycle detection, the memo and call-scoped
    /// reuse before their handler runs. A result served from the memo or from
    /// reuse counts its full height against the recursion limit, so the
    /// outcome never depends on what was frozen before.
    pub fn freeze(&mut self, value: &Value) -> Result<Node, FreezeError> {
        let level = self.tracker.depth() + 1;
        self.check_depth(level, 1, value)?;
        tracing::trace!(
            target: "deepfreeze",
            depth = level,
            category = value.category(),
            value = %value.describe(self.config.log_width),
            "freeze"
        );

        let Some(id) = value.id() else {
            self.reach(level);
            return self.dispatch(value);
        };

        if let Some(node) = self.tracker.back_ref(id) {
            self.metrics.back_refs += 1;
            self.reach(level);
            tracing::trace!(target: "deepfreeze", token = ?node.value, "cycle");
            return Ok(node);
        }
        if let Some(entry) = self.memo.get_trusted(id) {
            let node = Node::leaf(entry.value.clone()).with_height(entry.height);
            self.check_depth(level, node.height(), value)?;
            self.metrics.memo_hits += 1;
            self.reach(level + node.height() - 1);
            return Ok(node);
        }
        if let Some(node) = self.tracker.reuse(id) {
            self.check_depth(level, node.height(), value)?;
            self.metrics.shared_reuses += 1;
            self.reach(level + node.height() - 1);
            return Ok(node);
        }

        self.metrics.memo_misses += 1;
        let outer_deepest = std::mem::replace(&mut self.deepest, level);
        self.tracker.enter(id, value);
        let node = self.dispatch(value)?;
        let height = self.deepest - level + 1;
        self.deepest = self.deepest.max(outer_deepest);
        let node = self.tracker.exit(value, node.with_height(height));

        if node.is_context_free() && node.immutable {
            if let Some(anchor) = value.anchor() {
                self.memo.put(id, anchor, node.value.clone(), true, height);
                self.metrics.memo_inserts += 1;
            }
        }
        Ok(node)
    }

    /// Fails when a subtree `height` levels tall, rooted at `level`, would
    /// cross the recursion limit.
    fn check_depth(&self, level: usize, height: usize, value: &Value) -> Result<(), FreezeError> {
        match self.config.recursion_limit {
            Some(limit) if level + height.max(1) - 1 > limit => Err(FreezeError::RecursionLimit {
                limit,
                path: self.tracker.path_to(value),
            }),
            _ => Ok(()),
        }
    }

    fn reach(&mut self, level: usize) {
        self.deepest = self.deepest.max(level);
    }

    fn dispatch(&mut self, value: &Value) -> Result<Node, FreezeError> {
        let table = self.table;
        table.resolve(value)?.freeze(value, self)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::dispatch::DispatchTable;
    use crate::frozen::FrozenValue;
    use crate::memo::{Memo, Metrics};
    use crate::value::Value;
    use tracing_subscriber::EnvFilter;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("deepfreeze=trace"))
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn shared_values_are_frozen_once_per_call() {
        init_tracing();
        let config = Config::default();
        let table = DispatchTable::with_builtins();
        let mut memo = Memo::new();
        let mut metrics = Metrics::default();
        let shared = Value::list([Value::Int(1)]);
        let outer = Value::tuple([shared.clone(), shared.clone()]);

        let node = {
            let mut walk = super::Walk::new(&config, &table, &mut memo, &mut metrics);
            let node = walk.freeze(&outer).unwrap();
            assert_eq!(walk.depth(), 0);
            node
        };
        assert!(!node.immutable);
        let inner = FrozenValue::tuple([FrozenValue::Int(1)]);
        assert_eq!(node.into_value(), FrozenValue::tuple([inner.clone(), inner]));
        assert_eq!(metrics.shared_reuses, 1);
        assert_eq!(metrics.memo_misses, 2);
        assert!(memo.is_empty());
    }

    #[test]
    fn immutable_compounds_are_memoized() {
        init_tracing();
        let config = Config::default();
        let table = DispatchTable::with_builtins();
        let mut memo = Memo::new();
        let mut metrics = Metrics::default();
        let value = Value::tuple([Value::str("a"), Value::tuple([Value::Int(2)])]);

        super::Walk::new(&config, &table, &mut memo, &mut metrics)
            .freeze(&value)
            .unwrap();
        assert_eq!(memo.len(), 2);
        assert_eq!(metrics.memo_inserts, 2);
    }
}
