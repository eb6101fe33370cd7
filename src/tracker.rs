//! Reference tracking for one top-level freeze call.
//!
//! The tracker keeps the stack of compound values currently being decomposed
//! and the results of values already finished in this call.
//!
//! # Back-references
//! A value met again while it is still on the stack freezes to
//! `BackRef(n)`, where `n` counts frames from the occurrence up to the
//! referenced ancestor. How a cycle unrolls depends on where it is entered
//! from: freezing `g` alone and freezing `g` below `f` in the cycle
//! `f -> g -> f` give different subtrees for `g`. A [`Node`] whose subtree
//! holds any back-reference is therefore never reused nor memoized.
//!
//! # Height
//! Each node also records how many nesting levels its subtree spans, so a
//! result served from the memo or from call-scoped reuse is held to the same
//! recursion limit as a fresh walk.

use crate::frozen::FrozenValue;
use crate::value::{ObjectId, Value};
use std::collections::HashMap;

/// A frozen value plus what the walk needs to know about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub value: FrozenValue,
    pub immutable: bool,
    has_back_ref: bool,
    height: usize,
}

impl Node {
    pub fn new(value: FrozenValue, immutable: bool) -> Self {
        Self {
            value,
            immutable,
            has_back_ref: false,
            height: 0,
        }
    }

    /// Immutable leaf.
    pub fn leaf(value: FrozenValue) -> Self {
        Self::new(value, true)
    }

    /// Tuple of `nodes`, immutable iff all of them are.
    pub fn tuple(nodes: impl IntoIterator<Item = Node>) -> Self {
        let mut parts = Parts::new();
        parts.extend(nodes);
        parts.into_tuple()
    }

    /// Whether the subtree holds no back-reference, which makes the result
    /// independent of where the value was reached from.
    pub fn is_context_free(&self) -> bool {
        !self.has_back_ref
    }

    /// Nesting levels spanned by the walked subtree, this value included.
    pub fn height(&self) -> usize {
        self.height
    }

    pub(crate) fn with_height(mut self, height: usize) -> Self {
        self.height = height;
        self
    }

    pub fn mutable(mut self) -> Self {
        self.immutable = false;
        self
    }

    pub fn into_value(self) -> FrozenValue {
        self.value
    }
}

/// Accumulates child nodes into a tuple or set node.
#[derive(Debug)]
pub struct Parts {
    items: Vec<FrozenValue>,
    immutable: bool,
    has_back_ref: bool,
}

impl Default for Parts {
    fn default() -> Self {
        Self::new()
    }
}

impl Parts {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            immutable: true,
            has_back_ref: false,
        }
    }

    pub fn push(&mut self, node: Node) {
        self.immutable &= node.immutable;
        self.has_back_ref |= node.has_back_ref;
        self.items.push(node.value);
    }

    /// Adds an immutable label or scalar.
    pub fn push_leaf(&mut self, value: FrozenValue) {
        self.items.push(value);
    }

    pub fn mark_mutable(&mut self) {
        self.immutable = false;
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_tuple(self) -> Node {
        Node {
            value: FrozenValue::Tuple(self.items),
            immutable: self.immutable,
            has_back_ref: self.has_back_ref,
            height: 0,
        }
    }

    pub fn into_set(self) -> Node {
        Node {
            value: FrozenValue::Set(self.items.into_iter().collect()),
            immutable: self.immutable,
            has_back_ref: self.has_back_ref,
            height: 0,
        }
    }
}

impl Extend<Node> for Parts {
    fn extend<I: IntoIterator<Item = Node>>(&mut self, iter: I) {
        for node in iter {
            self.push(node);
        }
    }
}

#[derive(Debug)]
struct Frame {
    id: ObjectId,
    type_name: String,
    order: usize,
}

/// Cycle detection and call-scoped result sharing.
#[derive(Debug, Default)]
pub struct Tracker {
    stack: Vec<Frame>,
    in_progress: HashMap<ObjectId, usize>,
    // The value is kept alive so its address cannot be reused within the call.
    completed: HashMap<ObjectId, (Value, Node)>,
    next_order: usize,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compound values currently being decomposed.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Type names from the root down to `value`.
    pub fn path_to(&self, value: &Value) -> Vec<String> {
        self.stack
            .iter()
            .map(|frame| frame.type_name.clone())
            .chain(std::iter::once(value.type_key().to_string()))
            .collect()
    }

    /// Back-reference token if `id` is in progress.
    pub fn back_ref(&self, id: ObjectId) -> Option<Node> {
        let position = *self.in_progress.get(&id)?;
        let distance = self.stack.len() - position;
        Some(Node {
            value: FrozenValue::BackRef(u32::try_from(distance).unwrap_or(u32::MAX)),
            immutable: true,
            has_back_ref: true,
            height: 1,
        })
    }

    /// Result computed for `id` earlier in this call.
    pub fn reuse(&self, id: ObjectId) -> Option<Node> {
        self.completed.get(&id).map(|(_, node)| node.clone())
    }

    /// Pushes `value` and returns its stack position and order index.
    pub fn enter(&mut self, id: ObjectId, value: &Value) -> (usize, usize) {
        let position = self.stack.len();
        let order = self.next_order;
        self.next_order += 1;
        self.stack.push(Frame {
            id,
            type_name: value.type_key().to_string(),
            order,
        });
        self.in_progress.insert(id, position);
        (position, order)
    }

    /// Pops the top frame.
    ///
    /// A context-free result is remembered for reuse later in the call.
    pub fn exit(&mut self, value: &Value, node: Node) -> Node {
        if let Some(frame) = self.stack.pop() {
            self.in_progress.remove(&frame.id);
            if node.is_context_free() {
                self.completed.insert(frame.id, (value.clone(), node.clone()));
            }
        }
        node
    }

    /// Order index of the innermost frame, for diagnostics.
    pub fn current_order(&self) -> Option<usize> {
        self.stack.last().map(|frame| frame.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn back_ref_counts_frames_to_ancestor() {
        let mut tracker = Tracker::new();
        let outer = Value::list([]);
        let inner = Value::list([]);
        tracker.enter(outer.id().unwrap(), &outer);
        tracker.enter(inner.id().unwrap(), &inner);

        let to_inner = tracker.back_ref(inner.id().unwrap()).unwrap();
        assert_eq!(to_inner.value, FrozenValue::BackRef(1));
        let to_outer = tracker.back_ref(outer.id().unwrap()).unwrap();
        assert_eq!(to_outer.value, FrozenValue::BackRef(2));
        assert!(!to_outer.is_context_free());
    }

    #[test]
    fn results_holding_back_refs_are_not_reused() {
        let mut tracker = Tracker::new();
        let outer = Value::list([]);
        let inner = Value::list([]);
        let outer_id = outer.id().unwrap();
        let inner_id = inner.id().unwrap();
        tracker.enter(outer_id, &outer);
        tracker.enter(inner_id, &inner);

        let token = tracker.back_ref(outer_id).unwrap();
        let inner_node = tracker.exit(&inner, Node::tuple([token]));
        assert!(!inner_node.is_context_free());
        assert!(tracker.reuse(inner_id).is_none());

        let outer_node = tracker.exit(&outer, Node::tuple([inner_node]));
        assert!(!outer_node.is_context_free());
        assert!(tracker.reuse(outer_id).is_none());
        assert_eq!(tracker.depth(), 0);

        let plain = Value::list([]);
        tracker.enter(plain.id().unwrap(), &plain);
        let plain_node = tracker.exit(&plain, Node::tuple([Node::leaf(FrozenValue::Int(1))]));
        assert_eq!(tracker.reuse(plain.id().unwrap()), Some(plain_node));
    }

    #[test]
    fn parts_combine_mutability_and_back_refs() {
        let mut parts = Parts::new();
        parts.push(Node::leaf(FrozenValue::Int(1)));
        parts.push(Node::leaf(FrozenValue::Int(2)).mutable());
        parts.push_leaf(FrozenValue::str("tag"));
        assert_eq!(parts.len(), 3);
        let node = parts.into_set();
        assert!(!node.immutable);
        assert!(node.is_context_free());
        assert_eq!(node.value.as_set().map(|s| s.len()), Some(3));
    }

    #[test]
    fn path_lists_type_names() {
        let mut tracker = Tracker::new();
        let outer = Value::list([]);
        tracker.enter(outer.id().unwrap(), &outer);
        assert_eq!(tracker.path_to(&Value::str("hi")), ["list", "str"]);
        assert_eq!(tracker.current_order(), Some(0));
    }
}
