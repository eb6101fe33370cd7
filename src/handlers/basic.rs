//! Scalars and containers.

use super::mismatch;
use crate::error::FreezeError;
use crate::frozen::FrozenValue;
use crate::tracker::{Node, Parts};
use crate::value::Value;
use crate::walk::Walk;

/// Scalars freeze to themselves and are always immutable, except bytearray.
pub fn freeze_primitive(value: &Value, _walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let frozen = match value {
        Value::None => FrozenValue::None,
        Value::Ellipsis => FrozenValue::Ellipsis,
        Value::Bool(b) => FrozenValue::Bool(*b),
        Value::Int(i) => FrozenValue::Int(*i),
        Value::Float(x) => FrozenValue::float(*x),
        Value::Complex(re, im) => {
            FrozenValue::tuple([FrozenValue::float(*re), FrozenValue::float(*im)])
        }
        Value::Str(s) => FrozenValue::str(&**s),
        Value::Bytes(b) => FrozenValue::Bytes(b.to_vec()),
        Value::ByteArray(b) => {
            return Ok(Node::new(FrozenValue::Bytes(b.borrow().clone()), false));
        }
        other => return Err(mismatch(other, "a primitive")),
    };
    Ok(Node::leaf(frozen))
}

/// Lists and tuples freeze to an ordered tuple. Lists are always mutable.
pub fn freeze_sequence(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let (items, mutable): (Vec<Value>, bool) = match value {
        Value::Tuple(items) => (items.to_vec(), false),
        Value::List(items) => (items.borrow().clone(), true),
        other => return Err(mismatch(other, "a list or tuple")),
    };
    let mut parts = Parts::new();
    for item in &items {
        parts.push(walk.freeze(item)?);
    }
    if mutable {
        parts.mark_mutable();
    }
    Ok(parts.into_tuple())
}

/// Sets and frozensets freeze to an unordered set. Sets are always mutable.
pub fn freeze_set(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let (items, mutable): (Vec<Value>, bool) = match value {
        Value::FrozenSet(items) => (items.to_vec(), false),
        Value::Set(items) => (items.borrow().clone(), true),
        other => return Err(mismatch(other, "a set or frozenset")),
    };
    let mut parts = Parts::new();
    for item in &items {
        parts.push(walk.freeze(item)?);
    }
    if mutable {
        parts.mark_mutable();
    }
    Ok(parts.into_set())
}

/// Dicts freeze to `(key, value)` pairs, ordered unless `ignore_dict_order`.
pub fn freeze_mapping(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let Value::Dict(entries) = value else {
        return Err(mismatch(value, "a dict"));
    };
    let entries = entries.borrow().clone();
    let mut parts = Parts::new();
    for (key, item) in &entries {
        let key = walk.freeze(key)?;
        let item = walk.freeze(item)?;
        parts.push(Node::tuple([key, item]));
    }
    parts.mark_mutable();
    if walk.config().ignore_dict_order {
        Ok(parts.into_set())
    } else {
        Ok(parts.into_tuple())
    }
}
