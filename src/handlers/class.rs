//! Classes.
//!
//! A class freezes to its name, its own attributes and its frozen bases. The
//! defining module is left out so that a class reached as `__main__.Model`
//! and as `app.models.Model` freezes the same.

use super::{label, mismatch};
use crate::error::FreezeError;
use crate::frozen::FrozenValue;
use crate::tracker::{Node, Parts};
use crate::value::Value;
use crate::walk::Walk;

pub fn freeze_class(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let Value::Class(class) = value else {
        return Err(mismatch(value, "a class"));
    };
    let config = walk.config();
    if config.ignores_class(class.module(), class.name()) {
        tracing::debug!(target: "deepfreeze", class = %class.key(), "freezing class by name");
        return Ok(Node::leaf(FrozenValue::tuple([
            label("class"),
            FrozenValue::str(class.module()),
            FrozenValue::str(class.name()),
        ])));
    }

    let attrs: Vec<(String, Value)> = class
        .attrs()
        .iter()
        .filter(|(attr, _)| {
            !config.special_class_attributes.contains(attr.as_str())
                && !config.ignores_attribute(class.module(), class.name(), attr)
        })
        .map(|(attr, bound)| (attr.clone(), bound.clone()))
        .collect();
    let mut members = Parts::new();
    for (attr, bound) in &attrs {
        let frozen = walk.freeze(bound)?;
        members.push(Node::tuple([Node::leaf(FrozenValue::str(attr)), frozen]));
    }

    let mut bases = Parts::new();
    for base in class.bases() {
        bases.push(walk.freeze(&Value::Class(base.clone()))?);
    }

    let mut parts = Parts::new();
    parts.push_leaf(label("class"));
    parts.push_leaf(FrozenValue::str(class.name()));
    parts.push(members.into_set());
    parts.push(bases.into_tuple());
    Ok(parts.into_tuple())
}
