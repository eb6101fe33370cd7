//! Instances of user classes.
//!
//! Resolution order, first match wins:
//! 1. classes in `ignore_objects_by_class` and instances in
//!    `ignore_objects_by_id` freeze to `("object", module, name)`;
//! 2. [`ObjectProtocol::frozen_state`] freezes to `("frozen_state", (module, name), state)`;
//! 3. [`ObjectProtocol::reduce`] freezes to `("reduce", ...)`;
//! 4. a declined recipe freezes to `("object", class, attributes)`.
//!
//! An instance is immutable only if its class is declared frozen and every
//! part of its output is immutable.
//!
//! [`ObjectProtocol::frozen_state`]: crate::protocol::ObjectProtocol::frozen_state
//! [`ObjectProtocol::reduce`]: crate::protocol::ObjectProtocol::reduce

use super::{label, mismatch};
use crate::error::FreezeError;
use crate::frozen::FrozenValue;
use crate::protocol::{Constructor, Recipe, State};
use crate::tracker::{Node, Parts};
use crate::value::{Class, Instance, Namespace, Value};
use crate::walk::Walk;
use std::rc::Rc;

/// Marker standing in for the allocate-then-initialize constructor.
const NEWOBJ: &str = "__newobj__";

pub fn freeze_object(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let Value::Instance(instance) = value else {
        return Err(mismatch(value, "a class instance"));
    };
    let class = instance.class();
    let config = walk.config();
    if config.ignores_objects_of(class.module(), class.name()) || config.ignores_object(value) {
        return Ok(Node::leaf(FrozenValue::tuple([
            label("object"),
            FrozenValue::str(class.module()),
            FrozenValue::str(class.name()),
        ])));
    }

    let protocol = class.protocol();
    let mut node = if let Some(state) = protocol.frozen_state(instance) {
        let state = state.map_err(|err| {
            FreezeError::unfreezable(
                class.key().to_string(),
                format!("frozen state hook failed: {err}"),
            )
        })?;
        let state = walk.freeze(&state)?;
        Node::tuple([
            Node::leaf(label("frozen_state")),
            Node::leaf(FrozenValue::tuple([
                FrozenValue::str(class.module()),
                FrozenValue::str(class.name()),
            ])),
            state,
        ])
    } else {
        match protocol.reduce(instance) {
            Ok(recipe) => freeze_recipe(class, recipe, walk)?,
            Err(err) if err.is_decline() => {
                tracing::debug!(
                    target: "deepfreeze",
                    class = %class.key(),
                    reason = %err,
                    "recipe declined, freezing attributes"
                );
                freeze_fallback(class, instance, walk)?
            }
            Err(err) => {
                return Err(FreezeError::unfreezable(class.key().to_string(), err.to_string()));
            }
        }
    };
    if !class.is_frozen() {
        node = node.mutable();
    }
    Ok(node)
}

fn freeze_recipe(
    class: &Rc<Class>,
    recipe: Recipe,
    walk: &mut Walk<'_>,
) -> Result<Node, FreezeError> {
    let mut parts = Parts::new();
    parts.push_leaf(label("reduce"));

    let constructor = match &recipe.constructor {
        Constructor::NewObj => Node::leaf(FrozenValue::str(NEWOBJ)),
        Constructor::Callable(callable) => walk.freeze(callable)?,
    };
    parts.push(Node::tuple([Node::leaf(label("constructor")), constructor]));

    if !recipe.args.is_empty() {
        let mut args = Parts::new();
        for arg in &recipe.args {
            args.push(walk.freeze(arg)?);
        }
        parts.push(Node::tuple([Node::leaf(label("args")), args.into_tuple()]));
    }

    match &recipe.state {
        Some(State::Attrs(attrs)) => {
            let attrs = freeze_attrs(class, attrs, walk)?;
            if !attrs.is_empty() {
                parts.push(Node::tuple([Node::leaf(label("state")), attrs.into_set()]));
            }
        }
        Some(State::Value(state)) => {
            let state = walk.freeze(state)?;
            parts.push(Node::tuple([Node::leaf(label("state")), state]));
        }
        None => {}
    }

    if !recipe.list_items.is_empty() {
        let mut items = Parts::new();
        for item in &recipe.list_items {
            items.push(walk.freeze(item)?);
        }
        parts.push(Node::tuple([Node::leaf(label("list_items")), items.into_tuple()]));
    }

    if !recipe.dict_items.is_empty() {
        let mut items = Parts::new();
        for (key, item) in &recipe.dict_items {
            let key = walk.freeze(key)?;
            let item = walk.freeze(item)?;
            items.push(Node::tuple([key, item]));
        }
        parts.push(Node::tuple([Node::leaf(label("dict_items")), items.into_tuple()]));
    }
    Ok(parts.into_tuple())
}

fn freeze_fallback(
    class: &Rc<Class>,
    instance: &Instance,
    walk: &mut Walk<'_>,
) -> Result<Node, FreezeError> {
    let frozen_class = walk.freeze(&Value::Class(Rc::clone(class)))?;
    let attrs = instance.attrs().clone();
    let attrs = freeze_attrs(class, &attrs, walk)?;
    Ok(Node::tuple([Node::leaf(label("object")), frozen_class, attrs.into_set()]))
}

/// `(name, value)` pairs of `attrs`, minus suppressed attributes.
fn freeze_attrs(
    class: &Class,
    attrs: &Namespace,
    walk: &mut Walk<'_>,
) -> Result<Parts, FreezeError> {
    let config = walk.config();
    let mut parts = Parts::new();
    for (attr, bound) in attrs {
        if config.ignores_attribute(class.module(), class.name(), attr) {
            continue;
        }
        let frozen = walk.freeze(bound)?;
        parts.push(Node::tuple([Node::leaf(FrozenValue::str(attr)), frozen]));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::{FreezeError, ProtocolError};
    use crate::freezer::Freezer;
    use crate::frozen::FrozenValue;
    use crate::protocol::{FrozenStateFn, NoRecipe, ObjectProtocol, Recipe};
    use crate::value::{Class, Instance, Value};
    use std::rc::Rc;

    fn frozen(value: &Value, config: &Config) -> FrozenValue {
        Freezer::new().freeze_value(value, config).unwrap()
    }

    fn point(class: &Rc<Class>, x: i64, cache: i64) -> Value {
        Value::instance(
            Instance::new(class)
                .with_attr("x", Value::Int(x))
                .with_attr("cache", Value::Int(cache)),
        )
    }

    #[test]
    fn default_recipe_tracks_attributes() {
        let class = Class::builder("geo", "Point").build().unwrap();
        let config = Config::default();
        assert_ne!(frozen(&point(&class, 1, 0), &config), frozen(&point(&class, 2, 0), &config));
        let value = frozen(&point(&class, 1, 0), &config);
        let parts = value.as_tuple().unwrap();
        assert_eq!(parts[0], FrozenValue::str("reduce"));
        assert_eq!(
            parts[1],
            FrozenValue::tuple([FrozenValue::str("constructor"), FrozenValue::str("__newobj__")])
        );
    }

    #[test]
    fn suppressed_attribute_does_not_contribute() {
        let class = Class::builder("geo", "Point").build().unwrap();
        let mut config = Config::default();
        assert_ne!(frozen(&point(&class, 1, 0), &config), frozen(&point(&class, 1, 9), &config));
        config
            .ignore_attributes
            .insert(("geo".into(), "Point".into(), "cache".into()));
        assert_eq!(frozen(&point(&class, 1, 0), &config), frozen(&point(&class, 1, 9), &config));
    }

    #[test]
    fn frozen_state_hook_wins() {
        let hook = FrozenStateFn::new(|instance: &Instance| {
            Ok(instance.get_attr("x").unwrap_or(Value::None))
        });
        let class = Class::builder("geo", "Tagged").protocol(hook).build().unwrap();
        let config = Config::default();
        let value = frozen(&point(&class, 1, 0), &config);
        assert_eq!(
            value,
            FrozenValue::tuple([
                FrozenValue::str("frozen_state"),
                FrozenValue::tuple([FrozenValue::str("geo"), FrozenValue::str("Tagged")]),
                FrozenValue::Int(1),
            ])
        );
        assert_eq!(value, frozen(&point(&class, 1, 5), &config));
    }

    #[test]
    fn hook_can_hide_an_unfreezable_member() {
        let lock = Class::builder("threading", "Lock")
            .protocol(NoRecipe::new("lock state is not exportable"))
            .build()
            .unwrap();
        struct Failing;
        impl ObjectProtocol for Failing {
            fn reduce(&self, _: &Instance) -> Result<Recipe, ProtocolError> {
                Err(ProtocolError::Other("boom".into()))
            }
        }
        let failing = Class::builder("app", "Failing").protocol(Failing).build().unwrap();
        let holder = Class::builder("app", "Holder")
            .protocol(FrozenStateFn::new(|instance: &Instance| {
                Ok(instance.get_attr("n").unwrap_or(Value::None))
            }))
            .build()
            .unwrap();
        let value = Value::instance(
            Instance::new(&holder)
                .with_attr("n", Value::Int(3))
                .with_attr("bad", Value::instance(Instance::new(&failing)))
                .with_attr("lock", Value::instance(Instance::new(&lock))),
        );
        let config = Config::default();
        assert!(frozen(&value, &config).to_string().contains("frozen_state"));

        let bare = Value::instance(Instance::new(&failing));
        let err = Freezer::new().freeze_value(&bare, &config).unwrap_err();
        assert!(matches!(err, FreezeError::Unfreezable { .. }));
    }

    #[test]
    fn declined_recipe_falls_back_to_attributes() {
        let class = Class::builder("native", "Handle")
            .protocol(NoRecipe::new("no recipe"))
            .build()
            .unwrap();
        let config = Config::default();
        let value = frozen(&point(&class, 1, 0), &config);
        assert_eq!(value.as_tuple().unwrap()[0], FrozenValue::str("object"));
        assert_ne!(value, frozen(&point(&class, 2, 0), &config));
    }

    #[test]
    fn ignored_objects_freeze_to_their_class_name() {
        let class = Class::builder("threading", "Lock").build().unwrap();
        let mut config = Config::default();
        config
            .ignore_objects_by_class
            .insert(("threading".into(), "Lock".into()));
        assert_eq!(
            frozen(&point(&class, 1, 0), &config),
            FrozenValue::tuple([
                FrozenValue::str("object"),
                FrozenValue::str("threading"),
                FrozenValue::str("Lock"),
            ])
        );
    }

    #[test]
    fn single_instance_can_be_ignored_by_identity() {
        let class = Class::builder("app", "Connection")
            .protocol(FrozenStateFn::new(|_: &Instance| {
                Err(ProtocolError::Other("socket state is not exportable".into()))
            }))
            .build()
            .unwrap();
        let ignored = Value::instance(Instance::new(&class));
        let other = Value::instance(Instance::new(&class));
        let mut config = Config::default();
        assert!(config.ignore_object(&ignored));

        assert_eq!(
            frozen(&Value::list([ignored]), &config),
            FrozenValue::tuple([FrozenValue::tuple([
                FrozenValue::str("object"),
                FrozenValue::str("app"),
                FrozenValue::str("Connection"),
            ])])
        );
        let err = Freezer::new().freeze_value(&other, &config).unwrap_err();
        assert!(matches!(err, FreezeError::Unfreezable { .. }));
    }

    #[test]
    fn only_frozen_classes_are_memoized() {
        let plain = Class::builder("geo", "Point").build().unwrap();
        let sealed = Class::builder("geo", "FrozenPoint").frozen(true).build().unwrap();
        let mut freezer = Freezer::new();
        let config = Config::default();
        let a = point(&plain, 1, 0);
        let b = point(&sealed, 1, 0);
        freezer.freeze_value(&a, &config).unwrap();
        freezer.freeze_value(&b, &config).unwrap();
        assert!(freezer.memo().get_immutable(a.id().unwrap()).is_none());
        assert!(freezer.memo().get_immutable(b.id().unwrap()).is_some());
    }

    #[test]
    fn distinct_cycles_freeze_differently() {
        let node = Class::builder("tree", "TreeNode").build().unwrap();
        let make = |loop_to_root: bool| {
            let root = Value::instance(Instance::new(&node));
            let left = Value::instance(Instance::new(&node));
            let (Value::Instance(r), Value::Instance(l)) = (&root, &left) else {
                unreachable!()
            };
            r.set_attr("left", left.clone());
            let target = if loop_to_root { root.clone() } else { left.clone() };
            l.set_attr("left", target);
            root
        };
        let config = Config::default();
        let cycle_a = frozen(&make(true), &config);
        let cycle_b = frozen(&make(false), &config);
        assert_ne!(cycle_a, cycle_b);
        assert_eq!(cycle_a, frozen(&make(true), &config));
    }
}
