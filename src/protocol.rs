//! Reconstruction recipes and the frozen-state override hook.
//!
//! Every class carries an [`ObjectProtocol`]. The generic object handler asks
//! it first for an explicit frozen state, then for a recipe describing how the
//! instance would be rebuilt (constructor, arguments, state, extra items).

use crate::error::ProtocolError;
use crate::value::{Instance, Namespace, Value};

/// How a recipe rebuilds its object.
#[derive(Debug, Clone)]
pub enum Constructor {
    /// Allocate an instance of the class passed as the first argument.
    NewObj,
    /// Call this value with the arguments.
    Callable(Value),
}

/// State applied after construction.
#[derive(Debug, Clone)]
pub enum State {
    /// Attribute assignments; subject to attribute suppression.
    Attrs(Namespace),
    /// Any other state value, frozen as is.
    Value(Value),
}

/// Reconstruction recipe for an instance.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub constructor: Constructor,
    pub args: Vec<Value>,
    pub state: Option<State>,
    pub list_items: Vec<Value>,
    pub dict_items: Vec<(Value, Value)>,
}

impl Recipe {
    /// `(NEWOBJ, (class,), attributes)`, the recipe of a plain instance.
    pub fn new_obj(instance: &Instance) -> Self {
        let attrs = instance.attrs().clone();
        Self {
            constructor: Constructor::NewObj,
            args: vec![Value::Class(instance.class().clone())],
            state: (!attrs.is_empty()).then_some(State::Attrs(attrs)),
            list_items: Vec::new(),
            dict_items: Vec::new(),
        }
    }

    /// Recipe calling `constructor` with `args` and no state.
    pub fn call(constructor: Value, args: impl IntoIterator<Item = Value>) -> Self {
        Self {
            constructor: Constructor::Callable(constructor),
            args: args.into_iter().collect(),
            state: None,
            list_items: Vec::new(),
            dict_items: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_list_items(mut self, items: impl IntoIterator<Item = Value>) -> Self {
        self.list_items = items.into_iter().collect();
        self
    }

    pub fn with_dict_items(mut self, items: impl IntoIterator<Item = (Value, Value)>) -> Self {
        self.dict_items = items.into_iter().collect();
        self
    }
}

/// Per-class capability consulted by the object handler.
pub trait ObjectProtocol {
    /// Explicit state to freeze in place of the recipe.
    ///
    /// Returning `Some` wins over [`ObjectProtocol::reduce`]; the snapshot is
    /// frozen recursively.
    fn frozen_state(&self, _instance: &Instance) -> Option<Result<Value, ProtocolError>> {
        None
    }

    /// Reconstruction recipe for `instance`.
    ///
    /// `ProtocolError::Type` and `ProtocolError::Import` decline the protocol
    /// and make the handler fall back to the instance's attributes.
    fn reduce(&self, instance: &Instance) -> Result<Recipe, ProtocolError> {
        Ok(Recipe::new_obj(instance))
    }
}

/// Protocol of classes that define neither hook.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProtocol;

impl ObjectProtocol for DefaultProtocol {}

/// Protocol that declines the recipe, as native objects without pickling
/// support do.
#[derive(Debug, Clone, Default)]
pub struct NoRecipe {
    reason: String,
}

impl NoRecipe {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl ObjectProtocol for NoRecipe {
    fn reduce(&self, _instance: &Instance) -> Result<Recipe, ProtocolError> {
        Err(ProtocolError::Type(self.reason.clone()))
    }
}

/// Protocol whose frozen state is computed by a closure.
pub struct FrozenStateFn<F>(pub F);

impl<F> FrozenStateFn<F>
where
    F: Fn(&Instance) -> Result<Value, ProtocolError>,
{
    pub fn new(hook: F) -> Self {
        Self(hook)
    }
}

impl<F> ObjectProtocol for FrozenStateFn<F>
where
    F: Fn(&Instance) -> Result<Value, ProtocolError>,
{
    fn frozen_state(&self, instance: &Instance) -> Option<Result<Value, ProtocolError>> {
        Some((self.0)(instance))
    }
}
