//! Built-in handlers, one submodule per value category.
//!
//! | category | output |
//! |---|---|
//! | scalars | the scalar; complex as `(re, im)`; bytearray as bytes |
//! | list, tuple | tuple of elements |
//! | set, frozenset | set of elements |
//! | dict | tuple of `(key, value)` pairs, or a set under `ignore_dict_order` |
//! | code | `("code", name, params, names, consts, bytecode)` |
//! | function | `("function", qualname, code, closure, globals)` |
//! | module | per [`crate::config::ModulePolicy`] |
//! | class | `("class", name, attrs, bases)` |
//! | instance | hook state, reduce recipe, or attribute fallback |

pub mod basic;
pub mod class;
pub mod function;
pub mod module;
pub mod object;

use crate::dispatch::DispatchTable;
use crate::error::FreezeError;
use crate::frozen::FrozenValue;
use crate::value::{TypeKey, Value};

/// Registers every built-in handler.
pub(crate) fn install(table: &mut DispatchTable) {
    for key in [
        TypeKey::NONE,
        TypeKey::ELLIPSIS,
        TypeKey::BOOL,
        TypeKey::INT,
        TypeKey::FLOAT,
        TypeKey::COMPLEX,
        TypeKey::STR,
        TypeKey::BYTES,
        TypeKey::BYTEARRAY,
    ] {
        table.register(key, basic::freeze_primitive);
    }
    table.register(TypeKey::TUPLE, basic::freeze_sequence);
    table.register(TypeKey::LIST, basic::freeze_sequence);
    table.register(TypeKey::SET, basic::freeze_set);
    table.register(TypeKey::FROZENSET, basic::freeze_set);
    table.register(TypeKey::DICT, basic::freeze_mapping);
    table.register(TypeKey::CODE, function::freeze_code);
    table.register(TypeKey::FUNCTION, function::freeze_function);
    table.register(TypeKey::BUILTIN_FUNCTION, function::freeze_builtin);
    table.register(TypeKey::METHOD, function::freeze_method);
    table.register(TypeKey::MODULE, module::freeze_module);
    table.register(TypeKey::TYPE, class::freeze_class);
    table.register(TypeKey::OBJECT, object::freeze_object);
}

/// A handler was invoked on a value it does not understand.
pub(crate) fn mismatch(value: &Value, expected: &str) -> FreezeError {
    FreezeError::unfreezable(
        value.type_key().to_string(),
        format!("handler expects {expected}"),
    )
}

pub(crate) fn label(tag: &str) -> FrozenValue {
    FrozenValue::str(tag)
}
