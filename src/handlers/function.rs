//! Code objects, functions, builtins and bound methods.
//!
//! A function is identified by what it computes: its code (instructions,
//! constants, parameter and global names), the current values of its closure
//! cells, and the values of the globals it reads. Source location and object
//! identity never contribute.

use super::{label, mismatch};
use crate::error::FreezeError;
use crate::frozen::FrozenValue;
use crate::tracker::{Node, Parts};
use crate::value::{Code, Function, Value};
use crate::walk::Walk;
use std::rc::Rc;

pub fn freeze_code(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let Value::Code(code) = value else {
        return Err(mismatch(value, "a code object"));
    };
    if walk.config().ignores_code_file(&code.filename) {
        tracing::debug!(target: "deepfreeze", code = %code.name, "freezing code by name");
        return Ok(Node::leaf(FrozenValue::tuple([label("code"), FrozenValue::str(&code.name)])));
    }

    let mut consts = Parts::new();
    for constant in &code.consts {
        if matches!(constant, Value::Code(inner) if Rc::ptr_eq(inner, code)) {
            continue;
        }
        consts.push(walk.freeze(constant)?);
    }

    let mut parts = Parts::new();
    parts.push_leaf(label("code"));
    parts.push_leaf(FrozenValue::str(&code.name));
    parts.push_leaf(strings(&code.params));
    parts.push_leaf(strings(&code.names));
    parts.push(consts.into_tuple());
    parts.push_leaf(FrozenValue::Bytes(code.bytecode.clone()));
    Ok(parts.into_tuple())
}

fn strings(items: &[String]) -> FrozenValue {
    FrozenValue::tuple(items.iter().map(FrozenValue::str))
}

pub fn freeze_function(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let Value::Function(function) = value else {
        return Err(mismatch(value, "a function"));
    };
    let config = walk.config();
    if config.ignores_function(&function.module, &function.qualname) {
        return Ok(Node::leaf(FrozenValue::tuple([
            label("function"),
            FrozenValue::str(&function.module),
            FrozenValue::str(&function.qualname),
        ])));
    }

    let code = walk.freeze(&Value::Code(Rc::clone(&function.code)))?;
    let closure = freeze_closure(function, walk)?;
    let globals = freeze_globals(function, walk)?;

    let mut parts = Parts::new();
    parts.push_leaf(label("function"));
    parts.push_leaf(FrozenValue::str(&function.qualname));
    parts.push(code);
    parts.push(closure);
    parts.push(globals);
    Ok(parts.into_tuple())
}

/// `{(name, value)}` over the closure cells, minus ignored nonlocals.
fn freeze_closure(function: &Function, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let config = walk.config();
    let mut closure = Parts::new();
    for (name, cell) in &function.closure {
        if config.ignores_nonlocal(&function.module, &function.qualname, name) {
            continue;
        }
        let current = cell.borrow().clone();
        let frozen = walk.freeze(&current)?;
        closure.push(Node::tuple([Node::leaf(FrozenValue::str(name)), frozen]));
    }
    Ok(closure.into_set())
}

/// `{(name, value)}` over the global names the code reads that resolve in
/// the function's module, minus ignored globals.
fn freeze_globals(function: &Function, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let config = walk.config();
    let mut globals = Parts::new();
    let Some(module) = &function.globals else {
        return Ok(globals.into_set());
    };
    for name in referenced_names(&function.code) {
        if config.ignores_global(&module.name, name) {
            continue;
        }
        let Some(bound) = module.get_attr(name) else {
            continue;
        };
        let frozen = walk.freeze(&bound)?;
        globals.push(Node::tuple([Node::leaf(FrozenValue::str(name)), frozen]));
    }
    Ok(globals.into_set())
}

/// Global names of `code` and of code objects nested in its constants.
fn referenced_names(code: &Rc<Code>) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    let mut pending: Vec<&Code> = vec![&**code];
    while let Some(current) = pending.pop() {
        for name in &current.names {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        for constant in &current.consts {
            if let Value::Code(inner) = constant {
                if !Rc::ptr_eq(inner, code) {
                    pending.push(inner);
                }
            }
        }
    }
    names
}

pub fn freeze_builtin(value: &Value, _walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let Value::Builtin(builtin) = value else {
        return Err(mismatch(value, "a builtin function"));
    };
    Ok(Node::leaf(FrozenValue::tuple([
        label("builtin"),
        FrozenValue::str(&builtin.module),
        FrozenValue::str(&builtin.name),
    ])))
}

pub fn freeze_method(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let Value::Method(method) = value else {
        return Err(mismatch(value, "a bound method"));
    };
    let receiver = walk.freeze(&method.receiver)?;
    let function = walk.freeze(&method.function)?;
    Ok(Node::tuple([Node::leaf(label("method")), receiver, function]))
}

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::freezer::Freezer;
    use crate::frozen::FrozenValue;
    use crate::value::{Code, Function, Module, Value};
    use std::rc::Rc;

    fn adder_code(filename: &str) -> Code {
        Code::new("add", vec![0x7c, 0x00, 0x88, 0x00, 0x17, 0x00, 0x53, 0x00])
            .with_params(["x"])
            .with_filename(filename)
    }

    fn make_adder(n: i64, filename: &str) -> Value {
        let cell = Value::cell(Value::Int(n));
        Value::function(
            Function::new("app", "make_adder.<locals>.add", adder_code(filename))
                .with_cell("n", cell),
        )
    }

    /// `f` closes over `g` and `g` closes over `f`.
    fn mutually_recursive() -> (Value, Value) {
        let f_cell = Value::cell(Value::None);
        let g_cell = Value::cell(Value::None);
        let f = Value::function(
            Function::new("app", "f", Code::new("f", vec![0x88, 0x00]))
                .with_cell("g", Rc::clone(&g_cell)),
        );
        let g = Value::function(
            Function::new("app", "g", Code::new("g", vec![0x88, 0x01]))
                .with_cell("f", Rc::clone(&f_cell)),
        );
        *f_cell.borrow_mut() = f.clone();
        *g_cell.borrow_mut() = g.clone();
        (f, g)
    }

    fn frozen(value: &Value, config: &Config) -> FrozenValue {
        Freezer::new().freeze_value(value, config).unwrap()
    }

    #[test]
    fn closure_values_distinguish_functions() {
        let config = Config::default();
        assert_ne!(
            frozen(&make_adder(1, "a.py"), &config),
            frozen(&make_adder(2, "a.py"), &config)
        );
    }

    #[test]
    fn source_location_does_not_matter() {
        let config = Config::default();
        assert_eq!(
            frozen(&make_adder(1, "/src/a.py"), &config),
            frozen(&make_adder(1, "/other/b.py"), &config)
        );
    }

    #[test]
    fn ignored_nonlocal_is_omitted() {
        let mut config = Config::default();
        config.ignore_nonlocals.insert((
            "app".to_string(),
            "make_adder.<locals>.add".to_string(),
            "n".to_string(),
        ));
        assert_eq!(
            frozen(&make_adder(1, "a.py"), &config),
            frozen(&make_adder(2, "a.py"), &config)
        );
    }

    #[test]
    fn ignored_function_freezes_by_name() {
        let mut config = Config::default();
        config
            .ignore_functions
            .insert(("app".to_string(), "make_adder.<locals>.add".to_string()));
        assert_eq!(
            frozen(&make_adder(1, "a.py"), &config),
            FrozenValue::tuple([
                FrozenValue::str("function"),
                FrozenValue::str("app"),
                FrozenValue::str("make_adder.<locals>.add"),
            ])
        );
    }

    #[test]
    fn ignored_code_files_freeze_code_by_name() {
        let mut config = Config::default();
        config.ignore_code_files.insert("/usr/lib".into());
        let code = Value::code(adder_code("/usr/lib/stdlib/op.py"));
        assert_eq!(
            frozen(&code, &config),
            FrozenValue::tuple([FrozenValue::str("code"), FrozenValue::str("add")])
        );
    }

    #[test]
    fn globals_are_read_from_the_module() {
        let build = |scale: i64| {
            let module = Rc::new(Module::new("app"));
            module.set_attr("SCALE", Value::Int(scale));
            module.set_attr("unused", Value::Int(99));
            let code = Code::new("scaled", vec![0x74, 0x00]).with_names(["SCALE", "missing"]);
            Value::function(Function::new("app", "scaled", code).with_globals(&module))
        };
        let config = Config::default();
        assert_ne!(frozen(&build(1), &config), frozen(&build(2), &config));

        let mut ignoring = Config::default();
        ignoring.ignore_globals.insert(("app".to_string(), "SCALE".to_string()));
        assert_eq!(frozen(&build(1), &ignoring), frozen(&build(2), &ignoring));
    }

    #[test]
    fn recursive_closure_terminates_without_being_memoized() {
        let cell = Value::cell(Value::None);
        let code = Code::new("fact", vec![0x88, 0x00]).with_params(["n"]);
        let fact = Value::function(
            Function::new("app", "outer.<locals>.fact", code).with_cell("fact", Rc::clone(&cell)),
        );
        *cell.borrow_mut() = fact.clone();

        let mut freezer = Freezer::new();
        let config = Config::default();
        let first = freezer.freeze_value(&fact, &config).unwrap();
        let second = freezer.freeze_value(&fact, &config).unwrap();
        assert_eq!(first, second);
        assert!(first.to_string().contains("<backref 1>"));
        assert!(freezer.memo().get_immutable(fact.id().unwrap()).is_none());
        // The acyclic code object is still served from the memo.
        assert!(freezer.metrics().memo_hits >= 1);
    }

    #[test]
    fn earlier_calls_do_not_change_a_cycle() {
        let (f, g) = mutually_recursive();
        let config = Config::default();
        let cold = frozen(&f, &config);

        let mut warm = Freezer::new();
        warm.freeze_value(&g, &config).unwrap();
        assert_eq!(warm.freeze_value(&f, &config).unwrap(), cold);
        assert_eq!(warm.freeze_value(&g, &config).unwrap(), frozen(&g, &config));
    }

    #[test]
    fn cycle_member_freezes_the_same_inside_a_container() {
        let (f, g) = mutually_recursive();
        let config = Config::default();
        let pair = frozen(&Value::tuple([f.clone(), g.clone()]), &config);
        let items = pair.as_tuple().unwrap();
        assert_eq!(items[0], frozen(&f, &config));
        assert_eq!(items[1], frozen(&g, &config));
        assert_ne!(items[0], items[1]);
    }

    #[test]
    fn builtins_and_methods() {
        let config = Config::default();
        let len = Value::builtin("builtins", "len");
        assert_eq!(
            frozen(&len, &config),
            FrozenValue::tuple([
                FrozenValue::str("builtin"),
                FrozenValue::str("builtins"),
                FrozenValue::str("len"),
            ])
        );
        let bound_a = Value::method(Value::Int(1), make_adder(1, "a.py"));
        let bound_b = Value::method(Value::Int(2), make_adder(1, "a.py"));
        assert_ne!(frozen(&bound_a, &config), frozen(&bound_b, &config));
    }
}
