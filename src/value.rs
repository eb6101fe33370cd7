//! The dynamic object model that gets frozen.
//!
//! Values mirror the object graph of a dynamically typed runtime: scalars,
//! containers shared by reference, code objects, functions with closure cells,
//! modules, classes with a C3 method resolution order, and instances.
//!
//! # Key Design Principles
//! - Every compound value lives behind an `Rc`; its [`ObjectId`] is the address
//!   of that allocation and is used only for cycle detection and memoization.
//! - Mutable containers use `RefCell`, so a list can be appended to itself and
//!   a closure cell can hold the function that closes over it.
//! - Types are named by [`TypeKey`] (module, qualified name), which is what the
//!   dispatch table keys on.

use crate::error::ClassError;
use crate::memo::Anchor;
use crate::protocol::{DefaultProtocol, ObjectProtocol};
use indexmap::IndexMap;
use std::borrow::Cow;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

/// A shared, rebindable closure slot.
pub type Cell = Rc<RefCell<Value>>;

/// Mutable ordered attribute namespace.
pub type Namespace = IndexMap<String, Value>;

// ----------------------------------------------------------------------------
// Type keys
// ----------------------------------------------------------------------------

const BUILTINS: &str = "builtins";

/// Name of a runtime type: defining module plus qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey {
    module: Cow<'static, str>,
    name: Cow<'static, str>,
}

impl TypeKey {
    pub const NONE: TypeKey = TypeKey::builtin("NoneType");
    pub const ELLIPSIS: TypeKey = TypeKey::builtin("ellipsis");
    pub const BOOL: TypeKey = TypeKey::builtin("bool");
    pub const INT: TypeKey = TypeKey::builtin("int");
    pub const FLOAT: TypeKey = TypeKey::builtin("float");
    pub const COMPLEX: TypeKey = TypeKey::builtin("complex");
    pub const STR: TypeKey = TypeKey::builtin("str");
    pub const BYTES: TypeKey = TypeKey::builtin("bytes");
    pub const BYTEARRAY: TypeKey = TypeKey::builtin("bytearray");
    pub const TUPLE: TypeKey = TypeKey::builtin("tuple");
    pub const LIST: TypeKey = TypeKey::builtin("list");
    pub const SET: TypeKey = TypeKey::builtin("set");
    pub const FROZENSET: TypeKey = TypeKey::builtin("frozenset");
    pub const DICT: TypeKey = TypeKey::builtin("dict");
    pub const FUNCTION: TypeKey = TypeKey::builtin("function");
    pub const CODE: TypeKey = TypeKey::builtin("code");
    pub const BUILTIN_FUNCTION: TypeKey = TypeKey::builtin("builtin_function_or_method");
    pub const METHOD: TypeKey = TypeKey::builtin("method");
    pub const MODULE: TypeKey = TypeKey::builtin("module");
    pub const TYPE: TypeKey = TypeKey::builtin("type");
    pub const OBJECT: TypeKey = TypeKey::builtin("object");

    /// Key of a type defined in the `builtins` module.
    pub const fn builtin(name: &'static str) -> Self {
        Self {
            module: Cow::Borrowed(BUILTINS),
            name: Cow::Borrowed(name),
        }
    }

    pub fn new(module: impl Into<Cow<'static, str>>, name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_builtin(&self) -> bool {
        self.module == BUILTINS
    }
}

/// Builtin types print bare; others print as `module.name`.
impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_builtin() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.module, self.name)
        }
    }
}

static NONE_MRO: [TypeKey; 2] = [TypeKey::NONE, TypeKey::OBJECT];
static ELLIPSIS_MRO: [TypeKey; 2] = [TypeKey::ELLIPSIS, TypeKey::OBJECT];
static BOOL_MRO: [TypeKey; 3] = [TypeKey::BOOL, TypeKey::INT, TypeKey::OBJECT];
static INT_MRO: [TypeKey; 2] = [TypeKey::INT, TypeKey::OBJECT];
static FLOAT_MRO: [TypeKey; 2] = [TypeKey::FLOAT, TypeKey::OBJECT];
static COMPLEX_MRO: [TypeKey; 2] = [TypeKey::COMPLEX, TypeKey::OBJECT];
static STR_MRO: [TypeKey; 2] = [TypeKey::STR, TypeKey::OBJECT];
static BYTES_MRO: [TypeKey; 2] = [TypeKey::BYTES, TypeKey::OBJECT];
static BYTEARRAY_MRO: [TypeKey; 2] = [TypeKey::BYTEARRAY, TypeKey::OBJECT];
static TUPLE_MRO: [TypeKey; 2] = [TypeKey::TUPLE, TypeKey::OBJECT];
static LIST_MRO: [TypeKey; 2] = [TypeKey::LIST, TypeKey::OBJECT];
static SET_MRO: [TypeKey; 2] = [TypeKey::SET, TypeKey::OBJECT];
static FROZENSET_MRO: [TypeKey; 2] = [TypeKey::FROZENSET, TypeKey::OBJECT];
static DICT_MRO: [TypeKey; 2] = [TypeKey::DICT, TypeKey::OBJECT];
static FUNCTION_MRO: [TypeKey; 2] = [TypeKey::FUNCTION, TypeKey::OBJECT];
static CODE_MRO: [TypeKey; 2] = [TypeKey::CODE, TypeKey::OBJECT];
static BUILTIN_FUNCTION_MRO: [TypeKey; 2] = [TypeKey::BUILTIN_FUNCTION, TypeKey::OBJECT];
static METHOD_MRO: [TypeKey; 2] = [TypeKey::METHOD, TypeKey::OBJECT];
static MODULE_MRO: [TypeKey; 2] = [TypeKey::MODULE, TypeKey::OBJECT];
static TYPE_MRO: [TypeKey; 2] = [TypeKey::TYPE, TypeKey::OBJECT];

// ----------------------------------------------------------------------------
// Identity
// ----------------------------------------------------------------------------

/// Identity of a compound value: the address of its shared allocation.
///
/// Only meaningful while the allocation is alive (or anchored by a weak
/// reference). Never part of a frozen value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    fn of<T: ?Sized>(rc: &Rc<T>) -> Self {
        ObjectId(Rc::as_ptr(rc) as *const () as usize)
    }

    pub fn addr(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Values
// ----------------------------------------------------------------------------

/// A value of the dynamic object model.
///
/// Cloning a compound value clones the reference, not the object.
#[derive(Clone)]
pub enum Value {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex(f64, f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    ByteArray(Rc<RefCell<Vec<u8>>>),
    Tuple(Rc<[Value]>),
    List(Rc<RefCell<Vec<Value>>>),
    /// Mutable set; elements are unique under [`Value::key_eq`].
    Set(Rc<RefCell<Vec<Value>>>),
    FrozenSet(Rc<[Value]>),
    /// Insertion-ordered mapping; keys are unique under [`Value::key_eq`].
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Code(Rc<Code>),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    Method(Rc<BoundMethod>),
    Module(Rc<Module>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    pub fn bytes(b: &[u8]) -> Self {
        Value::Bytes(Rc::from(b))
    }

    pub fn bytearray(b: &[u8]) -> Self {
        Value::ByteArray(Rc::new(RefCell::new(b.to_vec())))
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items.into_iter().collect())))
    }

    /// Builds a set, dropping duplicates.
    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(unique(items))))
    }

    /// Builds a frozenset, dropping duplicates.
    pub fn frozenset(items: impl IntoIterator<Item = Value>) -> Self {
        Value::FrozenSet(Rc::from(unique(items)))
    }

    /// Builds a dict. A repeated key keeps its first position and its last value.
    pub fn dict(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let mut entries: Vec<(Value, Value)> = Vec::new();
        for (key, value) in pairs {
            insert_pair(&mut entries, key, value);
        }
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    pub fn code(code: Code) -> Self {
        Value::Code(Rc::new(code))
    }

    pub fn function(function: Function) -> Self {
        Value::Function(Rc::new(function))
    }

    pub fn builtin(module: &str, name: &str) -> Self {
        Value::Builtin(Rc::new(Builtin {
            module: module.to_string(),
            name: name.to_string(),
        }))
    }

    pub fn method(receiver: Value, function: Value) -> Self {
        Value::Method(Rc::new(BoundMethod { receiver, function }))
    }

    pub fn module(module: Module) -> Self {
        Value::Module(Rc::new(module))
    }

    pub fn instance(instance: Instance) -> Self {
        Value::Instance(Rc::new(instance))
    }

    /// New closure cell holding `value`.
    pub fn cell(value: Value) -> Cell {
        Rc::new(RefCell::new(value))
    }

    /// Appends to a list. Returns false if `self` is not a list.
    pub fn push(&self, item: Value) -> bool {
        match self {
            Value::List(items) => {
                items.borrow_mut().push(item);
                true
            }
            _ => false,
        }
    }

    /// Inserts into a dict. Returns false if `self` is not a dict.
    pub fn insert(&self, key: Value, value: Value) -> bool {
        match self {
            Value::Dict(entries) => {
                insert_pair(&mut entries.borrow_mut(), key, value);
                true
            }
            _ => false,
        }
    }

    /// Adds to a set unless an equal item is already present. Returns false
    /// if `self` is not a set.
    pub fn add(&self, item: Value) -> bool {
        match self {
            Value::Set(items) => {
                let mut items = items.borrow_mut();
                if !items.iter().any(|existing| existing.key_eq(&item)) {
                    items.push(item);
                }
                true
            }
            _ => false,
        }
    }

    /// Identity of a compound value; `None` for scalars, strings and bytes.
    pub fn id(&self) -> Option<ObjectId> {
        match self {
            Value::None
            | Value::Ellipsis
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Complex(..)
            | Value::Str(_)
            | Value::Bytes(_) => None,
            Value::ByteArray(rc) => Some(ObjectId::of(rc)),
            Value::Tuple(rc) => Some(ObjectId::of(rc)),
            Value::List(rc) => Some(ObjectId::of(rc)),
            Value::Set(rc) => Some(ObjectId::of(rc)),
            Value::FrozenSet(rc) => Some(ObjectId::of(rc)),
            Value::Dict(rc) => Some(ObjectId::of(rc)),
            Value::Code(rc) => Some(ObjectId::of(rc)),
            Value::Function(rc) => Some(ObjectId::of(rc)),
            Value::Builtin(rc) => Some(ObjectId::of(rc)),
            Value::Method(rc) => Some(ObjectId::of(rc)),
            Value::Module(rc) => Some(ObjectId::of(rc)),
            Value::Class(rc) => Some(ObjectId::of(rc)),
            Value::Instance(rc) => Some(ObjectId::of(rc)),
        }
    }

    /// Weak anchor on the allocation behind [`Value::id`].
    pub(crate) fn anchor(&self) -> Option<Anchor> {
        match self {
            Value::ByteArray(rc) => Some(Anchor::new(rc)),
            Value::Tuple(rc) => Some(Anchor::new(rc)),
            Value::List(rc) => Some(Anchor::new(rc)),
            Value::Set(rc) => Some(Anchor::new(rc)),
            Value::FrozenSet(rc) => Some(Anchor::new(rc)),
            Value::Dict(rc) => Some(Anchor::new(rc)),
            Value::Code(rc) => Some(Anchor::new(rc)),
            Value::Function(rc) => Some(Anchor::new(rc)),
            Value::Builtin(rc) => Some(Anchor::new(rc)),
            Value::Method(rc) => Some(Anchor::new(rc)),
            Value::Module(rc) => Some(Anchor::new(rc)),
            Value::Class(rc) => Some(Anchor::new(rc)),
            Value::Instance(rc) => Some(Anchor::new(rc)),
            _ => None,
        }
    }

    /// Method resolution order of the value's type, most derived first.
    pub fn mro(&self) -> &[TypeKey] {
        match self {
            Value::None => &NONE_MRO,
            Value::Ellipsis => &ELLIPSIS_MRO,
            Value::Bool(_) => &BOOL_MRO,
            Value::Int(_) => &INT_MRO,
            Value::Float(_) => &FLOAT_MRO,
            Value::Complex(..) => &COMPLEX_MRO,
            Value::Str(_) => &STR_MRO,
            Value::Bytes(_) => &BYTES_MRO,
            Value::ByteArray(_) => &BYTEARRAY_MRO,
            Value::Tuple(_) => &TUPLE_MRO,
            Value::List(_) => &LIST_MRO,
            Value::Set(_) => &SET_MRO,
            Value::FrozenSet(_) => &FROZENSET_MRO,
            Value::Dict(_) => &DICT_MRO,
            Value::Code(_) => &CODE_MRO,
            Value::Function(_) => &FUNCTION_MRO,
            Value::Builtin(_) => &BUILTIN_FUNCTION_MRO,
            Value::Method(_) => &METHOD_MRO,
            Value::Module(_) => &MODULE_MRO,
            Value::Class(_) => &TYPE_MRO,
            Value::Instance(instance) => instance.class.mro(),
        }
    }

    /// Key of the value's own type.
    pub fn type_key(&self) -> &TypeKey {
        &self.mro()[0]
    }

    /// Coarse category used in trace output.
    pub fn category(&self) -> &'static str {
        match self {
            Value::None
            | Value::Ellipsis
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Float(_)
            | Value::Complex(..)
            | Value::Str(_)
            | Value::Bytes(_)
            | Value::ByteArray(_) => "primitive",
            Value::Tuple(_) | Value::List(_) => "sequence",
            Value::Set(_) | Value::FrozenSet(_) => "set",
            Value::Dict(_) => "mapping",
            Value::Code(_) => "code",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin",
            Value::Method(_) => "method",
            Value::Module(_) => "module",
            Value::Class(_) => "class",
            Value::Instance(_) => "object",
        }
    }

    /// Key equality used for dict keys and set membership.
    ///
    /// Scalars, strings, bytes, tuples and frozensets compare by content;
    /// everything else compares by identity.
    pub fn key_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) | (Value::Ellipsis, Value::Ellipsis) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Complex(ar, ai), Value::Complex(br, bi)) => ar == br && ai == bi,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.key_eq(y))
            }
            (Value::FrozenSet(a), Value::FrozenSet(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.key_eq(y)))
            }
            _ => match (self.id(), other.id()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }

    /// Short, non-recursive description for log output, cut to `width` chars.
    pub fn describe(&self, width: usize) -> String {
        let full = match self {
            Value::None => "None".to_string(),
            Value::Ellipsis => "Ellipsis".to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(x) => format!("{x:?}"),
            Value::Complex(re, im) => format!("({re:?}+{im:?}j)"),
            Value::Str(s) => format!("{:?}", &**s),
            Value::Bytes(b) => format!("bytes(len={})", b.len()),
            Value::ByteArray(b) => {
                format!("bytearray(len={})", len_of(b.try_borrow().map(|b| b.len())))
            }
            Value::Tuple(items) => format!("tuple(len={})", items.len()),
            Value::List(items) => {
                format!("list(len={})", len_of(items.try_borrow().map(|v| v.len())))
            }
            Value::Set(items) => {
                format!("set(len={})", len_of(items.try_borrow().map(|v| v.len())))
            }
            Value::FrozenSet(items) => format!("frozenset(len={})", items.len()),
            Value::Dict(entries) => {
                format!("dict(len={})", len_of(entries.try_borrow().map(|v| v.len())))
            }
            Value::Code(code) => format!("<code {}>", code.name),
            Value::Function(function) => {
                format!("<function {}.{}>", function.module, function.qualname)
            }
            Value::Builtin(builtin) => format!("<built-in {}.{}>", builtin.module, builtin.name),
            Value::Method(method) => {
                format!("<bound method of {}>", method.receiver.type_key())
            }
            Value::Module(module) => format!("<module {}>", module.name),
            Value::Class(class) => format!("<class {}>", class.key),
            Value::Instance(instance) => format!("<{} object>", instance.class.key),
        };
        if full.chars().count() > width {
            let mut cut: String = full.chars().take(width).collect();
            cut.push_str("...");
            cut
        } else {
            full
        }
    }
}

fn len_of<E>(len: Result<usize, E>) -> String {
    len.map_or_else(|_| "?".to_string(), |n| n.to_string())
}

fn unique(items: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.iter().any(|existing| existing.key_eq(&item)) {
            out.push(item);
        }
    }
    out
}

fn insert_pair(entries: &mut Vec<(Value, Value)>, key: Value, value: Value) {
    match entries.iter_mut().find(|(existing, _)| existing.key_eq(&key)) {
        Some(slot) => slot.1 = value,
        None => entries.push((key, value)),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(usize::MAX))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<Rc<Class>> for Value {
    fn from(class: Rc<Class>) -> Self {
        Value::Class(class)
    }
}

impl From<Rc<Module>> for Value {
    fn from(module: Rc<Module>) -> Self {
        Value::Module(module)
    }
}

// ----------------------------------------------------------------------------
// Code, functions, methods
// ----------------------------------------------------------------------------

/// A compiled code object.
#[derive(Debug, Clone, Default)]
pub struct Code {
    pub name: String,
    /// Parameter names in declaration order.
    pub params: Vec<String>,
    pub consts: Vec<Value>,
    /// Global names the instructions load.
    pub names: Vec<String>,
    pub bytecode: Vec<u8>,
    /// Source file the code was compiled from.
    pub filename: PathBuf,
}

impl Code {
    pub fn new(name: impl Into<String>, bytecode: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytecode: bytecode.into(),
            ..Self::default()
        }
    }

    pub fn with_params<S: Into<String>>(mut self, params: impl IntoIterator<Item = S>) -> Self {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_consts(mut self, consts: impl IntoIterator<Item = Value>) -> Self {
        self.consts = consts.into_iter().collect();
        self
    }

    pub fn with_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = filename.into();
        self
    }
}

/// A user-defined function.
#[derive(Debug, Clone)]
pub struct Function {
    pub module: String,
    pub qualname: String,
    pub code: Rc<Code>,
    /// Free variables and the cells they are bound to.
    pub closure: Vec<(String, Cell)>,
    /// Namespace global names resolve in.
    pub globals: Option<Rc<Module>>,
}

impl Function {
    pub fn new(module: impl Into<String>, qualname: impl Into<String>, code: Code) -> Self {
        Self {
            module: module.into(),
            qualname: qualname.into(),
            code: Rc::new(code),
            closure: Vec::new(),
            globals: None,
        }
    }

    pub fn with_cell(mut self, name: impl Into<String>, cell: Cell) -> Self {
        self.closure.push((name.into(), cell));
        self
    }

    pub fn with_globals(mut self, module: &Rc<Module>) -> Self {
        self.globals = Some(Rc::clone(module));
        self
    }
}

/// A native function, known only by name.
#[derive(Debug, Clone)]
pub struct Builtin {
    pub module: String,
    pub name: String,
}

/// A function bound to a receiver.
#[derive(Debug, Clone)]
pub struct BoundMethod {
    pub receiver: Value,
    pub function: Value,
}

// ----------------------------------------------------------------------------
// Modules, classes, instances
// ----------------------------------------------------------------------------

/// A module and its attribute namespace.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub version: Option<String>,
    attrs: RefCell<Namespace>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            attrs: RefCell::new(Namespace::new()),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn set_attr(&self, name: impl Into<String>, value: Value) {
        self.attrs.borrow_mut().insert(name.into(), value);
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn attrs(&self) -> Ref<'_, Namespace> {
        self.attrs.borrow()
    }
}

/// A class: name, bases, linearized resolution order and class attributes.
pub struct Class {
    key: TypeKey,
    bases: Vec<Rc<Class>>,
    mro: Vec<TypeKey>,
    attrs: RefCell<Namespace>,
    frozen: bool,
    protocol: Rc<dyn ObjectProtocol>,
}

impl Class {
    pub fn builder(module: impl Into<String>, name: impl Into<String>) -> ClassBuilder {
        let module: String = module.into();
        let name: String = name.into();
        ClassBuilder {
            key: TypeKey::new(module, name),
            bases: Vec::new(),
            attrs: Namespace::new(),
            frozen: false,
            protocol: Rc::new(DefaultProtocol),
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn module(&self) -> &str {
        self.key.module()
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn bases(&self) -> &[Rc<Class>] {
        &self.bases
    }

    /// C3 linearization, starting with this class and ending with `object`.
    pub fn mro(&self) -> &[TypeKey] {
        &self.mro
    }

    /// Whether instances are declared immutable.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn protocol(&self) -> &dyn ObjectProtocol {
        &*self.protocol
    }

    pub fn set_attr(&self, name: impl Into<String>, value: Value) {
        self.attrs.borrow_mut().insert(name.into(), value);
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn attrs(&self) -> Ref<'_, Namespace> {
        self.attrs.borrow()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("key", &self.key)
            .field("mro", &self.mro)
            .field("frozen", &self.frozen)
            .finish_non_exhaustive()
    }
}

/// Builder returned by [`Class::builder`].
pub struct ClassBuilder {
    key: TypeKey,
    bases: Vec<Rc<Class>>,
    attrs: Namespace,
    frozen: bool,
    protocol: Rc<dyn ObjectProtocol>,
}

impl ClassBuilder {
    pub fn base(mut self, base: &Rc<Class>) -> Self {
        self.bases.push(Rc::clone(base));
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(name.into(), value);
        self
    }

    pub fn frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn protocol(mut self, protocol: impl ObjectProtocol + 'static) -> Self {
        self.protocol = Rc::new(protocol);
        self
    }

    pub fn build(self) -> Result<Rc<Class>, ClassError> {
        for (i, base) in self.bases.iter().enumerate() {
            if self.bases[..i].iter().any(|other| other.key == base.key) {
                return Err(ClassError::DuplicateBase(base.key.to_string()));
            }
        }
        let mro = linearize(&self.key, &self.bases)?;
        Ok(Rc::new(Class {
            key: self.key,
            bases: self.bases,
            mro,
            attrs: RefCell::new(self.attrs),
            frozen: self.frozen,
            protocol: self.protocol,
        }))
    }
}

/// C3 merge of the bases' linearizations and the base list itself.
fn linearize(key: &TypeKey, bases: &[Rc<Class>]) -> Result<Vec<TypeKey>, ClassError> {
    let mut seqs: Vec<Vec<TypeKey>> = bases.iter().map(|base| base.mro.clone()).collect();
    if bases.is_empty() {
        seqs.push(vec![TypeKey::OBJECT]);
    }
    seqs.push(bases.iter().map(|base| base.key.clone()).collect());

    let mut out = vec![key.clone()];
    loop {
        seqs.retain(|seq| !seq.is_empty());
        if seqs.is_empty() {
            return Ok(out);
        }
        let head = seqs
            .iter()
            .map(|seq| &seq[0])
            .find(|candidate| !seqs.iter().any(|seq| seq[1..].contains(*candidate)))
            .cloned()
            .ok_or_else(|| ClassError::InconsistentMro(key.to_string()))?;
        for seq in &mut seqs {
            if seq[0] == head {
                seq.remove(0);
            }
        }
        out.push(head);
    }
}

/// An instance of a class with its own attribute namespace.
#[derive(Debug)]
pub struct Instance {
    class: Rc<Class>,
    attrs: RefCell<Namespace>,
}

impl Instance {
    pub fn new(class: &Rc<Class>) -> Self {
        Self {
            class: Rc::clone(class),
            attrs: RefCell::new(Namespace::new()),
        }
    }

    pub fn with_attr(self, name: impl Into<String>, value: Value) -> Self {
        self.attrs.borrow_mut().insert(name.into(), value);
        self
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn set_attr(&self, name: impl Into<String>, value: Value) {
        self.attrs.borrow_mut().insert(name.into(), value);
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn attrs(&self) -> Ref<'_, Namespace> {
        self.attrs.borrow()
    }
}
