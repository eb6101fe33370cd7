//! Freeze configuration.
//!
//! A [`Config`] is a plain value threaded through every recursive call. All
//! collections are ordered sets so that the configuration has a stable
//! fingerprint, which the [`crate::Freezer`] uses to notice configuration
//! changes between calls.

use crate::fingerprint::{put_bytes, Canonicalizable, HashValue, DOMAIN_CONFIG_V1};
use crate::value::{ObjectId, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How modules freeze.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModulePolicy {
    /// By name only.
    #[default]
    Name,
    /// By name and declared version.
    Version,
    /// By name and the frozen attribute namespace.
    Contents,
}

impl ModulePolicy {
    fn tag(self) -> u8 {
        match self {
            ModulePolicy::Name => 0,
            ModulePolicy::Version => 1,
            ModulePolicy::Contents => 2,
        }
    }
}

/// Freeze configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deepest nesting level allowed (the root is level 1); `None` disables the check.
    pub recursion_limit: Option<usize>,

    /// Freeze dicts as sets of pairs instead of ordered tuples.
    pub ignore_dict_order: bool,

    /// Return a 64-bit digest instead of the frozen tree.
    pub use_hash: bool,

    /// `(module, class, attribute)` triples omitted from object and class state.
    pub ignore_attributes: BTreeSet<(String, String, String)>,

    /// `(module, name)` globals omitted from functions and module contents.
    pub ignore_globals: BTreeSet<(String, String)>,

    /// `(module, function qualname, variable)` closure variables to omit.
    pub ignore_nonlocals: BTreeSet<(String, String, String)>,

    /// `(module, qualname)` functions frozen by name only.
    pub ignore_functions: BTreeSet<(String, String)>,

    /// `(module, qualname)` classes frozen by name only.
    pub ignore_classes: BTreeSet<(String, String)>,

    /// Modules whose classes are all frozen by name only.
    pub ignore_class_modules: BTreeSet<String>,

    /// Freeze every class by name only.
    pub ignore_all_classes: bool,

    /// `(module, qualname)` classes whose instances freeze to the class name.
    pub ignore_objects_by_class: BTreeSet<(String, String)>,

    /// Identities of single instances that freeze to their class name.
    ///
    /// Runtime only: never read from or written to TOML. Each object must stay
    /// alive while this configuration is in use, since a freed address can be
    /// handed to another object.
    #[serde(skip)]
    pub ignore_objects_by_id: BTreeSet<ObjectId>,

    /// Freeze every code object by name only.
    pub ignore_all_code: bool,

    /// Path prefixes whose code objects freeze by name only.
    pub ignore_code_files: BTreeSet<PathBuf>,

    /// Module attributes skipped under [`ModulePolicy::Contents`].
    pub ignore_module_attrs: BTreeSet<String>,

    /// Class attributes that are never frozen.
    pub special_class_attributes: BTreeSet<String>,

    pub module_policy: ModulePolicy,

    /// Modules frozen by name only even under [`ModulePolicy::Version`].
    pub use_version_exceptions: BTreeSet<String>,

    /// Width at which value descriptions in trace events are cut.
    pub log_width: usize,
}

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recursion_limit: Some(50),
            ignore_dict_order: false,
            use_hash: false,
            ignore_attributes: BTreeSet::new(),
            ignore_globals: BTreeSet::new(),
            ignore_nonlocals: BTreeSet::new(),
            ignore_functions: BTreeSet::new(),
            ignore_classes: BTreeSet::new(),
            ignore_class_modules: BTreeSet::new(),
            ignore_all_classes: false,
            ignore_objects_by_class: BTreeSet::new(),
            ignore_objects_by_id: BTreeSet::new(),
            ignore_all_code: false,
            ignore_code_files: BTreeSet::new(),
            ignore_module_attrs: names(&[
                "__builtins__",
                "__cached__",
                "__doc__",
                "__file__",
                "__loader__",
                "__spec__",
            ]),
            special_class_attributes: names(&[
                "__orig_bases__",
                "__dict__",
                "__weakref__",
                "__doc__",
                "__parameters__",
                "__slots__",
                "__slotnames__",
                "__mro_entries__",
                "__annotations__",
                "__hash__",
                "__module__",
            ]),
            module_policy: ModulePolicy::Name,
            use_version_exceptions: BTreeSet::new(),
            log_width: 250,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recursion_limit == Some(0) {
            return Err(ConfigError::Invalid(
                "recursion_limit must be at least 1 (omit it to disable the limit)".into(),
            ));
        }
        if self.log_width == 0 {
            return Err(ConfigError::Invalid("log_width must be at least 1".into()));
        }
        Ok(())
    }

    /// Stable fingerprint of every field.
    pub fn digest(&self) -> HashValue {
        self.fingerprint(DOMAIN_CONFIG_V1)
    }

    pub fn ignores_attribute(&self, module: &str, class: &str, attr: &str) -> bool {
        self.ignore_attributes
            .iter()
            .any(|(m, c, a)| m == module && c == class && a == attr)
    }

    pub fn ignores_global(&self, module: &str, name: &str) -> bool {
        self.ignore_globals.iter().any(|(m, n)| m == module && n == name)
    }

    pub fn ignores_nonlocal(&self, module: &str, function: &str, var: &str) -> bool {
        self.ignore_nonlocals
            .iter()
            .any(|(m, f, v)| m == module && f == function && v == var)
    }

    pub fn ignores_function(&self, module: &str, qualname: &str) -> bool {
        self.ignore_functions.iter().any(|(m, q)| m == module && q == qualname)
    }

    /// Whether the class freezes by name only.
    pub fn ignores_class(&self, module: &str, qualname: &str) -> bool {
        self.ignore_all_classes
            || self.ignore_class_modules.contains(module)
            || self.ignore_classes.iter().any(|(m, q)| m == module && q == qualname)
    }

    pub fn ignores_objects_of(&self, module: &str, qualname: &str) -> bool {
        self.ignore_objects_by_class
            .iter()
            .any(|(m, q)| m == module && q == qualname)
    }

    /// Adds `value` to [`Config::ignore_objects_by_id`]. Returns false for
    /// values without identity.
    pub fn ignore_object(&mut self, value: &Value) -> bool {
        match value.id() {
            Some(id) => {
                self.ignore_objects_by_id.insert(id);
                true
            }
            None => false,
        }
    }

    pub fn ignores_object(&self, value: &Value) -> bool {
        value
            .id()
            .is_some_and(|id| self.ignore_objects_by_id.contains(&id))
    }

    /// Whether a module with a declared version freezes with it.
    pub fn uses_version_of(&self, module: &str) -> bool {
        self.module_policy == ModulePolicy::Version && !self.use_version_exceptions.contains(module)
    }

    /// Whether code compiled from `filename` freezes by name only.
    pub fn ignores_code_file(&self, filename: &Path) -> bool {
        self.ignore_all_code
            || self
                .ignore_code_files
                .iter()
                .any(|prefix| filename.starts_with(prefix))
    }
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u64).to_le_bytes());
}

fn put_str(out: &mut Vec<u8>, s: &str) {
    put_bytes(out, s.as_bytes());
}

impl Canonicalizable for Config {
    fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(512);
        match self.recursion_limit {
            Some(limit) => {
                out.push(1);
                put_len(&mut out, limit);
            }
            None => out.push(0),
        }
        out.push(u8::from(self.ignore_dict_order));
        out.push(u8::from(self.use_hash));
        out.push(u8::from(self.ignore_all_classes));
        out.push(u8::from(self.ignore_all_code));
        out.push(self.module_policy.tag());
        put_len(&mut out, self.log_width);

        for set in [&self.ignore_attributes, &self.ignore_nonlocals] {
            put_len(&mut out, set.len());
            for (a, b, c) in set {
                put_str(&mut out, a);
                put_str(&mut out, b);
                put_str(&mut out, c);
            }
        }
        for set in [
            &self.ignore_globals,
            &self.ignore_functions,
            &self.ignore_classes,
            &self.ignore_objects_by_class,
        ] {
            put_len(&mut out, set.len());
            for (a, b) in set {
                put_str(&mut out, a);
                put_str(&mut out, b);
            }
        }
        put_len(&mut out, self.ignore_objects_by_id.len());
        for id in &self.ignore_objects_by_id {
            put_len(&mut out, id.addr());
        }
        put_len(&mut out, self.ignore_code_files.len());
        for path in &self.ignore_code_files {
            put_str(&mut out, &path.to_string_lossy());
        }
        for set in [
            &self.ignore_class_modules,
            &self.ignore_module_attrs,
            &self.special_class_attributes,
            &self.use_version_exceptions,
        ] {
            put_len(&mut out, set.len());
            for name in set {
                put_str(&mut out, name);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.recursion_limit, Some(50));
        assert!(!config.use_hash);
        assert_eq!(config.module_policy, ModulePolicy::Name);
        assert!(config.special_class_attributes.contains("__module__"));
        assert!(config.ignore_module_attrs.contains("__file__"));
        config.validate().unwrap();
    }

    #[test]
    fn parse_partial_toml() {
        let toml = r#"
            recursion_limit = 10
            ignore_dict_order = true
            module_policy = "contents"
            ignore_attributes = [["shapes", "Point", "cache"]]
            ignore_code_files = ["/usr/lib/stdlib"]
            use_version_exceptions = ["numpy"]
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.recursion_limit, Some(10));
        assert!(config.ignore_dict_order);
        assert_eq!(config.module_policy, ModulePolicy::Contents);
        assert!(config.ignores_attribute("shapes", "Point", "cache"));
        assert!(!config.ignores_attribute("shapes", "Point", "x"));
        assert!(config.ignores_code_file(Path::new("/usr/lib/stdlib/os.py")));
        assert!(!config.ignores_code_file(Path::new("/home/me/app.py")));
        assert_eq!(config.log_width, 250);
        assert!(config.use_version_exceptions.contains("numpy"));
        assert!(config.ignore_objects_by_id.is_empty());
    }

    #[test]
    fn zero_limit_is_invalid() {
        let err = Config::from_toml_str("recursion_limit = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = Config::from_toml_str("recursion_limit = \"deep\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "use_hash = true").unwrap();
        let config = Config::from_file(file.path()).unwrap();
        assert!(config.use_hash);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::from_file("/nonexistent/deepfreeze.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn digest_tracks_every_field() {
        let base = Config::default();
        assert_eq!(base.digest(), Config::default().digest());

        let mut ordered = base.clone();
        ordered.ignore_dict_order = true;
        assert_ne!(base.digest(), ordered.digest());

        let mut ignored = base.clone();
        ignored
            .ignore_globals
            .insert(("app".to_string(), "counter".to_string()));
        assert_ne!(base.digest(), ignored.digest());

        let mut excepted = base.clone();
        excepted.use_version_exceptions.insert("numpy".into());
        assert_ne!(base.digest(), excepted.digest());

        let mut unlimited = base.clone();
        unlimited.recursion_limit = None;
        assert_ne!(base.digest(), unlimited.digest());
    }

    #[test]
    fn class_ignores_cover_modules_and_flag() {
        let mut config = Config::default();
        config.ignore_class_modules.insert("threading".into());
        assert!(config.ignores_class("threading", "Lock"));
        assert!(!config.ignores_class("app", "Model"));
        config.ignore_all_classes = true;
        assert!(config.ignores_class("app", "Model"));
    }

    #[test]
    fn objects_are_ignored_by_identity() {
        let target = Value::list([]);
        let twin = Value::list([]);
        let mut config = Config::default();
        let before = config.digest();
        assert!(config.ignore_object(&target));
        assert!(!config.ignore_object(&Value::Int(1)));
        assert!(config.ignores_object(&target));
        assert!(config.ignores_object(&target.clone()));
        assert!(!config.ignores_object(&twin));
        assert_ne!(before, config.digest());
    }

    #[test]
    fn version_exceptions_only_apply_to_the_version_policy() {
        let mut config = Config::default();
        config.use_version_exceptions.insert("numpy".into());
        assert!(!config.uses_version_of("scipy"));
        config.module_policy = ModulePolicy::Version;
        assert!(config.uses_version_of("scipy"));
        assert!(!config.uses_version_of("numpy"));
    }
}
