//! Modules, frozen according to the configured [`ModulePolicy`].

use super::{label, mismatch};
use crate::config::ModulePolicy;
use crate::error::FreezeError;
use crate::frozen::FrozenValue;
use crate::tracker::{Node, Parts};
use crate::value::Value;
use crate::walk::Walk;

pub fn freeze_module(value: &Value, walk: &mut Walk<'_>) -> Result<Node, FreezeError> {
    let Value::Module(module) = value else {
        return Err(mismatch(value, "a module"));
    };
    let config = walk.config();
    let name = FrozenValue::str(&module.name);
    match (config.module_policy, &module.version) {
        (ModulePolicy::Version, Some(version)) if config.uses_version_of(&module.name) => {
            Ok(Node::leaf(FrozenValue::tuple([
                label("module"),
                name,
                FrozenValue::str(version),
            ])))
        }
        (ModulePolicy::Name | ModulePolicy::Version, _) => {
            Ok(Node::leaf(FrozenValue::tuple([label("module"), name])))
        }
        (ModulePolicy::Contents, _) => {
            let attrs: Vec<(String, Value)> = module
                .attrs()
                .iter()
                .filter(|(attr, _)| {
                    !config.ignore_module_attrs.contains(attr.as_str())
                        && !config.ignores_global(&module.name, attr)
                })
                .map(|(attr, bound)| (attr.clone(), bound.clone()))
                .collect();
            let mut contents = Parts::new();
            for (attr, bound) in &attrs {
                let frozen = walk.freeze(bound)?;
                contents.push(Node::tuple([Node::leaf(FrozenValue::str(attr)), frozen]));
            }
            let mut parts = Parts::new();
            parts.push_leaf(label("module"));
            parts.push_leaf(name);
            parts.push(contents.into_set());
            Ok(parts.into_tuple())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, ModulePolicy};
    use crate::freezer::Freezer;
    use crate::frozen::FrozenValue;
    use crate::value::{Module, Value};

    fn numpy(version: &str, pi: f64) -> Value {
        let module = Module::new("numpy").with_version(version);
        module.set_attr("pi", Value::Float(pi));
        module.set_attr("__file__", Value::str("/site-packages/numpy/__init__.py"));
        Value::module(module)
    }

    fn with_policy(policy: ModulePolicy) -> Config {
        Config {
            module_policy: policy,
            ..Config::default()
        }
    }

    fn frozen(value: &Value, config: &Config) -> FrozenValue {
        Freezer::new().freeze_value(value, config).unwrap()
    }

    #[test]
    fn name_policy_ignores_everything_but_the_name() {
        let config = with_policy(ModulePolicy::Name);
        assert_eq!(frozen(&numpy("1.0", 3.5), &config), frozen(&numpy("2.0", 3.0), &config));
        assert_eq!(
            frozen(&numpy("1.0", 3.5), &config),
            FrozenValue::tuple([FrozenValue::str("module"), FrozenValue::str("numpy")])
        );
    }

    #[test]
    fn version_policy_tracks_the_version() {
        let config = with_policy(ModulePolicy::Version);
        assert_ne!(frozen(&numpy("1.0", 3.5), &config), frozen(&numpy("2.0", 3.5), &config));
        assert_eq!(frozen(&numpy("1.0", 3.5), &config), frozen(&numpy("1.0", 3.0), &config));
        let unversioned = Value::module(Module::new("numpy"));
        assert_eq!(
            frozen(&unversioned, &config),
            frozen(&unversioned, &with_policy(ModulePolicy::Name))
        );
    }

    #[test]
    fn version_exceptions_freeze_by_name() {
        let mut config = with_policy(ModulePolicy::Version);
        config.use_version_exceptions.insert("numpy".into());
        assert_eq!(frozen(&numpy("1.0", 3.5), &config), frozen(&numpy("2.0", 3.5), &config));
        assert_eq!(
            frozen(&numpy("1.0", 3.5), &config),
            FrozenValue::tuple([FrozenValue::str("module"), FrozenValue::str("numpy")])
        );

        let scipy = |version: &str| Value::module(Module::new("scipy").with_version(version));
        assert_ne!(frozen(&scipy("1.0"), &config), frozen(&scipy("1.1"), &config));
    }

    #[test]
    fn contents_policy_tracks_attributes_but_not_dunders() {
        let config = with_policy(ModulePolicy::Contents);
        assert_ne!(frozen(&numpy("1.0", 3.5), &config), frozen(&numpy("1.0", 3.0), &config));

        let other_file = numpy("1.0", 3.5);
        if let Value::Module(module) = &other_file {
            module.set_attr("__file__", Value::str("/elsewhere.py"));
        }
        assert_eq!(frozen(&numpy("1.0", 3.5), &config), frozen(&other_file, &config));
    }

    #[test]
    fn self_referencing_module_contents_terminate() {
        let module = std::rc::Rc::new(Module::new("app"));
        module.set_attr("me", Value::Module(module.clone()));
        let value = frozen(&Value::Module(module), &with_policy(ModulePolicy::Contents));
        assert!(value.to_string().contains("<backref 1>"));
    }
}
