//! Locating where two frozen values diverge.
//!
//! The walk descends both trees in lockstep and reports each point of
//! divergence as a pair of [`ObjectLocation`]s. A location's labels read as an
//! access path from the root (`obj0[4].keys().has()`), and its objects are the
//! frozen values met along the way, ending with the one that differs.
//!
//! Tuples and sets whose elements are all pairs are compared as mappings, so
//! dictionaries frozen with or without `ignore_dict_order` report by key
//! rather than by position.

use crate::config::{Config, ConfigError};
use crate::error::FreezeError;
use crate::freezer::with_default;
use crate::frozen::FrozenValue;
use crate::value::Value;
use std::collections::BTreeMap;

/// Stand-in for a set member that exists on the other side only.
pub const NO_SUCH_ELEMENT: &str = "no such element";

/// An access path into a frozen value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub labels: Vec<String>,
    pub objects: Vec<FrozenValue>,
}

impl ObjectLocation {
    /// Root location named `obj{index}`.
    pub fn root(index: usize, value: FrozenValue) -> Self {
        Self {
            labels: vec![format!("obj{index}")],
            objects: vec![value],
        }
    }

    /// Extends the path by one step.
    pub fn append(&self, label: impl Into<String>, value: FrozenValue) -> Self {
        let mut next = self.clone();
        next.labels.push(label.into());
        next.objects.push(value);
        next
    }

    /// The value at the end of the path.
    pub fn tail(&self) -> &FrozenValue {
        // Locations are only built through `root` and `append`.
        &self.objects[self.objects.len() - 1]
    }

    /// Labels after the root name.
    pub fn steps(&self) -> &[String] {
        &self.labels[1..]
    }
}

/// One point of divergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub left: ObjectLocation,
    pub right: ObjectLocation,
}

/// True for a non-empty tuple or set made only of pairs.
pub fn is_frozen_dict(value: &FrozenValue) -> bool {
    let is_pair = |item: &FrozenValue| item.as_tuple().is_some_and(|pair| pair.len() == 2);
    match value {
        FrozenValue::Tuple(items) => !items.is_empty() && items.iter().all(is_pair),
        FrozenValue::Set(items) => !items.is_empty() && items.iter().all(is_pair),
        _ => false,
    }
}

/// Every point where `left` and `right` diverge, in walk order.
pub fn iterate_diffs_of_frozen(
    left: &FrozenValue,
    right: &FrozenValue,
) -> impl Iterator<Item = Difference> {
    let mut out = Vec::new();
    find_diffs(
        ObjectLocation::root(0, left.clone()),
        ObjectLocation::root(1, right.clone()),
        &mut out,
    );
    out.into_iter()
}

/// Human-readable report of [`iterate_diffs_of_frozen`].
///
/// When every difference sits below a common path, `let` lines name that path
/// and the report continues relative to it. Equal values report
/// `no differences`.
pub fn summarize_diffs_of_frozen(left: &FrozenValue, right: &FrozenValue) -> String {
    let differences: Vec<Difference> = iterate_diffs_of_frozen(left, right).collect();
    let Some(first) = differences.first() else {
        return "no differences".to_string();
    };

    let mut common = first.left.steps().len();
    for difference in &differences {
        common = common
            .min(common_prefix(first.left.steps(), difference.left.steps()))
            .min(common_prefix(first.left.steps(), difference.right.steps()));
    }
    let prefix = first.left.steps()[..common].concat();

    let mut lines = Vec::with_capacity(differences.len() * 2 + 2);
    if !prefix.is_empty() {
        lines.push(format!("let obj0_sub = obj0{prefix}"));
        lines.push(format!("let obj1_sub = obj1{prefix}"));
    }
    for difference in &differences {
        let path = difference.left.steps()[common..].concat();
        lines.push(format!("obj0_sub{path} == {}", difference.left.tail()));
        lines.push(format!("obj1_sub{path} == {}", difference.right.tail()));
    }
    lines.join("\n")
}

/// Freezes both values under `config` and lists their differences.
///
/// Fails when `config.use_hash` is set, since digests carry no structure.
pub fn iterate_diffs(
    left: &Value,
    right: &Value,
    config: &Config,
) -> Result<Vec<Difference>, FreezeError> {
    let (left, right) = freeze_pair(left, right, config)?;
    Ok(iterate_diffs_of_frozen(&left, &right).collect())
}

/// Freezes both values under `config` and summarizes their differences.
pub fn summarize_diffs(
    left: &Value,
    right: &Value,
    config: &Config,
) -> Result<String, FreezeError> {
    let (left, right) = freeze_pair(left, right, config)?;
    Ok(summarize_diffs_of_frozen(&left, &right))
}

fn freeze_pair(
    left: &Value,
    right: &Value,
    config: &Config,
) -> Result<(FrozenValue, FrozenValue), FreezeError> {
    if config.use_hash {
        let reason = "diffs need a config with use_hash = false".to_string();
        return Err(ConfigError::Invalid(reason).into());
    }
    with_default(|freezer| -> Result<_, FreezeError> {
        let left = freezer.freeze_value(left, config)?;
        let right = freezer.freeze_value(right, config)?;
        Ok((left, right))
    })?
}

fn common_prefix(a: &[String], b: &[String]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn find_diffs(left: ObjectLocation, right: ObjectLocation, out: &mut Vec<Difference>) {
    let scalars_differ = match (left.tail(), right.tail()) {
        (l, r) if l.kind() != r.kind() => {
            let (lk, rk) = (l.kind(), r.kind());
            out.push(Difference {
                left: left.append(".__class__", FrozenValue::str(lk)),
                right: right.append(".__class__", FrozenValue::str(rk)),
            });
            false
        }
        (l, r) if is_frozen_dict(l) && is_frozen_dict(r) => {
            find_mapping_diffs(&left, &right, out);
            false
        }
        (FrozenValue::Tuple(l), FrozenValue::Tuple(r)) => {
            if l.len() != r.len() {
                out.push(Difference {
                    left: left.append(".__len__()", FrozenValue::Int(l.len() as i64)),
                    right: right.append(".__len__()", FrozenValue::Int(r.len() as i64)),
                });
            }
            for (idx, (l, r)) in l.iter().zip(r).enumerate() {
                let label = format!("[{idx}]");
                find_diffs(
                    left.append(label.clone(), l.clone()),
                    right.append(label, r.clone()),
                    out,
                );
            }
            false
        }
        (FrozenValue::Set(l), FrozenValue::Set(r)) => {
            let missing = FrozenValue::str(NO_SUCH_ELEMENT);
            for elem in l.difference(r) {
                out.push(Difference {
                    left: left.append(".has()", elem.clone()),
                    right: right.append(".has()", missing.clone()),
                });
            }
            for elem in r.difference(l) {
                out.push(Difference {
                    left: left.append(".has()", missing.clone()),
                    right: right.append(".has()", elem.clone()),
                });
            }
            false
        }
        (l, r) => l != r,
    };
    if scalars_differ {
        out.push(Difference { left, right });
    }
}

fn find_mapping_diffs(left: &ObjectLocation, right: &ObjectLocation, out: &mut Vec<Difference>) {
    let l = as_mapping(left.tail());
    let r = as_mapping(right.tail());
    let l_keys = FrozenValue::set(l.keys().map(|key| (*key).clone()));
    let r_keys = FrozenValue::set(r.keys().map(|key| (*key).clone()));
    find_diffs(left.append(".keys()", l_keys), right.append(".keys()", r_keys), out);
    for (key, l_item) in &l {
        if let Some(r_item) = r.get(key) {
            let label = format!("[{}]", key.repr());
            find_diffs(
                left.append(label.clone(), (*l_item).clone()),
                right.append(label, (*r_item).clone()),
                out,
            );
        }
    }
}

fn as_mapping(value: &FrozenValue) -> BTreeMap<&FrozenValue, &FrozenValue> {
    let pairs: Box<dyn Iterator<Item = &FrozenValue>> = match value {
        FrozenValue::Tuple(items) => Box::new(items.iter()),
        FrozenValue::Set(items) => Box::new(items.iter()),
        _ => Box::new(std::iter::empty()),
    };
    pairs
        .filter_map(FrozenValue::as_tuple)
        .filter_map(|pair| match pair {
            [key, item] => Some((key, item)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(config: &Config, items: Vec<Value>) -> FrozenValue {
        crate::freezer::Freezer::new()
            .freeze_value(&Value::list(items), config)
            .unwrap()
    }

    fn dict(pairs: &[(&str, i64)]) -> Value {
        Value::dict(pairs.iter().map(|(k, v)| (Value::str(k), Value::Int(*v))))
    }

    fn ints(items: &[i64]) -> Vec<Value> {
        items.iter().map(|&i| Value::Int(i)).collect()
    }

    fn pair() -> (FrozenValue, FrozenValue) {
        let config = Config {
            ignore_dict_order: true,
            ..Config::default()
        };
        let left = sample(
            &config,
            vec![
                Value::Int(0),
                Value::Int(1),
                Value::Int(2),
                Value::set(ints(&[3, 4])),
                dict(&[("a", 5), ("b", 6), ("c", 7)]),
                Value::Int(8),
            ],
        );
        let right = sample(
            &config,
            vec![
                Value::Int(0),
                Value::Int(8),
                Value::Int(2),
                Value::set(ints(&[3, 5])),
                dict(&[("a", 5), ("b", 7), ("d", 8)]),
            ],
        );
        (left, right)
    }

    #[test]
    fn reports_each_divergence_with_its_path() {
        let (left, right) = pair();
        let labels: Vec<Vec<String>> = iterate_diffs_of_frozen(&left, &right)
            .map(|difference| difference.left.labels)
            .collect();
        let expected: Vec<Vec<&str>> = vec![
            vec!["obj0", ".__len__()"],
            vec!["obj0", "[1]"],
            vec!["obj0", "[3]", ".has()"],
            vec!["obj0", "[3]", ".has()"],
            vec!["obj0", "[4]", ".keys()", ".has()"],
            vec!["obj0", "[4]", ".keys()", ".has()"],
            vec!["obj0", "[4]", "['b']"],
        ];
        assert_eq!(labels, expected);
    }

    #[test]
    fn summary_lists_both_sides() {
        let (left, right) = pair();
        let summary = summarize_diffs_of_frozen(&left, &right);
        assert_eq!(
            summary.split('\n').collect::<Vec<_>>(),
            vec![
                "obj0_sub.__len__() == 6",
                "obj1_sub.__len__() == 5",
                "obj0_sub[1] == 1",
                "obj1_sub[1] == 8",
                "obj0_sub[3].has() == 4",
                "obj1_sub[3].has() == no such element",
                "obj0_sub[3].has() == no such element",
                "obj1_sub[3].has() == 5",
                "obj0_sub[4].keys().has() == c",
                "obj1_sub[4].keys().has() == no such element",
                "obj0_sub[4].keys().has() == no such element",
                "obj1_sub[4].keys().has() == d",
                "obj0_sub[4]['b'] == 6",
                "obj1_sub[4]['b'] == 7",
            ]
        );
    }

    #[test]
    fn shared_prefix_becomes_let_bindings() {
        let triple = |middle| {
            FrozenValue::tuple([FrozenValue::tuple([
                FrozenValue::Int(1),
                FrozenValue::Int(middle),
                FrozenValue::Int(3),
            ])])
        };
        let left = triple(2);
        let right = triple(9);
        assert_eq!(
            summarize_diffs_of_frozen(&left, &right),
            "let obj0_sub = obj0[0][1]\nlet obj1_sub = obj1[0][1]\nobj0_sub == 2\nobj1_sub == 9"
        );
    }

    #[test]
    fn kind_mismatch_is_reported_as_class() {
        let differences: Vec<_> =
            iterate_diffs_of_frozen(&FrozenValue::Int(1), &FrozenValue::str("1")).collect();
        assert_eq!(differences.len(), 1);
        assert_eq!(differences[0].left.labels, vec!["obj0", ".__class__"]);
        assert_eq!(differences[0].left.tail(), &FrozenValue::str("int"));
        assert_eq!(differences[0].right.tail(), &FrozenValue::str("str"));
    }

    #[test]
    fn equal_values_have_no_differences() {
        let (left, _) = pair();
        assert_eq!(summarize_diffs_of_frozen(&left, &left.clone()), "no differences");
    }

    #[test]
    fn frozen_dict_detection() {
        let pair = FrozenValue::tuple([FrozenValue::Int(1), FrozenValue::Int(2)]);
        assert!(is_frozen_dict(&FrozenValue::tuple([pair.clone()])));
        assert!(is_frozen_dict(&FrozenValue::set([pair.clone()])));
        assert!(!is_frozen_dict(&FrozenValue::tuple([])));
        assert!(!is_frozen_dict(&FrozenValue::tuple([pair, FrozenValue::Int(3)])));
    }

    #[test]
    fn raw_values_are_frozen_first() {
        let config = Config::default();
        let summary =
            summarize_diffs(&Value::list(ints(&[1, 2])), &Value::list(ints(&[1, 3])), &config)
                .unwrap();
        assert_eq!(
            summary,
            "let obj0_sub = obj0[1]\nlet obj1_sub = obj1[1]\nobj0_sub == 2\nobj1_sub == 3"
        );
        assert_eq!(iterate_diffs(&Value::Int(1), &Value::Int(1), &config).unwrap().len(), 0);
    }

    #[test]
    fn hashing_config_is_rejected() {
        let config = Config {
            use_hash: true,
            ..Config::default()
        };
        let err = summarize_diffs(&Value::Int(1), &Value::Int(2), &config).unwrap_err();
        assert!(matches!(err, FreezeError::Config(ConfigError::Invalid(_))));
    }
}
