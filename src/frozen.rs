//! The canonical output of freezing.
//!
//! A [`FrozenValue`] is built only from scalars, ordered tuples, sorted sets and
//! back-reference tokens. It carries no pointer, identity number or live
//! reference to the value it was computed from, so two processes freezing the
//! same logical value produce byte-identical encodings.

use crate::fingerprint::{put_bytes, Canonicalizable, HashValue, DOMAIN_FROZEN_VALUE_V1};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Bit pattern every NaN is normalized to.
const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

/// A float stored by its IEEE-754 bits.
///
/// Equality, hashing and ordering are over the bits, which makes them total.
/// `0.0` and `-0.0` are distinct; all NaNs are equal.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrozenFloat(u64);

impl FrozenFloat {
    /// Canonicalizes `value`.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            Self(CANONICAL_NAN)
        } else {
            Self(value.to_bits())
        }
    }

    /// Returns the float.
    pub fn get(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Returns the canonical bits.
    pub fn to_bits(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for FrozenFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.get())
    }
}

/// Recursively immutable, hashable, totally ordered fingerprint tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FrozenValue {
    /// The none value.
    None,
    /// The ellipsis singleton.
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(FrozenFloat),
    Str(String),
    Bytes(Vec<u8>),
    /// Ordered sequence.
    Tuple(Vec<FrozenValue>),
    /// Unordered collection, kept sorted.
    Set(BTreeSet<FrozenValue>),
    /// Occurrence of a value that was still being frozen higher up.
    ///
    /// The payload counts ancestor frames from the occurrence to the
    /// referenced value; `1` is the immediate parent.
    BackRef(u32),
}

impl FrozenValue {
    /// Shorthand for a string scalar.
    pub fn str(value: impl Into<String>) -> Self {
        FrozenValue::Str(value.into())
    }

    /// Shorthand for a tuple.
    pub fn tuple(items: impl IntoIterator<Item = FrozenValue>) -> Self {
        FrozenValue::Tuple(items.into_iter().collect())
    }

    /// Shorthand for a set.
    pub fn set(items: impl IntoIterator<Item = FrozenValue>) -> Self {
        FrozenValue::Set(items.into_iter().collect())
    }

    /// Shorthand for a float.
    pub fn float(value: f64) -> Self {
        FrozenValue::Float(FrozenFloat::new(value))
    }

    /// Returns the category name used by diff reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FrozenValue::None => "NoneType",
            FrozenValue::Ellipsis => "ellipsis",
            FrozenValue::Bool(_) => "bool",
            FrozenValue::Int(_) => "int",
            FrozenValue::Float(_) => "float",
            FrozenValue::Str(_) => "str",
            FrozenValue::Bytes(_) => "bytes",
            FrozenValue::Tuple(_) => "tuple",
            FrozenValue::Set(_) => "frozenset",
            FrozenValue::BackRef(_) => "backref",
        }
    }

    /// Returns the elements of a tuple, if this is one.
    pub fn as_tuple(&self) -> Option<&[FrozenValue]> {
        match self {
            FrozenValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the elements of a set, if this is one.
    pub fn as_set(&self) -> Option<&BTreeSet<FrozenValue>> {
        match self {
            FrozenValue::Set(items) => Some(items),
            _ => None,
        }
    }

    /// Quoted representation, used where a value names a key.
    pub fn repr(&self) -> String {
        match self {
            FrozenValue::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }

    /// Domain-separated SHA-256 of the canonical encoding.
    pub fn digest(&self) -> HashValue {
        Canonicalizable::fingerprint(self, DOMAIN_FROZEN_VALUE_V1)
    }

    /// Serializes to CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }

    /// Deserializes from CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, serde_cbor::Error> {
        serde_cbor::from_slice(bytes)
    }

    fn write_canonical(&self, out: &mut Vec<u8>) {
        match self {
            FrozenValue::None => out.push(0x00),
            FrozenValue::Ellipsis => out.push(0x01),
            FrozenValue::Bool(b) => {
                out.push(0x02);
                out.push(u8::from(*b));
            }
            FrozenValue::Int(i) => {
                out.push(0x03);
                out.extend_from_slice(&i.to_le_bytes());
            }
            FrozenValue::Float(x) => {
                out.push(0x04);
                out.extend_from_slice(&x.to_bits().to_le_bytes());
            }
            FrozenValue::Str(s) => {
                out.push(0x05);
                put_bytes(out, s.as_bytes());
            }
            FrozenValue::Bytes(b) => {
                out.push(0x06);
                put_bytes(out, b);
            }
            FrozenValue::Tuple(items) => {
                out.push(0x07);
                out.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.write_canonical(out);
                }
            }
            FrozenValue::Set(items) => {
                // BTreeSet iterates in sorted order, so no extra sort is needed.
                out.push(0x08);
                out.extend_from_slice(&(items.len() as u64).to_le_bytes());
                for item in items {
                    item.write_canonical(out);
                }
            }
            FrozenValue::BackRef(n) => {
                out.push(0x09);
                out.extend_from_slice(&n.to_le_bytes());
            }
        }
    }
}

impl Canonicalizable for FrozenValue {
    fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(64);
        self.write_canonical(&mut out);
        out
    }
}

/// Plain rendering used in diff summaries (strings unquoted at the top level).
impl fmt::Display for FrozenValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrozenValue::None => write!(f, "None"),
            FrozenValue::Ellipsis => write!(f, "Ellipsis"),
            FrozenValue::Bool(true) => write!(f, "True"),
            FrozenValue::Bool(false) => write!(f, "False"),
            FrozenValue::Int(i) => write!(f, "{i}"),
            FrozenValue::Float(x) => write!(f, "{:?}", x.get()),
            FrozenValue::Str(s) => write!(f, "{s}"),
            FrozenValue::Bytes(b) => {
                write!(f, "b'")?;
                for byte in b {
                    match byte {
                        b'\\' => write!(f, "\\\\")?,
                        b'\'' => write!(f, "\\'")?,
                        0x20..=0x7e => write!(f, "{}", *byte as char)?,
                        _ => write!(f, "\\x{byte:02x}")?,
                    }
                }
                write!(f, "'")
            }
            FrozenValue::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            FrozenValue::Set(items) => {
                write!(f, "frozenset({{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "}})")
            }
            FrozenValue::BackRef(n) => write!(f, "<backref {n}>"),
        }
    }
}
