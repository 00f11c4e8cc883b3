//! Cache Key Module
//!
//! Turns a call's argument list into a stable, structurally compared key.
//!
//! Keys compare by value over the ordered positional arguments and the named
//! arguments, so two calls whose arguments merely *print* alike never share
//! an entry. Floats compare by bit pattern: `0.0` and `-0.0` are distinct
//! keys while a `NaN` argument still finds its own entry again.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::Serialize;

// == Argument Value ==
/// A single hashable argument value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Arg {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Arg>),
    Map(BTreeMap<String, Arg>),
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Arg::Null, Arg::Null) => true,
            (Arg::Bool(a), Arg::Bool(b)) => a == b,
            (Arg::Int(a), Arg::Int(b)) => a == b,
            (Arg::UInt(a), Arg::UInt(b)) => a == b,
            (Arg::Float(a), Arg::Float(b)) => a.to_bits() == b.to_bits(),
            (Arg::Str(a), Arg::Str(b)) => a == b,
            (Arg::Bytes(a), Arg::Bytes(b)) => a == b,
            (Arg::List(a), Arg::List(b)) => a == b,
            (Arg::Map(a), Arg::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Arg {}

impl Hash for Arg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Arg::Null => {}
            Arg::Bool(v) => v.hash(state),
            Arg::Int(v) => v.hash(state),
            Arg::UInt(v) => v.hash(state),
            Arg::Float(v) => v.to_bits().hash(state),
            Arg::Str(v) => v.hash(state),
            Arg::Bytes(v) => v.hash(state),
            Arg::List(v) => v.hash(state),
            Arg::Map(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Null => write!(f, "null"),
            Arg::Bool(v) => write!(f, "{}", v),
            Arg::Int(v) => write!(f, "{}", v),
            Arg::UInt(v) => write!(f, "{}", v),
            Arg::Float(v) => write!(f, "{:?}", v),
            Arg::Str(v) => write!(f, "{:?}", v),
            Arg::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Arg::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Arg::Map(items) => {
                write!(f, "{{")?;
                for (i, (k, v)) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// == Conversions ==
macro_rules! arg_from {
    ($variant:ident, $conv:ty => $($t:ty),+) => {
        $(
            impl From<$t> for Arg {
                fn from(v: $t) -> Self {
                    Arg::$variant(<$conv>::from(v))
                }
            }
        )+
    };
}

arg_from!(Int, i64 => i8, i16, i32, i64);
arg_from!(UInt, u64 => u8, u16, u32, u64);
arg_from!(Float, f64 => f32, f64);
arg_from!(Bool, bool => bool);
arg_from!(Str, String => String, &str);

impl From<usize> for Arg {
    fn from(v: usize) -> Self {
        Arg::UInt(v as u64)
    }
}

impl From<Vec<u8>> for Arg {
    fn from(v: Vec<u8>) -> Self {
        Arg::Bytes(v)
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(v: Option<T>) -> Self {
        v.map_or(Arg::Null, Into::into)
    }
}

impl From<serde_json::Value> for Arg {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Arg::Null,
            Value::Bool(b) => Arg::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Arg::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Arg::UInt(u)
                } else {
                    Arg::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Arg::Str(s),
            Value::Array(items) => Arg::List(items.into_iter().map(Arg::from).collect()),
            Value::Object(map) => {
                Arg::Map(map.into_iter().map(|(k, v)| (k, Arg::from(v))).collect())
            }
        }
    }
}

// == Call Arguments ==
/// The full argument list of one call: ordered positional arguments plus
/// named arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct CallArgs {
    pub positional: Vec<Arg>,
    pub named: BTreeMap<String, Arg>,
}

impl CallArgs {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an argument list from positional arguments only.
    pub fn positional<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Arg>,
    {
        Self {
            positional: args.into_iter().map(Into::into).collect(),
            named: BTreeMap::new(),
        }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Arg>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a named argument, replacing any previous value under `name`.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    /// Prepends an implicit receiver as the first positional argument.
    pub fn with_receiver(mut self, receiver: impl Into<Arg>) -> Self {
        self.positional.insert(0, receiver.into());
        self
    }

    /// Returns the positional argument at `index`, if any.
    pub fn get(&self, index: usize) -> Option<&Arg> {
        self.positional.get(index)
    }

    /// Returns the named argument `name`, if any.
    pub fn get_named(&self, name: &str) -> Option<&Arg> {
        self.named.get(name)
    }
}

impl fmt::Display for CallArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut first = true;
        for arg in &self.positional {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}", arg)?;
        }
        for (name, arg) in &self.named {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{}={}", name, arg)?;
        }
        write!(f, ")")
    }
}

// == Cache Key ==
/// Opaque identifier of a distinct argument set.
///
/// Holds the arguments themselves (shared, never copied) together with a
/// precomputed hash, so map probes hash once per call.
#[derive(Debug, Clone)]
pub struct CacheKey {
    hash: u64,
    args: Arc<CallArgs>,
}

impl CacheKey {
    /// The argument list this key was derived from.
    pub fn args(&self) -> &CallArgs {
        &self.args
    }

    pub(crate) fn shared_args(&self) -> Arc<CallArgs> {
        Arc::clone(&self.args)
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && (Arc::ptr_eq(&self.args, &other.args) || self.args == other.args)
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key{}", self.args)
    }
}

// == Derive Key ==
/// Derives the key for an argument list.
///
/// Pure and deterministic: equal argument lists yield equal keys for the
/// lifetime of the process.
pub fn derive_key(args: &CallArgs) -> CacheKey {
    into_key(args.clone())
}

/// Same as [`derive_key`] but takes ownership, avoiding a copy of the
/// arguments on the miss path.
pub(crate) fn into_key(args: CallArgs) -> CacheKey {
    let mut hasher = DefaultHasher::new();
    args.hash(&mut hasher);
    CacheKey {
        hash: hasher.finish(),
        args: Arc::new(args),
    }
}
