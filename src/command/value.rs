//! Values exchanged with the host on synchronous calls
//!
//! Commands only carry strings and handles. Method calls that need an answer
//! from the host (layout queries, `toBlob`, ...) use [`NativeValue`] for both
//! arguments and the result.

use super::item::NativeString;
use crate::native::NativeHandle;
use std::fmt;

/// Value crossing the bridge on a synchronous call
#[derive(Debug, Clone, PartialEq, Default)]
pub enum NativeValue {
    #[default]
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(NativeString),
    /// JSON text, passed through untouched
    Json(NativeString),
    /// Reference to a native object of the calling context
    Handle(NativeHandle),
    List(Vec<NativeValue>),
}

impl NativeValue {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, NativeValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NativeValue::Int64(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers widen to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            NativeValue::Float64(n) => Some(*n),
            NativeValue::Int64(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NativeValue::String(s) | NativeValue::Json(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<NativeHandle> {
        match self {
            NativeValue::Handle(h) => Some(*h),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            NativeValue::Null => "null",
            NativeValue::Bool(_) => "bool",
            NativeValue::Int64(_) => "int64",
            NativeValue::Float64(_) => "float64",
            NativeValue::String(_) => "string",
            NativeValue::Json(_) => "json",
            NativeValue::Handle(_) => "handle",
            NativeValue::List(_) => "list",
        }
    }
}

impl From<bool> for NativeValue {
    fn from(b: bool) -> Self {
        NativeValue::Bool(b)
    }
}

impl From<i64> for NativeValue {
    fn from(n: i64) -> Self {
        NativeValue::Int64(n)
    }
}

impl From<f64> for NativeValue {
    fn from(n: f64) -> Self {
        NativeValue::Float64(n)
    }
}

impl From<&str> for NativeValue {
    fn from(s: &str) -> Self {
        NativeValue::String(s.into())
    }
}

impl From<NativeHandle> for NativeValue {
    fn from(h: NativeHandle) -> Self {
        NativeValue::Handle(h)
    }
}

impl fmt::Display for NativeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeValue::Null => write!(f, "null"),
            NativeValue::Bool(b) => write!(f, "{}", b),
            NativeValue::Int64(n) => write!(f, "{}", n),
            NativeValue::Float64(n) => write!(f, "{}", n),
            NativeValue::String(s) => write!(f, "{:?}", s),
            NativeValue::Json(s) => write!(f, "{}", s),
            NativeValue::Handle(h) => write!(f, "{}", h),
            NativeValue::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
        }
    }
}
