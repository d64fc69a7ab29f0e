mod compare;

pub use compare::{canonical_cmp, strict_order_cmp};

use crate::error::GridError;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Value
///
/// Owned cell value. `Null` is the store null sentinel; two null-equivalent
/// values never produce a ledger entry when one replaces the other.
///

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "[NULL]"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v}"),
            Self::Blob(v) => write!(f, "[BLOB:{}]", v.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

///
/// DisplayFormat
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DisplayFormat {
    Ui,
    Edit,
    Native,
}

///
/// ValueHandler
///
/// Per-column value semantics: null testing, conversion of foreign objects
/// into storable values, display rendering, and release of owned resources
/// (streamed content) when a value is discarded.
///

pub trait ValueHandler: Send + Sync {
    fn is_null(&self, value: &Value) -> bool {
        value.is_null()
    }

    fn value_from_object(&self, source: &Value) -> Result<Value, GridError> {
        Ok(source.clone())
    }

    fn value_from_clipboard(&self, text: &str) -> Result<Value, GridError> {
        Ok(Value::Text(text.to_owned()))
    }

    fn display_string(&self, value: &Value, format: DisplayFormat) -> String {
        match format {
            DisplayFormat::Ui | DisplayFormat::Edit | DisplayFormat::Native => value.to_string(),
        }
    }

    /// Release any resource owned by a value that is about to be discarded.
    fn release(&self, value: &mut Value) {
        let _ = value;
    }
}

///
/// DefaultValueHandler
/// Plain value semantics with no owned resources.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultValueHandler;

impl ValueHandler for DefaultValueHandler {}
