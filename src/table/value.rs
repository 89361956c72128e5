use crate::ArcStr;
use chrono::NaiveDateTime;
use std::fmt;

/// Timestamp format used by the admissions and event extracts.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Cell contents that are read as missing, in addition to the empty string.
const NA_MARKERS: [&str; 5] = ["NA", "NaN", "nan", "NULL", "null"];

pub(crate) fn is_na(raw: &str) -> bool {
    raw.is_empty() || NA_MARKERS.contains(&raw)
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    /// Always finite.
    Float(f64),
    DateTime(NaiveDateTime),
    Text(ArcStr),
}

impl Value {
    pub fn text(s: impl Into<ArcStr>) -> Self {
        Value::Text(s.into())
    }

    /// Parse a raw cell on its own.
    ///
    /// A number or timestamp is only recognised when it is written exactly the way it would be
    /// written back out, so `007` and `0.50` stay text. Rendering a parsed value therefore always
    /// gives back the raw cell, whichever type its column ends up with.
    pub fn parse(raw: &str) -> Self {
        if is_na(raw) {
            return Value::Null;
        }
        if let Ok(v) = raw.parse::<i64>() {
            if v.to_string() == raw {
                return Value::Int(v);
            }
        }
        if let Ok(v) = raw.parse::<f64>() {
            if v.is_finite() && v.to_string() == raw {
                return Value::Float(v);
            }
        }
        if let Ok(v) = NaiveDateTime::parse_from_str(raw, DATETIME_FORMAT) {
            if v.format(DATETIME_FORMAT).to_string() == raw {
                return Value::DateTime(v);
            }
        }
        Value::Text(raw.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn ty(&self) -> ColumnType {
        match self {
            Value::Null => ColumnType::Null,
            Value::Int(_) => ColumnType::Int,
            Value::Float(_) => ColumnType::Float,
            Value::DateTime(_) => ColumnType::DateTime,
            Value::Text(_) => ColumnType::Text,
        }
    }

    /// The canonical form of this value when it is (part of) a join key.
    ///
    /// Integral floats collapse onto the integers, so `100` and `100.0` are the same key. `Null`
    /// has no key and so never matches.
    pub(crate) fn key(&self) -> Option<Key> {
        Some(match self {
            Value::Null => return None,
            Value::Int(v) => Key::Int(*v),
            Value::Float(v) if v.fract() == 0. && v.abs() < i64::MAX as f64 => Key::Int(*v as i64),
            Value::Float(v) => Key::Float(v.to_bits()),
            Value::DateTime(v) => Key::DateTime(*v),
            Value::Text(v) => Key::Text(v.clone()),
        })
    }

    /// Convert to a value of the (wider) type `ty`.
    pub(crate) fn cast(self, ty: ColumnType) -> Value {
        match (self, ty) {
            (Value::Null, _) => Value::Null,
            (v @ Value::Text(_), ColumnType::Text) => v,
            (v, ColumnType::Text) => Value::Text(v.to_string().into()),
            (Value::Int(v), ColumnType::Float) => Value::Float(v as f64),
            (v, _) => v,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
            Value::Text(v) => f.write_str(v),
        }
    }
}

/// The type of a column, inferred from its non-null cells.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// No non-null cells.
    Null,
    Int,
    Float,
    DateTime,
    Text,
}

impl ColumnType {
    /// The type of a single raw cell.
    pub fn of_raw(raw: &str) -> Self {
        Value::parse(raw).ty()
    }

    /// The narrowest type that can hold values of both `self` and `other`.
    pub fn unify(self, other: Self) -> Self {
        use ColumnType::*;
        match (self, other) {
            (Null, ty) | (ty, Null) => ty,
            (a, b) if a == b => a,
            (Int, Float) | (Float, Int) => Float,
            _ => Text,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Float)
    }

    /// Whether keys of these two types can be compared for equality.
    ///
    /// A `Null` column has no values to disagree with, so it is compatible with everything.
    pub fn is_join_compatible(self, other: Self) -> bool {
        self == other
            || self == ColumnType::Null
            || other == ColumnType::Null
            || (self.is_numeric() && other.is_numeric())
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            ColumnType::Null => "empty",
            ColumnType::Int => "integer",
            ColumnType::Float => "float",
            ColumnType::DateTime => "datetime",
            ColumnType::Text => "text",
        })
    }
}

/// Canonical join key component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Key {
    Int(i64),
    /// Bit pattern of a finite, non-integral float.
    Float(u64),
    DateTime(NaiveDateTime),
    Text(ArcStr),
}
