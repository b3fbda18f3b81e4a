use std::{cmp::Ordering, fmt::Display};

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::parser::ast::Consts,
};

/// Column data types
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    String,
}

impl Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Float => "FLOAT",
            DataType::String => "TEXT",
        })
    }
}

/// Runtime value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl From<Value> for Consts {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Boolean(b) => Self::Boolean(b),
            Value::Integer(i) => Self::Integer(i),
            Value::Float(f) => Self::Float(f),
            Value::String(s) => Self::String(s),
        }
    }
}

impl From<Consts> for Value {
    fn from(value: Consts) -> Self {
        match value {
            Consts::Null => Self::Null,
            Consts::Boolean(b) => Self::Boolean(b),
            Consts::Integer(i) => Self::Integer(i),
            Consts::Float(f) => Self::Float(f),
            Consts::String(s) => Self::String(s),
        }
    }
}

impl Value {
    /// Returns the data type of the value, or None if it's Null
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            Self::Null => None,
            Self::Boolean(_) => Some(DataType::Boolean),
            Self::Integer(_) => Some(DataType::Integer),
            Self::Float(_) => Some(DataType::Float),
            Self::String(_) => Some(DataType::String),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Textual form used when a value meets a text operand
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Boolean(b) => (*b as i64).to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
        }
    }

    /// Numeric form used by arithmetic and numeric aggregates.
    ///
    /// Text that reads as a number becomes that number, any other text is 0.
    pub fn to_number(&self) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Boolean(b) => Value::Integer(*b as i64),
            Value::Integer(_) | Value::Float(_) => self.clone(),
            Value::String(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Value::Integer(i)
                } else if let Ok(f) = s.parse::<f64>() {
                    Value::Float(f)
                } else {
                    Value::Integer(0)
                }
            }
        }
    }

    /// Truth value for WHERE/HAVING/ON. `None` stands for SQL unknown.
    pub fn truthy(&self) -> Option<bool> {
        match self.to_number() {
            Value::Null => None,
            Value::Integer(i) => Some(i != 0),
            Value::Float(f) => Some(f != 0.0),
            _ => Some(false),
        }
    }

    /// Converts a value to a column's type on its way into a table.
    ///
    /// TEXT columns accept anything and store its textual form; numeric
    /// columns accept text that reads as a number of the right kind.
    pub fn coerce_to(self, datatype: DataType) -> Result<Value> {
        let mismatch = |v: &Value| {
            Error::Internal(format!("datatype mismatch: cannot store {} as {}", v, datatype))
        };
        Ok(match (datatype, self) {
            (_, Value::Null) => Value::Null,
            (DataType::String, Value::String(s)) => Value::String(s),
            (DataType::String, v) => Value::String(v.to_text()),
            (DataType::Integer, Value::Integer(i)) => Value::Integer(i),
            (DataType::Integer, Value::Boolean(b)) => Value::Integer(b as i64),
            (DataType::Integer, Value::Float(f)) if f.fract() == 0.0 => Value::Integer(f as i64),
            (DataType::Integer, v @ Value::String(_)) => match v.to_number() {
                Value::Integer(i) if v.to_text().trim() == i.to_string() => Value::Integer(i),
                _ => return Err(mismatch(&v)),
            },
            (DataType::Float, Value::Float(f)) => Value::Float(f),
            (DataType::Float, Value::Integer(i)) => Value::Float(i as f64),
            (DataType::Float, v @ Value::String(_)) => match v.to_text().trim().parse::<f64>() {
                Ok(f) => Value::Float(f),
                Err(_) => return Err(mismatch(&v)),
            },
            (DataType::Boolean, Value::Boolean(b)) => Value::Boolean(b),
            (DataType::Boolean, Value::Integer(i)) if i == 0 || i == 1 => Value::Boolean(i == 1),
            (_, v) => return Err(mismatch(&v)),
        })
    }

    /// Compares two non-null values.
    ///
    /// Numbers compare numerically. When either side is text, both sides
    /// compare as text, so the number `2` equals the stored text `'2'`.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::String(a), b) => Some(a.as_str().cmp(b.to_text().as_str())),
            (a, Value::String(b)) => Some(a.to_text().as_str().cmp(b.as_str())),
            (a, b) => match (a.to_number(), b.to_number()) {
                (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(&b)),
                (Value::Integer(a), Value::Float(b)) => (a as f64).partial_cmp(&b),
                (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(b as f64)),
                (Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
                _ => None,
            },
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(true) => write!(f, "TRUE"),
            Value::Boolean(false) => write!(f, "FALSE"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
        }
    }
}

/// Ordering used by ORDER BY, MIN and MAX: NULL sorts first
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),
            (a, b) => a.compare(b),
        }
    }
}

/// A row is a vector of values
pub type Row = Vec<Value>;

/// Name of a column in an intermediate or final result, with the table (or
/// table alias) it came from, if any
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    pub table: Option<String>,
    pub name: String,
    /// Reachable only by its qualified name, and left out of `*`
    pub hidden: bool,
}

impl Label {
    pub fn new(table: Option<String>, name: impl Into<String>) -> Self {
        Self { table, name: name.into(), hidden: false }
    }

    /// Identifiers match case-insensitively
    pub fn matches(&self, table: Option<&str>, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            && match (table, &self.table) {
                (None, _) => !self.hidden,
                (Some(t), Some(own)) => own.eq_ignore_ascii_case(t),
                (Some(_), None) => false,
            }
    }

    /// Whether `SELECT *` shows the column. #agg slots never show.
    pub fn is_visible(&self) -> bool {
        !self.hidden && !self.name.starts_with('#')
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::{DataType, Value};
    use crate::error::Result;

    #[test]
    fn test_text_and_number_compare_as_text() {
        let two = Value::String("2".into());
        assert_eq!(two.compare(&Value::Integer(2)), Some(Ordering::Equal));
        // Lexicographic, like a TEXT column in any engine with type affinity
        assert_eq!(
            Value::String("500".into()).compare(&Value::Integer(1000)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Integer(500).compare(&Value::Float(1000.0)), Some(Ordering::Less));
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
    }

    #[test]
    fn test_to_number() {
        assert_eq!(Value::String("1500".into()).to_number(), Value::Integer(1500));
        assert_eq!(Value::String("-2.5".into()).to_number(), Value::Float(-2.5));
        assert_eq!(Value::String("Alice".into()).to_number(), Value::Integer(0));
        assert_eq!(Value::Null.to_number(), Value::Null);
    }

    #[test]
    fn test_coerce_to() -> Result<()> {
        assert_eq!(Value::Integer(3).coerce_to(DataType::String)?, Value::String("3".into()));
        assert_eq!(Value::String("17".into()).coerce_to(DataType::Integer)?, Value::Integer(17));
        assert_eq!(Value::Null.coerce_to(DataType::Integer)?, Value::Null);
        assert!(Value::String("abc".into()).coerce_to(DataType::Integer).is_err());
        assert!(Value::String("1.5".into()).coerce_to(DataType::Integer).is_err());
        Ok(())
    }

    #[test]
    fn test_null_sorts_first() {
        let mut values = vec![Value::String("b".into()), Value::Null, Value::String("a".into())];
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        assert_eq!(
            values,
            vec![Value::Null, Value::String("a".into()), Value::String("b".into())]
        );
    }
}
