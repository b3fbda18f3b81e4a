use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::types::{DataType, Row, Value},
};

/// Table schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    /// Validates table schema
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::Internal(format!("table {} has no columns", self.name)));
        }

        if self.columns.iter().filter(|c| c.primary_key).count() > 1 {
            return Err(Error::Internal(format!(
                "table \"{}\" has more than one primary key",
                self.name
            )));
        }

        for (i, column) in self.columns.iter().enumerate() {
            if self.columns[..i]
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                return Err(Error::Internal(format!("duplicate column name: {}", column.name)));
            }
            if column.primary_key && column.nullable {
                return Err(Error::Internal(format!(
                    "primary key {} cannot be nullable",
                    column.name
                )));
            }
            if let Some(default) = &column.default {
                default.clone().coerce_to(column.datatype)?;
            }
        }
        Ok(())
    }

    /// Position of the primary key column. Tables without one are keyed by rowid.
    pub fn primary_key_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.primary_key)
    }

    /// Extracts primary key value from a row
    pub fn get_primary_key(&self, row: &Row) -> Option<Value> {
        self.primary_key_index().map(|pos| row[pos].clone())
    }

    /// Returns the column index for a given column name
    pub fn get_col_index(&self, col_name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(col_name))
            .ok_or_else(|| {
                Error::Internal(format!("table {} has no column named {}", self.name, col_name))
            })
    }

    /// Checks a complete row against the column definitions, coercing each
    /// value to its column's type
    pub fn check_row(&self, row: Row) -> Result<Row> {
        if row.len() != self.columns.len() {
            return Err(Error::Internal(format!(
                "table {} has {} columns but {} values were supplied",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        row.into_iter()
            .zip(self.columns.iter())
            .map(|(value, col)| match value.coerce_to(col.datatype)? {
                Value::Null if !col.nullable => Err(Error::Internal(format!(
                    "NOT NULL constraint failed: {}.{}",
                    self.name, col.name
                ))),
                value => Ok(value),
            })
            .collect()
    }
}

/// Column schema definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub datatype: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
    /// Whether this column is the primary key
    pub primary_key: bool,
}

#[cfg(test)]
mod tests {
    use super::{Column, Table};
    use crate::{
        error::Result,
        sql::types::{DataType, Value},
    };

    fn column(name: &str, datatype: DataType, primary_key: bool) -> Column {
        Column {
            name: name.to_string(),
            datatype,
            nullable: !primary_key,
            default: None,
            primary_key,
        }
    }

    #[test]
    fn test_validate() {
        let table = Table {
            name: "t".into(),
            columns: vec![column("a", DataType::Integer, true), column("A", DataType::String, false)],
        };
        assert!(table.validate().is_err());

        let table = Table {
            name: "t".into(),
            columns: vec![column("a", DataType::Integer, true), column("b", DataType::Integer, true)],
        };
        assert!(table.validate().is_err());

        let table = Table {
            name: "t".into(),
            columns: vec![column("a", DataType::String, false)],
        };
        assert!(table.validate().is_ok());
        assert_eq!(table.primary_key_index(), None);
    }

    #[test]
    fn test_check_row() -> Result<()> {
        let table = Table {
            name: "t".into(),
            columns: vec![column("id", DataType::Integer, true), column("name", DataType::String, false)],
        };
        assert_eq!(
            table.check_row(vec![Value::String("7".into()), Value::Integer(3)])?,
            vec![Value::Integer(7), Value::String("3".into())]
        );
        assert!(table.check_row(vec![Value::Null, Value::Null]).is_err());
        assert!(table.check_row(vec![Value::Integer(1)]).is_err());
        assert_eq!(table.get_col_index("NAME")?, 1);
        Ok(())
    }
}
