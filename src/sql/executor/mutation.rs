use crate::{
    error::{Error, Result},
    sql::{
        engine::Transaction,
        executor::ResultSet,
        parser::ast::Expression,
        schema::Table,
        types::{Label, Row, Value},
    },
};

use super::{subquery, Executor};

/// INSERT executor - stores every row of its source (VALUES or a SELECT)
pub struct Insert<T: Transaction> {
    table_name: String,
    columns: Vec<String>,
    source: Box<dyn Executor<T>>,
}

impl<T: Transaction> Insert<T> {
    pub fn new(table_name: String, columns: Vec<String>, source: Box<dyn Executor<T>>) -> Box<Self> {
        Box::new(Self {
            table_name,
            columns,
            source,
        })
    }
}

// Column alignment without a column list:
// insert into tbl values(1, 2, 3);
// a       b       c          d
// 1       2       3      default
fn pad_row(table: &Table, row: Row) -> Result<Row> {
    if row.len() > table.columns.len() {
        return Err(Error::Internal(format!(
            "table {} has {} columns but {} values were supplied",
            table.name,
            table.columns.len(),
            row.len()
        )));
    }
    let mut results = row;
    for column in table.columns.iter().skip(results.len()) {
        match &column.default {
            Some(default) => results.push(default.clone()),
            None => {
                return Err(Error::Internal(format!("No default value for column {}", column.name)));
            }
        }
    }
    Ok(results)
}

// With a column list, unnamed columns take their defaults:
// insert into tbl(d, c) values(1, 2);
//    a          b       c          d
// default   default     2          1
fn make_row(table: &Table, columns: &[String], values: Row) -> Result<Row> {
    if columns.len() != values.len() {
        return Err(Error::Internal(format!(
            "{} values for {} columns",
            values.len(),
            columns.len()
        )));
    }

    let mut results: Vec<Option<Value>> = vec![None; table.columns.len()];
    for (col_name, value) in columns.iter().zip(values) {
        results[table.get_col_index(col_name)?] = Some(value);
    }

    results
        .into_iter()
        .zip(table.columns.iter())
        .map(|(value, col)| match (value, &col.default) {
            (Some(value), _) => Ok(value),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(Error::Internal(format!(
                "No value given for the column {}",
                col.name
            ))),
        })
        .collect()
}

impl<T: Transaction> Executor<T> for Insert<T> {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(&self.table_name)?;
        // The source is read in full before the first row is written
        let (_, rows) = self.source.execute(txn)?.into_scan()?;
        let mut count = 0;
        for row in rows {
            let insert_row = if self.columns.is_empty() {
                pad_row(&table, row)?
            } else {
                make_row(&table, &self.columns, row)?
            };

            txn.create_row(&table.name, insert_row)?;
            count += 1;
        }
        Ok(ResultSet::Insert { count })
    }
}

/// Rows of a table matching an optional WHERE clause, with their ids
fn matching_rows<T: Transaction + 'static>(
    txn: &mut T,
    table: &Table,
    filter: Option<&Expression>,
) -> Result<(Vec<Label>, Vec<(Value, Row)>)> {
    let labels: Vec<Label> = table
        .columns
        .iter()
        .map(|c| Label::new(Some(table.name.clone()), c.name.clone()))
        .collect();
    let mut rows = txn.scan_rows(&table.name)?;
    if let Some(filter) = filter {
        filter.check(&labels)?;
        let mut kept = Vec::new();
        for (id, row) in rows {
            if subquery::evaluate(txn, filter, &labels, &row)?.truthy() == Some(true) {
                kept.push((id, row));
            }
        }
        rows = kept;
    }
    Ok((labels, rows))
}

/// UPDATE executor
pub struct Update {
    table_name: String,
    filter: Option<Expression>,
    columns: Vec<(String, Expression)>,
}

impl Update {
    pub fn new(table_name: String, filter: Option<Expression>, columns: Vec<(String, Expression)>) -> Box<Self> {
        Box::new(Self {
            table_name,
            filter,
            columns,
        })
    }
}

impl<T: Transaction + 'static> Executor<T> for Update {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(&self.table_name)?;
        let (labels, rows) = matching_rows(txn, &table, self.filter.as_ref())?;

        let mut assignments = Vec::with_capacity(self.columns.len());
        for (col, expr) in &self.columns {
            expr.check(&labels)?;
            assignments.push((table.get_col_index(col)?, expr));
        }

        let mut count = 0;
        for (id, row) in rows {
            let mut new_row = row.clone();
            // Every SET expression sees the row as it was before the update
            for (index, expr) in &assignments {
                new_row[*index] = subquery::evaluate(txn, expr, &labels, &row)?;
            }
            txn.update_row(&table, &id, new_row)?;
            count += 1;
        }
        Ok(ResultSet::Update { count })
    }
}

/// DELETE executor
pub struct Delete {
    table_name: String,
    filter: Option<Expression>,
}

impl Delete {
    pub fn new(table_name: String, filter: Option<Expression>) -> Box<Self> {
        Box::new(Self { table_name, filter })
    }
}

impl<T: Transaction + 'static> Executor<T> for Delete {
    fn execute(self: Box<Self>, txn: &mut T) -> Result<ResultSet> {
        let table = txn.must_get_table(&self.table_name)?;
        let (_, rows) = matching_rows(txn, &table, self.filter.as_ref())?;
        let count = rows.len();
        for (id, _) in rows {
            txn.delete_row(&table, &id)?;
        }
        Ok(ResultSet::Delete { count })
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::Result,
        sql::{
            engine::{Engine, KVEngine},
            executor::ResultSet,
            types::Value,
        },
        storage::memory::MemoryEngine,
    };

    #[test]
    fn test_insert_update_delete() -> Result<()> {
        let mut s = KVEngine::new(MemoryEngine::new()).session()?;
        s.execute("create table t (id integer primary key, name text default 'x', score integer)")?;

        assert_eq!(
            s.execute("insert into t (score, id) values (10, 1), (20, 2), (30, 3)")?,
            ResultSet::Insert { count: 3 }
        );
        assert_eq!(
            s.execute("update t set score = score + 1, name = 'hi' where id >= 2")?,
            ResultSet::Update { count: 2 }
        );
        assert_eq!(s.execute("delete from t where id = 1")?, ResultSet::Delete { count: 1 });

        let (_, rows) = s.execute("select * from t")?.into_scan()?;
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(2), Value::String("hi".into()), Value::Integer(21)],
                vec![Value::Integer(3), Value::String("hi".into()), Value::Integer(31)],
            ]
        );

        assert_eq!(s.execute("delete from t")?, ResultSet::Delete { count: 2 });
        Ok(())
    }

    #[test]
    fn test_insert_errors() -> Result<()> {
        let mut s = KVEngine::new(MemoryEngine::new()).session()?;
        s.execute("create table t (id integer primary key, v text)")?;
        assert!(s.execute("insert into t values (1, 'a', 'extra')").is_err());
        assert!(s.execute("insert into t (nope) values (1)").is_err());
        // Primary key has no default
        assert!(s.execute("insert into t (v) values ('a')").is_err());
        assert!(s.execute("insert into t values ('abc', 'a')").is_err());
        assert!(s.execute("update t set nope = 1").is_err());
        Ok(())
    }
}
