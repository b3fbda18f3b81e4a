use tracing::debug;

use crate::{
    error::{Error, Result},
    sql::types::Value,
};

use super::{executor::ResultSet, parser::Parser, plan::Plan, schema::Table, types::Row};

mod kv;

pub use kv::KVEngine;

/// SQL engine trait
pub trait Engine: Clone {
    type Transaction: Transaction;

    fn begin(&self) -> Result<Self::Transaction>;

    fn session(&self) -> Result<Session<Self>> {
        Ok(Session {
            engine: self.clone(),
        })
    }
}

/// SQL transaction trait (DDL and DML operations)
///
/// Table names are matched case-insensitively. Rows are addressed by their
/// primary key value, or by a hidden rowid when the table has no primary key.
pub trait Transaction {
    fn commit(&self) -> Result<()>;
    fn rollback(&self) -> Result<()>;

    fn create_row(&mut self, table_name: &str, row: Row) -> Result<()>;
    /// Replaces the row stored under `id`
    fn update_row(&mut self, table: &Table, id: &Value, row: Row) -> Result<()>;
    fn delete_row(&mut self, table: &Table, id: &Value) -> Result<()>;
    fn read_row(&self, table: &Table, id: &Value) -> Result<Option<Row>>;
    /// Returns every row of a table together with its id, in id order
    fn scan_rows(&self, table_name: &str) -> Result<Vec<(Value, Row)>>;

    fn scan_table(&self, table_name: &str) -> Result<Vec<Row>> {
        Ok(self
            .scan_rows(table_name)?
            .into_iter()
            .map(|(_, row)| row)
            .collect())
    }

    // DDL operations
    fn create_table(&mut self, table: Table) -> Result<()>;
    /// Drops a table and all of its rows
    fn drop_table(&mut self, table_name: &str) -> Result<()>;
    fn get_table(&self, table_name: &str) -> Result<Option<Table>>;
    fn list_tables(&self) -> Result<Vec<Table>>;

    /// Returns table info, returns error if table doesn't exist
    fn must_get_table(&self, table_name: &str) -> Result<Table> {
        self.get_table(table_name)?
            .ok_or_else(|| Error::Internal(format!("no such table: {}", table_name)))
    }
}

/// SQL session for executing statements
pub struct Session<E: Engine> {
    engine: E,
}

impl<E: Engine + 'static> Session<E> {
    /// Executes a single SQL statement in its own transaction
    pub fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        let stmt = Parser::new(sql).parse()?;
        let mut txn = self.engine.begin()?;
        match Plan::build(stmt).and_then(|plan| plan.execute(&mut txn)) {
            Ok(result) => {
                txn.commit()?;
                Ok(result)
            }
            Err(err) => {
                debug!(%err, "statement failed, rolling back");
                txn.rollback()?;
                Err(err)
            }
        }
    }

    /// Runs `f` inside one transaction, committing if it succeeds
    pub fn with_txn<R>(&mut self, f: impl FnOnce(&mut E::Transaction) -> Result<R>) -> Result<R> {
        let mut txn = self.engine.begin()?;
        match f(&mut txn) {
            Ok(result) => {
                txn.commit()?;
                Ok(result)
            }
            Err(err) => {
                txn.rollback()?;
                Err(err)
            }
        }
    }
}
