use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    sql::{
        schema::Table,
        types::{Row, Value},
    },
    storage::{self, engine::Engine as StorageEngine, keycode},
};

use super::{Engine, Transaction};

/// Key-value store backed SQL engine
pub struct KVEngine<E: StorageEngine> {
    pub kv: storage::mvcc::Mvcc<E>,
}

impl<E: StorageEngine> Clone for KVEngine<E> {
    fn clone(&self) -> Self {
        Self {
            kv: self.kv.clone(),
        }
    }
}

impl<E: StorageEngine> KVEngine<E> {
    pub fn new(engine: E) -> Self {
        Self {
            kv: storage::mvcc::Mvcc::new(engine),
        }
    }
}

impl<E: StorageEngine> Engine for KVEngine<E> {
    type Transaction = KVTransaction<E>;

    fn begin(&self) -> Result<Self::Transaction> {
        Ok(Self::Transaction::new(self.kv.begin()?))
    }
}

/// Key-value transaction (wrapper around MVCC transaction)
pub struct KVTransaction<E: StorageEngine> {
    txn: storage::mvcc::MvccTransaction<E>,
}

impl<E: StorageEngine> KVTransaction<E> {
    pub fn new(txn: storage::mvcc::MvccTransaction<E>) -> Self {
        Self { txn }
    }

    /// Hands out the next hidden rowid for a table without a primary key
    fn next_rowid(&mut self, table_name: &str) -> Result<i64> {
        let key = Key::RowSeq(table_name.to_lowercase()).encode()?;
        let rowid = match self.txn.get(key.clone())? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => 1,
        };
        self.txn.set(key, bincode::serialize(&(rowid + 1))?)?;
        Ok(rowid)
    }

    fn row_key(table: &Table, id: &Value) -> Result<Vec<u8>> {
        Key::Row(table.name.to_lowercase(), id.clone()).encode()
    }
}

impl<E: StorageEngine> Transaction for KVTransaction<E> {
    fn commit(&self) -> Result<()> {
        self.txn.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.txn.rollback()
    }

    fn create_row(&mut self, table_name: &str, row: Row) -> Result<()> {
        let table = self.must_get_table(table_name)?;
        let row = table.check_row(row)?;

        let id = match table.get_primary_key(&row) {
            Some(id) => {
                if self.read_row(&table, &id)?.is_some() {
                    return Err(Error::Internal(format!(
                        "UNIQUE constraint failed: {}.{}",
                        table.name,
                        table.columns[table.primary_key_index().unwrap_or_default()].name
                    )));
                }
                id
            }
            None => Value::Integer(self.next_rowid(table_name)?),
        };

        self.txn.set(Self::row_key(&table, &id)?, bincode::serialize(&row)?)
    }

    fn update_row(&mut self, table: &Table, id: &Value, row: Row) -> Result<()> {
        let row = table.check_row(row)?;
        // A changed primary key moves the row to a new key
        if let Some(new_id) = table.get_primary_key(&row) {
            if new_id != *id {
                if self.read_row(table, &new_id)?.is_some() {
                    return Err(Error::Internal(format!(
                        "UNIQUE constraint failed: {}.{}",
                        table.name,
                        table.columns[table.primary_key_index().unwrap_or_default()].name
                    )));
                }
                self.delete_row(table, id)?;
                return self.txn.set(Self::row_key(table, &new_id)?, bincode::serialize(&row)?);
            }
        }
        self.txn.set(Self::row_key(table, id)?, bincode::serialize(&row)?)
    }

    fn delete_row(&mut self, table: &Table, id: &Value) -> Result<()> {
        self.txn.delete(Self::row_key(table, id)?)
    }

    fn read_row(&self, table: &Table, id: &Value) -> Result<Option<Row>> {
        self.txn
            .get(Self::row_key(table, id)?)?
            .map(|v| bincode::deserialize(&v))
            .transpose()
            .map_err(Error::from)
    }

    fn scan_rows(&self, table_name: &str) -> Result<Vec<(Value, Row)>> {
        // Use prefix scan to find all rows in the table
        let prefix = KeyPrefix::Row(table_name.to_lowercase()).encode()?;
        let mut rows = Vec::new();
        for result in self.txn.scan_prefix(prefix)? {
            let id = match Key::decode(&result.key)? {
                Key::Row(_, id) => id,
                key => return Err(Error::Internal(format!("unexpected key {:?}", key))),
            };
            rows.push((id, bincode::deserialize(&result.value)?));
        }
        Ok(rows)
    }

    fn create_table(&mut self, table: Table) -> Result<()> {
        if self.get_table(&table.name)?.is_some() {
            return Err(Error::Internal(format!("table {} already exists", table.name)));
        }
        table.validate()?;

        // Store table schema: key = lowercased table name, value = serialized table schema
        let key = Key::Table(table.name.to_lowercase()).encode()?;
        self.txn.set(key, bincode::serialize(&table)?)
    }

    fn drop_table(&mut self, table_name: &str) -> Result<()> {
        let table = self.must_get_table(table_name)?;
        for (id, _) in self.scan_rows(&table.name)? {
            self.delete_row(&table, &id)?;
        }
        let name = table.name.to_lowercase();
        self.txn.delete(Key::RowSeq(name.clone()).encode()?)?;
        self.txn.delete(Key::Table(name).encode()?)
    }

    fn get_table(&self, table_name: &str) -> Result<Option<Table>> {
        let key = Key::Table(table_name.to_lowercase()).encode()?;
        Ok(self
            .txn
            .get(key)?
            .map(|v| bincode::deserialize(&v))
            .transpose()?)
    }

    fn list_tables(&self) -> Result<Vec<Table>> {
        self.txn
            .scan_prefix(KeyPrefix::Table.encode()?)?
            .into_iter()
            .map(|r| Ok(bincode::deserialize(&r.value)?))
            .collect()
    }
}

/// Key types for KV storage operations
///
/// Encoded with the order-preserving keycode format, so all rows of a table
/// sit together and sort by id.
#[derive(Debug, Serialize, Deserialize)]
enum Key {
    Table(String),
    Row(String, Value),
    RowSeq(String),
}

impl Key {
    fn encode(&self) -> Result<Vec<u8>> {
        keycode::serialize_key(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        keycode::deserialize_key(bytes)
    }
}

/// Key prefix types for prefix scanning
///
/// Variants must line up with `Key`, since the variant index is the first byte.
#[derive(Debug, Serialize, Deserialize)]
enum KeyPrefix {
    Table,
    Row(String),
}

impl KeyPrefix {
    fn encode(&self) -> Result<Vec<u8>> {
        keycode::serialize_key(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        error::Result,
        sql::{
            engine::{Engine, Transaction},
            executor::ResultSet,
            types::{Label, Value},
        },
        storage::{disk::DiskEngine, memory::MemoryEngine},
    };

    use super::KVEngine;

    fn scan(result: ResultSet) -> (Vec<String>, Vec<Vec<Value>>) {
        match result {
            ResultSet::Scan { columns, rows } => {
                (columns.iter().map(Label::to_string).collect(), rows)
            }
            other => panic!("expected rows, got {:?}", other),
        }
    }

    #[test]
    fn test_create_table() -> Result<()> {
        let kvengine = KVEngine::new(MemoryEngine::new());
        let mut s = kvengine.session()?;

        s.execute("create table t1 (a int, b text default 'vv', c integer default 100);")?;
        s.execute("insert into t1 values(1, 'a', 1);")?;
        s.execute("insert into t1 values(2, 'b');")?;
        s.execute("insert into t1(c, a) values(200, 3);")?;

        let (columns, rows) = scan(s.execute("select * from t1;")?);
        assert_eq!(columns, vec!["a", "b", "c"]);
        assert_eq!(
            rows,
            vec![
                vec![Value::Integer(1), Value::String("a".into()), Value::Integer(1)],
                vec![Value::Integer(2), Value::String("b".into()), Value::Integer(100)],
                vec![Value::Integer(3), Value::String("vv".into()), Value::Integer(200)],
            ]
        );

        let err = s.execute("create table T1 (x text)").unwrap_err();
        assert_eq!(err.to_string(), "table T1 already exists");
        Ok(())
    }

    #[test]
    fn test_primary_key() -> Result<()> {
        let kvengine = KVEngine::new(MemoryEngine::new());
        let mut s = kvengine.session()?;
        s.execute("create table t (id integer primary key, v text)")?;
        s.execute("insert into t values (2, 'b'), (1, 'a')")?;
        assert!(s.execute("insert into t values (1, 'dup')").is_err());

        // The failed statement rolled back as a whole
        let (_, rows) = scan(s.execute("select v from t")?);
        assert_eq!(rows, vec![vec![Value::String("a".into())], vec![Value::String("b".into())]]);

        s.execute("update t set id = 3 where id = 1")?;
        let (_, rows) = scan(s.execute("select id from t")?);
        assert_eq!(rows, vec![vec![Value::Integer(2)], vec![Value::Integer(3)]]);
        Ok(())
    }

    #[test]
    fn test_drop_table() -> Result<()> {
        let kvengine = KVEngine::new(MemoryEngine::new());
        let mut s = kvengine.session()?;
        s.execute("create table a (x text)")?;
        s.execute("create table b (x text)")?;
        s.execute("insert into a values ('1')")?;
        s.execute("drop table a")?;
        assert!(s.execute("select * from a").is_err());
        assert!(s.execute("drop table a").is_err());
        s.execute("drop table if exists a")?;

        let names = s.with_txn(|txn| txn.list_tables())?;
        assert_eq!(names.into_iter().map(|t| t.name).collect::<Vec<_>>(), vec!["b"]);

        // Re-created tables start out empty
        s.execute("create table a (x text)")?;
        let (_, rows) = scan(s.execute("select * from a")?);
        assert!(rows.is_empty());
        Ok(())
    }

    #[test]
    fn test_disk_persistence() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sqldb-log");
        {
            let mut s = KVEngine::new(DiskEngine::new(path.clone())?).session()?;
            s.execute("create table t (day integer primary key, answer text)")?;
            s.execute("insert into t values (1, 'select 1')")?;
        }
        let mut s = KVEngine::new(DiskEngine::new(path)?).session()?;
        let (_, rows) = scan(s.execute("select answer from t where day = 1")?);
        assert_eq!(rows, vec![vec![Value::String("select 1".into())]]);
        Ok(())
    }
}
