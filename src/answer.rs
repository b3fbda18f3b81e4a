//! Per-day answer persistence on top of the embedded SQL engine.

use std::{fmt, str::FromStr};

use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    sql::{
        engine::{Engine, Transaction},
        schema::Table,
        types::{Row, Value},
    },
};

const TABLE_NAME: &str = "user_answers";

/// Progress of a single day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::NotStarted => "not_started",
            Status::InProgress => "in_progress",
            Status::Completed => "completed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not_started" => Ok(Status::NotStarted),
            "in_progress" => Ok(Status::InProgress),
            "completed" => Ok(Status::Completed),
            _ => Err(Error::Internal(format!("invalid answer status {}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerRecord {
    pub day: u32,
    pub answer_text: String,
    pub status: Status,
}

impl AnswerRecord {
    fn into_row(self) -> Row {
        vec![
            Value::Integer(self.day.into()),
            Value::String(self.answer_text),
            Value::String(self.status.as_str().to_string()),
        ]
    }

    fn from_row(row: Row) -> Result<Self> {
        let [day, answer_text, status]: [Value; 3] = row
            .try_into()
            .map_err(|row: Row| Error::Internal(format!("{} has 3 columns, got {}", TABLE_NAME, row.len())))?;
        let day = match day {
            Value::Integer(day) => u32::try_from(day)
                .map_err(|_| Error::Internal(format!("day {} out of range", day)))?,
            other => return Err(Error::Internal(format!("invalid day {}", other))),
        };
        let answer_text = match answer_text {
            Value::Null => String::new(),
            other => other.to_text(),
        };
        Ok(Self {
            day,
            answer_text,
            status: status.to_text().parse()?,
        })
    }
}

/// Keyed records of day -> answer text and status.
///
/// Every operation runs in its own transaction.
#[derive(Clone)]
pub struct AnswerStore<E: Engine> {
    engine: E,
}

impl<E: Engine + 'static> AnswerStore<E> {
    /// Opens the store, creating its table on first use
    pub fn new(engine: E) -> Result<Self> {
        engine.session()?.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (day INTEGER PRIMARY KEY, answer_text TEXT DEFAULT '', status TEXT DEFAULT 'not_started')",
            TABLE_NAME
        ))?;
        Ok(Self { engine })
    }

    fn with_txn<R>(&self, f: impl FnOnce(&mut E::Transaction, &Table) -> Result<R>) -> Result<R> {
        self.engine.session()?.with_txn(|txn| {
            let table = txn.must_get_table(TABLE_NAME)?;
            f(txn, &table)
        })
    }

    pub fn get(&self, day: u32) -> Result<Option<AnswerRecord>> {
        self.with_txn(|txn, table| {
            txn.read_row(table, &Value::Integer(day.into()))?
                .map(AnswerRecord::from_row)
                .transpose()
        })
    }

    /// Saves the answer text for a day. Non-blank text moves the day to
    /// in_progress, even from completed. Blank text keeps the prior status.
    pub fn upsert(&self, day: u32, answer_text: &str) -> Result<()> {
        self.with_txn(|txn, table| {
            let id = Value::Integer(day.into());
            let blank = answer_text.trim().is_empty();
            match txn.read_row(table, &id)? {
                Some(row) => {
                    let mut record = AnswerRecord::from_row(row)?;
                    record.answer_text = answer_text.to_string();
                    if !blank {
                        record.status = Status::InProgress;
                    }
                    txn.update_row(table, &id, record.into_row())
                }
                None => {
                    let record = AnswerRecord {
                        day,
                        answer_text: answer_text.to_string(),
                        status: Status::InProgress,
                    };
                    txn.create_row(&table.name, record.into_row())
                }
            }
        })?;
        debug!(day, "saved answer");
        Ok(())
    }

    /// Marks an existing record completed. Absent records are left absent.
    pub fn mark_completed(&self, day: u32) -> Result<()> {
        self.with_txn(|txn, table| {
            let id = Value::Integer(day.into());
            let Some(row) = txn.read_row(table, &id)? else {
                return Ok(());
            };
            let mut record = AnswerRecord::from_row(row)?;
            if record.status == Status::Completed {
                return Ok(());
            }
            record.status = Status::Completed;
            txn.update_row(table, &id, record.into_row())
        })
    }

    /// Seeds one not_started record per day when the store is empty
    pub fn bootstrap(&self, total_days: u32) -> Result<()> {
        let seeded = self.with_txn(|txn, table| {
            if !txn.scan_rows(&table.name)?.is_empty() {
                return Ok(false);
            }
            seed(txn, table, total_days)?;
            Ok(true)
        })?;
        if seeded {
            info!(total_days, "initialized answer store");
        }
        Ok(())
    }

    /// Drops every record and seeds fresh not_started ones
    pub fn reset(&self, total_days: u32) -> Result<()> {
        self.with_txn(|txn, table| {
            for (id, _) in txn.scan_rows(&table.name)? {
                txn.delete_row(table, &id)?;
            }
            seed(txn, table, total_days)
        })?;
        info!(total_days, "reset answer store");
        Ok(())
    }

    /// All records ordered by day
    pub fn all(&self) -> Result<Vec<AnswerRecord>> {
        self.with_txn(|txn, table| {
            txn.scan_table(&table.name)?
                .into_iter()
                .map(AnswerRecord::from_row)
                .collect()
        })
    }
}

fn seed<T: Transaction>(txn: &mut T, table: &Table, total_days: u32) -> Result<()> {
    for day in 1..=total_days {
        let record = AnswerRecord {
            day,
            answer_text: String::new(),
            status: Status::NotStarted,
        };
        txn.create_row(&table.name, record.into_row())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{AnswerRecord, AnswerStore, Status};
    use crate::{
        error::Result,
        sql::engine::KVEngine,
        storage::{disk::DiskEngine, memory::MemoryEngine},
    };

    fn store() -> Result<AnswerStore<KVEngine<MemoryEngine>>> {
        AnswerStore::new(KVEngine::new(MemoryEngine::new()))
    }

    fn status(store: &AnswerStore<KVEngine<MemoryEngine>>, day: u32) -> Result<Option<Status>> {
        Ok(store.get(day)?.map(|r| r.status))
    }

    #[test]
    fn test_status_strings() -> Result<()> {
        for status in [Status::NotStarted, Status::InProgress, Status::Completed] {
            assert_eq!(status.as_str().parse::<Status>()?, status);
        }
        assert!("done".parse::<Status>().is_err());
        Ok(())
    }

    #[test]
    fn test_save_transitions() -> Result<()> {
        let store = store()?;
        assert_eq!(store.get(3)?, None);

        store.upsert(3, "SELECT 1")?;
        assert_eq!(
            store.get(3)?,
            Some(AnswerRecord {
                day: 3,
                answer_text: "SELECT 1".into(),
                status: Status::InProgress,
            })
        );

        store.mark_completed(3)?;
        assert_eq!(status(&store, 3)?, Some(Status::Completed));

        // Blank text keeps the status
        store.upsert(3, "   ")?;
        assert_eq!(status(&store, 3)?, Some(Status::Completed));
        assert_eq!(store.get(3)?.map(|r| r.answer_text), Some("   ".to_string()));

        // Non-blank text reopens a completed day
        store.upsert(3, "SELECT 2")?;
        assert_eq!(status(&store, 3)?, Some(Status::InProgress));
        Ok(())
    }

    #[test]
    fn test_blank_first_save_is_in_progress() -> Result<()> {
        let store = store()?;
        store.upsert(1, "")?;
        assert_eq!(status(&store, 1)?, Some(Status::InProgress));
        Ok(())
    }

    #[test]
    fn test_mark_completed_absent_is_noop() -> Result<()> {
        let store = store()?;
        store.mark_completed(9)?;
        assert_eq!(store.get(9)?, None);
        assert!(store.all()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_bootstrap_and_reset() -> Result<()> {
        let store = store()?;
        store.bootstrap(17)?;
        let all = store.all()?;
        assert_eq!(all.len(), 17);
        assert_eq!(all.iter().map(|r| r.day).collect::<Vec<_>>(), (1..=17).collect::<Vec<_>>());
        assert!(all.iter().all(|r| r.status == Status::NotStarted && r.answer_text.is_empty()));

        store.upsert(2, "SELECT * FROM t")?;
        // A non-empty store is left alone
        store.bootstrap(17)?;
        assert_eq!(status(&store, 2)?, Some(Status::InProgress));

        store.reset(5)?;
        let all = store.all()?;
        assert_eq!(all.len(), 5);
        assert_eq!(status(&store, 2)?, Some(Status::NotStarted));
        Ok(())
    }

    #[test]
    fn test_persists_on_disk() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("answers.db");
        {
            let store = AnswerStore::new(KVEngine::new(DiskEngine::new(path.clone())?))?;
            store.upsert(4, "SELECT 'it''s'")?;
            store.mark_completed(4)?;
        }
        let store = AnswerStore::new(KVEngine::new(DiskEngine::new(path)?))?;
        assert_eq!(
            store.get(4)?,
            Some(AnswerRecord {
                day: 4,
                answer_text: "SELECT 'it''s'".into(),
                status: Status::Completed,
            })
        );
        Ok(())
    }
}
