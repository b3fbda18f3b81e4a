//! The request-handling layer: wires the catalog, the answer store and the
//! playground together.

use std::sync::Arc;

use tracing::debug;

use crate::{
    answer::{AnswerRecord, AnswerStore},
    catalog::{Catalog, Drill},
    error::{Error, Result},
    playground::{self, PlaygroundResult},
    progress::Progress,
    sql::engine::Engine,
};

pub const SAVED_MESSAGE: &str = "✅ 保存しました！";

/// Everything the drill list shows
#[derive(Debug, Clone)]
pub struct Overview<'a> {
    pub drills: &'a [Drill],
    pub progress: Progress,
    pub total_days: u32,
    pub active_day: u32,
}

/// One day as shown to the learner
#[derive(Debug, Clone)]
pub struct DayView<'a> {
    pub drill: &'a Drill,
    pub answer: Option<AnswerRecord>,
}

/// The model answer for a day
#[derive(Debug, Clone, PartialEq)]
pub struct Reveal {
    pub example_answer: String,
    pub explanation: String,
}

pub struct Trainer<E: Engine> {
    catalog: Arc<Catalog>,
    store: AnswerStore<E>,
    total_days: u32,
}

impl<E: Engine + 'static> Trainer<E> {
    pub fn new(catalog: Arc<Catalog>, store: AnswerStore<E>, total_days: u32) -> Self {
        Self {
            catalog,
            store,
            total_days,
        }
    }

    pub fn store(&self) -> &AnswerStore<E> {
        &self.store
    }

    pub fn overview(&self) -> Result<Overview<'_>> {
        let answers = self.store.all()?;
        Ok(Overview {
            drills: self.catalog.drills(),
            progress: Progress::from_answers(&answers, self.total_days),
            total_days: self.total_days,
            active_day: 1,
        })
    }

    fn drill(&self, day: u32) -> Result<&Drill> {
        self.catalog
            .find_by_day(day)
            .ok_or_else(|| Error::NotFound(format!("no drill for day {}", day)))
    }

    pub fn day(&self, day: u32) -> Result<DayView<'_>> {
        Ok(DayView {
            drill: self.drill(day)?,
            answer: self.store.get(day)?,
        })
    }

    pub fn save(&self, day: u32, answer_text: &str) -> Result<&'static str> {
        self.store.upsert(day, answer_text)?;
        Ok(SAVED_MESSAGE)
    }

    /// Returns the example answer and marks the day completed
    pub fn reveal(&self, day: u32) -> Result<Reveal> {
        let drill = self.drill(day)?;
        self.store.mark_completed(day)?;
        debug!(day, "revealed example answer");
        Ok(Reveal {
            example_answer: drill.example_answer.clone(),
            explanation: drill.explanation.clone(),
        })
    }

    pub fn run_sql(&self, day: u32, sql: &str) -> PlaygroundResult {
        playground::run_query(self.catalog.find_by_day(day), sql)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{Trainer, SAVED_MESSAGE};
    use crate::{
        answer::{AnswerStore, Status},
        catalog::Catalog,
        error::{Error, Result},
        playground::{PlaygroundResult, EMPTY_QUERY_MESSAGE},
        sql::{engine::KVEngine, types::Value},
        storage::memory::MemoryEngine,
    };

    const DRILLS: &str = r#"[
        {
            "day": 1,
            "title": "Filtering",
            "question": "Find Bob",
            "explanation": "Use WHERE",
            "schema": [{"table_name": "users.csv", "mock_data": [{"id": 1, "name": "Alice"}, {"id": 2, "name": "Bob"}]}],
            "example_answer": "SELECT name FROM users_csv WHERE id = 2"
        },
        {"day": 2, "explanation": "", "schema": [], "example_answer": "SELECT 1"}
    ]"#;

    fn trainer() -> Result<Trainer<KVEngine<MemoryEngine>>> {
        let store = AnswerStore::new(KVEngine::new(MemoryEngine::new()))?;
        store.bootstrap(17)?;
        Ok(Trainer::new(Arc::new(Catalog::from_json_str(DRILLS)?), store, 17))
    }

    #[test]
    fn test_overview() -> Result<()> {
        let trainer = trainer()?;
        trainer.reveal(1)?;
        trainer.save(2, "SELECT 2")?;

        let overview = trainer.overview()?;
        assert_eq!(overview.drills.len(), 2);
        assert_eq!(overview.active_day, 1);
        assert_eq!(overview.progress.percent, 5);
        assert_eq!(overview.progress.status(1), Status::Completed);
        assert_eq!(overview.progress.status(2), Status::InProgress);
        assert_eq!(overview.progress.status(3), Status::NotStarted);
        Ok(())
    }

    #[test]
    fn test_save_and_show() -> Result<()> {
        let trainer = trainer()?;
        assert_eq!(trainer.save(1, "SELECT * FROM users_csv")?, SAVED_MESSAGE);

        let view = trainer.day(1)?;
        assert_eq!(view.drill.title, "Filtering");
        assert_eq!(
            view.answer.map(|a| (a.answer_text, a.status)),
            Some(("SELECT * FROM users_csv".to_string(), Status::InProgress))
        );
        assert!(matches!(trainer.day(40), Err(Error::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_reveal() -> Result<()> {
        let trainer = trainer()?;
        let reveal = trainer.reveal(1)?;
        assert_eq!(reveal.example_answer, "SELECT name FROM users_csv WHERE id = 2");
        assert_eq!(reveal.explanation, "Use WHERE");
        assert_eq!(trainer.store().get(1)?.map(|r| r.status), Some(Status::Completed));

        assert!(matches!(trainer.reveal(99), Err(Error::NotFound(_))));
        assert_eq!(trainer.store().get(99)?, None);
        Ok(())
    }

    #[test]
    fn test_example_answer_runs() -> Result<()> {
        let trainer = trainer()?;
        let reveal = trainer.reveal(1)?;
        assert_eq!(
            trainer.run_sql(1, &reveal.example_answer),
            PlaygroundResult::Rows {
                columns: vec!["name".into()],
                rows: vec![vec![Value::String("Bob".into())]],
            }
        );
        assert_eq!(
            trainer.run_sql(7, "SELECT 1"),
            PlaygroundResult::Error { error: EMPTY_QUERY_MESSAGE.into() }
        );
        Ok(())
    }

    #[test]
    fn test_bundled_drills() -> Result<()> {
        let catalog = Catalog::load_all(concat!(env!("CARGO_MANIFEST_DIR"), "/data/drills.json"))?;
        let store = AnswerStore::new(KVEngine::new(MemoryEngine::new()))?;
        let trainer = Trainer::new(Arc::new(catalog), store, 17);

        for drill in trainer.overview()?.drills {
            let result = trainer.run_sql(drill.day, &drill.example_answer);
            assert!(
                matches!(&result, PlaygroundResult::Rows { rows, .. } if !rows.is_empty()),
                "day {}: {:?}",
                drill.day,
                result
            );
        }

        assert_eq!(
            trainer.run_sql(4, "SELECT order_id, COUNT(*) AS cnt FROM fct_orders GROUP BY order_id HAVING COUNT(*) > 1"),
            PlaygroundResult::Rows {
                columns: vec!["order_id".into(), "cnt".into()],
                rows: vec![vec![Value::String("O1".into()), Value::Integer(2)]],
            }
        );
        Ok(())
    }
}
