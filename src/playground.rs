//! The SQL playground: materializes a drill's mock data into a throwaway
//! in-memory database and runs one learner statement against it.
//!
//! Every column is created as TEXT and every mock value is stored as text, so
//! comparisons and arithmetic in learner queries operate on textual values.

use tracing::{debug, warn};

use crate::{
    catalog::{Drill, SchemaSpec},
    error::Result,
    sql::{
        engine::{Engine, KVEngine, Session},
        types::Value,
    },
    storage::memory::MemoryEngine,
};

pub const EMPTY_QUERY_MESSAGE: &str = "Query is empty or drill not found.";
pub const NO_PREVIEW_MESSAGE: &str =
    "Query executed successfully, but no data returned (only SELECT is supported for preview).";

/// Outcome of a playground run. Failures are data, never an `Err`.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaygroundResult {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Error {
        error: String,
    },
}

impl PlaygroundResult {
    fn error(message: impl Into<String>) -> Self {
        PlaygroundResult::Error { error: message.into() }
    }
}

/// Turns a display name into a table name: the leading whitespace-separated
/// token, with `.` replaced by `_`
pub fn derive_table_name(display_name: &str) -> String {
    display_name
        .split(char::is_whitespace)
        .next()
        .unwrap_or_default()
        .replace('.', "_")
}

/// Whether a schema describes a real table rather than an illustrative
/// artifact (task descriptions, sources, DAGs, bracketed outputs)
pub fn is_materializable(display_name: &str) -> bool {
    let table_name = derive_table_name(display_name);
    !(table_name.contains('[')
        || table_name.contains("Task:")
        || table_name.contains("Source")
        || display_name.contains("DAG"))
}

/// Runs `sql` against a fresh database holding the drill's mock tables
pub fn run_query(drill: Option<&Drill>, sql: &str) -> PlaygroundResult {
    let Some(drill) = drill.filter(|_| !sql.trim().is_empty()) else {
        return PlaygroundResult::error(EMPTY_QUERY_MESSAGE);
    };

    // The engine lives for this call only and is dropped on every return path
    let engine = KVEngine::new(MemoryEngine::new());
    match execute(&engine, drill, sql) {
        Ok(result) => result,
        Err(err) => {
            debug!(day = drill.day, %err, "playground query failed");
            PlaygroundResult::error(err.to_string())
        }
    }
}

fn execute(engine: &KVEngine<MemoryEngine>, drill: &Drill, sql: &str) -> Result<PlaygroundResult> {
    let mut session = engine.session()?;
    for schema in &drill.schema {
        materialize(&mut session, schema)?;
    }

    let result = session.execute(sql)?;
    if !sql.trim_start().to_uppercase().starts_with("SELECT") {
        return Ok(PlaygroundResult::error(NO_PREVIEW_MESSAGE));
    }
    let (columns, rows) = result.into_scan()?;
    Ok(PlaygroundResult::Rows {
        columns: columns.into_iter().map(|l| l.name).collect(),
        rows,
    })
}

/// Creates and fills the table for one schema, if it is materializable
fn materialize(session: &mut Session<KVEngine<MemoryEngine>>, schema: &SchemaSpec) -> Result<()> {
    if !is_materializable(&schema.display_name) {
        warn!(name = %schema.display_name, "skipping conceptual schema");
        return Ok(());
    }
    let Some(first) = schema.mock_data.first() else {
        return Ok(());
    };

    let table_name = derive_table_name(&schema.display_name);
    let keys: Vec<&str> = first.keys().collect();
    let columns = keys
        .iter()
        .map(|k| format!("{} TEXT", quote_ident(k)))
        .collect::<Vec<_>>()
        .join(", ");
    session.execute(&format!("CREATE TABLE {} ({})", quote_ident(&table_name), columns))?;

    let values = schema
        .mock_data
        .iter()
        .map(|row| {
            let texts = keys
                .iter()
                .map(|k| quote_text(&row.get(k).map(|v| v.to_text()).unwrap_or_default()))
                .collect::<Vec<_>>();
            format!("({})", texts.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ");
    let column_list = keys.iter().map(|k| quote_ident(k)).collect::<Vec<_>>().join(", ");
    session.execute(&format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_ident(&table_name),
        column_list,
        values
    ))?;

    debug!(table = %table_name, rows = schema.mock_data.len(), "materialized mock table");
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::{
        derive_table_name, is_materializable, run_query, PlaygroundResult, EMPTY_QUERY_MESSAGE,
        NO_PREVIEW_MESSAGE,
    };
    use crate::{
        catalog::{Catalog, Drill},
        error::Result,
        sql::types::Value,
    };

    fn drill(json: &str) -> Result<Drill> {
        let catalog = Catalog::from_json_str(&format!("[{}]", json))?;
        Ok(catalog.drills()[0].clone())
    }

    fn customers() -> Result<Drill> {
        drill(
            r#"{"day": 1, "example_answer": "", "explanation": "", "schema": [
                {"table_name": "customers", "mock_data": [{"id": 1, "name": "Alice"}, {"id": 2, "name": "Bob"}]},
                {"table_name": "[Output] expected", "mock_data": [{"x": 1}]}
            ]}"#,
        )
    }

    fn text(s: &str) -> Value {
        Value::String(s.to_string())
    }

    #[test]
    fn test_select_one_ignores_schemas() -> Result<()> {
        let drill = drill(
            r#"{"day": 3, "schema": [
                {"table_name": "users.csv", "mock_data": [{"id": 1, "email": "a@example.com"}]},
                {"table_name": "sales (Partitioned by Date)", "mock_data": [{"sale_id": 1, "sale_date (YYYY-MM-DD)": "2023-10-01"}]},
                {"table_name": "orders", "mock_data": [{"order_id": 1, "amount": 10.5, "paid": false}]}
            ]}"#,
        )?;
        assert_eq!(
            run_query(Some(&drill), "SELECT 1"),
            PlaygroundResult::Rows {
                columns: vec!["1".into()],
                rows: vec![vec![Value::Integer(1)]],
            }
        );
        Ok(())
    }

    #[test]
    fn test_derive_table_name() {
        assert_eq!(derive_table_name("users.csv"), "users_csv");
        assert_eq!(derive_table_name("dest_table (既存データ)"), "dest_table");
        assert_eq!(derive_table_name("sales (Partitioned by Date)"), "sales");
        assert_eq!(derive_table_name(""), "");
    }

    #[test]
    fn test_conceptual_filter() -> Result<()> {
        assert!(is_materializable("customers"));
        assert!(!is_materializable("[Output] result"));
        assert!(!is_materializable("Task: build a pipeline"));
        assert!(!is_materializable("DataSource"));
        assert!(!is_materializable("orders DAG"));
        // Only the leading token is checked for Source
        assert!(is_materializable("orders (Source system)"));

        let result = run_query(Some(&customers()?), "SELECT * FROM \"[Output]\"");
        assert_eq!(
            result,
            PlaygroundResult::Error { error: "no such table: [Output]".into() }
        );
        Ok(())
    }

    #[test]
    fn test_where_on_text_column() -> Result<()> {
        assert_eq!(
            run_query(Some(&customers()?), "SELECT name FROM customers WHERE id = 2"),
            PlaygroundResult::Rows {
                columns: vec!["name".into()],
                rows: vec![vec![text("Bob")]],
            }
        );
        Ok(())
    }

    #[test]
    fn test_empty_query() -> Result<()> {
        let expected = PlaygroundResult::Error { error: EMPTY_QUERY_MESSAGE.into() };
        assert_eq!(run_query(Some(&customers()?), "   \n\t"), expected);
        assert_eq!(run_query(None, "SELECT 1"), expected);
        Ok(())
    }

    #[test]
    fn test_non_select_has_no_preview() -> Result<()> {
        let drill = customers()?;
        assert_eq!(
            run_query(Some(&drill), "UPDATE customers SET name='X' WHERE id=1"),
            PlaygroundResult::Error { error: NO_PREVIEW_MESSAGE.into() }
        );
        // Nothing leaks into the next run
        assert_eq!(
            run_query(Some(&drill), "SELECT name FROM customers WHERE id = 1"),
            PlaygroundResult::Rows {
                columns: vec!["name".into()],
                rows: vec![vec![text("Alice")]],
            }
        );
        Ok(())
    }

    #[test]
    fn test_values_are_text() -> Result<()> {
        let drill = drill(
            r#"{"day": 4, "schema": [
                {"table_name": "t", "mock_data": [{"a": null, "b": true, "c": 1.5}, {"a": "x"}]}
            ]}"#,
        )?;
        assert_eq!(
            run_query(Some(&drill), "select a, b, c, c * 2 as d from t"),
            PlaygroundResult::Rows {
                columns: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                rows: vec![
                    vec![text(""), text("true"), text("1.5"), Value::Float(3.0)],
                    vec![text("x"), text(""), text(""), Value::Integer(0)],
                ],
            }
        );
        Ok(())
    }

    #[test]
    fn test_errors_are_results() -> Result<()> {
        let drill = customers()?;
        let PlaygroundResult::Error { error } = run_query(Some(&drill), "SELEC name FROM customers") else {
            panic!("expected an error");
        };
        assert!(error.starts_with("parse error"));

        assert_eq!(
            run_query(Some(&drill), "SELECT nope FROM customers"),
            PlaygroundResult::Error { error: "no such column: nope".into() }
        );
        assert_eq!(
            run_query(Some(&drill), "SELECT 1; SELECT 2"),
            PlaygroundResult::Error { error: "parse error: you can only execute one statement at a time".into() }
        );
        Ok(())
    }

    #[test]
    fn test_duplicate_table_name() -> Result<()> {
        let drill = drill(
            r#"{"day": 5, "schema": [
                {"table_name": "orders", "mock_data": [{"id": 1}]},
                {"table_name": "orders (copy)", "mock_data": [{"id": 3}]}
            ]}"#,
        )?;
        assert_eq!(
            run_query(Some(&drill), "SELECT * FROM orders"),
            PlaygroundResult::Error { error: "table orders already exists".into() }
        );
        Ok(())
    }

    #[test]
    fn test_subqueries_and_union() -> Result<()> {
        let drill = drill(
            r#"{"day": 6, "schema": [
                {"table_name": "customers", "mock_data": [{"id": 1, "name": "Alice"}, {"id": 2, "name": "Bob"}]},
                {"table_name": "orders.csv", "mock_data": [{"order_id": 10, "customer_id": 2}]}
            ]}"#,
        )?;
        assert_eq!(
            run_query(Some(&drill), "SELECT name FROM customers WHERE id IN (SELECT customer_id FROM orders_csv)"),
            PlaygroundResult::Rows {
                columns: vec!["name".into()],
                rows: vec![vec![text("Bob")]],
            }
        );
        assert_eq!(
            run_query(Some(&drill), "SELECT 1 UNION SELECT 2"),
            PlaygroundResult::Rows {
                columns: vec!["1".into()],
                rows: vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
            }
        );
        Ok(())
    }

    #[test]
    fn test_hostile_queries_are_errors() -> Result<()> {
        let drill = customers()?;
        assert_eq!(
            run_query(Some(&drill), "SELECT ABS(-9223372036854775807 - 1)"),
            PlaygroundResult::Error { error: "integer overflow".into() }
        );
        let nested = format!("SELECT {}1{}", "(".repeat(1000), ")".repeat(1000));
        assert_eq!(
            run_query(Some(&drill), &nested),
            PlaygroundResult::Error {
                error: "parse error: expression tree is too large (maximum depth 100)".into()
            }
        );
        Ok(())
    }
}
