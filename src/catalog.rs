//! Drill definitions, loaded once from a JSON document and read-only afterwards.

use std::{fmt, path::Path};

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer,
};
use tracing::{debug, info};

use crate::error::Result;

/// One day's exercise
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Drill {
    pub day: u32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub schema: Vec<SchemaSpec>,
    #[serde(default)]
    pub example_answer: String,
}

/// A named table description with its mock rows, as authored in drill content
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchemaSpec {
    /// Human-readable name such as `users.csv` or `dest_table (existing)`
    #[serde(rename = "table_name", default)]
    pub display_name: String,
    #[serde(default)]
    pub mock_data: Vec<MockRow>,
}

/// A mock data scalar
#[derive(Debug, Clone, PartialEq)]
pub enum MockValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MockValue {
    /// The text stored in the playground: null becomes the empty string,
    /// booleans are `true`/`false`, floats keep their fraction (`1.0`)
    pub fn to_text(&self) -> String {
        match self {
            MockValue::Null => String::new(),
            MockValue::Bool(b) => b.to_string(),
            MockValue::Integer(i) => i.to_string(),
            MockValue::Float(f) => serde_json::Number::from_f64(*f).map_or_else(|| f.to_string(), |n| n.to_string()),
            MockValue::Text(s) => s.clone(),
        }
    }
}

impl From<serde_json::Value> for MockValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => MockValue::Null,
            serde_json::Value::Bool(b) => MockValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => MockValue::Integer(i),
                None => MockValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => MockValue::Text(s),
            // Nested structures are kept as their JSON text
            other => MockValue::Text(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for MockValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(MockValue::from)
    }
}

/// A mock row: column name to value, in document order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockRow(pub Vec<(String, MockValue)>);

impl MockRow {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn get(&self, key: &str) -> Option<&MockValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

struct MockRowVisitor;

impl<'de> Visitor<'de> for MockRowVisitor {
    type Value = MockRow;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<MockRow, A::Error> {
        let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, MockValue>()? {
            entries.push((key, value));
        }
        Ok(MockRow(entries))
    }
}

impl<'de> Deserialize<'de> for MockRow {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_map(MockRowVisitor)
    }
}

/// The loaded drills, sorted by day
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    drills: Vec<Drill>,
}

impl Catalog {
    /// Loads drills from a JSON file. A missing file yields an empty catalog.
    pub fn load_all(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "no drill file, starting with an empty catalog");
            return Ok(Self::default());
        }
        let catalog = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        debug!(path = %path.display(), drills = catalog.drills.len(), "loaded drill catalog");
        Ok(catalog)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self::from_drills(serde_json::from_str(json)?))
    }

    pub fn from_drills(mut drills: Vec<Drill>) -> Self {
        drills.sort_by_key(|d| d.day);
        Self { drills }
    }

    pub fn find_by_day(&self, day: u32) -> Option<&Drill> {
        self.drills.iter().find(|d| d.day == day)
    }

    pub fn drills(&self) -> &[Drill] {
        &self.drills
    }
}

#[cfg(test)]
mod tests {
    use super::{Catalog, MockRow, MockValue};
    use crate::error::Result;

    const DRILLS: &str = r#"[
        {
            "day": 2,
            "title": "Joins",
            "explanation": "join them",
            "schema": [
                {"table_name": "customers", "mock_data": [
                    {"name": "Alice", "customer_id": 1, "vip": true, "note": null}
                ]}
            ],
            "example_answer": "SELECT 1"
        },
        {"day": 1, "schema": [], "example_answer": "", "explanation": ""}
    ]"#;

    #[test]
    fn test_load_sorted_with_ordered_rows() -> Result<()> {
        let catalog = Catalog::from_json_str(DRILLS)?;
        assert_eq!(catalog.drills().iter().map(|d| d.day).collect::<Vec<_>>(), vec![1, 2]);

        let drill = catalog.find_by_day(2).expect("day 2");
        assert_eq!(drill.title, "Joins");
        let row = &drill.schema[0].mock_data[0];
        // Document order, not alphabetical
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["name", "customer_id", "vip", "note"]);
        assert_eq!(row.get("customer_id"), Some(&MockValue::Integer(1)));
        assert_eq!(row.get("vip").map(MockValue::to_text), Some("true".to_string()));
        assert_eq!(row.get("note").map(MockValue::to_text), Some(String::new()));
        assert!(catalog.find_by_day(3).is_none());
        Ok(())
    }

    #[test]
    fn test_float_text_keeps_fraction() -> Result<()> {
        let row: MockRow = serde_json::from_str(r#"{"price": 1.0, "rate": 0.25, "qty": 3}"#)?;
        assert_eq!(row.get("price"), Some(&MockValue::Float(1.0)));
        assert_eq!(row.get("price").map(MockValue::to_text), Some("1.0".to_string()));
        assert_eq!(row.get("rate").map(MockValue::to_text), Some("0.25".to_string()));
        assert_eq!(row.get("qty").map(MockValue::to_text), Some("3".to_string()));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let catalog = Catalog::load_all(dir.path().join("drills.json"))?;
        assert!(catalog.drills().is_empty());

        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json")?;
        assert!(Catalog::load_all(&path).is_err());
        Ok(())
    }
}
