//! Snapshot and extracted record structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// One program, flattened to the configured output fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    /// Value of a named field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Snapshot line: rendered values joined by commas, in field order.
    pub fn to_line(&self) -> String {
        self.fields
            .iter()
            .map(|(_, value)| render_value(value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Render a scalar for display; null becomes an empty string.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Serialize records into the text form that gets stored and diffed.
pub fn render_snapshot(records: &[Record]) -> String {
    records
        .iter()
        .map(Record::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// One stored extraction cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub taken_at: DateTime<Utc>,

    /// Hex SHA-256 of `data`
    pub digest: String,

    pub data: String,
}

impl Snapshot {
    pub fn new(data: String) -> Self {
        Self::at(Utc::now(), data)
    }

    pub fn at(taken_at: DateTime<Utc>, data: String) -> Self {
        Self {
            taken_at,
            digest: digest(&data),
            data,
        }
    }

    /// Short digest prefix for logs.
    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}

fn digest(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, updated: Value) -> Record {
        let mut record = Record::new();
        record.push("title", Value::from(title));
        record.push("last_update_at", updated);
        record
    }

    #[test]
    fn test_record_line_keeps_field_order() {
        let line = record("Acme", Value::from("2026-01-02")).to_line();
        assert_eq!(line, "Acme,2026-01-02");
    }

    #[test]
    fn test_null_renders_empty() {
        assert_eq!(record("Acme", Value::Null).to_line(), "Acme,");
        assert_eq!(render_value(&Value::from(12)), "12");
        assert_eq!(render_value(&Value::from(true)), "true");
    }

    #[test]
    fn test_render_snapshot() {
        let records = vec![
            record("A", Value::from(1)),
            record("B", Value::from(2)),
        ];
        assert_eq!(render_snapshot(&records), "A,1\nB,2");
        assert_eq!(render_snapshot(&[]), "");
    }

    #[test]
    fn test_snapshot_digest_tracks_content() {
        let a = Snapshot::new("A,1".into());
        let b = Snapshot::new("A,1".into());
        let c = Snapshot::new("A,2".into());
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
        assert_eq!(a.digest.len(), 64);
        assert_eq!(a.short_digest().len(), 12);
    }

    #[test]
    fn test_record_get() {
        let r = record("Acme", Value::Null);
        assert_eq!(r.get("title"), Some(&Value::from("Acme")));
        assert_eq!(r.get("missing"), None);
        assert_eq!(r.fields().count(), 2);
    }
}
