//! Per-field shadow records used to resolve out-of-order view updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Last write seen for a field, or for one element of an array field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaRecord {
    pub removed: bool,
    pub timestamp: DateTime<Utc>,
    pub value: Value,
}

impl MetaRecord {
    pub fn written(timestamp: DateTime<Utc>, value: Value) -> Self {
        Self {
            removed: false,
            timestamp,
            value,
        }
    }

    pub fn removed(timestamp: DateTime<Utc>, value: Value) -> Self {
        Self {
            removed: true,
            timestamp,
            value,
        }
    }

    /// Parses a single record; anything else yields `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    /// Parses an array of records, skipping entries that are not records.
    pub fn list_from_value(value: Option<&Value>) -> Vec<Self> {
        match value {
            Some(Value::Array(items)) => items.iter().filter_map(Self::from_value).collect(),
            _ => Vec::new(),
        }
    }

    /// Returns true if this record was written strictly after `timestamp`.
    pub fn is_newer_than(&self, timestamp: DateTime<Utc>) -> bool {
        self.timestamp > timestamp
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_record_roundtrips_through_json() {
        let record = MetaRecord::written(Utc::now(), json!({"a": 1}));
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["removed"], false);
        assert!(value["timestamp"].is_string());
        assert_eq!(MetaRecord::from_value(&value), Some(record));
    }

    #[test]
    fn test_non_records_are_ignored() {
        let now = Utc::now();
        let list = json!([
            serde_json::to_value(MetaRecord::removed(now, json!("x"))).unwrap(),
            {"nested": {"removed": false}},
            "plain",
        ]);

        let records = MetaRecord::list_from_value(Some(&list));

        assert_eq!(records, vec![MetaRecord::removed(now, json!("x"))]);
        assert!(MetaRecord::list_from_value(Some(&json!({"a": 1}))).is_empty());
        assert!(MetaRecord::list_from_value(None).is_empty());
        assert_eq!(MetaRecord::from_value(&json!({"nested": {}})), None);
    }

    #[test]
    fn test_is_newer_than_is_strict() {
        let now = Utc::now();
        let record = MetaRecord::written(now, json!(1));

        assert!(!record.is_newer_than(now));
        assert!(record.is_newer_than(now - Duration::seconds(1)));
        assert!(!record.is_newer_than(now + Duration::seconds(1)));
    }
}
