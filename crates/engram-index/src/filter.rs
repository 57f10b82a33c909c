// SPDX-FileCopyrightText: 2026 Engram Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filter and sort semantics for index queries.
//!
//! Filters are a conjunction over keys: equality per key, or IN-membership
//! when the filter value is an array. `user_id`, `session_id`, and the
//! record's own fields match top-level; any other key matches metadata.

use std::cmp::Ordering;

use engram_core::types::{MemoryRecord, Metadata, SortDirection, SortSpec};
use serde_json::Value;

/// Resolve a filter key against a record.
fn field_value(record: &MemoryRecord, key: &str) -> Value {
    match key {
        "id" => Value::String(record.id.clone()),
        "memory" => Value::String(record.memory.clone()),
        "user_id" => record
            .user_id
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "session_id" => record
            .session_id
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "created_at" => Value::String(record.created_at.clone()),
        "updated_at" => Value::String(record.updated_at.clone()),
        _ => record.metadata.get(key).cloned().unwrap_or(Value::Null),
    }
}

/// Whether `record` satisfies every key of `filter`.
pub fn record_matches(record: &MemoryRecord, filter: &Metadata) -> bool {
    filter.iter().all(|(key, expected)| {
        let actual = field_value(record, key);
        match expected {
            // Array filter value = IN membership.
            Value::Array(allowed) => allowed.iter().any(|candidate| candidate == &actual),
            _ => expected == &actual,
        }
    })
}

/// Total order over JSON values good enough for sorting records.
///
/// Numbers compare numerically, strings lexically (ISO timestamps sort
/// correctly this way); mixed types fall back to their JSON rendering.
fn cmp_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Sort records by the given sort keys, or newest-first when none given.
pub fn sort_records(records: &mut [MemoryRecord], sort: Option<&[SortSpec]>) {
    match sort {
        Some(specs) if !specs.is_empty() => {
            records.sort_by(|a, b| {
                for spec in specs {
                    let ord = cmp_values(&field_value(a, &spec.field), &field_value(b, &spec.field));
                    let ord = match spec.direction {
                        SortDirection::Asc => ord,
                        SortDirection::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }
        _ => {
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, user_id: Option<&str>, session_id: Option<&str>) -> MemoryRecord {
        MemoryRecord {
            id: id.to_string(),
            user_id: user_id.map(str::to_string),
            session_id: session_id.map(str::to_string),
            memory: "fact".to_string(),
            metadata: Metadata::new(),
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
            updated_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn filter(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn equality_on_scope_fields() {
        let r = record("m1", Some("u1"), Some("s1"));
        assert!(record_matches(&r, &filter(&[("user_id", json!("u1"))])));
        assert!(!record_matches(&r, &filter(&[("user_id", json!("u2"))])));
        assert!(!record_matches(&r, &filter(&[("session_id", json!("s2"))])));
    }

    #[test]
    fn conjunction_across_keys() {
        let r = record("m1", Some("u1"), Some("s1"));
        assert!(record_matches(
            &r,
            &filter(&[("user_id", json!("u1")), ("session_id", json!("s1"))])
        ));
        assert!(!record_matches(
            &r,
            &filter(&[("user_id", json!("u1")), ("session_id", json!("s2"))])
        ));
    }

    #[test]
    fn array_value_is_in_membership() {
        let r = record("m1", Some("u1"), None);
        assert!(record_matches(
            &r,
            &filter(&[("user_id", json!(["u0", "u1", "u2"]))])
        ));
        assert!(!record_matches(&r, &filter(&[("user_id", json!(["u3"]))])));
    }

    #[test]
    fn metadata_keys_match_against_metadata() {
        let mut r = record("m1", None, None);
        r.metadata.insert("topic".into(), json!("food"));
        assert!(record_matches(&r, &filter(&[("topic", json!("food"))])));
        assert!(!record_matches(&r, &filter(&[("topic", json!("sports"))])));
        // Absent metadata key only matches an explicit null.
        assert!(!record_matches(&r, &filter(&[("missing", json!("x"))])));
        assert!(record_matches(&r, &filter(&[("missing", Value::Null)])));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let r = record("m1", None, None);
        assert!(record_matches(&r, &Metadata::new()));
    }

    #[test]
    fn scope_isolation_between_sessions() {
        let a = record("m1", None, Some("A"));
        let b = record("m2", None, Some("B"));
        let f = filter(&[("session_id", json!("A"))]);
        assert!(record_matches(&a, &f));
        assert!(!record_matches(&b, &f));
    }

    #[test]
    fn default_sort_is_newest_first() {
        let mut old = record("old", None, None);
        old.created_at = "2026-01-01T00:00:00.000Z".into();
        let mut new = record("new", None, None);
        new.created_at = "2026-02-01T00:00:00.000Z".into();

        let mut records = vec![old, new];
        sort_records(&mut records, None);
        assert_eq!(records[0].id, "new");
    }

    #[test]
    fn explicit_sort_ascending_on_metadata_number() {
        let mut a = record("a", None, None);
        a.metadata.insert("rank".into(), json!(2));
        let mut b = record("b", None, None);
        b.metadata.insert("rank".into(), json!(1));

        let mut records = vec![a, b];
        sort_records(
            &mut records,
            Some(&[SortSpec {
                field: "rank".into(),
                direction: SortDirection::Asc,
            }]),
        );
        assert_eq!(records[0].id, "b");
    }
}
