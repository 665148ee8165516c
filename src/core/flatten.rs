use crate::domain::model::{Fields, FlatRecord, Record};
use crate::utils::error::{HarvestError, Result};
use serde_json::Value;

/// Result of flattening one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Flattened {
    pub record: FlatRecord,
    /// Joined keys written more than once; the last value won.
    pub collisions: Vec<String>,
}

/// Collapses nested objects into `parent<delimiter>child` keys.
///
/// Arrays and scalars are copied unchanged. An empty object has no leaves
/// and is kept as a leaf so that [`unflatten`] can restore it.
pub fn flatten(record: &Record, delimiter: &str) -> Flattened {
    let mut fields = Fields::new();
    let mut collisions = Vec::new();
    flatten_into(&record.data, None, delimiter, &mut fields, &mut collisions);

    for key in &collisions {
        tracing::warn!(
            "⚠️ Flattened key '{}' produced more than once, keeping last value",
            key
        );
    }

    Flattened {
        record: FlatRecord::new(fields),
        collisions,
    }
}

fn flatten_into(
    source: &Fields,
    prefix: Option<&str>,
    delimiter: &str,
    out: &mut Fields,
    collisions: &mut Vec<String>,
) {
    for (key, value) in source {
        let path = match prefix {
            Some(prefix) => format!("{}{}{}", prefix, delimiter, key),
            None => key.clone(),
        };

        match value {
            Value::Object(child) if !child.is_empty() => {
                flatten_into(child, Some(&path), delimiter, out, collisions);
            }
            leaf => {
                if out.insert(path.clone(), leaf.clone()).is_some() && !collisions.contains(&path) {
                    collisions.push(path);
                }
            }
        }
    }
}

/// Flattens a whole collection, dropping collision details after logging.
pub fn flatten_all(records: &[Record], delimiter: &str) -> Vec<FlatRecord> {
    records
        .iter()
        .map(|record| flatten(record, delimiter).record)
        .collect()
}

/// Rebuilds nesting by splitting keys on `delimiter`.
///
/// Fails when one key is both a leaf and a prefix of another key.
pub fn unflatten(flat: &FlatRecord, delimiter: &str) -> Result<Record> {
    let mut root = Fields::new();

    for (key, value) in &flat.data {
        let segments: Vec<&str> = key.split(delimiter).collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| HarvestError::processing("empty flattened key"))?;

        let mut cursor = &mut root;
        for segment in parents {
            let slot = cursor
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Fields::new()));
            cursor = match slot {
                Value::Object(child) => child,
                _ => {
                    return Err(HarvestError::processing(format!(
                        "key '{}' conflicts with leaf '{}'",
                        key, segment
                    )))
                }
            };
        }

        if cursor.contains_key(*last) {
            return Err(HarvestError::processing(format!(
                "key '{}' conflicts with an existing nested path",
                key
            )));
        }
        cursor.insert(last.to_string(), value.clone());
    }

    Ok(Record::new(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn test_flatten_nested_paths() {
        let flat = flatten(&record(json!({"x": {"y": 1, "z": {"w": 2}}})), ".");
        assert_eq!(
            Value::Object(flat.record.data),
            json!({"x.y": 1, "x.z.w": 2})
        );
        assert!(flat.collisions.is_empty());
    }

    #[test]
    fn test_flatten_keeps_arrays_and_nulls_as_leaves() {
        let flat = flatten(
            &record(json!({"data": {"authors": [{"name": "A"}], "doi": null}})),
            "_",
        );
        assert_eq!(
            Value::Object(flat.record.data),
            json!({"data_authors": [{"name": "A"}], "data_doi": null})
        );
    }

    #[test]
    fn test_flatten_preserves_key_order() {
        let flat = flatten(&record(json!({"b": 1, "a": {"d": 2, "c": 3}, "e": 4})), ".");
        let keys: Vec<&String> = flat.record.columns().collect();
        assert_eq!(keys, vec!["b", "a.d", "a.c", "e"]);
    }

    #[test]
    fn test_flatten_reports_collisions_last_write_wins() {
        let flat = flatten(&record(json!({"a.b": 1, "a": {"b": 2}})), ".");
        assert_eq!(flat.collisions, vec!["a.b".to_string()]);
        assert_eq!(flat.record.get("a.b"), Some(&json!(2)));
    }

    #[test]
    fn test_flatten_keeps_empty_object_leaf() {
        let flat = flatten(&record(json!({"meta": {}, "x": 1})), ".");
        assert_eq!(flat.record.get("meta"), Some(&json!({})));
        let restored = unflatten(&flat.record, ".").unwrap();
        assert_eq!(restored, record(json!({"meta": {}, "x": 1})));
    }

    #[test]
    fn test_unflatten_conflict() {
        let flat = FlatRecord::new(
            json!({"a": 1, "a.b": 2})
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert!(unflatten(&flat, ".").is_err());
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z ]{0,8}".prop_map(Value::String),
        ]
    }

    fn nested() -> impl Strategy<Value = Value> {
        leaf().prop_recursive(3, 24, 4, |inner| {
            prop::collection::btree_map("[a-z]{1,4}", inner, 1..4)
                .prop_map(|map| Value::Object(map.into_iter().collect()))
        })
    }

    fn nested_record() -> impl Strategy<Value = Record> {
        prop::collection::btree_map("[a-z]{1,4}", nested(), 0..5)
            .prop_map(|map| Record::new(map.into_iter().collect()))
    }

    proptest! {
        #[test]
        fn prop_flatten_is_idempotent(input in nested_record()) {
            let once = flatten(&input, ".").record;
            let twice = flatten(&Record::new(once.data.clone()), ".").record;
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_unflatten_recovers_nesting(input in nested_record()) {
            let flat = flatten(&input, ".");
            prop_assert!(flat.collisions.is_empty());
            let restored = unflatten(&flat.record, ".").unwrap();
            prop_assert_eq!(restored, input);
        }
    }
}
