//! Record-shape discovery for project logs: per `type`, a handful of
//! examples and the union of their JSON types.

use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// A loose JSON-Schema: the set of JSON types seen, plus nested shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Shape {
    #[serde(rename = "type")]
    pub types: BTreeSet<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Shape>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Shape>>,
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl Shape {
    pub fn of(value: &Value) -> Self {
        let mut shape = Shape {
            types: BTreeSet::from([type_name(value)]),
            ..Default::default()
        };
        match value {
            Value::Object(map) => {
                shape.properties =
                    Some(map.iter().map(|(k, v)| (k.clone(), Shape::of(v))).collect());
            }
            Value::Array(items) => {
                let merged = items
                    .iter()
                    .map(Shape::of)
                    .reduce(|acc, next| acc.merge(next))
                    .unwrap_or_default();
                shape.items = Some(Box::new(merged));
            }
            _ => {}
        }
        shape
    }

    /// Union of both shapes. Keys present on one side only keep that side's
    /// shape.
    pub fn merge(mut self, other: Shape) -> Self {
        self.types.extend(other.types);

        self.properties = match (self.properties.take(), other.properties) {
            (None, None) => None,
            (Some(p), None) | (None, Some(p)) => Some(p),
            (Some(mut mine), Some(theirs)) => {
                for (key, shape) in theirs {
                    let merged = match mine.remove(&key) {
                        Some(existing) => existing.merge(shape),
                        None => shape,
                    };
                    mine.insert(key, merged);
                }
                Some(mine)
            }
        };

        self.items = match (self.items.take(), other.items) {
            (None, None) => None,
            (Some(i), None) | (None, Some(i)) => Some(i),
            (Some(mine), Some(theirs)) => Some(Box::new(mine.merge(*theirs))),
        };

        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TypeSamples {
    pub count: usize,
    pub required_keys: Vec<String>,
    pub schema: Shape,
    pub examples: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchemaSamples {
    pub total_records: usize,
    pub sample_limit: usize,
    pub types: BTreeMap<String, TypeSamples>,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    examples: Vec<Value>,
    schema: Option<Shape>,
    keys: Option<BTreeSet<String>>,
}

/// Group every record by its `type` field (non-strings count as `unknown`)
/// and sample the first `sample_limit` of each.
pub fn extract_schema_samples(paths: &[PathBuf], sample_limit: usize) -> Result<SchemaSamples> {
    let mut by_type: BTreeMap<String, Accumulator> = BTreeMap::new();
    let mut total_records = 0;

    for path in paths {
        for (_, record) in claude_log::iter_jsonl(path)? {
            total_records += 1;
            let key = record
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let acc = by_type.entry(key).or_default();
            acc.count += 1;
            if acc.examples.len() >= sample_limit {
                continue;
            }

            let shape = Shape::of(&record);
            acc.schema = Some(match acc.schema.take() {
                Some(existing) => existing.merge(shape),
                None => shape,
            });
            let keys: BTreeSet<String> = record
                .as_object()
                .map(|o| o.keys().cloned().collect())
                .unwrap_or_default();
            acc.keys = Some(match acc.keys.take() {
                Some(existing) => existing.intersection(&keys).cloned().collect(),
                None => keys,
            });
            acc.examples.push(record);
        }
    }

    let types = by_type
        .into_iter()
        .map(|(key, acc)| {
            (
                key,
                TypeSamples {
                    count: acc.count,
                    required_keys: acc.keys.unwrap_or_default().into_iter().collect(),
                    schema: acc.schema.unwrap_or_default(),
                    examples: acc.examples,
                },
            )
        })
        .collect();

    Ok(SchemaSamples {
        total_records,
        sample_limit,
        types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn shape_of_nested_value() {
        let shape = Shape::of(&json!({"a": [1, "x"], "b": null}));
        let value = serde_json::to_value(&shape).unwrap();
        assert_eq!(value["type"], json!(["object"]));
        assert_eq!(value["properties"]["a"]["items"]["type"], json!(["number", "string"]));
        assert_eq!(value["properties"]["b"]["type"], json!(["null"]));
    }

    #[test]
    fn merge_unions_types_and_properties() {
        let merged = Shape::of(&json!({"a": 1})).merge(Shape::of(&json!({"a": "s", "b": true})));
        let props = merged.properties.unwrap();
        assert_eq!(props["a"].types, BTreeSet::from(["number", "string"]));
        assert_eq!(props["b"].types, BTreeSet::from(["boolean"]));
    }

    #[test]
    fn samples_grouped_by_type() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        std::fs::write(
            &path,
            [
                r#"{"type":"user","uuid":"1","cwd":"/a"}"#,
                r#"{"type":"user","uuid":"2"}"#,
                r#"{"type":"user","uuid":"3","extra":1}"#,
                r#"{"type":"assistant","uuid":"4"}"#,
                r#"{"type":7}"#,
                "not json",
            ]
            .join("\n"),
        )
        .unwrap();

        let samples = extract_schema_samples(&[path], 2).unwrap();
        assert_eq!(samples.total_records, 5);
        let user = &samples.types["user"];
        assert_eq!(user.count, 3);
        assert_eq!(user.examples.len(), 2);
        assert_eq!(user.required_keys, vec!["type", "uuid"]);
        assert!(user.schema.properties.as_ref().unwrap().contains_key("cwd"));
        assert!(!user.schema.properties.as_ref().unwrap().contains_key("extra"));
        assert_eq!(samples.types["unknown"].count, 1);
    }
}
