// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use super::*;
use serde_json::json;

// ---------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------

fn paths(violations: &[Violation]) -> Vec<&str> {
    violations.iter().map(|v| v.path.as_str()).collect()
}

fn person() -> ObjectShape {
    ObjectShape::new()
        .field("name", FieldSpec::of_type(JsonType::String).required())
        .field(
            "age",
            FieldSpec {
                min: Some(0.0),
                max: Some(150.0),
                ..FieldSpec::of_type(JsonType::Integer)
            },
        )
}

// ---------------------------------------------------------------
// AnyJson / TypedShape
// ---------------------------------------------------------------

#[test]
fn any_json_accepts_everything() {
    assert!(AnyJson.validate(&json!(null)).is_empty());
    assert!(AnyJson.check_partial(&json!([1, 2])).is_ok());
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Report {
    #[serde(rename = "requiredField")]
    required_field: String,
    note: Option<String>,
}

#[test]
fn typed_shape_maps_missing_field_to_path() {
    let shape = TypedShape::<Report>::new();
    let violations = shape.validate(&json!({"note": "x"}));
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].path, "requiredField");
    assert!(violations[0].message.contains("missing field"));
    assert!(shape.check_partial(&json!({"note": "x"})).is_err());
}

#[test]
fn typed_shape_accepts_matching_value() {
    let shape = TypedShape::<Report>::new();
    assert!(shape.validate(&json!({"requiredField": "ok"})).is_empty());
}

#[test]
fn typed_shape_type_error_has_root_path() {
    let shape = TypedShape::<Report>::new();
    let violations = shape.validate(&json!([1]));
    assert_eq!(paths(&violations), vec![""]);
}

// ---------------------------------------------------------------
// ObjectShape
// ---------------------------------------------------------------

#[test]
fn object_shape_accepts_valid_value() {
    assert!(person().validate(&json!({"name": "Alice", "age": 3})).is_empty());
}

#[test]
fn missing_required_field_is_reported() {
    let violations = person().validate(&json!({"age": 3}));
    assert_eq!(
        violations,
        vec![Violation::new("name", "required field is missing")]
    );
}

#[test]
fn null_counts_as_missing() {
    let violations = person().validate(&json!({"name": null}));
    assert_eq!(paths(&violations), vec!["name"]);
}

#[test]
fn collects_every_violation() {
    let violations = person().validate(&json!({"age": -1}));
    assert_eq!(paths(&violations), vec!["age", "name"]);
    assert!(violations[0].message.contains("less than minimum"));
}

#[test]
fn type_mismatch_skips_other_predicates() {
    let violations = person().validate(&json!({"name": "A", "age": "old"}));
    assert_eq!(violations.len(), 1);
    assert_eq!(
        violations[0].message,
        "expected type \"integer\", got \"string\""
    );
}

#[test]
fn top_level_non_object_has_empty_path() {
    let violations = person().validate(&json!("nope"));
    assert_eq!(paths(&violations), vec![""]);
    assert_eq!(violations[0].to_string(), "expected type \"object\", got \"string\"");
}

#[test]
fn string_predicates() {
    let shape = ObjectShape::new().field(
        "url",
        FieldSpec {
            starts_with: Some("https://".to_string()),
            not_contains: vec!["..".to_string()],
            matches: Some(Pattern::new(r"^[a-z:/.]+$").unwrap()),
            max_length: Some(12),
            ..FieldSpec::default()
        },
    );
    assert!(shape.validate(&json!({"url": "https://a.io"})).is_empty());

    let violations = shape.validate(&json!({"url": "http://../X/long"}));
    let messages: Vec<_> = violations.iter().map(|v| v.message.as_str()).collect();
    assert_eq!(violations.len(), 4, "{messages:?}");
    assert!(paths(&violations).iter().all(|p| *p == "url"));
}

#[test]
fn one_of_predicate() {
    let shape = ObjectShape::new().field(
        "mode",
        FieldSpec {
            one_of: Some(vec!["fast".to_string(), "slow".to_string()]),
            ..FieldSpec::default()
        },
    );
    assert!(shape.validate(&json!({"mode": "fast"})).is_empty());
    assert_eq!(shape.validate(&json!({"mode": "medium"})).len(), 1);
    assert_eq!(
        shape.validate(&json!({"mode": 3}))[0].message,
        "expected string for string checks"
    );
}

#[test]
fn max_length_counts_characters() {
    let shape = ObjectShape::new().field(
        "s",
        FieldSpec {
            max_length: Some(2),
            ..FieldSpec::default()
        },
    );
    assert!(shape.validate(&json!({"s": "éé"})).is_empty());
}

#[test]
fn nested_fields_use_dotted_paths() {
    let shape = ObjectShape::new().field(
        "address",
        FieldSpec::of_type(JsonType::Object)
            .required()
            .with_fields(ObjectShape::new().field("city", FieldSpec::of_type(JsonType::String).required())),
    );
    let violations = shape.validate(&json!({"address": {}}));
    assert_eq!(paths(&violations), vec!["address.city"]);
}

#[test]
fn array_items_use_indexed_paths() {
    let shape = ObjectShape::new().field(
        "tags",
        FieldSpec::of_type(JsonType::Array).with_items(FieldSpec::of_type(JsonType::String)),
    );
    let violations = shape.validate(&json!({"tags": ["a", "b", 3]}));
    assert_eq!(paths(&violations), vec!["tags[2]"]);
}

#[test]
fn additional_fields_rejected_when_denied() {
    let shape = person().deny_additional();
    let violations = shape.validate(&json!({"name": "A", "extra": 1}));
    assert_eq!(
        violations,
        vec![Violation::new("extra", "unexpected field")]
    );
    assert!(person().validate(&json!({"name": "A", "extra": 1})).is_empty());
}

#[test]
fn check_partial_reports_first_violation() {
    let reason = person().check_partial(&json!({})).unwrap_err();
    assert_eq!(reason, "name: required field is missing");
}

#[test]
fn json_type_names_round_trip() {
    for name in ["string", "number", "integer", "boolean", "array", "object", "null"] {
        assert_eq!(JsonType::parse(name).map(JsonType::name), Some(name));
    }
    assert_eq!(JsonType::parse("float"), None);
    assert!(JsonType::Number.matches(&json!(1.5)));
    assert!(!JsonType::Integer.matches(&json!(1.5)));
}
