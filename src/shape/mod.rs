// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Target shapes
//
// The rules a streamed value is checked against. Shapes are consumed, not
// defined, by the pipeline: mid-stream they only decide whether a value is
// ready, at finalization they enumerate every violation with its path.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Violations
// ---------------------------------------------------------------------------

/// One violated constraint. `path` is dotted/indexed (`address.city`,
/// `tags[2]`); the empty path is the value itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

// ---------------------------------------------------------------------------
// Shape trait
// ---------------------------------------------------------------------------

/// Validation rules for the streamed value.
pub trait TargetShape: Send + Sync {
    /// Every constraint `value` violates. Empty means valid.
    fn validate(&self, value: &Value) -> Vec<Violation>;

    /// Mid-stream readiness. An `Err` is not a failure, only "no value yet".
    fn check_partial(&self, value: &Value) -> Result<(), String> {
        match self.validate(value).into_iter().next() {
            Some(violation) => Err(violation.to_string()),
            None => Ok(()),
        }
    }
}

/// Accepts any syntactically valid JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyJson;

impl TargetShape for AnyJson {
    fn validate(&self, _value: &Value) -> Vec<Violation> {
        Vec::new()
    }

    fn check_partial(&self, _value: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// Valid iff the value deserializes into `T`.
pub struct TypedShape<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> TypedShape<T> {
    pub fn new() -> Self {
        Self {
            _target: PhantomData,
        }
    }
}

impl<T> Default for TypedShape<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for TypedShape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedShape")
            .field("target", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: DeserializeOwned> TargetShape for TypedShape<T> {
    fn validate(&self, value: &Value) -> Vec<Violation> {
        match T::deserialize(value) {
            Ok(_) => Vec::new(),
            Err(err) => vec![violation_from_serde(&err.to_string())],
        }
    }
}

/// serde reports "missing field `x`" / "unknown field `x`, expected ..."
/// without a path; lift the field name into one.
fn violation_from_serde(message: &str) -> Violation {
    let field = ["missing field `", "unknown field `"]
        .iter()
        .find_map(|prefix| message.strip_prefix(prefix))
        .and_then(|rest| rest.split('`').next());
    match field {
        Some(name) => Violation::new(name, message),
        None => Violation::new("", message),
    }
}

// ---------------------------------------------------------------------------
// Declarative object shape
// ---------------------------------------------------------------------------

/// JSON type names accepted by `FieldSpec::type_check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "string" => JsonType::String,
            "number" => JsonType::Number,
            "integer" => JsonType::Integer,
            "boolean" => JsonType::Boolean,
            "array" => JsonType::Array,
            "object" => JsonType::Object,
            "null" => JsonType::Null,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Null => "null",
        }
    }

    pub fn matches(self, value: &Value) -> bool {
        match self {
            JsonType::String => value.is_string(),
            JsonType::Number => value.is_number(),
            JsonType::Integer => value.is_i64() || value.is_u64(),
            JsonType::Boolean => value.is_boolean(),
            JsonType::Array => value.is_array(),
            JsonType::Object => value.is_object(),
            JsonType::Null => value.is_null(),
        }
    }
}

/// A compiled regex that remembers its source text.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

/// Constraints on one field. All set predicates must hold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSpec {
    pub required: bool,
    pub type_check: Option<JsonType>,
    pub starts_with: Option<String>,
    pub not_contains: Vec<String>,
    pub matches: Option<Pattern>,
    pub one_of: Option<Vec<String>>,
    /// Maximum length in characters.
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Shape of an object-valued field.
    pub fields: Option<ObjectShape>,
    /// Spec applied to every element of an array-valued field.
    pub items: Option<Box<FieldSpec>>,
}

impl FieldSpec {
    pub fn of_type(json_type: JsonType) -> Self {
        Self {
            type_check: Some(json_type),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_fields(mut self, shape: ObjectShape) -> Self {
        self.fields = Some(shape);
        self
    }

    pub fn with_items(mut self, items: FieldSpec) -> Self {
        self.items = Some(Box::new(items));
        self
    }

    fn check(&self, path: &str, value: &Value, out: &mut Vec<Violation>) {
        if let Some(expected) = self.type_check {
            if !expected.matches(value) {
                out.push(Violation::new(
                    path,
                    format!(
                        "expected type \"{}\", got \"{}\"",
                        expected.name(),
                        json_type_name(value)
                    ),
                ));
                return;
            }
        }

        self.check_string(path, value, out);
        self.check_number(path, value, out);

        if let Some(shape) = &self.fields {
            shape.check_object(path, value, out);
        }

        if let Some(items) = &self.items {
            match value.as_array() {
                Some(elements) => {
                    for (idx, element) in elements.iter().enumerate() {
                        items.check(&format!("{path}[{idx}]"), element, out);
                    }
                }
                None => out.push(Violation::new(path, "expected array for items check")),
            }
        }
    }

    fn check_string(&self, path: &str, value: &Value, out: &mut Vec<Violation>) {
        let has_string_predicate = self.starts_with.is_some()
            || !self.not_contains.is_empty()
            || self.matches.is_some()
            || self.one_of.is_some()
            || self.max_length.is_some();
        if !has_string_predicate {
            return;
        }
        let Some(text) = value.as_str() else {
            out.push(Violation::new(path, "expected string for string checks"));
            return;
        };

        if let Some(prefix) = &self.starts_with {
            if !text.starts_with(prefix.as_str()) {
                out.push(Violation::new(
                    path,
                    format!("value \"{text}\" does not start with \"{prefix}\""),
                ));
            }
        }
        for forbidden in &self.not_contains {
            if text.contains(forbidden.as_str()) {
                out.push(Violation::new(
                    path,
                    format!("contains forbidden substring \"{forbidden}\""),
                ));
            }
        }
        if let Some(pattern) = &self.matches {
            if !pattern.is_match(text) {
                out.push(Violation::new(
                    path,
                    format!(
                        "value \"{text}\" does not match pattern \"{}\"",
                        pattern.as_str()
                    ),
                ));
            }
        }
        if let Some(allowed) = &self.one_of {
            if !allowed.iter().any(|candidate| candidate == text) {
                out.push(Violation::new(
                    path,
                    format!("value \"{text}\" not in allowed list {allowed:?}"),
                ));
            }
        }
        if let Some(max_length) = self.max_length {
            let length = text.chars().count();
            if length > max_length {
                out.push(Violation::new(
                    path,
                    format!("length {length} exceeds maximum {max_length}"),
                ));
            }
        }
    }

    fn check_number(&self, path: &str, value: &Value, out: &mut Vec<Violation>) {
        if self.min.is_none() && self.max.is_none() {
            return;
        }
        let Some(number) = value.as_f64() else {
            out.push(Violation::new(path, "expected number for range checks"));
            return;
        };
        if let Some(min) = self.min {
            if number < min {
                out.push(Violation::new(
                    path,
                    format!("value {number} is less than minimum {min}"),
                ));
            }
        }
        if let Some(max) = self.max {
            if number > max {
                out.push(Violation::new(
                    path,
                    format!("value {number} exceeds maximum {max}"),
                ));
            }
        }
    }
}

/// Declarative shape of a JSON object. Collects every violation rather
/// than stopping at the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    pub fields: BTreeMap<String, FieldSpec>,
    /// When false, keys without a field spec are violations.
    pub allow_additional: bool,
}

impl ObjectShape {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            allow_additional: true,
        }
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    pub fn deny_additional(mut self) -> Self {
        self.allow_additional = false;
        self
    }

    fn check_object(&self, path: &str, value: &Value, out: &mut Vec<Violation>) {
        let Some(map) = value.as_object() else {
            out.push(Violation::new(
                path,
                format!(
                    "expected type \"object\", got \"{}\"",
                    json_type_name(value)
                ),
            ));
            return;
        };

        for (name, spec) in &self.fields {
            let field_path = join_path(path, name);
            match map.get(name) {
                None | Some(Value::Null) => {
                    if spec.required {
                        out.push(Violation::new(field_path, "required field is missing"));
                    }
                }
                Some(field) => spec.check(&field_path, field, out),
            }
        }

        if !self.allow_additional {
            for key in map.keys().filter(|key| !self.fields.contains_key(*key)) {
                out.push(Violation::new(
                    join_path(path, key),
                    "unexpected field",
                ));
            }
        }
    }
}

impl TargetShape for ObjectShape {
    fn validate(&self, value: &Value) -> Vec<Violation> {
        let mut violations = Vec::new();
        self.check_object("", value, &mut violations);
        violations
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

/// Type name used in violation messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}

#[cfg(test)]
mod tests;
