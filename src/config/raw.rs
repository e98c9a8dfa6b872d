// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types
//
// Kept apart from the public config because the public types hold compiled
// regexes and enums, and validation happens between the two.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub streamfold: String,
    pub transport: Option<String>,
    #[serde(default)]
    pub transports: BTreeMap<String, RawTransport>,
    pub dedup: Option<RawDedup>,
    pub shape: Option<RawShape>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTransport {
    pub usage_mode: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDedup {
    pub pending_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawShape {
    pub allow_additional: Option<bool>,
    #[serde(default)]
    pub fields: BTreeMap<String, RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawField {
    #[serde(rename = "type")]
    pub type_check: Option<String>,
    #[serde(default)]
    pub required: bool,
    pub starts_with: Option<String>,
    pub not_contains: Option<Vec<String>>,
    pub matches: Option<String>,
    pub one_of: Option<Vec<String>>,
    pub max_length: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Nested object fields.
    pub fields: Option<BTreeMap<String, RawField>>,
    pub allow_additional: Option<bool>,
    pub items: Option<Box<RawField>>,
}
