// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::frame::PendingValuePolicy;
use crate::shape::{FieldSpec, JsonType, ObjectShape, Pattern};
use crate::transport::{TransportProfile, TransportRegistry, UsageMode};

use super::error::ConfigError;
use super::raw;
use super::source::ConfigSource;
use super::Config;

/// Load and validate a streamfold config from the given source.
///
/// Steps:
/// 1. Read raw YAML from the source
/// 2. Compute the SHA-256 config hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate the version marker and enum-valued strings
/// 5. Merge declared transports over the built-in registry
/// 6. Compile the shape, including regex predicates
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let config_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.streamfold != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.streamfold
        )));
    }

    let mut transports = TransportRegistry::builtin();
    for (name, raw_transport) in raw.transports {
        let usage_mode = parse_usage_mode(&name, &raw_transport.usage_mode)?;
        transports.register(TransportProfile::new(name, usage_mode));
    }

    if let Some(default) = &raw.transport {
        transports
            .get(default)
            .map_err(|err| ConfigError::Validation(format!("transport: {err}")))?;
    }

    let pending_policy = match raw.dedup.and_then(|dedup| dedup.pending_value) {
        None => PendingValuePolicy::default(),
        Some(policy) => match policy.as_str() {
            "advance" => PendingValuePolicy::Advance,
            "hold" => PendingValuePolicy::Hold,
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown dedup.pending_value \"{other}\", expected \"advance\" or \"hold\""
                )))
            }
        },
    };

    let shape = raw
        .shape
        .map(|shape| build_object_shape("shape", shape.fields, shape.allow_additional))
        .transpose()?;

    let config = Config {
        version: raw.streamfold,
        default_transport: raw.transport,
        transports,
        pending_policy,
        shape,
        config_hash,
    };

    tracing::info!(
        source = %source.describe(),
        config_hash = %config.config_hash,
        transports = config.transports.len(),
        "config loaded"
    );

    Ok(config)
}

pub fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn parse_usage_mode(transport: &str, mode: &str) -> Result<UsageMode, ConfigError> {
    match mode {
        "additive" => Ok(UsageMode::Additive),
        "cumulative" => Ok(UsageMode::Cumulative),
        other => Err(ConfigError::Validation(format!(
            "transports.{transport}.usage_mode: unknown mode \"{other}\", expected \"additive\" or \"cumulative\""
        ))),
    }
}

fn build_object_shape(
    path: &str,
    fields: BTreeMap<String, raw::RawField>,
    allow_additional: Option<bool>,
) -> Result<ObjectShape, ConfigError> {
    let mut shape = ObjectShape::new();
    shape.allow_additional = allow_additional.unwrap_or(true);
    for (name, raw_field) in fields {
        let field_path = format!("{path}.fields.{name}");
        let spec = build_field_spec(&field_path, raw_field)?;
        shape.fields.insert(name, spec);
    }
    Ok(shape)
}

fn build_field_spec(path: &str, raw: raw::RawField) -> Result<FieldSpec, ConfigError> {
    let type_check = raw
        .type_check
        .as_deref()
        .map(|name| {
            JsonType::parse(name).ok_or_else(|| {
                ConfigError::Validation(format!(
                    "{path}.type: unknown type \"{name}\", expected one of string, number, \
                     integer, boolean, array, object, null"
                ))
            })
        })
        .transpose()?;

    let matches = raw
        .matches
        .as_deref()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|source| ConfigError::InvalidRegex {
                path: format!("{path}.matches"),
                pattern: pattern.to_string(),
                source,
            })
        })
        .transpose()?;

    if let (Some(min), Some(max)) = (raw.min, raw.max) {
        if min > max {
            return Err(ConfigError::Validation(format!(
                "{path}: min {min} is greater than max {max}"
            )));
        }
    }

    let fields = match raw.fields {
        Some(nested) => Some(build_object_shape(path, nested, raw.allow_additional)?),
        None if raw.allow_additional.is_some() => {
            return Err(ConfigError::Validation(format!(
                "{path}.allow_additional requires nested fields"
            )))
        }
        None => None,
    };

    let items = raw
        .items
        .map(|items| build_field_spec(&format!("{path}.items"), *items).map(Box::new))
        .transpose()?;

    Ok(FieldSpec {
        required: raw.required,
        type_check,
        starts_with: raw.starts_with,
        not_contains: raw.not_contains.unwrap_or_default(),
        matches,
        one_of: raw.one_of,
        max_length: raw.max_length,
        min: raw.min,
        max: raw.max,
        fields,
        items,
    })
}
