// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while loading or validating `streamfold.yaml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config source: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid regex pattern \"{pattern}\" at {path}: {source}")]
    InvalidRegex {
        path: String,
        pattern: String,
        source: regex::Error,
    },
}
