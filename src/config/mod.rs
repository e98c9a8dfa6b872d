// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Config loading
//
// Loads streamfold.yaml, validates it, merges declared transports over the
// built-in registry, compiles the optional shape, and computes a
// deterministic config hash.

mod error;
mod loader;
mod raw;
mod source;

pub use error::ConfigError;
pub use loader::{compute_hash, load_config};
pub use source::{ConfigSource, FileSource, StringSource};

use crate::frame::PendingValuePolicy;
use crate::shape::ObjectShape;
use crate::transport::TransportRegistry;

/// Validated, compiled configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub version: String,
    /// Transport used when the caller does not name one.
    pub default_transport: Option<String>,
    pub transports: TransportRegistry,
    pub pending_policy: PendingValuePolicy,
    pub shape: Option<ObjectShape>,
    pub config_hash: String,
}

impl Config {
    /// Configuration used when no file is given: built-in transports, no
    /// default transport, no shape.
    pub fn builtin() -> Self {
        Self {
            version: "v1".to_string(),
            default_transport: None,
            transports: TransportRegistry::builtin(),
            pending_policy: PendingValuePolicy::default(),
            shape: None,
            config_hash: "builtin".to_string(),
        }
    }
}
