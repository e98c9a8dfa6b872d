// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Transport profiles
//
// Each transport declares how its usage reports combine. The registry is a
// plain value handed to the pipeline at construction; the mode is looked
// up by name and never inferred from the deltas themselves.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How successive usage reports combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMode {
    /// Each report is an increment; counters are summed.
    Additive,
    /// Each report is a running total. Each counter takes the larger of the
    /// held and reported value, so a report replaces the previous one
    /// unless it would make a counter go backwards.
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportProfile {
    pub name: String,
    pub usage_mode: UsageMode,
}

impl TransportProfile {
    pub fn new(name: impl Into<String>, usage_mode: UsageMode) -> Self {
        Self {
            name: name.into(),
            usage_mode,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown transport \"{name}\", known transports: {known}")]
    Unknown { name: String, known: String },
    #[error("no transport selected and no default configured, known transports: {known}")]
    Unspecified { known: String },
}

/// Named transport profiles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportRegistry {
    profiles: BTreeMap<String, TransportProfile>,
}

impl TransportRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Profiles shipped with the crate:
    ///
    /// | name          | usage mode   |
    /// |---------------|--------------|
    /// | `openai`      | cumulative   |
    /// | `anthropic`   | cumulative   |
    /// | `incremental` | additive     |
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(TransportProfile::new("openai", UsageMode::Cumulative));
        registry.register(TransportProfile::new("anthropic", UsageMode::Cumulative));
        registry.register(TransportProfile::new("incremental", UsageMode::Additive));
        registry
    }

    /// Adds or replaces a profile.
    pub fn register(&mut self, profile: TransportProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Result<&TransportProfile, TransportError> {
        self.profiles.get(name).ok_or_else(|| TransportError::Unknown {
            name: name.to_string(),
            known: self.names().collect::<Vec<_>>().join(", "),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
