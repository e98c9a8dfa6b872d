// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Deserialization stage
//
// Repaired text to a value checked against the target shape. Nothing here
// is an error mid-stream: every shortfall is "no value yet".

use std::sync::Arc;

use serde_json::Value;

use crate::shape::TargetShape;

/// Why no value is available yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// Nothing repairable has arrived.
    NoText,
    /// Repaired text did not parse.
    Malformed,
    /// Parsed, but the shape is not satisfied yet.
    Incomplete(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueOrPending {
    Ready(Value),
    Pending(Pending),
}

impl ValueOrPending {
    pub fn ready(&self) -> Option<&Value> {
        match self {
            ValueOrPending::Ready(value) => Some(value),
            ValueOrPending::Pending(_) => None,
        }
    }

    pub fn into_ready(self) -> Option<Value> {
        match self {
            ValueOrPending::Ready(value) => Some(value),
            ValueOrPending::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ValueOrPending::Pending(_))
    }
}

pub struct DeserializationStage {
    shape: Arc<dyn TargetShape>,
}

impl DeserializationStage {
    pub fn new(shape: Arc<dyn TargetShape>) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> &Arc<dyn TargetShape> {
        &self.shape
    }

    pub fn deserialize(&self, repaired: Option<&str>) -> ValueOrPending {
        let Some(text) = repaired else {
            return ValueOrPending::Pending(Pending::NoText);
        };
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "repaired text did not parse");
                return ValueOrPending::Pending(Pending::Malformed);
            }
        };
        match self.shape.check_partial(&value) {
            Ok(()) => ValueOrPending::Ready(value),
            Err(reason) => ValueOrPending::Pending(Pending::Incomplete(reason)),
        }
    }
}
