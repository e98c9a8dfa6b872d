// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Finalization
//
// Runs once after end of stream: re-derives the value from the finished
// source when the aggregate's value is stale, then validates it against
// the target shape. No retry decision is made here.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::aggregate::RollingAggregate;
use crate::repair::JsonRepair;
use crate::shape::TargetShape;

pub use crate::shape::Violation;

/// Terminal failure: every violated constraint of the final value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("final value failed validation: {}", join_violations(.violations))]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl ValidationError {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// Correction message for the orchestration layer to send back when it
    /// replays the request.
    pub fn corrective_feedback(&self) -> String {
        let mut feedback =
            String::from("The previous response did not match the expected JSON structure:\n");
        for violation in &self.violations {
            let _ = writeln!(feedback, "- {violation}");
        }
        feedback.push_str("Respond again with a complete JSON value that fixes these problems.");
        feedback
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validated value or the violations that prevented it.
pub type FinalValue = Result<Value, ValidationError>;

/// Notified of every rejected final value.
pub trait FinalizationHook: Send + Sync {
    fn on_validation_failure(&self, error: &ValidationError, aggregate: &RollingAggregate);
}

pub struct FinalizationStage {
    repair: Arc<dyn JsonRepair>,
    shape: Arc<dyn TargetShape>,
    hook: Option<Arc<dyn FinalizationHook>>,
}

impl FinalizationStage {
    pub fn new(repair: Arc<dyn JsonRepair>, shape: Arc<dyn TargetShape>) -> Self {
        Self {
            repair,
            shape,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn FinalizationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn validate(&self, aggregate: &RollingAggregate) -> FinalValue {
        let value = if aggregate.is_value_stale() {
            self.rederive(aggregate)
        } else {
            aggregate.value().cloned()
        };

        let violations = match &value {
            Some(value) => self.shape.validate(value),
            None => vec![Violation::new(
                "",
                "no JSON value could be derived from the stream",
            )],
        };

        match value {
            Some(value) if violations.is_empty() => Ok(value),
            _ => {
                let error = ValidationError::new(violations);
                if let Some(hook) = &self.hook {
                    hook.on_validation_failure(&error, aggregate);
                }
                Err(error)
            }
        }
    }

    fn rederive(&self, aggregate: &RollingAggregate) -> Option<Value> {
        let derived = aggregate
            .active_source()
            .and_then(|source| self.repair.repair(source))
            .and_then(|text| serde_json::from_str::<Value>(&text).ok());
        if derived.is_none() && aggregate.value().is_some() {
            tracing::debug!("final source not derivable, using last known value");
            return aggregate.value().cloned();
        }
        derived
    }
}

// ---------------------------------------------------------------------------
// External report
// ---------------------------------------------------------------------------

/// Serialized terminal output: `{ok, value}` or `{ok, errors}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Violation>,
}

impl From<&FinalValue> for FinalReport {
    fn from(result: &FinalValue) -> Self {
        match result {
            Ok(value) => Self {
                ok: true,
                value: Some(value.clone()),
                errors: Vec::new(),
            },
            Err(error) => Self {
                ok: false,
                value: None,
                errors: error.violations.clone(),
            },
        }
    }
}
