// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Tool call assembly
//
// Demultiplexes tool-call deltas across one active invocation at a time.
// Arguments are buffered per invocation and repaired incrementally; a
// switch to another tool or the end of the stream finalizes the active one.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::repair::{IncrementalJsonRepairer, JsonRepair};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    Started,
    Accumulating,
    Finalized,
}

/// Point-in-time view of an invocation, cheap to clone into frames.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallState {
    pub name: String,
    /// 0-based order of the invocation within the session.
    pub ordinal: usize,
    pub phase: ToolPhase,
    /// Repaired argument text, if any has been derived.
    pub arguments: Option<Arc<str>>,
}

impl ToolCallState {
    pub fn arguments_value(&self) -> Option<Value> {
        self.arguments
            .as_deref()
            .and_then(|text| serde_json::from_str(text).ok())
    }
}

/// Notification produced by the assembler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ToolCallEvent {
    Started {
        name: String,
        ordinal: usize,
    },
    Updated {
        name: String,
        ordinal: usize,
        arguments: Value,
    },
    /// `empty_arguments` marks a call with no discernible arguments; its
    /// `arguments` are then `{}`.
    Completed {
        name: String,
        ordinal: usize,
        arguments: Value,
        empty_arguments: bool,
    },
}

impl ToolCallEvent {
    pub fn name(&self) -> &str {
        match self {
            ToolCallEvent::Started { name, .. }
            | ToolCallEvent::Updated { name, .. }
            | ToolCallEvent::Completed { name, .. } => name,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ToolCallEvent::Completed { .. })
    }
}

/// One tool invocation: name, ordinal, lifecycle and argument buffer.
#[derive(Debug)]
pub struct ToolInvocation {
    name: String,
    ordinal: usize,
    phase: ToolPhase,
    arguments: IncrementalJsonRepairer,
    repaired: Option<Arc<str>>,
}

impl ToolInvocation {
    fn new(name: &str, ordinal: usize, repair: Arc<dyn JsonRepair>) -> Self {
        Self {
            name: name.to_string(),
            ordinal,
            phase: ToolPhase::Started,
            arguments: IncrementalJsonRepairer::new(repair),
            repaired: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn phase(&self) -> ToolPhase {
        self.phase
    }

    pub fn raw_arguments(&self) -> &str {
        self.arguments.raw()
    }

    fn state(&self) -> ToolCallState {
        ToolCallState {
            name: self.name.clone(),
            ordinal: self.ordinal,
            phase: self.phase,
            arguments: self.repaired.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Assembly seam
// ---------------------------------------------------------------------------

/// Tool-call state machine driven by the frame sequencer.
pub trait ToolCallAssembly: Send {
    /// A tool-call signal. Returns the completion of the previous call (on
    /// a switch) followed by the start of the new one.
    fn signal(&mut self, name: &str) -> Vec<ToolCallEvent>;

    /// Argument text for the active call. Returns an update only when the
    /// repaired arguments changed and are non-empty.
    fn append_args(&mut self, text: &str) -> Option<ToolCallEvent>;

    /// Finalizes the active call, if any.
    fn end_of_stream(&mut self) -> Option<ToolCallEvent>;

    /// The active call, or the most recently finalized one.
    fn current(&self) -> Option<ToolCallState>;
}

/// Creates one assembler per session.
pub trait AssemblerFactory: Send + Sync {
    fn create(&self, repair: Arc<dyn JsonRepair>) -> Box<dyn ToolCallAssembly>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAssemblerFactory;

impl AssemblerFactory for DefaultAssemblerFactory {
    fn create(&self, repair: Arc<dyn JsonRepair>) -> Box<dyn ToolCallAssembly> {
        Box::new(ToolCallAssembler::new(repair))
    }
}

// ---------------------------------------------------------------------------
// Default assembler
// ---------------------------------------------------------------------------

/// `Idle` when `active` is `None`, `Active(name)` otherwise.
pub struct ToolCallAssembler {
    repair: Arc<dyn JsonRepair>,
    active: Option<ToolInvocation>,
    last_finalized: Option<ToolCallState>,
    next_ordinal: usize,
}

impl ToolCallAssembler {
    pub fn new(repair: Arc<dyn JsonRepair>) -> Self {
        Self {
            repair,
            active: None,
            last_finalized: None,
            next_ordinal: 0,
        }
    }

    pub fn active(&self) -> Option<&ToolInvocation> {
        self.active.as_ref()
    }

    fn finalize(&mut self, mut invocation: ToolInvocation) -> ToolCallEvent {
        invocation.repaired = invocation.arguments.repaired();
        invocation.phase = ToolPhase::Finalized;

        let parsed = invocation
            .repaired
            .as_deref()
            .and_then(|text| serde_json::from_str::<Value>(text).ok());
        let (arguments, empty_arguments) = match parsed {
            Some(value) if !is_empty_arguments(&value) => (value, false),
            _ => {
                tracing::warn!(
                    tool = %invocation.name,
                    ordinal = invocation.ordinal,
                    raw_len = invocation.raw_arguments().len(),
                    "tool call finalized with no discernible arguments"
                );
                (Value::Object(Map::new()), true)
            }
        };
        if empty_arguments {
            // The finalized state agrees with the completion event.
            invocation.repaired = Some(Arc::from("{}"));
        }

        tracing::debug!(
            tool = %invocation.name,
            ordinal = invocation.ordinal,
            "tool call completed"
        );

        let event = ToolCallEvent::Completed {
            name: invocation.name.clone(),
            ordinal: invocation.ordinal,
            arguments,
            empty_arguments,
        };
        self.last_finalized = Some(invocation.state());
        event
    }
}

impl ToolCallAssembly for ToolCallAssembler {
    fn signal(&mut self, name: &str) -> Vec<ToolCallEvent> {
        if let Some(active) = &self.active {
            if active.name == name {
                tracing::trace!(tool = %name, "repeated tool call signal, continuing");
                return Vec::new();
            }
        }

        let mut events = Vec::with_capacity(2);
        if let Some(previous) = self.active.take() {
            events.push(self.finalize(previous));
        }

        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        self.active = Some(ToolInvocation::new(name, ordinal, self.repair.clone()));
        tracing::debug!(tool = %name, ordinal, "tool call started");
        events.push(ToolCallEvent::Started {
            name: name.to_string(),
            ordinal,
        });
        events
    }

    fn append_args(&mut self, text: &str) -> Option<ToolCallEvent> {
        let Some(active) = self.active.as_mut() else {
            tracing::warn!(
                len = text.len(),
                "tool arguments with no active tool call, ignoring"
            );
            return None;
        };

        active.phase = ToolPhase::Accumulating;
        active.arguments.append(text);
        let repaired = active.arguments.repaired();
        if repaired == active.repaired {
            return None;
        }
        active.repaired = repaired;

        let arguments: Value = serde_json::from_str(active.repaired.as_deref()?).ok()?;
        if is_empty_arguments(&arguments) {
            return None;
        }
        Some(ToolCallEvent::Updated {
            name: active.name.clone(),
            ordinal: active.ordinal,
            arguments,
        })
    }

    fn end_of_stream(&mut self) -> Option<ToolCallEvent> {
        let active = self.active.take()?;
        Some(self.finalize(active))
    }

    fn current(&self) -> Option<ToolCallState> {
        self.active
            .as_ref()
            .map(ToolInvocation::state)
            .or_else(|| self.last_finalized.clone())
    }
}

fn is_empty_arguments(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
