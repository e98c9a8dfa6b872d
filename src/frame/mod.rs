// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Frame sequencing
//
// Folds one delta at a time through repair, tool-call assembly,
// deserialization and deduplication into an immutable, sequence-numbered
// frame carrying an emission verdict.
//
// The value source is the accumulated text until the first tool-call
// signal; from then on it is the current tool call's arguments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dedup::{Candidate, DeduplicationGate, ToolCandidate};
use crate::delta::Delta;
use crate::deserialize::{DeserializationStage, Pending, ValueOrPending};
use crate::repair::{IncrementalJsonRepairer, JsonRepair};
use crate::tool_call::{ToolCallAssembly, ToolCallEvent, ToolCallState};

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Emission verdict of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emission {
    /// Dropped from the outward sequence; still folded into the aggregate.
    Suppressed,
    Update,
    /// The end-of-stream frame. Always emitted.
    Final,
}

/// Immutable snapshot produced for one input delta.
#[derive(Debug, Clone)]
pub struct Frame {
    sequence: u64,
    captured_at: DateTime<Utc>,
    delta: Delta,
    repaired: Option<Arc<str>>,
    value: ValueOrPending,
    tool: Option<ToolCallState>,
    tool_events: Vec<ToolCallEvent>,
    emission: Emission,
}

impl Frame {
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    /// Repaired text of the active value source.
    pub fn repaired(&self) -> Option<&str> {
        self.repaired.as_deref()
    }

    pub fn value(&self) -> &ValueOrPending {
        &self.value
    }

    /// The active tool call, or the last finalized one.
    pub fn tool(&self) -> Option<&ToolCallState> {
        self.tool.as_ref()
    }

    /// Tool-call notifications caused by this frame's delta.
    pub fn tool_events(&self) -> &[ToolCallEvent] {
        &self.tool_events
    }

    pub fn emission(&self) -> Emission {
        self.emission
    }

    pub fn is_emitted(&self) -> bool {
        self.emission != Emission::Suppressed
    }

    pub fn is_final(&self) -> bool {
        self.emission == Emission::Final
    }
}

// ---------------------------------------------------------------------------
// Pending-value policy
// ---------------------------------------------------------------------------

/// Whether a frame with no value yet still advances the dedup state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingValuePolicy {
    /// Participates in dedup with a null value, so text progress is emitted.
    #[default]
    Advance,
    /// Never an update; the dedup state is left untouched.
    Hold,
}

// ---------------------------------------------------------------------------
// Sequencer
// ---------------------------------------------------------------------------

pub struct FrameSequencer {
    next_sequence: u64,
    text: IncrementalJsonRepairer,
    tools: Box<dyn ToolCallAssembly>,
    gate: DeduplicationGate,
    deserializer: DeserializationStage,
    pending_policy: PendingValuePolicy,
    tool_mode: bool,
    ended: bool,
    last_repaired: Option<Arc<str>>,
    last_value: ValueOrPending,
}

impl FrameSequencer {
    pub fn new(
        repair: Arc<dyn JsonRepair>,
        tools: Box<dyn ToolCallAssembly>,
        gate: DeduplicationGate,
        deserializer: DeserializationStage,
        pending_policy: PendingValuePolicy,
    ) -> Self {
        Self {
            next_sequence: 0,
            text: IncrementalJsonRepairer::new(repair),
            tools,
            gate,
            deserializer,
            pending_policy,
            tool_mode: false,
            ended: false,
            last_repaired: None,
            last_value: ValueOrPending::Pending(Pending::NoText),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Whether the value source has switched to tool-call arguments.
    pub fn is_tool_mode(&self) -> bool {
        self.tool_mode
    }

    /// Accumulated text as seen by this sequencer.
    pub fn content(&self) -> &str {
        self.text.raw()
    }

    pub fn fold(&mut self, delta: Delta) -> Frame {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let captured_at = Utc::now();

        if self.ended {
            tracing::warn!(sequence, kind = delta.kind(), "delta after end of stream, ignoring");
            return Frame {
                sequence,
                captured_at,
                delta,
                repaired: self.last_repaired.clone(),
                value: self.last_value.clone(),
                tool: self.tools.current(),
                tool_events: Vec::new(),
                emission: Emission::Suppressed,
            };
        }

        let mut tool_events = Vec::new();
        match &delta {
            Delta::Content { text, accumulated } => match accumulated {
                Some(accumulated) => self.text.adopt(accumulated),
                None => self.text.append(text),
            },
            Delta::ToolCallSignal { name } => {
                self.tool_mode = true;
                tool_events = self.tools.signal(name);
            }
            Delta::ToolArgs { text } => tool_events.extend(self.tools.append_args(text)),
            Delta::UsageUpdate { .. } | Delta::FinishSignal { .. } => {}
            Delta::EndOfStream => {
                self.ended = true;
                tool_events.extend(self.tools.end_of_stream());
            }
        }

        let tool = self.tools.current();
        let repaired = if self.tool_mode {
            tool.as_ref().and_then(|state| state.arguments.clone())
        } else {
            self.text.repaired()
        };
        let value = self.derive_value(&repaired);

        let emission = if self.ended {
            Emission::Final
        } else {
            self.verdict(&value, tool.as_ref())
        };

        tracing::trace!(
            sequence,
            kind = delta.kind(),
            emission = ?emission,
            pending = value.is_pending(),
            "delta folded"
        );

        Frame {
            sequence,
            captured_at,
            delta,
            repaired,
            value,
            tool,
            tool_events,
            emission,
        }
    }

    /// Re-deserializes only when the repaired text actually changed.
    fn derive_value(&mut self, repaired: &Option<Arc<str>>) -> ValueOrPending {
        let unchanged = match (&self.last_repaired, repaired) {
            (Some(previous), Some(current)) => {
                Arc::ptr_eq(previous, current) || previous == current
            }
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            self.last_value = self.deserializer.deserialize(repaired.as_deref());
            self.last_repaired = repaired.clone();
        }
        self.last_value.clone()
    }

    fn verdict(&mut self, value: &ValueOrPending, tool: Option<&ToolCallState>) -> Emission {
        if value.is_pending() && self.pending_policy == PendingValuePolicy::Hold {
            return Emission::Suppressed;
        }
        let candidate = Candidate {
            content: self.text.raw(),
            value: value.ready(),
            tool: tool.map(|state| ToolCandidate {
                name: &state.name,
                ordinal: state.ordinal,
                arguments: state.arguments.as_deref(),
            }),
        };
        if self.gate.admit(&candidate) {
            Emission::Update
        } else {
            Emission::Suppressed
        }
    }
}

#[cfg(test)]
mod tests;
