// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Delta input types
//
// A delta is one atomic update handed over by the transport collaborator.
// Provider wire formats are already decoded by the time a delta reaches
// the pipeline; the pipeline only sees these six shapes.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Usage counters
// ---------------------------------------------------------------------------

/// Token counters reported by the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub cached: u64,
}

impl Usage {
    pub fn new(input: u64, output: u64, cached: u64) -> Self {
        Self {
            input,
            output,
            cached,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input == 0 && self.output == 0 && self.cached == 0
    }

    pub fn total(&self) -> u64 {
        self.input.saturating_add(self.output)
    }
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// One streamed update unit.
///
/// Serialized form (used by the replay binary) is internally tagged:
/// `{"type":"content","text":"{\"na"}`, `{"type":"end"}`, etc.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Delta {
    /// Incremental text. `accumulated`, when present, is the transport's
    /// authoritative full text so far and replaces local accumulation.
    #[serde(rename = "content")]
    Content {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        accumulated: Option<String>,
    },
    /// A tool invocation begins (or continues, when the name repeats).
    #[serde(rename = "tool_call")]
    ToolCallSignal { name: String },
    /// Argument text for the active tool invocation.
    #[serde(rename = "tool_args")]
    ToolArgs { text: String },
    /// Usage report. Whether counts add up or replace is decided by the
    /// transport profile, never by the delta.
    #[serde(rename = "usage")]
    UsageUpdate { usage: Usage },
    #[serde(rename = "finish")]
    FinishSignal { reason: String },
    #[serde(rename = "end")]
    EndOfStream,
}

impl Delta {
    pub fn content(text: impl Into<String>) -> Self {
        Delta::Content {
            text: text.into(),
            accumulated: None,
        }
    }

    /// Content delta carrying the authoritative accumulated text.
    pub fn content_snapshot(text: impl Into<String>, accumulated: impl Into<String>) -> Self {
        Delta::Content {
            text: text.into(),
            accumulated: Some(accumulated.into()),
        }
    }

    pub fn tool_call(name: impl Into<String>) -> Self {
        Delta::ToolCallSignal { name: name.into() }
    }

    pub fn tool_args(text: impl Into<String>) -> Self {
        Delta::ToolArgs { text: text.into() }
    }

    pub fn usage(input: u64, output: u64, cached: u64) -> Self {
        Delta::UsageUpdate {
            usage: Usage::new(input, output, cached),
        }
    }

    pub fn finish(reason: impl Into<String>) -> Self {
        Delta::FinishSignal {
            reason: reason.into(),
        }
    }

    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Delta::Content { .. } => "content",
            Delta::ToolCallSignal { .. } => "tool_call",
            Delta::ToolArgs { .. } => "tool_args",
            Delta::UsageUpdate { .. } => "usage",
            Delta::FinishSignal { .. } => "finish",
            Delta::EndOfStream => "end",
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Delta::EndOfStream)
    }
}

// ---------------------------------------------------------------------------
// JSONL decoding
// ---------------------------------------------------------------------------

/// A delta line that could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("invalid delta on line {line}: {source}")]
pub struct DeltaParseError {
    pub line: usize,
    #[source]
    pub source: serde_json::Error,
}

/// Decode one delta per non-blank line. Line numbers in errors are 1-based.
pub fn parse_jsonl(input: &str) -> Result<Vec<Delta>, DeltaParseError> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| DeltaParseError {
                line: idx + 1,
                source,
            })
        })
        .collect()
}
