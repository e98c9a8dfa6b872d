// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Rolling aggregate
//
// Running summary of every frame in a session, suppressed ones included.
// Holds only the latest state, never the frame history.

use serde_json::Value;

use crate::delta::{Delta, Usage};
use crate::frame::Frame;
use crate::tool_call::ToolCallState;
use crate::transport::UsageMode;

#[derive(Debug, Clone, PartialEq)]
pub struct RollingAggregate {
    usage_mode: UsageMode,
    content: String,
    tool: Option<ToolCallState>,
    value: Option<Value>,
    /// Revision of the value source the current `value` was derived from.
    value_revision: u64,
    /// Bumped whenever the active value source changes.
    source_revision: u64,
    usage: Usage,
    finish_reason: Option<String>,
    frames: u64,
    emitted: u64,
    ended: bool,
}

impl RollingAggregate {
    pub fn new(usage_mode: UsageMode) -> Self {
        Self {
            usage_mode,
            content: String::new(),
            tool: None,
            value: None,
            value_revision: 0,
            source_revision: 0,
            usage: Usage::default(),
            finish_reason: None,
            frames: 0,
            emitted: 0,
            ended: false,
        }
    }

    /// Fold one frame into a new aggregate.
    pub fn merge(mut self, frame: &Frame) -> Self {
        if self.ended {
            tracing::debug!(sequence = frame.sequence(), "aggregate already ended, frame ignored");
            return self;
        }

        self.frames += 1;
        if frame.is_emitted() {
            self.emitted += 1;
        }

        match frame.delta() {
            Delta::Content { text, accumulated } => {
                let before = self.content.len();
                match accumulated {
                    Some(accumulated) => {
                        if *accumulated != self.content {
                            self.content.clear();
                            self.content.push_str(accumulated);
                            self.touch_text_source();
                        }
                    }
                    None => {
                        self.content.push_str(text);
                        if self.content.len() != before {
                            self.touch_text_source();
                        }
                    }
                }
            }
            Delta::UsageUpdate { usage } => self.merge_usage(usage),
            Delta::FinishSignal { reason } => {
                if !reason.is_empty() {
                    self.finish_reason = Some(reason.clone());
                }
            }
            Delta::EndOfStream => self.ended = true,
            Delta::ToolCallSignal { .. } | Delta::ToolArgs { .. } => {}
        }

        if let Some(tool) = frame.tool() {
            let switched = self
                .tool
                .as_ref()
                .map_or(true, |previous| previous.ordinal != tool.ordinal);
            let changed = switched
                || self
                    .tool
                    .as_ref()
                    .is_some_and(|previous| previous.arguments != tool.arguments);
            if switched {
                // A value derived from another source never carries over.
                self.value = None;
            }
            if changed {
                self.source_revision += 1;
            }
            self.tool = Some(tool.clone());
        }

        if let Some(value) = frame.value().ready() {
            if self.value.as_ref() != Some(value) {
                self.value = Some(value.clone());
            }
            self.value_revision = self.source_revision;
        }

        self
    }

    fn touch_text_source(&mut self) {
        if self.tool.is_none() {
            self.source_revision += 1;
        }
    }

    fn merge_usage(&mut self, report: &Usage) {
        match self.usage_mode {
            UsageMode::Additive => {
                self.usage.input = self.usage.input.saturating_add(report.input);
                self.usage.output = self.usage.output.saturating_add(report.output);
                self.usage.cached = self.usage.cached.saturating_add(report.cached);
            }
            UsageMode::Cumulative => {
                if report.input < self.usage.input
                    || report.output < self.usage.output
                    || report.cached < self.usage.cached
                {
                    tracing::debug!(
                        previous = ?self.usage,
                        report = ?report,
                        "cumulative usage report went backwards, keeping maxima"
                    );
                }
                self.usage.input = self.usage.input.max(report.input);
                self.usage.output = self.usage.output.max(report.output);
                self.usage.cached = self.usage.cached.max(report.cached);
            }
        }
    }

    pub fn usage_mode(&self) -> UsageMode {
        self.usage_mode
    }

    /// Accumulated text content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The active tool call, or the last finalized one.
    pub fn tool(&self) -> Option<&ToolCallState> {
        self.tool.as_ref()
    }

    /// Latest value that was ready for the current value source.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Whether the value source changed after `value` was derived.
    pub fn is_value_stale(&self) -> bool {
        self.value.is_none() || self.value_revision != self.source_revision
    }

    /// Text the final value derives from: tool arguments once a tool call
    /// has been seen, otherwise the accumulated content.
    pub fn active_source(&self) -> Option<&str> {
        match &self.tool {
            Some(tool) => tool.arguments.as_deref(),
            None if self.content.is_empty() => None,
            None => Some(&self.content),
        }
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Frames folded so far, suppressed ones included.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}
