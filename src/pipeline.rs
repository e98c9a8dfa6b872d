// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Stream pipeline
//
// Composition root. A `StreamPipeline` holds the injected stages and hands
// out sessions; a session folds deltas into frames and the aggregate, and
// finalizes once the end-of-stream delta has been seen.
//
// Pull-based throughout: `Frames` wraps any iterator of deltas and
// `FrameStream` any `Stream` of deltas. Both stop pulling after the final
// snapshot. Dropping either before that abandons the session.

use std::iter::FusedIterator;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};

use futures_util::stream::Stream;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::aggregate::RollingAggregate;
use crate::config::Config;
use crate::dedup::{ContentHasher, DeduplicationGate, Xxh3ContentHasher};
use crate::delta::{Delta, Usage};
use crate::deserialize::DeserializationStage;
use crate::finalize::{FinalReport, FinalValue, FinalizationHook, FinalizationStage};
use crate::frame::{Frame, FrameSequencer, PendingValuePolicy};
use crate::repair::{ClosingRepair, JsonRepair};
use crate::shape::{AnyJson, TargetShape};
use crate::tool_call::{AssemblerFactory, DefaultAssemblerFactory, ToolCallEvent, ToolPhase};
use crate::transport::{TransportError, TransportProfile};

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

/// Swappable stages injected into the pipeline.
#[derive(Clone)]
pub struct PipelineDeps {
    pub profile: TransportProfile,
    pub repair: Arc<dyn JsonRepair>,
    pub hasher: Arc<dyn ContentHasher>,
    pub assemblers: Arc<dyn AssemblerFactory>,
    pub shape: Arc<dyn TargetShape>,
    pub pending_policy: PendingValuePolicy,
    pub hook: Option<Arc<dyn FinalizationHook>>,
}

impl PipelineDeps {
    /// Default stages for the given transport profile.
    pub fn for_profile(profile: TransportProfile) -> Self {
        Self {
            profile,
            repair: Arc::new(ClosingRepair),
            hasher: Arc::new(Xxh3ContentHasher),
            assemblers: Arc::new(DefaultAssemblerFactory),
            shape: Arc::new(AnyJson),
            pending_policy: PendingValuePolicy::default(),
            hook: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct StreamPipeline {
    deps: PipelineDeps,
}

impl StreamPipeline {
    pub fn new_with(deps: PipelineDeps) -> Self {
        Self { deps }
    }

    pub fn profile(&self) -> &TransportProfile {
        &self.deps.profile
    }

    /// A fresh session with its own buffers and dedup state.
    pub fn session(&self) -> Session {
        let deps = &self.deps;
        let sequencer = FrameSequencer::new(
            deps.repair.clone(),
            deps.assemblers.create(deps.repair.clone()),
            DeduplicationGate::new(deps.hasher.clone()),
            DeserializationStage::new(deps.shape.clone()),
            deps.pending_policy,
        );
        let mut finalizer = FinalizationStage::new(deps.repair.clone(), deps.shape.clone());
        if let Some(hook) = &deps.hook {
            finalizer = finalizer.with_hook(hook.clone());
        }

        let id = Uuid::new_v4();
        tracing::info!(
            session_id = %id,
            transport = %deps.profile.name,
            usage_mode = ?deps.profile.usage_mode,
            "session started"
        );

        Session {
            id,
            sequencer,
            aggregate: RollingAggregate::new(deps.profile.usage_mode),
            finalizer,
            undelivered: Vec::new(),
        }
    }

    /// Drive a synchronous delta sequence.
    pub fn run<I>(&self, deltas: I) -> Frames<I::IntoIter>
    where
        I: IntoIterator<Item = Delta>,
    {
        Frames {
            deltas: deltas.into_iter(),
            session: self.session(),
            done: false,
        }
    }

    /// Drive an async delta stream.
    pub fn stream<S>(&self, deltas: S) -> FrameStream<S>
    where
        S: Stream<Item = Delta> + Unpin,
    {
        FrameStream {
            deltas,
            session: self.session(),
            done: false,
        }
    }
}

/// Pipeline for `transport` (falling back to the config's default
/// transport) with the config's dedup policy and shape.
pub fn build_pipeline(config: &Config, transport: Option<&str>) -> Result<StreamPipeline, TransportError> {
    let name = transport
        .or(config.default_transport.as_deref())
        .ok_or_else(|| TransportError::Unspecified {
            known: config.transports.names().collect::<Vec<_>>().join(", "),
        })?;
    let profile = config.transports.get(name)?.clone();

    let mut deps = PipelineDeps::for_profile(profile);
    deps.pending_policy = config.pending_policy;
    if let Some(shape) = &config.shape {
        deps.shape = Arc::new(shape.clone());
    }
    Ok(StreamPipeline::new_with(deps))
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One stream's exclusively owned state.
pub struct Session {
    id: Uuid,
    sequencer: FrameSequencer,
    aggregate: RollingAggregate,
    finalizer: FinalizationStage,
    /// Tool events from suppressed frames, delivered with the next snapshot.
    undelivered: Vec<ToolCallEvent>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn aggregate(&self) -> &RollingAggregate {
        &self.aggregate
    }

    pub fn is_ended(&self) -> bool {
        self.aggregate.is_ended()
    }

    /// Fold one delta into a frame and the aggregate. Tool events stay on
    /// the returned frame.
    pub fn fold(&mut self, delta: Delta) -> Frame {
        let frame = self.sequencer.fold(delta);
        let placeholder = RollingAggregate::new(self.aggregate.usage_mode());
        self.aggregate = std::mem::replace(&mut self.aggregate, placeholder).merge(&frame);
        frame
    }

    /// Fold one delta; returns the outward snapshot when the frame is
    /// emitted.
    pub fn push(&mut self, delta: Delta) -> Option<Snapshot> {
        let frame = self.fold(delta);
        self.undelivered.extend(frame.tool_events().iter().cloned());
        if !frame.is_emitted() {
            return None;
        }
        tracing::debug!(
            session_id = %self.id,
            sequence = frame.sequence(),
            is_final = frame.is_final(),
            "snapshot emitted"
        );
        let events = std::mem::take(&mut self.undelivered);
        Some(Snapshot::new(&frame, &self.aggregate, events))
    }

    /// Validate the final value, or report the session as abandoned when
    /// the end-of-stream delta never arrived.
    pub fn finalize(self) -> Outcome {
        if !self.aggregate.is_ended() {
            tracing::info!(
                session_id = %self.id,
                frames = self.aggregate.frames(),
                "session abandoned before end of stream"
            );
            return Outcome::Abandoned {
                frames: self.aggregate.frames(),
            };
        }

        let result = self.finalizer.validate(&self.aggregate);
        match &result {
            Ok(_) => tracing::info!(
                session_id = %self.id,
                frames = self.aggregate.frames(),
                emitted = self.aggregate.emitted(),
                "session finalized"
            ),
            Err(err) => tracing::info!(
                session_id = %self.id,
                violations = err.violations.len(),
                "final value rejected"
            ),
        }
        Outcome::Completed(result)
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(FinalValue),
    /// The consumer stopped, or the input ran out, before end of stream.
    Abandoned { frames: u64 },
}

impl Outcome {
    pub fn report(&self) -> Option<FinalReport> {
        match self {
            Outcome::Completed(result) => Some(FinalReport::from(result)),
            Outcome::Abandoned { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Completed(Ok(_)))
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCallView {
    pub name: String,
    pub ordinal: usize,
    pub phase: ToolPhase,
    pub arguments: Option<Value>,
}

/// Outward shape of an emitted frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub sequence: u64,
    /// RFC 3339 capture time.
    pub captured_at: String,
    pub content: String,
    pub value: Option<Value>,
    pub is_final: bool,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCallView>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_events: Vec<ToolCallEvent>,
}

impl Snapshot {
    fn new(frame: &Frame, aggregate: &RollingAggregate, tool_events: Vec<ToolCallEvent>) -> Self {
        Self {
            sequence: frame.sequence(),
            captured_at: frame.captured_at().to_rfc3339(),
            content: aggregate.content().to_string(),
            value: frame.value().ready().cloned(),
            is_final: frame.is_final(),
            usage: aggregate.usage(),
            finish_reason: aggregate.finish_reason().map(str::to_string),
            tool_call: frame.tool().map(|tool| ToolCallView {
                name: tool.name.clone(),
                ordinal: tool.ordinal,
                phase: tool.phase,
                arguments: tool.arguments_value(),
            }),
            tool_events,
        }
    }
}

// ---------------------------------------------------------------------------
// Adapters
// ---------------------------------------------------------------------------

/// Snapshots over a synchronous delta iterator.
pub struct Frames<I> {
    deltas: I,
    session: Session,
    done: bool,
}

impl<I> Frames<I> {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn finalize(self) -> Outcome {
        self.session.finalize()
    }
}

impl<I: Iterator<Item = Delta>> Iterator for Frames<I> {
    type Item = Snapshot;

    fn next(&mut self) -> Option<Snapshot> {
        while !self.done {
            let Some(delta) = self.deltas.next() else {
                self.done = true;
                break;
            };
            if let Some(snapshot) = self.session.push(delta) {
                self.done = snapshot.is_final;
                return Some(snapshot);
            }
        }
        None
    }
}

impl<I: Iterator<Item = Delta>> FusedIterator for Frames<I> {}

/// Snapshots over an async delta stream.
pub struct FrameStream<S> {
    deltas: S,
    session: Session,
    done: bool,
}

impl<S> FrameStream<S> {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn finalize(self) -> Outcome {
        self.session.finalize()
    }
}

impl<S> Stream for FrameStream<S>
where
    S: Stream<Item = Delta> + Unpin,
{
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        let this = self.get_mut();
        while !this.done {
            match ready!(Pin::new(&mut this.deltas).poll_next(cx)) {
                Some(delta) => {
                    if let Some(snapshot) = this.session.push(delta) {
                        this.done = snapshot.is_final;
                        return Poll::Ready(Some(snapshot));
                    }
                }
                None => this.done = true,
            }
        }
        Poll::Ready(None)
    }
}
