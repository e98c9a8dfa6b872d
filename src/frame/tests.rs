// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Tests for frame sequencing
//
//  1. Sequence numbers strictly increase
//  2. Partial JSON progresses to the final value
//  3. Duplicate and empty deltas are suppressed
//  4. End of stream is always Final; later deltas are ignored
//  5. Tool-call deltas switch the value source to arguments
//  6. Pending-value policy and the first update

use super::*;
use crate::dedup::Xxh3ContentHasher;
use crate::repair::ClosingRepair;
use crate::shape::{AnyJson, FieldSpec, JsonType, ObjectShape, TargetShape};
use crate::tool_call::ToolCallAssembler;
use serde_json::{json, Value};

fn sequencer_with(shape: impl TargetShape + 'static, policy: PendingValuePolicy) -> FrameSequencer {
    let repair: Arc<dyn JsonRepair> = Arc::new(ClosingRepair);
    FrameSequencer::new(
        repair.clone(),
        Box::new(ToolCallAssembler::new(repair)),
        DeduplicationGate::new(Arc::new(Xxh3ContentHasher)),
        DeserializationStage::new(Arc::new(shape)),
        policy,
    )
}

fn sequencer() -> FrameSequencer {
    sequencer_with(AnyJson, PendingValuePolicy::Advance)
}

fn fold_all(sequencer: &mut FrameSequencer, deltas: Vec<Delta>) -> Vec<Frame> {
    deltas.into_iter().map(|delta| sequencer.fold(delta)).collect()
}

fn emissions(frames: &[Frame]) -> Vec<Emission> {
    frames.iter().map(Frame::emission).collect()
}

// ---------------------------------------------------------------------------
// 1. Sequencing
// ---------------------------------------------------------------------------

#[test]
fn sequence_numbers_strictly_increase() {
    let mut seq = sequencer();
    let frames = fold_all(
        &mut seq,
        vec![
            Delta::content("["),
            Delta::usage(1, 1, 0),
            Delta::content("1]"),
            Delta::EndOfStream,
        ],
    );
    let numbers: Vec<u64> = frames.iter().map(Frame::sequence).collect();
    assert_eq!(numbers, vec![0, 1, 2, 3]);
    assert!(frames
        .windows(2)
        .all(|pair| pair[0].captured_at() <= pair[1].captured_at()));
}

// ---------------------------------------------------------------------------
// 2. Progression
// ---------------------------------------------------------------------------

#[test]
fn partial_fragments_progress_to_final_value() {
    let mut seq = sequencer();
    let frames = fold_all(
        &mut seq,
        vec![
            Delta::content(r#"{"na"#),
            Delta::content(r#"me":"Al"#),
            Delta::content(r#"ice","age":3"#),
            Delta::EndOfStream,
        ],
    );
    let repaired: Vec<_> = frames.iter().map(|f| f.repaired().unwrap().to_string()).collect();
    assert_eq!(
        repaired,
        vec![
            "{}",
            r#"{"name":"Al"}"#,
            r#"{"name":"Alice","age":3}"#,
            r#"{"name":"Alice","age":3}"#,
        ]
    );
    assert_eq!(
        emissions(&frames),
        vec![Emission::Suppressed, Emission::Update, Emission::Update, Emission::Final]
    );
    assert_eq!(
        frames[3].value().ready(),
        Some(&json!({"name": "Alice", "age": 3}))
    );
    assert!(frames[3].is_final());
}

#[test]
fn authoritative_content_replaces_local_text() {
    let mut seq = sequencer();
    seq.fold(Delta::content(r#"{"a":"#));
    let frame = seq.fold(Delta::content_snapshot("ignored", r#"{"a":"full"}"#));
    assert_eq!(seq.content(), r#"{"a":"full"}"#);
    assert_eq!(frame.value().ready(), Some(&json!({"a": "full"})));
}

// ---------------------------------------------------------------------------
// 3. Suppression
// ---------------------------------------------------------------------------

#[test]
fn two_empty_content_deltas_emit_at_most_one_update() {
    let mut seq = sequencer();
    let frames = fold_all(&mut seq, vec![Delta::content(""), Delta::content("")]);
    let updates = frames.iter().filter(|f| f.emission() == Emission::Update).count();
    assert!(updates <= 1);
    assert_eq!(updates, 0);
}

#[test]
fn empty_deltas_after_content_are_suppressed() {
    let mut seq = sequencer();
    let frames = fold_all(
        &mut seq,
        vec![Delta::content("[1"), Delta::content(""), Delta::content("")],
    );
    assert_eq!(
        emissions(&frames),
        vec![Emission::Update, Emission::Suppressed, Emission::Suppressed]
    );
}

#[test]
fn usage_and_finish_deltas_are_suppressed_but_produce_frames() {
    let mut seq = sequencer();
    let frames = fold_all(
        &mut seq,
        vec![
            Delta::content("[1]"),
            Delta::usage(10, 2, 0),
            Delta::finish("stop"),
        ],
    );
    assert_eq!(
        emissions(&frames),
        vec![Emission::Update, Emission::Suppressed, Emission::Suppressed]
    );
    assert!(matches!(frames[1].delta(), Delta::UsageUpdate { .. }));
}

#[test]
fn no_update_repeats_its_predecessor() {
    let mut seq = sequencer();
    let deltas = vec![
        Delta::content("{"),
        Delta::content(""),
        Delta::content("\"k\""),
        Delta::usage(1, 0, 0),
        Delta::content(":"),
        Delta::content("\"v"),
        Delta::content(""),
        Delta::content("\""),
        Delta::content("}"),
        Delta::finish("stop"),
    ];
    let mut previous: Option<(String, Option<Value>)> = None;
    for delta in deltas {
        let frame = seq.fold(delta);
        if frame.emission() == Emission::Update {
            let current = (seq.content().to_string(), frame.value().ready().cloned());
            assert_ne!(previous.as_ref(), Some(&current));
            previous = Some(current);
        }
    }
}

// ---------------------------------------------------------------------------
// 4. End of stream
// ---------------------------------------------------------------------------

#[test]
fn end_of_stream_is_final_even_without_changes() {
    let mut seq = sequencer();
    let frames = fold_all(&mut seq, vec![Delta::EndOfStream]);
    assert_eq!(emissions(&frames), vec![Emission::Final]);
    assert!(seq.is_ended());
}

#[test]
fn deltas_after_end_are_suppressed() {
    let mut seq = sequencer();
    seq.fold(Delta::content("[1]"));
    seq.fold(Delta::EndOfStream);
    let late = seq.fold(Delta::content(",2"));
    assert_eq!(late.emission(), Emission::Suppressed);
    assert_eq!(seq.content(), "[1]");
    assert_eq!(late.repaired(), Some("[1]"));
    assert_eq!(late.sequence(), 2);
}

// ---------------------------------------------------------------------------
// 5. Tool calls
// ---------------------------------------------------------------------------

#[test]
fn tool_arguments_become_value_source() {
    let mut seq = sequencer();
    let frames = fold_all(
        &mut seq,
        vec![
            Delta::content("Let me search."),
            Delta::tool_call("search"),
            Delta::tool_args(r#"{"q":"ru"#),
            Delta::tool_args(r#"st"}"#),
            Delta::EndOfStream,
        ],
    );
    assert!(seq.is_tool_mode());
    assert_eq!(frames[1].emission(), Emission::Update);
    assert_eq!(frames[1].tool_events().len(), 1);
    assert_eq!(frames[2].value().ready(), Some(&json!({"q": "ru"})));
    assert_eq!(frames[3].value().ready(), Some(&json!({"q": "rust"})));

    let last = &frames[4];
    assert!(last.is_final());
    assert!(last.tool_events()[0].is_completed());
    assert_eq!(last.tool().unwrap().phase, crate::tool_call::ToolPhase::Finalized);
    assert_eq!(last.value().ready(), Some(&json!({"q": "rust"})));
}

#[test]
fn tool_switch_resets_value_source() {
    let mut seq = sequencer();
    let frames = fold_all(
        &mut seq,
        vec![
            Delta::tool_call("a"),
            Delta::tool_args(r#"{"x":1}"#),
            Delta::tool_call("b"),
        ],
    );
    assert_eq!(frames[2].tool_events().len(), 2);
    assert_eq!(frames[2].repaired(), None);
    assert!(frames[2].value().is_pending());
    assert_eq!(frames[2].emission(), Emission::Update);
}

// ---------------------------------------------------------------------------
// 6. Pending-value policy
// ---------------------------------------------------------------------------

fn named() -> ObjectShape {
    ObjectShape::new().field("name", FieldSpec::of_type(JsonType::String).required())
}

fn bounded() -> ObjectShape {
    ObjectShape::new().field(
        "n",
        FieldSpec {
            max: Some(5.0),
            ..FieldSpec::of_type(JsonType::Integer)
        },
    )
}

#[test]
fn advance_policy_emits_progress_without_value() {
    let mut seq = sequencer_with(bounded(), PendingValuePolicy::Advance);
    let frames = fold_all(&mut seq, vec![Delta::content(r#"{"n":1"#), Delta::content("0")]);
    // `{"n":10}` breaks the maximum, so the second value is pending.
    assert!(frames[1].value().is_pending());
    assert_eq!(emissions(&frames), vec![Emission::Update, Emission::Update]);
}

#[test]
fn hold_policy_suppresses_pending_progress() {
    let mut seq = sequencer_with(bounded(), PendingValuePolicy::Hold);
    let frames = fold_all(&mut seq, vec![Delta::content(r#"{"n":1"#), Delta::content("0")]);
    assert_eq!(emissions(&frames), vec![Emission::Update, Emission::Suppressed]);
}

#[test]
fn first_update_waits_for_a_non_empty_value() {
    let mut seq = sequencer();
    let frames = fold_all(
        &mut seq,
        vec![Delta::content("{"), Delta::content(r#""na"#), Delta::content(r#"me":"A"#)],
    );
    assert_eq!(frames[0].value().ready(), Some(&json!({})));
    assert_eq!(
        emissions(&frames),
        vec![Emission::Suppressed, Emission::Suppressed, Emission::Update]
    );

    // A pending value cannot open the sequence either.
    let mut seq = sequencer_with(named(), PendingValuePolicy::Advance);
    let frame = seq.fold(Delta::content(r#"{"na"#));
    assert!(frame.value().is_pending());
    assert_eq!(frame.emission(), Emission::Suppressed);
}

#[test]
fn hold_policy_waits_for_value() {
    let mut seq = sequencer_with(named(), PendingValuePolicy::Hold);
    let frames = fold_all(
        &mut seq,
        vec![
            Delta::content(r#"{"na"#),
            Delta::content(r#"me":"A"#),
            Delta::content(r#"da"}"#),
        ],
    );
    assert_eq!(
        emissions(&frames),
        vec![Emission::Suppressed, Emission::Update, Emission::Update]
    );
    assert_eq!(frames[2].value().ready(), Some(&json!({"name": "Ada"})));
}

#[test]
fn pending_policy_parses_from_snake_case() {
    let policy: PendingValuePolicy = serde_json::from_str("\"hold\"").unwrap();
    assert_eq!(policy, PendingValuePolicy::Hold);
    assert_eq!(PendingValuePolicy::default(), PendingValuePolicy::Advance);
}
