// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Incremental JSON repair
//
// Turns an append-only buffer of truncated JSON into the best valid JSON
// text derivable from it:
// - open objects/arrays are closed
// - an open string value is closed (dangling escapes are dropped)
// - an incomplete key, member, literal or number is dropped, never guessed
// - anything after a complete top-level value is ignored
//
// Output is self-validated with serde_json before it replaces the last
// good snapshot, so a repair failure never surfaces as invalid text.

use std::fmt;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Strategy trait
// ---------------------------------------------------------------------------

/// Repairs raw, possibly truncated JSON text.
///
/// Implementations are pure: the same input always yields the same output.
/// `None` means nothing valid can be derived (yet). Implementations are
/// injected into the pipeline so alternative repair rules can be tried
/// without forking the pipeline.
pub trait JsonRepair: Send + Sync {
    fn repair(&self, raw: &str) -> Option<String>;
}

/// Default strategy: single-pass scan that closes whatever is open.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosingRepair;

impl JsonRepair for ClosingRepair {
    fn repair(&self, raw: &str) -> Option<String> {
        repair_json(raw)
    }
}

/// Repair `raw` with the closing strategy.
pub fn repair_json(raw: &str) -> Option<String> {
    let mut scanner = Scanner::new(raw);
    for (idx, ch) in raw.char_indices() {
        match scanner.step(idx, ch) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(Invalid) => return None,
        }
    }
    scanner.render()
}

// ---------------------------------------------------------------------------
// Session-owned repair stage
// ---------------------------------------------------------------------------

/// Owns a raw buffer and keeps the last repaired snapshot that parsed.
///
/// The buffer only grows; `reset` is for the start of a new buffer (a new
/// session or a new tool invocation).
pub struct IncrementalJsonRepairer {
    raw: String,
    strategy: Arc<dyn JsonRepair>,
    last_good: Option<Arc<str>>,
    stale: bool,
}

impl IncrementalJsonRepairer {
    pub fn new(strategy: Arc<dyn JsonRepair>) -> Self {
        Self {
            raw: String::new(),
            strategy,
            last_good: None,
            stale: false,
        }
    }

    pub fn append(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.raw.push_str(text);
        self.stale = true;
    }

    /// Adopt the transport's authoritative accumulated text.
    ///
    /// When it extends the local buffer only the new suffix is appended.
    /// Otherwise the local buffer is replaced and a warning is logged.
    pub fn adopt(&mut self, accumulated: &str) {
        if accumulated == self.raw {
            return;
        }
        if let Some(suffix) = accumulated.strip_prefix(self.raw.as_str()) {
            self.raw.push_str(suffix);
        } else {
            tracing::warn!(
                local_len = self.raw.len(),
                authoritative_len = accumulated.len(),
                "authoritative content does not extend local buffer, replacing"
            );
            self.raw.clear();
            self.raw.push_str(accumulated);
        }
        self.stale = true;
    }

    pub fn reset(&mut self) {
        self.raw.clear();
        self.last_good = None;
        self.stale = false;
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Current repaired text. Falls back to the previous good snapshot when
    /// the strategy fails or returns text that does not parse.
    pub fn repaired(&mut self) -> Option<Arc<str>> {
        if self.stale {
            self.stale = false;
            match self.strategy.repair(&self.raw) {
                Some(candidate) if is_valid_json(&candidate) => {
                    if self.last_good.as_deref() != Some(candidate.as_str()) {
                        self.last_good = Some(Arc::from(candidate));
                    }
                }
                Some(candidate) => {
                    tracing::debug!(
                        raw_len = self.raw.len(),
                        candidate_len = candidate.len(),
                        "repair produced unparseable text, keeping last good snapshot"
                    );
                }
                None => {
                    tracing::trace!(
                        raw_len = self.raw.len(),
                        "nothing repairable yet, keeping last good snapshot"
                    );
                }
            }
        }
        self.last_good.clone()
    }
}

impl fmt::Debug for IncrementalJsonRepairer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalJsonRepairer")
            .field("raw_len", &self.raw.len())
            .field("last_good", &self.last_good)
            .finish()
    }
}

fn is_valid_json(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text).is_ok()
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// The input cannot be a prefix of valid JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Invalid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Top-level value is complete and trailing text begins.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

#[derive(Debug, Clone, Copy)]
struct Open {
    container: Container,
    /// Byte offset just past the last complete member/element (or just
    /// past the opening bracket). Truncation falls back to this point.
    last_complete: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    /// After ':' or after ',' in an array, or the top-level value.
    Value,
    /// Right after '['.
    ValueOrClose,
    /// After ',' in an object.
    Key,
    /// Right after '{'.
    KeyOrClose,
    Colon,
    CommaOrClose,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Escape {
    None,
    Backslash { at: usize },
    Unicode { at: usize, digits: u8, code: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrState {
    key: bool,
    escape: Escape,
    /// Offset of a high surrogate escape still waiting for its low half.
    lone_high: Option<usize>,
}

impl StrState {
    fn new(key: bool) -> Self {
        Self {
            key,
            escape: Escape::None,
            lone_high: None,
        }
    }

    /// Where to cut an unterminated string so that no partial escape or
    /// unpaired surrogate survives.
    fn cut_point(&self, len: usize) -> usize {
        let escape_at = match self.escape {
            Escape::None => None,
            Escape::Backslash { at } | Escape::Unicode { at, .. } => Some(at),
        };
        self.lone_high.or(escape_at).unwrap_or(len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    None,
    Str(StrState),
    Number { start: usize },
    Literal { expected: &'static str, matched: usize },
}

struct Scanner<'a> {
    raw: &'a str,
    stack: Vec<Open>,
    expect: Expect,
    token: Token,
    top_end: usize,
}

impl<'a> Scanner<'a> {
    fn new(raw: &'a str) -> Self {
        Self {
            raw,
            stack: Vec::new(),
            expect: Expect::Value,
            token: Token::None,
            top_end: 0,
        }
    }

    fn step(&mut self, idx: usize, ch: char) -> Result<Flow, Invalid> {
        match self.token {
            Token::Str(state) => {
                self.string_char(idx, ch, state)?;
                return Ok(Flow::Continue);
            }
            Token::Number { start } => {
                if is_number_char(ch) {
                    return Ok(Flow::Continue);
                }
                if !is_complete_number(&self.raw[start..idx]) {
                    return Err(Invalid);
                }
                self.token = Token::None;
                self.complete_value(idx);
            }
            Token::Literal { expected, matched } => {
                if expected.as_bytes()[matched] as char != ch {
                    return Err(Invalid);
                }
                if matched + 1 == expected.len() {
                    self.token = Token::None;
                    self.complete_value(idx + 1);
                } else {
                    self.token = Token::Literal {
                        expected,
                        matched: matched + 1,
                    };
                }
                return Ok(Flow::Continue);
            }
            Token::None => {}
        }
        self.structural(idx, ch)
    }

    fn structural(&mut self, idx: usize, ch: char) -> Result<Flow, Invalid> {
        if matches!(ch, ' ' | '\t' | '\n' | '\r') {
            return Ok(Flow::Continue);
        }
        match self.expect {
            Expect::Done => return Ok(Flow::Stop),
            Expect::ValueOrClose if ch == ']' => self.close(idx, Container::Array)?,
            Expect::Value | Expect::ValueOrClose => self.begin_value(idx, ch)?,
            Expect::KeyOrClose if ch == '}' => self.close(idx, Container::Object)?,
            Expect::Key | Expect::KeyOrClose => {
                if ch != '"' {
                    return Err(Invalid);
                }
                self.token = Token::Str(StrState::new(true));
            }
            Expect::Colon => {
                if ch != ':' {
                    return Err(Invalid);
                }
                self.expect = Expect::Value;
            }
            Expect::CommaOrClose => match (ch, self.innermost()) {
                (',', Some(Container::Object)) => self.expect = Expect::Key,
                (',', Some(Container::Array)) => self.expect = Expect::Value,
                ('}', Some(Container::Object)) => self.close(idx, Container::Object)?,
                (']', Some(Container::Array)) => self.close(idx, Container::Array)?,
                _ => return Err(Invalid),
            },
        }
        Ok(Flow::Continue)
    }

    fn begin_value(&mut self, idx: usize, ch: char) -> Result<(), Invalid> {
        match ch {
            '{' => {
                self.stack.push(Open {
                    container: Container::Object,
                    last_complete: idx + 1,
                });
                self.expect = Expect::KeyOrClose;
            }
            '[' => {
                self.stack.push(Open {
                    container: Container::Array,
                    last_complete: idx + 1,
                });
                self.expect = Expect::ValueOrClose;
            }
            '"' => self.token = Token::Str(StrState::new(false)),
            '-' | '0'..='9' => self.token = Token::Number { start: idx },
            't' => self.token = literal("true"),
            'f' => self.token = literal("false"),
            'n' => self.token = literal("null"),
            _ => return Err(Invalid),
        }
        Ok(())
    }

    fn string_char(&mut self, idx: usize, ch: char, mut state: StrState) -> Result<(), Invalid> {
        match state.escape {
            Escape::None => match ch {
                '"' => {
                    if state.lone_high.is_some() {
                        return Err(Invalid);
                    }
                    self.token = Token::None;
                    if state.key {
                        self.expect = Expect::Colon;
                    } else {
                        self.complete_value(idx + 1);
                    }
                    return Ok(());
                }
                '\\' => state.escape = Escape::Backslash { at: idx },
                c if (c as u32) < 0x20 => return Err(Invalid),
                _ if state.lone_high.is_some() => return Err(Invalid),
                _ => {}
            },
            Escape::Backslash { at } => match ch {
                'u' => {
                    state.escape = Escape::Unicode {
                        at,
                        digits: 0,
                        code: 0,
                    }
                }
                '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' => {
                    if state.lone_high.is_some() {
                        return Err(Invalid);
                    }
                    state.escape = Escape::None;
                }
                _ => return Err(Invalid),
            },
            Escape::Unicode { at, digits, code } => {
                let digit = ch.to_digit(16).ok_or(Invalid)?;
                let code = code * 16 + digit;
                if digits + 1 < 4 {
                    state.escape = Escape::Unicode {
                        at,
                        digits: digits + 1,
                        code,
                    };
                } else {
                    state.escape = Escape::None;
                    match code {
                        0xD800..=0xDBFF => {
                            if state.lone_high.is_some() {
                                return Err(Invalid);
                            }
                            state.lone_high = Some(at);
                        }
                        0xDC00..=0xDFFF => {
                            if state.lone_high.take().is_none() {
                                return Err(Invalid);
                            }
                        }
                        _ if state.lone_high.is_some() => return Err(Invalid),
                        _ => {}
                    }
                }
            }
        }
        self.token = Token::Str(state);
        Ok(())
    }

    fn close(&mut self, idx: usize, container: Container) -> Result<(), Invalid> {
        match self.stack.pop() {
            Some(open) if open.container == container => {
                self.complete_value(idx + 1);
                Ok(())
            }
            _ => Err(Invalid),
        }
    }

    fn complete_value(&mut self, end: usize) {
        match self.stack.last_mut() {
            Some(open) => {
                open.last_complete = end;
                self.expect = Expect::CommaOrClose;
            }
            None => {
                self.top_end = end;
                self.expect = Expect::Done;
            }
        }
    }

    fn innermost(&self) -> Option<Container> {
        self.stack.last().map(|open| open.container)
    }

    fn innermost_complete(&self) -> Option<usize> {
        self.stack.last().map(|open| open.last_complete)
    }

    fn render(&self) -> Option<String> {
        let len = self.raw.len();
        if self.expect == Expect::Done && self.token == Token::None {
            return Some(self.raw[..self.top_end].to_string());
        }

        let (cut, close_string) = match self.token {
            Token::Str(state) if !state.key => (state.cut_point(len), true),
            Token::Str(_) | Token::Literal { .. } => (self.innermost_complete()?, false),
            Token::Number { start } => {
                if is_complete_number(&self.raw[start..]) {
                    (len, false)
                } else {
                    (self.innermost_complete()?, false)
                }
            }
            Token::None => match self.expect {
                Expect::Value | Expect::Key | Expect::Colon => (self.innermost_complete()?, false),
                _ => (len, false),
            },
        };

        let mut out = String::with_capacity(cut + self.stack.len() + 1);
        out.push_str(&self.raw[..cut]);
        if close_string {
            out.push('"');
        }
        for open in self.stack.iter().rev() {
            out.push(match open.container {
                Container::Object => '}',
                Container::Array => ']',
            });
        }
        Some(out)
    }
}

fn literal(expected: &'static str) -> Token {
    Token::Literal {
        expected,
        matched: 1,
    }
}

fn is_number_char(ch: char) -> bool {
    matches!(ch, '0'..='9' | '-' | '+' | '.' | 'e' | 'E')
}

/// Whether `text` is a complete JSON number per RFC 8259 grammar.
fn is_complete_number(text: &str) -> bool {
    let bytes = text.as_bytes();
    let digit_at = |i: usize| bytes.get(i).map_or(false, |b| b.is_ascii_digit());
    let mut i = 0;

    if bytes.first() == Some(&b'-') {
        i += 1;
    }
    match bytes.get(i) {
        Some(b'0') => i += 1,
        Some(b) if b.is_ascii_digit() => {
            while digit_at(i) {
                i += 1;
            }
        }
        _ => return false,
    }
    if bytes.get(i) == Some(&b'.') {
        i += 1;
        let start = i;
        while digit_at(i) {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    if matches!(bytes.get(i), Some(b'e') | Some(b'E')) {
        i += 1;
        if matches!(bytes.get(i), Some(b'+') | Some(b'-')) {
            i += 1;
        }
        let start = i;
        while digit_at(i) {
            i += 1;
        }
        if i == start {
            return false;
        }
    }
    i == bytes.len()
}
