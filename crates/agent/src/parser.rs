//! Output parser: recovers reasoning and an action from free-form model text.
//!
//! [`parse`] is total. Every input yields a [`ParsedStep`], and the rules are
//! tried in order with the first match winning:
//!
//! 0. A line starting with `Final Answer:`. The rest of the text is the answer.
//! 1. The exact trailing form `Thought: ...` followed by `Action: name[argument]`.
//! 2. The last labelled `Action: name[argument]` anywhere in the text. Failing
//!    that, the last line that starts with a bare `name[argument]`.
//! 3. A labelled `Thought:` with no recognisable action.
//! 4. Nothing recognised.
//!
//! Labels are case-insensitive and may carry a step number (`Thought 2:`).
//! Arguments are bracket-balanced; when an argument opens with `{`, `[` or
//! `"`, brackets inside JSON strings do not count. An argument whose brackets
//! never balance ends at the last `]` of a trailing call, or else at the
//! first `]`.

use ponder_core::tool::FINISH_TOOL;
use regex_lite::Regex;
use std::sync::LazyLock;

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(thought|action|observation|final answer)(?:[ \t]+\d+)?[ \t]*:")
        .expect("label pattern is a valid regex")
});

/// Which rule produced a [`ParsedStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseRule {
    FinalAnswer,
    Exact,
    LabelledAction,
    BareAction,
    ReasoningOnly,
    Empty,
}

/// The structured reading of one model response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStep {
    pub reasoning: Option<String>,
    pub action_name: Option<String>,
    pub action_argument: Option<String>,
    /// The action is `finish` (any case) or the text carried a `Final Answer:` line.
    pub is_final: bool,
    pub rule: ParseRule,
}

impl ParsedStep {
    fn empty() -> Self {
        Self {
            reasoning: None,
            action_name: None,
            action_argument: None,
            is_final: false,
            rule: ParseRule::Empty,
        }
    }

    pub fn has_action(&self) -> bool {
        self.action_name.is_some()
    }

    fn action(reasoning: Option<String>, call: Call, rule: ParseRule) -> Self {
        let is_final = call.name.eq_ignore_ascii_case(FINISH_TOOL);
        let name = if is_final { FINISH_TOOL.to_string() } else { call.name };
        Self {
            reasoning,
            action_name: Some(name),
            action_argument: Some(call.argument),
            is_final,
            rule,
        }
    }
}

/// Parse one model response.
pub fn parse(raw: &str) -> ParsedStep {
    let labels = labels(raw);

    // 0. Final Answer line
    if let Some(label) = labels
        .iter()
        .find(|l| l.kind == LabelKind::FinalAnswer && starts_line(raw, l.start))
    {
        return ParsedStep {
            reasoning: last_thought_before(raw, &labels, label.start),
            action_name: Some(FINISH_TOOL.to_string()),
            action_argument: Some(raw[label.end..].trim().to_string()),
            is_final: true,
            rule: ParseRule::FinalAnswer,
        };
    }

    let last_action = labels
        .iter()
        .rev()
        .filter(|l| l.kind == LabelKind::Action)
        .find_map(|l| call_at(raw, l.end).map(|call| (l.start, call)));

    if let Some((label_start, call)) = last_action {
        let reasoning = last_thought_before(raw, &labels, label_start);

        // 1. Thought then Action, nothing after the closing bracket
        let exact = reasoning.is_some() && raw[call.end..].trim().is_empty();
        if exact {
            return ParsedStep::action(reasoning, call, ParseRule::Exact);
        }

        // 2a. Labelled action anywhere
        let reasoning = reasoning.or_else(|| non_empty(&raw[..label_start]));
        return ParsedStep::action(reasoning, call, ParseRule::LabelledAction);
    }

    // 2b. Bare `name[argument]` at the start of a line
    if let Some(call) = last_bare_call(raw) {
        let reasoning =
            last_thought_before(raw, &labels, call.start).or_else(|| non_empty(&raw[..call.start]));
        return ParsedStep::action(reasoning, call, ParseRule::BareAction);
    }

    // 3. Thought only
    if let Some(reasoning) = labels
        .iter()
        .rposition(|l| l.kind == LabelKind::Thought)
        .and_then(|i| non_empty(segment(raw, &labels, i, raw.len())))
    {
        return ParsedStep {
            reasoning: Some(reasoning),
            rule: ParseRule::ReasoningOnly,
            ..ParsedStep::empty()
        };
    }

    ParsedStep::empty()
}

// ── Labels ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Thought,
    Action,
    Observation,
    FinalAnswer,
}

#[derive(Debug)]
struct Label {
    kind: LabelKind,
    start: usize,
    end: usize,
}

fn labels(raw: &str) -> Vec<Label> {
    LABEL
        .captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
                "thought" => LabelKind::Thought,
                "action" => LabelKind::Action,
                "observation" => LabelKind::Observation,
                _ => LabelKind::FinalAnswer,
            };
            Some(Label {
                kind,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Text after label `i`, up to the next label or `limit`.
fn segment<'a>(raw: &'a str, labels: &[Label], i: usize, limit: usize) -> &'a str {
    let start = labels[i].end;
    let end = labels
        .get(i + 1)
        .map_or(raw.len(), |next| next.start)
        .min(limit);
    if end <= start { "" } else { &raw[start..end] }
}

fn last_thought_before(raw: &str, labels: &[Label], pos: usize) -> Option<String> {
    let i = labels
        .iter()
        .rposition(|l| l.kind == LabelKind::Thought && l.start < pos)?;
    non_empty(segment(raw, labels, i, pos))
}

fn starts_line(raw: &str, pos: usize) -> bool {
    raw[..pos]
        .rsplit('\n')
        .next()
        .is_none_or(|prefix| prefix.trim().is_empty())
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ── Calls ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Call {
    name: String,
    argument: String,
    /// Byte offset of the tool name
    start: usize,
    /// Byte offset just past the closing bracket
    end: usize,
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

/// Read `name[argument]` starting at `pos`, skipping leading whitespace.
fn call_at(raw: &str, pos: usize) -> Option<Call> {
    let rest = &raw[pos..];
    let trimmed = rest.trim_start();
    if !trimmed.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return None;
    }
    let start = pos + (rest.len() - trimmed.len());

    let name_len = trimmed
        .char_indices()
        .find(|(_, c)| !is_name_char(*c))
        .map_or(trimmed.len(), |(i, _)| i);
    let after_name = &trimmed[name_len..];
    let after_gap = after_name.trim_start_matches([' ', '\t']);
    if !after_gap.starts_with('[') {
        return None;
    }

    let open = start + name_len + (after_name.len() - after_gap.len());
    let (argument, end) = bracketed(raw, open)?;
    Some(Call {
        name: trimmed[..name_len].to_string(),
        argument,
        start,
        end,
    })
}

fn last_bare_call(raw: &str) -> Option<Call> {
    let mut found = None;
    let mut offset = 0;
    for line in raw.split_inclusive('\n') {
        if let Some(call) = call_at(raw, offset) {
            found = Some(call);
        }
        offset += line.len();
    }
    found
}

/// Argument text between `raw[open] == '['` and its matching `]`.
fn bracketed(raw: &str, open: usize) -> Option<(String, usize)> {
    let inner = &raw[open + 1..];
    let json_like = inner.trim_start().starts_with(['{', '[', '"']);
    let balanced = if json_like {
        closing_bracket(inner, true).or_else(|| closing_bracket(inner, false))
    } else {
        closing_bracket(inner, false)
    };
    let close = balanced.or_else(|| unbalanced_close(inner))?;
    Some((inner[..close].trim().to_string(), open + 1 + close + 1))
}

/// Closing bracket for an argument holding a stray `[`: the last `]` when
/// only whitespace follows it, otherwise the first.
fn unbalanced_close(inner: &str) -> Option<usize> {
    let last = inner.rfind(']')?;
    if inner[last + 1..].trim().is_empty() {
        Some(last)
    } else {
        inner.find(']')
    }
}

fn closing_bracket(inner: &str, skip_strings: bool) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in inner.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' if skip_strings => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Tests ──────────────────────────────────────────────────────────────────
