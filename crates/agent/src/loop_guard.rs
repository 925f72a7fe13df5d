//! Loop guard: detects a model repeating the same action.
//!
//! Keeps a bounded window of recent action signatures. A signature already
//! present in the window is a loop. `finish` is never checked or recorded.

use ponder_core::tool::FINISH_TOOL;
use std::collections::VecDeque;

/// A tool name (lower-cased) paired with its exact argument text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActionSignature {
    pub name: String,
    pub argument: String,
}

impl ActionSignature {
    pub fn new(name: &str, argument: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            argument: argument.to_string(),
        }
    }

    pub fn is_finish(&self) -> bool {
        self.name == FINISH_TOOL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Proceed,
    Repeated,
}

#[derive(Debug, Clone)]
pub struct LoopGuard {
    window: VecDeque<ActionSignature>,
    capacity: usize,
}

impl LoopGuard {
    /// A guard remembering the last `capacity` actions (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Check a proposed action and record it when it is new.
    ///
    /// A repeated signature is not recorded again.
    pub fn check(&mut self, signature: ActionSignature) -> Verdict {
        if signature.is_finish() {
            return Verdict::Proceed;
        }
        if self.window.contains(&signature) {
            return Verdict::Repeated;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(signature);
        Verdict::Proceed
    }

    /// Forget all recorded actions.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
