//! Direction inference from control priorities
//!
//! Invertible operations have two or more sides and must decide, per
//! invocation, which side is the source. A node keeps its control names
//! ordered by recency of direct edit; a lower index means edited more
//! recently, and that side drives.
//!
//! Every declared control appears exactly once in a node's priorities, so two
//! distinct declared controls never tie. A name missing from the list ranks
//! after every listed name.

use serde::{Deserialize, Serialize};

/// Position of `name` in `priorities`, if listed
pub fn priority_index(priorities: &[String], name: &str) -> Option<usize> {
    priorities.iter().position(|p| p == name)
}

fn rank(priorities: &[String], name: &str) -> usize {
    priority_index(priorities, name).unwrap_or(usize::MAX)
}

/// Whether `input` was edited more recently than `output`
pub fn is_forward(priorities: &[String], input: &str, output: &str) -> bool {
    rank(priorities, input) < rank(priorities, output)
}

/// The most recently edited of `candidates`
///
/// N-way generalization of [`is_forward`]; the first candidate wins when
/// none of them is listed.
pub fn most_recent<'a>(priorities: &[String], candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .copied()
        .enumerate()
        .min_by_key(|(position, name)| (rank(priorities, name), *position))
        .map(|(_, name)| name)
}

/// Ordered control names of one node, most recently edited first
///
/// Only direct edits promote a control. Values written by an operation leave
/// the order untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControlPriorities(Vec<String>);

impl ControlPriorities {
    /// Start from declaration order
    pub fn new(names: Vec<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(names.len());
        for name in names {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self(unique)
    }

    /// Move `name` to the front, inserting it if absent
    pub fn promote(&mut self, name: &str) {
        if let Some(index) = priority_index(&self.0, name) {
            let promoted = self.0.remove(index);
            self.0.insert(0, promoted);
        } else {
            self.0.insert(0, name.to_string());
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        priority_index(&self.0, name)
    }

    pub fn is_forward(&self, input: &str, output: &str) -> bool {
        is_forward(&self.0, input, output)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}
