//! Word Counter
//!
//! Counts the characters, words and lines that appear in a text. The counts
//! are read-only outputs, so the operation only ever runs forward.

use std::sync::Arc;

use once_cell::sync::Lazy;
use operation_engine::{
    ContributionExport, OperationChange, OperationOutcome, OperationRequest, OperationResult,
    SyncOperationBody,
};
use regex::Regex;
use serde_json::{json, Value};
use unicode_normalization::UnicodeNormalization;

pub const OPERATION_NAME: &str = "essentials/word-counter";

pub const CONTROL_TEXT: &str = "text";
pub const CONTROL_CHARACTER_COUNT: &str = "characterCount";
pub const CONTROL_WORD_COUNT: &str = "wordCount";
pub const CONTROL_LINE_COUNT: &str = "lineCount";

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n").expect("valid regex"));

/// Contribution record, checked by the schema validator on activation
pub fn contribution_record() -> Value {
    json!({
        "type": "operation",
        "name": OPERATION_NAME,
        "label": "Word counter",
        "description": "Operation for counting the number of characters, words and lines that appear in a text.",
        "keywords": [],
        "controls": [
            {
                "name": CONTROL_TEXT,
                "initialValue": "The quick brown fox jumps over the lazy dog.",
                "types": ["text"]
            },
            {
                "name": CONTROL_CHARACTER_COUNT,
                "initialValue": 44,
                "types": ["integer"],
                "writable": false,
                "order": 1000
            },
            {
                "name": CONTROL_WORD_COUNT,
                "initialValue": 9,
                "types": ["integer"],
                "writable": false,
                "order": 1000
            },
            {
                "name": CONTROL_LINE_COUNT,
                "initialValue": 1,
                "types": ["integer"],
                "writable": false,
                "order": 1000
            }
        ]
    })
}

pub fn export() -> ContributionExport {
    ContributionExport::record(contribution_record(), Arc::new(SyncOperationBody::new(execute)))
}

/// Counts of a text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextCounts {
    /// Code points after NFC normalization
    pub characters: usize,
    /// Pieces between runs of whitespace
    pub words: usize,
    /// Pieces between line breaks
    pub lines: usize,
}

impl TextCounts {
    pub fn of(text: &str) -> Self {
        Self {
            characters: text.nfc().count(),
            words: WHITESPACE.split(text).count(),
            lines: LINE_BREAK.split(text).count(),
        }
    }
}

pub fn execute(request: &OperationRequest) -> OperationOutcome {
    let text = match request.text(CONTROL_TEXT) {
        Ok(text) => text,
        Err(issue) => return issue.into(),
    };
    let counts = TextCounts::of(text);
    OperationResult::new(vec![
        OperationChange::new(CONTROL_CHARACTER_COUNT, count_value(counts.characters)),
        OperationChange::new(CONTROL_WORD_COUNT, count_value(counts.words)),
        OperationChange::new(CONTROL_LINE_COUNT, count_value(counts.lines)),
    ])
    .into()
}

fn count_value(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
