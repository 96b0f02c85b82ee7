//! Letter Number Cipher
//!
//! Replaces each letter of a text by its 1-based position in an alphabet
//! (A1Z26 with the default alphabet) and back.
//!
//! # Controls
//! - `letters` - Plain text
//! - `alphabet` - Ordered, duplicate-free characters; at least two
//! - `separator` - Joins the numbers when encoding
//! - `numbers` - Positions; any run of ASCII digits counts as one number
//!
//! Whichever of `letters` and `numbers` was edited more recently is the input.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use operation_engine::{
    ContributionExport, ControlDescriptor, OperationChange, OperationContribution, OperationExport,
    OperationIssue, OperationOutcome, OperationRequest, OperationResult, SyncOperationBody,
};
use regex::Regex;

use crate::choices::{alphabet_choices, separator_choices};
use crate::text::has_unique_elements;

pub const OPERATION_NAME: &str = "essentials/letter-number-cipher";

pub const CONTROL_LETTERS: &str = "letters";
pub const CONTROL_ALPHABET: &str = "alphabet";
pub const CONTROL_SEPARATOR: &str = "separator";
pub const CONTROL_NUMBERS: &str = "numbers";

const DEFAULT_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz";
const DEFAULT_NUMBERS: &str = "1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23 24 25 26";

pub const ALPHABET_TOO_SHORT_MESSAGE: &str = "The alphabet must have a size of 2 characters or more";
pub const ALPHABET_DUPLICATES_MESSAGE: &str = "The alphabet must not contain duplicate characters";
pub const SEPARATOR_EMPTY_MESSAGE: &str = "The separator must be at least one character long";
pub const FOREIGN_CHARACTERS_MESSAGE: &str =
    "The value contains characters that are not part of the alphabet and thus get ignored";
pub const OUT_OF_RANGE_MESSAGE: &str =
    "The value contains numbers that are out of range and thus being ignored";

static NUMBER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("valid regex"));

pub fn contribution() -> OperationContribution {
    OperationContribution::new(OPERATION_NAME)
        .with_label("Letter number cipher")
        .with_description(
            "Method in which each letter in a text is replaced by the corresponding position in the alphabet.",
        )
        .with_keywords(["a1z26 cipher", "letter number code", "substitution cipher"])
        .with_control(ControlDescriptor::new(CONTROL_LETTERS, DEFAULT_ALPHABET))
        .with_control(
            ControlDescriptor::new(CONTROL_ALPHABET, DEFAULT_ALPHABET).with_choices(alphabet_choices(), false),
        )
        .with_control(ControlDescriptor::new(CONTROL_SEPARATOR, " ").with_choices(separator_choices(), false))
        .with_control(ControlDescriptor::new(CONTROL_NUMBERS, DEFAULT_NUMBERS).with_order(1000))
}

pub fn export() -> ContributionExport {
    OperationExport::new(contribution(), Arc::new(SyncOperationBody::new(execute))).into()
}

pub fn execute(request: &OperationRequest) -> OperationOutcome {
    run(request).into()
}

fn run(request: &OperationRequest) -> Result<OperationResult, OperationIssue> {
    let alphabet_text = request.text(CONTROL_ALPHABET)?;
    let alphabet: Vec<char> = alphabet_text.chars().collect();
    if alphabet.len() <= 1 {
        return Err(OperationIssue::error(
            Some(CONTROL_ALPHABET.to_string()),
            ALPHABET_TOO_SHORT_MESSAGE,
        ));
    }
    if !has_unique_elements(&alphabet) {
        return Err(OperationIssue::error(
            Some(CONTROL_ALPHABET.to_string()),
            ALPHABET_DUPLICATES_MESSAGE,
        ));
    }

    // Checked in both directions even though only encoding uses it
    let separator = request.text(CONTROL_SEPARATOR)?;
    if separator.is_empty() {
        return Err(OperationIssue::error(
            Some(CONTROL_SEPARATOR.to_string()),
            SEPARATOR_EMPTY_MESSAGE,
        ));
    }

    if request.is_forward(CONTROL_LETTERS, CONTROL_NUMBERS) {
        Ok(encode(request.text(CONTROL_LETTERS)?, alphabet_text, separator))
    } else {
        Ok(decode(request.text(CONTROL_NUMBERS)?, &alphabet))
    }
}

fn encode(letters: &str, alphabet: &str, separator: &str) -> OperationResult {
    // Case-insensitive unless the alphabet itself distinguishes case
    let lowercase_alphabet: Vec<char> = alphabet.to_lowercase().chars().collect();
    let (alphabet, letters): (Vec<char>, String) = if has_unique_elements(&lowercase_alphabet) {
        (lowercase_alphabet, letters.to_lowercase())
    } else {
        (alphabet.chars().collect(), letters.to_string())
    };

    let positions: HashMap<char, usize> = alphabet
        .iter()
        .enumerate()
        .map(|(index, letter)| (*letter, index + 1))
        .collect();

    let mut foreign = false;
    let numbers: Vec<String> = letters
        .chars()
        .filter_map(|letter| {
            let position = positions.get(&letter);
            foreign |= position.is_none();
            position.map(|position| position.to_string())
        })
        .collect();

    let mut issues = Vec::new();
    if foreign {
        issues.push(OperationIssue::warn(CONTROL_LETTERS, FOREIGN_CHARACTERS_MESSAGE));
    }
    OperationResult::new(vec![OperationChange::new(CONTROL_NUMBERS, numbers.join(separator))]).with_issues(issues)
}

fn decode(numbers: &str, alphabet: &[char]) -> OperationResult {
    let mut out_of_range = false;
    let letters: String = NUMBER_PATTERN
        .find_iter(numbers)
        .filter_map(|number| {
            let letter = number
                .as_str()
                .parse::<usize>()
                .ok()
                .and_then(|position| position.checked_sub(1))
                .and_then(|index| alphabet.get(index).copied());
            out_of_range |= letter.is_none();
            letter
        })
        .collect();

    let mut issues = Vec::new();
    if out_of_range {
        issues.push(OperationIssue::warn(CONTROL_NUMBERS, OUT_OF_RANGE_MESSAGE));
    }
    OperationResult::new(vec![OperationChange::new(CONTROL_LETTERS, letters)]).with_issues(issues)
}
