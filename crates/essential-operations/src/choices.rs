//! Suggested values shared by text controls

use operation_engine::ControlChoice;

/// Common alphabets, offered but not enforced
pub fn alphabet_choices() -> Vec<ControlChoice> {
    vec![
        ControlChoice::new("abcdefghijklmnopqrstuvwxyz", "Latin alphabet"),
        ControlChoice::new("αβγδεζηθικλμνξοπρστυφχψω", "Greek alphabet"),
        ControlChoice::new("0123456789abcdefghijklmnopqrstuvwxyz", "Alphanumeric"),
    ]
}

/// Common separators, offered but not enforced
pub fn separator_choices() -> Vec<ControlChoice> {
    vec![
        ControlChoice::new(" ", "Space"),
        ControlChoice::new(",", "Comma"),
        ControlChoice::new("\n", "Line feed"),
        ControlChoice::new("-", "Dash"),
    ]
}
