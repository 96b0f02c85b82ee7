//! Contribution schema validation
//!
//! Runs once per extension at load time. Two entry points:
//!
//! - [`validate_operation_contribution`] checks a typed contribution against
//!   the rules the type system cannot express (unique control names,
//!   initial values within the accepted types, ...).
//! - [`parse_contribution`] walks a JSON contribution record field by field,
//!   builds the typed form and then validates it.
//!
//! Both report the first problem as a [`SchemaViolation`] with the path of
//! the offending field.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::contribution::{Contribution, ControlChoice, ControlDescriptor, OperationContribution};
use crate::error::SchemaViolation;
use crate::value::{ControlValue, ControlValueType};

type Violation<T> = std::result::Result<T, SchemaViolation>;

/// Validate a typed operation contribution
pub fn validate_operation_contribution(contribution: &OperationContribution) -> Violation<()> {
    if contribution.name.trim().is_empty() {
        return Err(SchemaViolation::new("name", "must not be empty"));
    }
    if contribution.name.chars().any(char::is_whitespace) {
        return Err(SchemaViolation::new("name", "must not contain whitespace"));
    }

    let mut seen = HashSet::new();
    for (index, control) in contribution.controls.iter().enumerate() {
        validate_control(control).map_err(|v| v.within(&format!("controls[{}]", index)))?;
        if !seen.insert(control.name.as_str()) {
            return Err(SchemaViolation::new(
                format!("controls[{}].name", index),
                format!("duplicate control name '{}'", control.name),
            ));
        }
    }
    Ok(())
}

fn validate_control(control: &ControlDescriptor) -> Violation<()> {
    if !is_identifier(&control.name) {
        return Err(SchemaViolation::new(
            "name",
            format!("'{}' is not a valid control identifier", control.name),
        ));
    }
    if control.types.is_empty() {
        return Err(SchemaViolation::new("types", "must list at least one value type"));
    }
    let mut types = HashSet::new();
    for (index, value_type) in control.types.iter().enumerate() {
        if !types.insert(value_type) {
            return Err(SchemaViolation::new(
                format!("types[{}]", index),
                format!("duplicate value type '{}'", value_type),
            ));
        }
    }
    if !control.accepts_type(control.initial_value.value_type()) {
        return Err(SchemaViolation::new(
            "initialValue",
            format!("type '{}' is not among the accepted types", control.initial_value.value_type()),
        ));
    }
    for (index, choice) in control.choices.iter().enumerate() {
        if !control.accepts_type(choice.value.value_type()) {
            return Err(SchemaViolation::new(
                format!("choices[{}].value", index),
                format!("type '{}' is not among the accepted types", choice.value.value_type()),
            ));
        }
    }
    if control.enforce_choices {
        if control.choices.is_empty() {
            return Err(SchemaViolation::new("choices", "must not be empty when choices are enforced"));
        }
        if !control.choices.iter().any(|c| c.value == control.initial_value) {
            return Err(SchemaViolation::new(
                "initialValue",
                "must be one of the choices when choices are enforced",
            ));
        }
    }
    Ok(())
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Parse and validate a JSON contribution record
pub fn parse_contribution(record: &Value) -> Violation<Contribution> {
    let object = expect_object(record, "")?;
    let kind = required_string(object, "type")?;
    match kind.as_str() {
        "operation" => {
            let operation = parse_operation(object)?;
            validate_operation_contribution(&operation)?;
            Ok(Contribution::Operation(operation))
        }
        other => Err(SchemaViolation::new(
            "type",
            format!("unknown contribution type '{}'", other),
        )),
    }
}

fn parse_operation(object: &Map<String, Value>) -> Violation<OperationContribution> {
    let mut operation = OperationContribution::new(required_string(object, "name")?);
    operation.label = optional_string(object, "label")?;
    operation.description = optional_string(object, "description")?;
    operation.url = optional_string(object, "url")?;
    operation.extension_url = optional_string(object, "extensionUrl")?;

    if let Some(keywords) = object.get("keywords") {
        let list = expect_array(keywords, "keywords")?;
        for (index, keyword) in list.iter().enumerate() {
            let keyword = keyword
                .as_str()
                .ok_or_else(|| SchemaViolation::new(format!("keywords[{}]", index), "expected a string"))?;
            operation.keywords.push(keyword.to_string());
        }
    }

    let controls = object
        .get("controls")
        .ok_or_else(|| SchemaViolation::new("controls", "is required"))?;
    for (index, control) in expect_array(controls, "controls")?.iter().enumerate() {
        let descriptor = parse_control(control).map_err(|v| v.within(&format!("controls[{}]", index)))?;
        operation.controls.push(descriptor);
    }
    Ok(operation)
}

fn parse_control(record: &Value) -> Violation<ControlDescriptor> {
    let object = expect_object(record, "")?;
    let name = required_string(object, "name")?;

    let types_value = object
        .get("types")
        .ok_or_else(|| SchemaViolation::new("types", "is required"))?;
    let mut types = Vec::new();
    for (index, entry) in expect_array(types_value, "types")?.iter().enumerate() {
        let path = format!("types[{}]", index);
        let type_name = entry
            .as_str()
            .ok_or_else(|| SchemaViolation::new(path.clone(), "expected a string"))?;
        let value_type = ControlValueType::from_name(type_name)
            .ok_or_else(|| SchemaViolation::new(path, format!("unknown value type '{}'", type_name)))?;
        types.push(value_type);
    }
    if types.is_empty() {
        return Err(SchemaViolation::new("types", "must list at least one value type"));
    }

    let initial = object
        .get("initialValue")
        .ok_or_else(|| SchemaViolation::new("initialValue", "is required"))?;
    let initial_value = parse_value(initial, &types, "initialValue")?;

    let mut choices = Vec::new();
    if let Some(list) = object.get("choices") {
        for (index, choice) in expect_array(list, "choices")?.iter().enumerate() {
            let path = format!("choices[{}]", index);
            let choice = expect_object(choice, &path)?;
            let value = choice
                .get("value")
                .ok_or_else(|| SchemaViolation::new(format!("{}.value", path), "is required"))?;
            let value = parse_value(value, &types, &format!("{}.value", path))?;
            let label = required_string(choice, "label").map_err(|v| v.within(&path))?;
            choices.push(ControlChoice { value, label });
        }
    }

    let enforce_choices = optional_bool(object, "enforceChoices")?.unwrap_or(false);
    let writable = optional_bool(object, "writable")?.unwrap_or(true);
    let order = match object.get("order") {
        None | Some(Value::Null) => 0,
        Some(value) => value
            .as_i64()
            .and_then(|order| i32::try_from(order).ok())
            .ok_or_else(|| SchemaViolation::new("order", "expected a 32-bit integer"))?,
    };

    Ok(ControlDescriptor {
        name,
        label: optional_string(object, "label")?,
        initial_value,
        types,
        choices,
        enforce_choices,
        order,
        writable,
    })
}

/// A value is either tagged (`{ type, data }`) or a bare primitive read
/// against the declared types
fn parse_value(value: &Value, types: &[ControlValueType], path: &str) -> Violation<ControlValue> {
    if value.is_object() {
        return ControlValue::from_tagged(value).map_err(|message| SchemaViolation::new(path, message));
    }
    ControlValue::from_untagged(value, types)
        .ok_or_else(|| SchemaViolation::new(path, "value does not match any of the declared types"))
}

fn expect_object<'a>(value: &'a Value, path: &str) -> Violation<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| SchemaViolation::new(path, "expected an object"))
}

fn expect_array<'a>(value: &'a Value, path: &str) -> Violation<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| SchemaViolation::new(path, "expected an array"))
}

fn required_string(object: &Map<String, Value>, field: &str) -> Violation<String> {
    match object.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(SchemaViolation::new(field, "expected a string")),
        None => Err(SchemaViolation::new(field, "is required")),
    }
}

fn optional_string(object: &Map<String, Value>, field: &str) -> Violation<Option<String>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SchemaViolation::new(field, "expected a string")),
    }
}

fn optional_bool(object: &Map<String, Value>, field: &str) -> Violation<Option<bool>> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(SchemaViolation::new(field, "expected a boolean")),
    }
}
