//! Contribution records
//!
//! A contribution is the static, pure-data half of an operation: its
//! identity and the controls it declares. The executable half lives in
//! [`crate::operation::OperationBody`].

use serde::Serialize;

use crate::error::{EngineError, Result};
use crate::operation::{OperationChange, OperationIssue};
use crate::value::{ControlValue, ControlValueType};

/// A suggested value for a control
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlChoice {
    pub value: ControlValue,
    pub label: String,
}

impl ControlChoice {
    pub fn new(value: impl Into<ControlValue>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Static declaration of one control on an operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDescriptor {
    /// Identifier, unique within the operation
    pub name: String,
    /// Human-readable label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Value a fresh node starts with
    pub initial_value: ControlValue,
    /// Accepted value types, never empty
    pub types: Vec<ControlValueType>,
    /// Suggested values
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ControlChoice>,
    /// Whether values outside `choices` are rejected
    pub enforce_choices: bool,
    /// Display sort key
    pub order: i32,
    /// Output-only controls are not writable
    pub writable: bool,
}

impl ControlDescriptor {
    /// Create a writable control accepting the type of its initial value
    pub fn new(name: impl Into<String>, initial_value: impl Into<ControlValue>) -> Self {
        let initial_value = initial_value.into();
        Self {
            name: name.into(),
            label: None,
            types: vec![initial_value.value_type()],
            initial_value,
            choices: Vec::new(),
            enforce_choices: false,
            order: 0,
            writable: true,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Replace the accepted value types
    pub fn with_types(mut self, types: Vec<ControlValueType>) -> Self {
        self.types = types;
        self
    }

    pub fn with_choices(mut self, choices: Vec<ControlChoice>, enforce: bool) -> Self {
        self.choices = choices;
        self.enforce_choices = enforce;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Mark this control as output-only
    pub fn read_only(mut self) -> Self {
        self.writable = false;
        self
    }

    pub fn accepts_type(&self, value_type: ControlValueType) -> bool {
        self.types.contains(&value_type)
    }

    /// Check a value against the accepted types and enforced choices
    pub fn check_value(&self, value: &ControlValue) -> Result<()> {
        if !self.accepts_type(value.value_type()) {
            return Err(EngineError::ValueTypeMismatch {
                control: self.name.clone(),
                found: value.value_type(),
            });
        }
        if self.enforce_choices && !self.choices.iter().any(|choice| &choice.value == value) {
            return Err(EngineError::ChoiceNotAllowed {
                control: self.name.clone(),
            });
        }
        Ok(())
    }
}

/// Declaration of an operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationContribution {
    /// Globally unique name, namespaced by extension by convention
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension_url: Option<String>,
    pub keywords: Vec<String>,
    /// Declared controls, in declaration order
    pub controls: Vec<ControlDescriptor>,
}

impl OperationContribution {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            description: None,
            url: None,
            extension_url: None,
            keywords: Vec::new(),
            controls: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_control(mut self, control: ControlDescriptor) -> Self {
        self.controls.push(control);
        self
    }

    /// Find a declared control by name
    pub fn control(&self, name: &str) -> Option<&ControlDescriptor> {
        self.controls.iter().find(|c| c.name == name)
    }

    /// Declared control names, in declaration order
    pub fn control_names(&self) -> Vec<String> {
        self.controls.iter().map(|c| c.name.clone()).collect()
    }

    /// Validate changes returned by an invocation of this operation
    ///
    /// Every change must name a declared control and carry a value type that
    /// control accepts. The first offending change is reported as an error
    /// issue on that control.
    pub fn check_changes(&self, changes: &[OperationChange]) -> std::result::Result<(), OperationIssue> {
        for change in changes {
            let Some(control) = self.control(&change.name) else {
                return Err(OperationIssue::error(
                    self.fallback_control(),
                    format!("Operation changed undeclared control '{}'", change.name),
                ));
            };
            if !control.accepts_type(change.value.value_type()) {
                return Err(OperationIssue::error(
                    Some(control.name.clone()),
                    format!(
                        "Operation produced a {} value for control '{}'",
                        change.value.value_type(),
                        control.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Control that issues with no better target attach to
    pub fn fallback_control(&self) -> Option<String> {
        self.controls.first().map(|c| c.name.clone())
    }
}

/// A contribution of any kind
///
/// Operations are the only kind today.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Contribution {
    Operation(OperationContribution),
}

impl Contribution {
    pub fn name(&self) -> &str {
        match self {
            Self::Operation(operation) => &operation.name,
        }
    }
}
