//! Operation execution contract
//!
//! An operation body receives an [`OperationRequest`] holding the current
//! value of every declared control plus the node's control priorities, and
//! produces an [`OperationOutcome`]: either a result (changes + advisory
//! issues) or a single fatal error issue.
//!
//! Bodies must not have side effects beyond the changes they return. The
//! engine may invoke them speculatively and throw the outcome away.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::direction;
use crate::value::ControlValue;

/// Input to one invocation of an operation body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationRequest {
    /// Current value of every declared control
    pub values: HashMap<String, ControlValue>,
    /// Control names, most recently edited first
    pub control_priorities: Vec<String>,
}

impl OperationRequest {
    pub fn new(values: HashMap<String, ControlValue>, control_priorities: Vec<String>) -> Self {
        Self {
            values,
            control_priorities,
        }
    }

    pub fn value(&self, name: &str) -> Option<&ControlValue> {
        self.values.get(name)
    }

    /// Read a text control, producing an error issue on a missing value or a
    /// type mismatch
    pub fn text(&self, name: &str) -> Result<&str, OperationIssue> {
        match self.values.get(name) {
            Some(ControlValue::Text(text)) => Ok(text),
            Some(other) => Err(OperationIssue::error(
                Some(name.to_string()),
                format!("Expected a text value, found {}", other.value_type()),
            )),
            None => Err(OperationIssue::error(
                Some(name.to_string()),
                "The value is missing".to_string(),
            )),
        }
    }

    /// Read an integer control, producing an error issue on a missing value
    /// or a type mismatch
    pub fn integer(&self, name: &str) -> Result<i64, OperationIssue> {
        match self.values.get(name) {
            Some(ControlValue::Integer(value)) => Ok(*value),
            Some(other) => Err(OperationIssue::error(
                Some(name.to_string()),
                format!("Expected an integer value, found {}", other.value_type()),
            )),
            None => Err(OperationIssue::error(
                Some(name.to_string()),
                "The value is missing".to_string(),
            )),
        }
    }

    /// Whether `input` was edited more recently than `output`
    pub fn is_forward(&self, input: &str, output: &str) -> bool {
        direction::is_forward(&self.control_priorities, input, output)
    }
}

/// Severity of an operation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    /// Fatal; the invocation produced no changes
    Error,
    /// Advisory; accompanies a valid result
    Warn,
    /// Informational
    Info,
}

/// A message attached to a control of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationIssue {
    #[serde(rename = "type")]
    pub level: IssueLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_name: Option<String>,
    pub message: String,
}

impl OperationIssue {
    pub fn error(control_name: Option<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Error,
            control_name,
            message: message.into(),
        }
    }

    pub fn warn(control_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Warn,
            control_name: Some(control_name.into()),
            message: message.into(),
        }
    }

    pub fn info(control_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: IssueLevel::Info,
            control_name: Some(control_name.into()),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == IssueLevel::Error
    }
}

/// A new value for one control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationChange {
    pub name: String,
    pub value: ControlValue,
}

impl OperationChange {
    pub fn new(name: impl Into<String>, value: impl Into<ControlValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Successful outcome of an invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResult {
    /// Controls to overwrite; controls not named keep their value
    pub changes: Vec<OperationChange>,
    /// Advisory issues, never errors
    #[serde(default)]
    pub issues: Vec<OperationIssue>,
}

impl OperationResult {
    pub fn new(changes: Vec<OperationChange>) -> Self {
        Self {
            changes,
            issues: Vec::new(),
        }
    }

    pub fn with_issues(mut self, issues: Vec<OperationIssue>) -> Self {
        self.issues = issues;
        self
    }

    pub fn change(&self, name: &str) -> Option<&ControlValue> {
        self.changes.iter().find(|c| c.name == name).map(|c| &c.value)
    }
}

/// What an invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    Result(OperationResult),
    /// A single fatal issue; no changes are applied
    Error(OperationIssue),
}

impl OperationOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl From<OperationResult> for OperationOutcome {
    fn from(result: OperationResult) -> Self {
        Self::Result(result)
    }
}

impl From<OperationIssue> for OperationOutcome {
    fn from(issue: OperationIssue) -> Self {
        Self::Error(issue)
    }
}

impl From<Result<OperationResult, OperationIssue>> for OperationOutcome {
    fn from(outcome: Result<OperationResult, OperationIssue>) -> Self {
        match outcome {
            Ok(result) => Self::Result(result),
            Err(issue) => Self::Error(issue),
        }
    }
}

/// The executable half of an operation
#[async_trait]
pub trait OperationBody: Send + Sync {
    /// Compute control changes for one request
    async fn execute(&self, request: OperationRequest) -> OperationOutcome;
}

type ExecuteFuture = Pin<Box<dyn Future<Output = OperationOutcome> + Send>>;

/// Async closure wrapped as an operation body
pub struct CallbackOperationBody {
    callback: Box<dyn Fn(OperationRequest) -> ExecuteFuture + Send + Sync>,
}

impl CallbackOperationBody {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(OperationRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = OperationOutcome> + Send + 'static,
    {
        Self {
            callback: Box::new(move |request| Box::pin(callback(request))),
        }
    }
}

#[async_trait]
impl OperationBody for CallbackOperationBody {
    async fn execute(&self, request: OperationRequest) -> OperationOutcome {
        (self.callback)(request).await
    }
}

/// Synchronous closure wrapped as an operation body
///
/// The outcome is available as soon as the body runs; the engine still
/// awaits it like any other invocation.
pub struct SyncOperationBody {
    callback: Box<dyn Fn(&OperationRequest) -> OperationOutcome + Send + Sync>,
}

impl SyncOperationBody {
    pub fn new(callback: impl Fn(&OperationRequest) -> OperationOutcome + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

#[async_trait]
impl OperationBody for SyncOperationBody {
    async fn execute(&self, request: OperationRequest) -> OperationOutcome {
        (self.callback)(&request)
    }
}
