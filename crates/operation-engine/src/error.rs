//! Error types for the operation engine

use std::any::Any;

use thiserror::Error;

use crate::value::ControlValueType;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// A contribution record failed static shape validation
///
/// `path` locates the offending field relative to the validated record,
/// e.g. `controls[2].types`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema violation at '{path}': {message}")]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Re-root this violation under `prefix`
    pub fn within(mut self, prefix: &str) -> Self {
        self.path = if self.path.is_empty() {
            prefix.to_string()
        } else if self.path.starts_with('[') {
            format!("{}{}", prefix, self.path)
        } else {
            format!("{}.{}", prefix, self.path)
        };
        self
    }
}

/// An extension could not be registered. Nothing it contributed is admitted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActivationFailure {
    /// The extension was already activated once by this registry
    #[error("extension '{extension}' has already been activated")]
    AlreadyActivated { extension: String },

    /// The activation entry point returned an error or panicked
    #[error("activation of extension '{extension}' failed: {message}")]
    Threw { extension: String, message: String },

    /// A returned contribution failed schema validation
    #[error("extension '{extension}' returned an invalid contribution: {violation}")]
    InvalidContribution {
        extension: String,
        violation: SchemaViolation,
    },

    /// A contributed operation name is already taken
    #[error("extension '{extension}' contributes operation '{name}' which is already registered")]
    DuplicateOperation { extension: String, name: String },
}

impl ActivationFailure {
    /// The extension this failure belongs to
    pub fn extension(&self) -> &str {
        match self {
            Self::AlreadyActivated { extension }
            | Self::Threw { extension, .. }
            | Self::InvalidContribution { extension, .. }
            | Self::DuplicateOperation { extension, .. } => extension,
        }
    }
}

/// Errors that can occur in the operation engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Contribution schema violation
    #[error(transparent)]
    Schema(#[from] SchemaViolation),

    /// Extension activation failure
    #[error(transparent)]
    Activation(#[from] ActivationFailure),

    /// No operation registered under this name
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// No node with this id in the graph store
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A node with this id already exists
    #[error("Node already exists: {0}")]
    DuplicateNode(String),

    /// The node's operation does not declare this control
    #[error("Node '{node}' has no control '{control}'")]
    UnknownControl { node: String, control: String },

    /// No edge with this id in the graph store
    #[error("Unknown edge: {0}")]
    UnknownEdge(String),

    /// Direct edit of an output-only control
    #[error("Control '{control}' on node '{node}' is not writable")]
    ReadOnlyControl { node: String, control: String },

    /// Value type not among the control's accepted types
    #[error("Control '{control}' does not accept values of type {found}")]
    ValueTypeMismatch {
        control: String,
        found: ControlValueType,
    },

    /// Value outside an enforced choice list
    #[error("Control '{control}' only accepts one of its declared choices")]
    ChoiceNotAllowed { control: String },

    /// The two controls share no value type
    #[error("Cannot connect '{source_node}.{source_control}' to '{target_node}.{target_control}': {reason}")]
    IncompatibleConnection {
        source_node: String,
        source_control: String,
        target_node: String,
        target_control: String,
        reason: String,
    },

    /// Engine configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
