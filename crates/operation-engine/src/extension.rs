//! Extension activation boundary
//!
//! An extension exposes a single activation entry point. The registry calls
//! it at most once with an [`ExtensionContext`] and receives the
//! contributions the extension provides, each paired with its body.
//!
//! Built-in extensions are collected at link time:
//!
//! ```ignore
//! inventory::submit!(operation_engine::ExtensionFn(|| Box::new(MyExtension)));
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::contribution::{Contribution, OperationContribution};
use crate::error::SchemaViolation;
use crate::operation::OperationBody;
use crate::schema::parse_contribution;

/// Host capabilities handed to an extension on activation
///
/// Empty today. Host services are added as fields without changing the
/// activation signature.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct ExtensionContext {}

impl ExtensionContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Error returned by an activation entry point
pub type ActivationError = Box<dyn std::error::Error + Send + Sync>;

/// A third-party extension
#[async_trait]
pub trait Extension: Send + Sync {
    /// Stable identifier, also the namespace of its operation names
    fn id(&self) -> &str;

    /// Produce this extension's contributions
    async fn activate(
        &self,
        context: &ExtensionContext,
    ) -> std::result::Result<Vec<ContributionExport>, ActivationError>;
}

/// An operation contribution paired with its body
#[derive(Clone)]
pub struct OperationExport {
    pub contribution: OperationContribution,
    pub body: Arc<dyn OperationBody>,
}

impl OperationExport {
    pub fn new(contribution: OperationContribution, body: Arc<dyn OperationBody>) -> Self {
        Self { contribution, body }
    }
}

impl std::fmt::Debug for OperationExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationExport")
            .field("contribution", &self.contribution.name)
            .finish_non_exhaustive()
    }
}

/// A JSON contribution record paired with its body
///
/// The record is parsed and validated by the registry, so a malformed record
/// is reported like any other invalid contribution.
#[derive(Clone)]
pub struct RecordExport {
    pub record: serde_json::Value,
    pub body: Arc<dyn OperationBody>,
}

impl std::fmt::Debug for RecordExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordExport")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// Anything an extension can contribute
#[derive(Debug, Clone)]
pub enum ContributionExport {
    Operation(OperationExport),
    Record(RecordExport),
}

impl ContributionExport {
    /// Pair a JSON contribution record with a body
    pub fn record(record: serde_json::Value, body: Arc<dyn OperationBody>) -> Self {
        Self::Record(RecordExport { record, body })
    }

    /// Parse a record into a typed export; typed exports pass through
    pub fn into_operation(self) -> std::result::Result<OperationExport, SchemaViolation> {
        match self {
            Self::Operation(export) => Ok(export),
            Self::Record(RecordExport { record, body }) => match parse_contribution(&record)? {
                Contribution::Operation(contribution) => Ok(OperationExport::new(contribution, body)),
            },
        }
    }

    /// Declared operation name; empty for a record without one
    pub fn name(&self) -> &str {
        match self {
            Self::Operation(export) => &export.contribution.name,
            Self::Record(export) => export
                .record
                .get("name")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default(),
        }
    }
}

impl From<OperationExport> for ContributionExport {
    fn from(export: OperationExport) -> Self {
        Self::Operation(export)
    }
}

/// Link-time registration of a built-in extension
pub struct ExtensionFn(pub fn() -> Box<dyn Extension>);

inventory::collect!(ExtensionFn);

/// Instantiate every extension submitted with [`ExtensionFn`]
pub fn builtin_extensions() -> Vec<Box<dyn Extension>> {
    inventory::iter::<ExtensionFn>
        .into_iter()
        .map(|ExtensionFn(create)| create())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{OperationOutcome, OperationResult, SyncOperationBody};
    use serde_json::json;

    fn noop() -> Arc<dyn OperationBody> {
        Arc::new(SyncOperationBody::new(|_| OperationOutcome::Result(OperationResult::default())))
    }

    #[test]
    fn test_record_into_operation() {
        let record = json!({
            "type": "operation",
            "name": "tests/noop",
            "controls": [{ "name": "value", "initialValue": true, "types": ["boolean"] }]
        });
        let export = ContributionExport::record(record, noop());
        assert_eq!(export.name(), "tests/noop");

        let operation = export.into_operation().unwrap();
        assert_eq!(operation.contribution.control_names(), vec!["value"]);
    }

    #[test]
    fn test_invalid_record_into_operation() {
        let export = ContributionExport::record(json!({ "type": "operation", "name": "tests/noop" }), noop());
        let violation = export.into_operation().unwrap_err();
        assert_eq!(violation.path, "controls");

        assert_eq!(ContributionExport::record(json!({ "type": "operation" }), noop()).name(), "");
    }

    #[test]
    fn test_no_builtins_in_core() {
        assert!(builtin_extensions().is_empty());
    }
}
