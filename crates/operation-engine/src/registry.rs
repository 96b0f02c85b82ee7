//! Operation registry
//!
//! Maps operation names to their contribution and body, and tracks which
//! extension owns which operations. Lifecycle:
//! `new (empty) → register(extension) → [get] → unregister(extension)`.
//!
//! Registration is all-or-nothing: an extension whose activation fails, or
//! whose contributions fail validation or collide with registered names,
//! admits no operation at all.
//!
//! # Usage
//!
//! ```ignore
//! let registry = OperationRegistry::new();
//! registry.register(&MyExtension).await?;
//! let operation = registry.get("my-extension/rot13").unwrap();
//! ```

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::RwLock;

use crate::contribution::OperationContribution;
use crate::error::{panic_message, ActivationFailure, SchemaViolation};
use crate::extension::{builtin_extensions, ContributionExport, Extension, ExtensionContext, OperationExport};
use crate::operation::OperationBody;
use crate::schema::validate_operation_contribution;

/// An admitted operation
pub struct RegisteredOperation {
    /// Unique per admission; a re-registered name gets a new id
    pub registration_id: u64,
    pub extension_id: String,
    pub contribution: OperationContribution,
    pub body: Arc<dyn OperationBody>,
}

impl RegisteredOperation {
    pub fn name(&self) -> &str {
        &self.contribution.name
    }
}

impl std::fmt::Debug for RegisteredOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredOperation")
            .field("registration_id", &self.registration_id)
            .field("extension_id", &self.extension_id)
            .field("name", &self.contribution.name)
            .finish_non_exhaustive()
    }
}

/// Outcome of loading one extension
#[derive(Debug, Clone)]
pub struct ExtensionLoadReport {
    pub extension_id: String,
    /// Admitted operation names, or why nothing was admitted
    pub outcome: Result<Vec<String>, ActivationFailure>,
}

#[derive(Default)]
struct RegistryTables {
    operations: HashMap<String, Arc<RegisteredOperation>>,
    extensions: HashMap<String, Vec<String>>,
    activated: HashSet<String>,
}

/// Registry of operations contributed by extensions
pub struct OperationRegistry {
    tables: RwLock<RegistryTables>,
    next_registration: AtomicU64,
}

impl OperationRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(RegistryTables::default()),
            next_registration: AtomicU64::new(1),
        }
    }

    /// Activate an extension and admit its operations
    ///
    /// Activation runs at most once per extension id for the lifetime of the
    /// registry, whether or not it succeeds.
    pub async fn register(&self, extension: &dyn Extension) -> Result<Vec<String>, ActivationFailure> {
        let extension_id = extension.id().to_string();
        if !self.tables.write().activated.insert(extension_id.clone()) {
            return Err(ActivationFailure::AlreadyActivated {
                extension: extension_id,
            });
        }

        let context = ExtensionContext::new();
        let exports = match AssertUnwindSafe(extension.activate(&context)).catch_unwind().await {
            Ok(Ok(exports)) => exports,
            Ok(Err(err)) => {
                return Err(ActivationFailure::Threw {
                    extension: extension_id,
                    message: err.to_string(),
                })
            }
            Err(payload) => {
                return Err(ActivationFailure::Threw {
                    extension: extension_id,
                    message: panic_message(payload),
                })
            }
        };

        let staged = stage_exports(&extension_id, exports)?;

        let mut tables = self.tables.write();
        if let Some(taken) = staged
            .iter()
            .find(|export| tables.operations.contains_key(&export.contribution.name))
        {
            return Err(ActivationFailure::DuplicateOperation {
                extension: extension_id,
                name: taken.contribution.name.clone(),
            });
        }

        let mut names = Vec::with_capacity(staged.len());
        for OperationExport { contribution, body } in staged {
            let registration_id = self.next_registration.fetch_add(1, Ordering::Relaxed);
            names.push(contribution.name.clone());
            tables.operations.insert(
                contribution.name.clone(),
                Arc::new(RegisteredOperation {
                    registration_id,
                    extension_id: extension_id.clone(),
                    contribution,
                    body,
                }),
            );
        }
        tables.extensions.insert(extension_id.clone(), names.clone());

        log::info!(
            "Registered extension '{}' with {} operation(s)",
            extension_id,
            names.len()
        );
        Ok(names)
    }

    /// Register every extension submitted via `inventory`
    pub async fn register_builtins(&self) -> Vec<ExtensionLoadReport> {
        let mut reports = Vec::new();
        for extension in builtin_extensions() {
            let outcome = self.register(extension.as_ref()).await;
            if let Err(failure) = &outcome {
                log::warn!("Rejected built-in extension: {}", failure);
            }
            reports.push(ExtensionLoadReport {
                extension_id: extension.id().to_string(),
                outcome,
            });
        }
        reports
    }

    /// Remove an extension's operations, returning their names
    pub fn unregister(&self, extension_id: &str) -> Vec<String> {
        let mut tables = self.tables.write();
        let names = tables.extensions.remove(extension_id).unwrap_or_default();
        for name in &names {
            tables.operations.remove(name);
        }
        if !names.is_empty() {
            log::info!(
                "Unregistered extension '{}' ({} operation(s))",
                extension_id,
                names.len()
            );
        }
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<RegisteredOperation>> {
        self.tables.read().operations.get(name).cloned()
    }

    pub fn contribution(&self, name: &str) -> Option<OperationContribution> {
        self.get(name).map(|operation| operation.contribution.clone())
    }

    pub fn has_operation(&self, name: &str) -> bool {
        self.tables.read().operations.contains_key(name)
    }

    /// Whether `operation` is still the admitted registration for its name
    pub fn is_current(&self, operation: &RegisteredOperation) -> bool {
        self.tables
            .read()
            .operations
            .get(operation.name())
            .is_some_and(|current| current.registration_id == operation.registration_id)
    }

    /// All operation names, sorted
    pub fn operation_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().operations.keys().cloned().collect();
        names.sort();
        names
    }

    /// All contributions sorted by name, e.g. for an operation palette
    pub fn contributions(&self) -> Vec<OperationContribution> {
        let tables = self.tables.read();
        let mut contributions: Vec<OperationContribution> = tables
            .operations
            .values()
            .map(|operation| operation.contribution.clone())
            .collect();
        contributions.sort_by(|a, b| a.name.cmp(&b.name));
        contributions
    }

    /// Operations owned by an extension
    pub fn extension_operations(&self, extension_id: &str) -> Vec<String> {
        self.tables
            .read()
            .extensions
            .get(extension_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_activated(&self, extension_id: &str) -> bool {
        self.tables.read().activated.contains(extension_id)
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate a whole export list before anything is admitted
fn stage_exports(
    extension_id: &str,
    exports: Vec<ContributionExport>,
) -> Result<Vec<OperationExport>, ActivationFailure> {
    let mut seen = HashSet::new();
    let mut staged = Vec::with_capacity(exports.len());
    for (index, export) in exports.into_iter().enumerate() {
        let invalid = |violation: SchemaViolation| ActivationFailure::InvalidContribution {
            extension: extension_id.to_string(),
            violation: violation.within("contribution").within(&format!("[{}]", index)),
        };
        let export = export.into_operation().map_err(invalid)?;
        validate_operation_contribution(&export.contribution).map_err(invalid)?;
        if !seen.insert(export.contribution.name.clone()) {
            return Err(ActivationFailure::DuplicateOperation {
                extension: extension_id.to_string(),
                name: export.contribution.name,
            });
        }
        staged.push(export);
    }
    Ok(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contribution::ControlDescriptor;
    use crate::extension::ActivationError;
    use crate::operation::{OperationOutcome, OperationResult, SyncOperationBody};
    use async_trait::async_trait;

    enum Behaviour {
        Contribute(Vec<&'static str>),
        Fail,
        Panic,
        DuplicateControl,
        MalformedRecord,
    }

    struct TestExtension {
        id: &'static str,
        behaviour: Behaviour,
    }

    fn export(name: &str) -> ContributionExport {
        let contribution = OperationContribution::new(name).with_control(ControlDescriptor::new("text", ""));
        let body = Arc::new(SyncOperationBody::new(|_| OperationOutcome::Result(OperationResult::default())));
        OperationExport::new(contribution, body).into()
    }

    #[async_trait]
    impl Extension for TestExtension {
        fn id(&self) -> &str {
            self.id
        }

        async fn activate(&self, _context: &ExtensionContext) -> Result<Vec<ContributionExport>, ActivationError> {
            match &self.behaviour {
                Behaviour::Contribute(names) => Ok(names.iter().map(|name| export(name)).collect()),
                Behaviour::Fail => Err("missing host service".into()),
                Behaviour::Panic => panic!("activation exploded"),
                Behaviour::DuplicateControl => {
                    let contribution = OperationContribution::new("broken/op")
                        .with_control(ControlDescriptor::new("text", ""))
                        .with_control(ControlDescriptor::new("text", ""));
                    let body = Arc::new(SyncOperationBody::new(|_| OperationOutcome::Result(OperationResult::default())));
                    Ok(vec![export("broken/fine"), OperationExport::new(contribution, body).into()])
                }
                Behaviour::MalformedRecord => {
                    let record = serde_json::json!({
                        "type": "operation",
                        "name": "records/count",
                        "controls": [{ "name": "count", "initialValue": "many", "types": ["integer"] }]
                    });
                    let body = Arc::new(SyncOperationBody::new(|_| OperationOutcome::Result(OperationResult::default())));
                    Ok(vec![export("records/fine"), ContributionExport::record(record, body)])
                }
            }
        }
    }

    fn extension(id: &'static str, behaviour: Behaviour) -> TestExtension {
        TestExtension { id, behaviour }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = OperationRegistry::new();
        let names = registry
            .register(&extension("text", Behaviour::Contribute(vec!["text/upper", "text/lower"])))
            .await
            .unwrap();

        assert_eq!(names, vec!["text/upper", "text/lower"]);
        assert!(registry.has_operation("text/upper"));
        assert_eq!(registry.get("text/lower").unwrap().extension_id, "text");
        assert_eq!(registry.operation_names(), vec!["text/lower", "text/upper"]);
        assert_eq!(registry.contributions()[0].name, "text/lower");
        assert_eq!(registry.extension_operations("text").len(), 2);
    }

    #[tokio::test]
    async fn test_failed_activation_admits_nothing() {
        let registry = OperationRegistry::new();

        let failure = registry.register(&extension("failing", Behaviour::Fail)).await.unwrap_err();
        assert!(matches!(failure, ActivationFailure::Threw { ref message, .. } if message == "missing host service"));

        let failure = registry.register(&extension("panicking", Behaviour::Panic)).await.unwrap_err();
        assert!(matches!(failure, ActivationFailure::Threw { ref message, .. } if message == "activation exploded"));

        let failure = registry
            .register(&extension("broken", Behaviour::DuplicateControl))
            .await
            .unwrap_err();
        match failure {
            ActivationFailure::InvalidContribution { violation, .. } => {
                assert_eq!(violation.path, "[1].contribution.controls[1].name");
            }
            other => panic!("unexpected failure: {}", other),
        }

        assert!(registry.operation_names().is_empty());
        assert!(!registry.has_operation("broken/fine"));
    }

    #[tokio::test]
    async fn test_malformed_record_reports_path() {
        let registry = OperationRegistry::new();
        let failure = registry
            .register(&extension("records", Behaviour::MalformedRecord))
            .await
            .unwrap_err();
        match failure {
            ActivationFailure::InvalidContribution { extension, violation } => {
                assert_eq!(extension, "records");
                assert_eq!(violation.path, "[1].contribution.controls[0].initialValue");
            }
            other => panic!("unexpected failure: {}", other),
        }
        assert!(!registry.has_operation("records/fine"));
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let registry = OperationRegistry::new();
        registry
            .register(&extension("first", Behaviour::Contribute(vec!["shared/op"])))
            .await
            .unwrap();

        let failure = registry
            .register(&extension("second", Behaviour::Contribute(vec!["second/op", "shared/op"])))
            .await
            .unwrap_err();
        assert!(matches!(failure, ActivationFailure::DuplicateOperation { ref name, .. } if name == "shared/op"));
        assert!(!registry.has_operation("second/op"));
        assert_eq!(registry.get("shared/op").unwrap().extension_id, "first");

        let failure = registry
            .register(&extension("third", Behaviour::Contribute(vec!["third/op", "third/op"])))
            .await
            .unwrap_err();
        assert!(matches!(failure, ActivationFailure::DuplicateOperation { .. }));
        assert!(!registry.has_operation("third/op"));
    }

    #[tokio::test]
    async fn test_activation_runs_once() {
        let registry = OperationRegistry::new();
        let ext = extension("once", Behaviour::Contribute(vec!["once/op"]));
        registry.register(&ext).await.unwrap();

        assert!(matches!(
            registry.register(&ext).await,
            Err(ActivationFailure::AlreadyActivated { .. })
        ));

        // Still counts as activated after unregistering
        assert_eq!(registry.unregister("once"), vec!["once/op"]);
        assert!(registry.is_activated("once"));
        assert!(matches!(
            registry.register(&ext).await,
            Err(ActivationFailure::AlreadyActivated { .. })
        ));
    }

    #[tokio::test]
    async fn test_unregister_invalidates_registration() {
        let registry = OperationRegistry::new();
        registry
            .register(&extension("a", Behaviour::Contribute(vec!["a/op"])))
            .await
            .unwrap();
        let held = registry.get("a/op").unwrap();
        assert!(registry.is_current(&held));

        registry.unregister("a");
        assert!(!registry.is_current(&held));
        assert!(registry.get("a/op").is_none());
        assert!(registry.unregister("a").is_empty());
    }

    #[tokio::test]
    async fn test_register_builtins_without_submissions() {
        let registry = OperationRegistry::new();
        assert!(registry.register_builtins().await.is_empty());
    }
}
