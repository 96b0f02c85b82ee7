//! Operation Engine - Operation contributions and value propagation for blueprints
//!
//! Extensions contribute operations: declared controls plus an async body that
//! maps control values to changes. Operations are instantiated as nodes in a
//! blueprint graph, and connections between controls carry values from node
//! to node. It supports:
//!
//! - Schema-validated contributions, all or nothing per extension
//! - Bidirectional operations driven by per-node control priorities
//! - Concurrent invocations with stale outcomes discarded
//! - Error isolation: a failing node faults alone and stops propagating
//! - Cycle-safe propagation passes
//!
//! # Architecture
//!
//! - `OperationRegistry`: Activates extensions and owns registered operations
//! - `PropagationEngine`: Schedules invocations and applies their outcomes
//! - `GraphStore`: The only path to node state (`InMemoryGraphStore` by default)
//! - `EventSink`: Generic event streaming to whatever renders the graph
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use operation_engine::{InMemoryGraphStore, NullEventSink, OperationRegistry, PropagationEngine};
//!
//! let engine = PropagationEngine::new(
//!     Arc::new(OperationRegistry::new()),
//!     Arc::new(InMemoryGraphStore::default()),
//!     Arc::new(NullEventSink),
//! );
//! engine.register_builtins().await;
//! engine.add_node("cipher", "essentials/letter-number-cipher")?;
//! let report = engine.edit_control("cipher", "letters", "hello".into()).await?;
//! ```

pub mod config;
pub mod contribution;
pub mod direction;
pub mod engine;
pub mod error;
pub mod events;
pub mod extension;
pub mod graph;
pub mod operation;
pub mod registry;
pub mod schema;
pub mod value;

// Re-export key types
pub use config::EngineConfig;
pub use contribution::{ControlChoice, ControlDescriptor, Contribution, OperationContribution};
pub use direction::ControlPriorities;
pub use engine::{NodeState, PropagationEngine, PropagationReport};
pub use error::{ActivationFailure, EngineError, Result, SchemaViolation};
pub use events::{ChangeOrigin, EngineEvent, EventSink, NodeStatus, NullEventSink, VecEventSink};
pub use extension::{
    ActivationError, ContributionExport, Extension, ExtensionContext, ExtensionFn, OperationExport,
    RecordExport,
};
pub use graph::{Blueprint, ControlEdge, GraphStore, InMemoryGraphStore, OperationNode};
pub use operation::{
    CallbackOperationBody, IssueLevel, OperationBody, OperationChange, OperationIssue,
    OperationOutcome, OperationRequest, OperationResult, SyncOperationBody,
};
pub use registry::{ExtensionLoadReport, OperationRegistry};
pub use schema::{parse_contribution, validate_operation_contribution};
pub use value::{ControlValue, ControlValueType};
