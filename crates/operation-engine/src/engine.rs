//! Value propagation engine
//!
//! Recomputes operation nodes when one of their control values changes and
//! pushes the results outward along connections, breadth first.
//!
//! # Per-node state machine
//!
//! `Idle → Computing → (apply | Faulted) → Idle`. Applying is a critical
//! section under the node runtime lock, so it is never observed from the
//! outside. A faulted node stays faulted until its next invocation starts.
//!
//! # Supersession
//!
//! Every invocation gets a fresh id, and writing a node's input (direct
//! edit or connection sync) invalidates whatever is in flight for it. An
//! outcome is applied only if its id is still the node's latest and its
//! operation registration is still current; anything else is discarded
//! whenever it resolves.
//!
//! # Passes
//!
//! One trigger (edit, connection, explicit recompute) runs one pass. Within a
//! pass each control is fed from outside its node at most once, by the edit
//! itself or by one connection sync. Later syncs into a fed control are
//! skipped, and a node's own result never overwrites a control fed this pass.
//! Since every sync feeds a fresh control, cyclic graphs terminate.
//! `EngineConfig::max_evaluations_per_pass` caps the pass on top.
//!
//! A node may run more than once per pass, e.g. when paths of different
//! length reach it. Every run that is not superseded writes its outputs.

use std::collections::{HashMap, HashSet};
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::contribution::ControlDescriptor;
use crate::error::{panic_message, EngineError, Result};
use crate::events::{ChangeOrigin, EngineEvent, EventSink, NodeStatus};
use crate::extension::Extension;
use crate::graph::{ControlEdge, ControlEndpoint, EdgeId, GraphStore, NodeId, OperationNode};
use crate::operation::{OperationChange, OperationIssue, OperationOutcome, OperationRequest};
use crate::registry::{ExtensionLoadReport, OperationRegistry, RegisteredOperation};
use crate::value::ControlValue;

/// Message attached when an operation body fails outside its contract
pub const UNEXPECTED_FAILURE_MESSAGE: &str = "The operation failed unexpectedly";

/// Status and active issues of a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub status: NodeStatus,
    /// The error of a faulted node, or the warnings of its last result
    pub issues: Vec<OperationIssue>,
}

/// Summary of one propagation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    pub pass_id: Uuid,
    /// Nodes invoked, in dispatch order
    pub evaluated: Vec<NodeId>,
    /// Nodes whose result wrote at least one control
    pub applied: Vec<NodeId>,
    /// Nodes that ended in an error issue
    pub faulted: Vec<NodeId>,
    /// Nodes whose outcome was superseded or invalidated
    pub discarded: Vec<NodeId>,
    /// The pass hit the evaluation bound
    pub truncated: bool,
}

#[derive(Debug, Default)]
struct NodeRuntime {
    state: NodeState,
    latest_invocation: u64,
}

struct Invocation {
    node_id: NodeId,
    id: u64,
    operation: Arc<RegisteredOperation>,
}

struct PropagationPass {
    report: PropagationReport,
    fed: HashSet<(NodeId, String)>,
    frontier: Vec<NodeId>,
}

impl PropagationPass {
    fn new() -> Self {
        Self {
            report: PropagationReport {
                pass_id: Uuid::new_v4(),
                evaluated: Vec::new(),
                applied: Vec::new(),
                faulted: Vec::new(),
                discarded: Vec::new(),
                truncated: false,
            },
            fed: HashSet::new(),
            frontier: Vec::new(),
        }
    }

    /// Mark a control as fed from outside its node; false if already fed
    fn claim(&mut self, node_id: &str, control: &str) -> bool {
        self.fed.insert((node_id.to_string(), control.to_string()))
    }

    fn is_fed(&self, node_id: &str, control: &str) -> bool {
        self.fed.contains(&(node_id.to_string(), control.to_string()))
    }

    fn enqueue(&mut self, node_id: &str) {
        if !self.frontier.iter().any(|queued| queued == node_id) {
            self.frontier.push(node_id.to_string());
        }
    }
}

/// Graph-level scheduler for operation invocations
pub struct PropagationEngine {
    registry: Arc<OperationRegistry>,
    store: Arc<dyn GraphStore>,
    event_sink: Arc<dyn EventSink>,
    config: EngineConfig,
    runtime: Mutex<HashMap<NodeId, NodeRuntime>>,
    next_invocation: AtomicU64,
}

impl PropagationEngine {
    /// Create an engine with the default configuration
    pub fn new(
        registry: Arc<OperationRegistry>,
        store: Arc<dyn GraphStore>,
        event_sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            store,
            event_sink,
            config: EngineConfig::default(),
            runtime: Mutex::new(HashMap::new()),
            next_invocation: AtomicU64::new(1),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Extensions
    // -----------------------------------------------------------------------

    /// Activate an extension and admit its operations
    pub async fn register_extension(&self, extension: &dyn Extension) -> Result<Vec<String>> {
        let extension_id = extension.id().to_string();
        match self.registry.register(extension).await {
            Ok(operations) => {
                self.emit(EngineEvent::ExtensionRegistered {
                    extension_id,
                    operations: operations.clone(),
                });
                Ok(operations)
            }
            Err(failure) => {
                log::warn!("Rejected extension '{}': {}", extension_id, failure);
                self.emit(EngineEvent::ExtensionRejected {
                    extension_id,
                    reason: failure.to_string(),
                });
                Err(failure.into())
            }
        }
    }

    /// Register every built-in extension, reporting each once
    pub async fn register_builtins(&self) -> Vec<ExtensionLoadReport> {
        let reports = self.registry.register_builtins().await;
        for report in &reports {
            let event = match &report.outcome {
                Ok(operations) => EngineEvent::ExtensionRegistered {
                    extension_id: report.extension_id.clone(),
                    operations: operations.clone(),
                },
                Err(failure) => EngineEvent::ExtensionRejected {
                    extension_id: report.extension_id.clone(),
                    reason: failure.to_string(),
                },
            };
            self.emit(event);
        }
        reports
    }

    /// Remove an extension's operations
    ///
    /// Outcomes still in flight for those operations are discarded when they
    /// resolve; affected nodes fault on their next computation.
    pub fn unregister_extension(&self, extension_id: &str) -> Vec<String> {
        let operations = self.registry.unregister(extension_id);
        self.emit(EngineEvent::ExtensionUnregistered {
            extension_id: extension_id.to_string(),
            operations: operations.clone(),
        });
        operations
    }

    // -----------------------------------------------------------------------
    // Graph editing
    // -----------------------------------------------------------------------

    /// Instantiate a registered operation as a new node
    ///
    /// Initial values are taken as consistent, so nothing is computed.
    pub fn add_node(&self, node_id: &str, operation: &str) -> Result<OperationNode> {
        let registered = self
            .registry
            .get(operation)
            .ok_or_else(|| EngineError::UnknownOperation(operation.to_string()))?;
        let node = OperationNode::instantiate(node_id, &registered.contribution);
        self.store.insert_node(node.clone())?;
        self.runtime.lock().entry(node_id.to_string()).or_default();
        log::debug!("Added node '{}' ({})", node_id, operation);
        Ok(node)
    }

    /// Apply a direct user edit and propagate it
    pub async fn edit_control(
        &self,
        node_id: &str,
        control: &str,
        value: ControlValue,
    ) -> Result<PropagationReport> {
        let descriptor = self.declared_control(node_id, control)?;
        if !descriptor.writable {
            return Err(EngineError::ReadOnlyControl {
                node: node_id.to_string(),
                control: control.to_string(),
            });
        }
        descriptor.check_value(&value)?;

        let change = OperationChange::new(control, value);
        self.write_input(node_id, &change, true)?;
        self.emit(EngineEvent::ControlsChanged {
            node_id: node_id.to_string(),
            origin: ChangeOrigin::Edit,
            changes: vec![change],
        });

        let mut pass = PropagationPass::new();
        pass.claim(node_id, control);
        pass.enqueue(node_id);
        self.sync_downstream(&mut pass, node_id, &[control.to_string()]);
        Ok(self.run_pass(pass, node_id).await)
    }

    /// Connect two controls and sync the source value into the target
    pub async fn connect(
        &self,
        source: &str,
        source_control: &str,
        target: &str,
        target_control: &str,
    ) -> Result<(EdgeId, PropagationReport)> {
        let incompatible = |reason: &str| EngineError::IncompatibleConnection {
            source_node: source.to_string(),
            source_control: source_control.to_string(),
            target_node: target.to_string(),
            target_control: target_control.to_string(),
            reason: reason.to_string(),
        };

        let source_descriptor = self.declared_control(source, source_control)?;
        let target_descriptor = self.declared_control(target, target_control)?;
        if source == target && source_control == target_control {
            return Err(incompatible("a control cannot feed itself"));
        }
        if !target_descriptor.writable {
            return Err(incompatible("the target control is not writable"));
        }
        if !source_descriptor
            .types
            .iter()
            .any(|value_type| target_descriptor.accepts_type(*value_type))
        {
            return Err(incompatible("the controls share no value type"));
        }

        let edge = ControlEdge {
            id: Uuid::new_v4().to_string(),
            source: source.to_string(),
            source_control: source_control.to_string(),
            target: target.to_string(),
            target_control: target_control.to_string(),
        };
        let edge_id = edge.id.clone();
        self.store.add_edge(edge)?;

        let mut pass = PropagationPass::new();
        pass.claim(source, source_control);
        if let Some(value) = self
            .store
            .node(source)
            .and_then(|node| node.values.get(source_control).cloned())
        {
            let endpoint = ControlEndpoint {
                node_id: target.to_string(),
                control: target_control.to_string(),
            };
            self.sync_endpoint(&mut pass, &value, &endpoint);
        }
        let report = self.run_pass(pass, source).await;
        Ok((edge_id, report))
    }

    pub fn disconnect(&self, edge_id: &str) -> Result<ControlEdge> {
        self.store.remove_edge(edge_id)
    }

    /// Re-run one node and propagate its changes
    pub async fn recompute(&self, node_id: &str) -> Result<PropagationReport> {
        if self.store.node(node_id).is_none() {
            return Err(EngineError::UnknownNode(node_id.to_string()));
        }
        let mut pass = PropagationPass::new();
        pass.enqueue(node_id);
        Ok(self.run_pass(pass, node_id).await)
    }

    /// Current status and issues of a node
    pub fn node_state(&self, node_id: &str) -> NodeState {
        self.runtime
            .lock()
            .get(node_id)
            .map(|runtime| runtime.state.clone())
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Propagation
    // -----------------------------------------------------------------------

    async fn run_pass(&self, mut pass: PropagationPass, origin: &str) -> PropagationReport {
        let pass_id = pass.report.pass_id.to_string();
        log::debug!("Propagation pass {} started at '{}'", pass_id, origin);
        self.emit(EngineEvent::PropagationStarted {
            pass_id: pass_id.clone(),
            origin: origin.to_string(),
        });

        while !pass.frontier.is_empty() {
            let frontier = std::mem::take(&mut pass.frontier);
            let mut started = Vec::with_capacity(frontier.len());
            for node_id in frontier {
                if pass.report.evaluated.len() >= self.config.max_evaluations_per_pass {
                    log::warn!(
                        "Propagation pass {} stopped after {} evaluations",
                        pass_id,
                        pass.report.evaluated.len()
                    );
                    pass.report.truncated = true;
                    break;
                }
                pass.report.evaluated.push(node_id.clone());
                match self.begin_invocation(&node_id) {
                    Ok(invocation) => started.push(invocation),
                    Err(issue) => self.fault(&mut pass, &node_id, issue),
                }
            }

            let settled = join_all(
                started
                    .into_iter()
                    .map(|(invocation, request)| self.dispatch(invocation, request)),
            )
            .await;
            for (invocation, outcome) in settled {
                self.settle(&mut pass, invocation, outcome);
            }

            if pass.report.truncated {
                break;
            }
        }

        self.emit(EngineEvent::PropagationCompleted {
            pass_id,
            evaluated: pass.report.evaluated.len(),
            truncated: pass.report.truncated,
        });
        pass.report
    }

    /// Enter `Computing`: assemble the request and claim the node's latest
    /// invocation id
    fn begin_invocation(
        &self,
        node_id: &str,
    ) -> std::result::Result<(Invocation, OperationRequest), OperationIssue> {
        let node = self
            .store
            .node(node_id)
            .ok_or_else(|| OperationIssue::error(None, "The node no longer exists"))?;
        let operation = self.registry.get(&node.operation).ok_or_else(|| {
            OperationIssue::error(None, format!("Operation '{}' is not registered", node.operation))
        })?;

        let values = operation
            .contribution
            .controls
            .iter()
            .map(|control| {
                let value = node
                    .values
                    .get(&control.name)
                    .cloned()
                    .unwrap_or_else(|| control.initial_value.clone());
                (control.name.clone(), value)
            })
            .collect();
        let request = OperationRequest::new(values, node.control_priorities.to_vec());

        let id = self.next_invocation.fetch_add(1, Ordering::SeqCst);
        {
            let mut runtime = self.runtime.lock();
            let entry = runtime.entry(node_id.to_string()).or_default();
            entry.latest_invocation = id;
            entry.state.status = NodeStatus::Computing;
        }
        self.emit(EngineEvent::NodeComputing {
            node_id: node_id.to_string(),
            invocation: id,
        });

        Ok((
            Invocation {
                node_id: node_id.to_string(),
                id,
                operation,
            },
            request,
        ))
    }

    /// Run the body on its own task so a panic stays contained
    async fn dispatch(
        &self,
        invocation: Invocation,
        request: OperationRequest,
    ) -> (Invocation, OperationOutcome) {
        log::debug!(
            "Invoking '{}' on node '{}' (invocation {})",
            invocation.operation.name(),
            invocation.node_id,
            invocation.id
        );
        let body = Arc::clone(&invocation.operation.body);
        let outcome = match tokio::spawn(async move { body.execute(request).await }).await {
            Ok(outcome) => outcome,
            Err(err) => {
                let detail = if err.is_panic() {
                    panic_message(err.into_panic())
                } else {
                    err.to_string()
                };
                log::error!(
                    "Operation '{}' failed unexpectedly on node '{}': {}",
                    invocation.operation.name(),
                    invocation.node_id,
                    detail
                );
                OperationOutcome::Error(OperationIssue::error(
                    invocation.operation.contribution.fallback_control(),
                    UNEXPECTED_FAILURE_MESSAGE,
                ))
            }
        };
        (invocation, outcome)
    }

    /// Apply or discard a resolved outcome
    fn settle(&self, pass: &mut PropagationPass, invocation: Invocation, outcome: OperationOutcome) {
        let node_id = invocation.node_id.as_str();
        let mut runtime = self.runtime.lock();
        let entry = runtime.entry(node_id.to_string()).or_default();

        if entry.latest_invocation != invocation.id || !self.registry.is_current(&invocation.operation) {
            drop(runtime);
            log::debug!(
                "Discarding stale outcome of invocation {} on node '{}'",
                invocation.id,
                node_id
            );
            pass.report.discarded.push(node_id.to_string());
            self.emit(EngineEvent::InvocationDiscarded {
                node_id: node_id.to_string(),
                invocation: invocation.id,
            });
            return;
        }

        let result = match outcome {
            OperationOutcome::Error(issue) => Err(issue),
            OperationOutcome::Result(result) => {
                match invocation.operation.contribution.check_changes(&result.changes) {
                    Ok(()) => Ok(result),
                    Err(issue) => {
                        log::error!(
                            "Operation '{}' broke its contract on node '{}': {}",
                            invocation.operation.name(),
                            node_id,
                            issue.message
                        );
                        Err(issue)
                    }
                }
            }
        };

        let result = match result {
            Ok(result) => result,
            Err(issue) => {
                drop(runtime);
                self.fault(pass, node_id, issue);
                return;
            }
        };

        let applied: Vec<OperationChange> = result
            .changes
            .into_iter()
            .filter(|change| !pass.is_fed(node_id, &change.name))
            .collect();
        if !applied.is_empty() {
            if let Err(err) = self.store.write_values(node_id, &applied) {
                drop(runtime);
                log::warn!("Could not apply changes to node '{}': {}", node_id, err);
                let issue = OperationIssue::error(
                    invocation.operation.contribution.fallback_control(),
                    format!("The result could not be applied: {}", err),
                );
                self.fault(pass, node_id, issue);
                return;
            }
        }
        entry.state = NodeState {
            status: NodeStatus::Idle,
            issues: result.issues,
        };
        let state = entry.state.clone();
        drop(runtime);

        if !applied.is_empty() {
            pass.report.applied.push(node_id.to_string());
            self.emit(EngineEvent::ControlsChanged {
                node_id: node_id.to_string(),
                origin: ChangeOrigin::Operation,
                changes: applied.clone(),
            });
        }
        self.emit(EngineEvent::NodeStateChanged {
            node_id: node_id.to_string(),
            status: state.status,
            issues: state.issues,
        });

        let changed: Vec<String> = applied.into_iter().map(|change| change.name).collect();
        self.sync_downstream(pass, node_id, &changed);
    }

    /// Enter `Faulted`; nothing propagates from here
    fn fault(&self, pass: &mut PropagationPass, node_id: &str, issue: OperationIssue) {
        log::debug!("Node '{}' faulted: {}", node_id, issue.message);
        let state = NodeState {
            status: NodeStatus::Faulted,
            issues: vec![issue],
        };
        self.runtime.lock().entry(node_id.to_string()).or_default().state = state.clone();
        pass.report.faulted.push(node_id.to_string());
        self.emit(EngineEvent::NodeStateChanged {
            node_id: node_id.to_string(),
            status: state.status,
            issues: state.issues,
        });
    }

    fn sync_downstream(&self, pass: &mut PropagationPass, node_id: &str, controls: &[String]) {
        let Some(node) = self.store.node(node_id) else {
            return;
        };
        for control in controls {
            let Some(value) = node.values.get(control) else {
                continue;
            };
            for endpoint in self.store.downstream(node_id, control) {
                self.sync_endpoint(pass, value, &endpoint);
            }
        }
    }

    /// Copy a value over one connection and schedule the receiving node
    fn sync_endpoint(&self, pass: &mut PropagationPass, value: &ControlValue, endpoint: &ControlEndpoint) {
        if !pass.claim(&endpoint.node_id, &endpoint.control) {
            return;
        }
        let accepted = self
            .store
            .node(&endpoint.node_id)
            .and_then(|node| self.registry.get(&node.operation))
            .and_then(|operation| {
                operation
                    .contribution
                    .control(&endpoint.control)
                    .map(|control| control.accepts_type(value.value_type()))
            })
            .unwrap_or(false);
        if !accepted {
            log::warn!(
                "Skipping sync of a {} value into '{}.{}'",
                value.value_type(),
                endpoint.node_id,
                endpoint.control
            );
            return;
        }

        let change = OperationChange::new(endpoint.control.clone(), value.clone());
        if let Err(err) = self.write_input(
            &endpoint.node_id,
            &change,
            self.config.promote_on_connection_sync,
        ) {
            log::warn!("Could not sync into node '{}': {}", endpoint.node_id, err);
            return;
        }
        self.emit(EngineEvent::ControlsChanged {
            node_id: endpoint.node_id.clone(),
            origin: ChangeOrigin::Connection,
            changes: vec![change],
        });
        pass.enqueue(&endpoint.node_id);
    }

    /// Write an input value and invalidate anything in flight for the node
    fn write_input(&self, node_id: &str, change: &OperationChange, promote: bool) -> Result<()> {
        let mut runtime = self.runtime.lock();
        self.store.write_values(node_id, slice::from_ref(change))?;
        if promote {
            self.store.promote_control(node_id, &change.name)?;
        }
        runtime.entry(node_id.to_string()).or_default().latest_invocation =
            self.next_invocation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn declared_control(&self, node_id: &str, control: &str) -> Result<ControlDescriptor> {
        let node = self
            .store
            .node(node_id)
            .ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))?;
        let operation = self
            .registry
            .get(&node.operation)
            .ok_or_else(|| EngineError::UnknownOperation(node.operation.clone()))?;
        operation
            .contribution
            .control(control)
            .cloned()
            .ok_or_else(|| EngineError::UnknownControl {
                node: node_id.to_string(),
                control: control.to_string(),
            })
    }

    fn emit(&self, event: EngineEvent) {
        if let Err(err) = self.event_sink.send(event) {
            log::warn!("Failed to deliver engine event: {}", err);
        }
    }
}
