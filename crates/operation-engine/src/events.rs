//! Event types for streaming engine activity
//!
//! Events are sent from the engine to the UI (or any consumer) to report
//! node status, active issues, and applied control values for re-render.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::operation::{OperationChange, OperationIssue};

/// Trait for sending engine events
///
/// This abstracts over the transport mechanism (channel, UI bridge, etc.)
/// allowing the engine to be used in different contexts.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be sent (e.g., channel closed)
    fn send(&self, event: EngineEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Status of a node as rendered by the UI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeStatus {
    #[default]
    Idle,
    /// An invocation is outstanding
    Computing,
    /// The latest invocation ended in an error issue
    Faulted,
}

/// Where a control value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOrigin {
    /// Direct user edit
    Edit,
    /// Result of the node's own operation
    Operation,
    /// Value synced over a connection
    Connection,
}

/// Events emitted by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    #[serde(rename_all = "camelCase")]
    PropagationStarted { pass_id: String, origin: String },

    #[serde(rename_all = "camelCase")]
    PropagationCompleted {
        pass_id: String,
        evaluated: usize,
        truncated: bool,
    },

    #[serde(rename_all = "camelCase")]
    NodeComputing { node_id: String, invocation: u64 },

    /// Control values were written
    #[serde(rename_all = "camelCase")]
    ControlsChanged {
        node_id: String,
        origin: ChangeOrigin,
        changes: Vec<OperationChange>,
    },

    /// Status and active issues of a node
    #[serde(rename_all = "camelCase")]
    NodeStateChanged {
        node_id: String,
        status: NodeStatus,
        issues: Vec<OperationIssue>,
    },

    /// A superseded or invalidated outcome was dropped
    #[serde(rename_all = "camelCase")]
    InvocationDiscarded { node_id: String, invocation: u64 },

    #[serde(rename_all = "camelCase")]
    ExtensionRegistered {
        extension_id: String,
        operations: Vec<String>,
    },

    #[serde(rename_all = "camelCase")]
    ExtensionRejected { extension_id: String, reason: String },

    #[serde(rename_all = "camelCase")]
    ExtensionUnregistered {
        extension_id: String,
        operations: Vec<String>,
    },
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: EngineEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events into a tokio channel, e.g. towards a UI task
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelEventSink {
    /// Create a sink together with the receiving end
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: EngineEvent) -> Result<(), EventError> {
        self.sender.send(event).map_err(|_| EventError::channel_closed())
    }
}
