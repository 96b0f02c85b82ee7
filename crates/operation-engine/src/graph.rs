//! Blueprint graph and the graph store boundary
//!
//! The propagation engine reads and writes node state only through
//! [`GraphStore`]. [`InMemoryGraphStore`] is the default implementation,
//! backed by a serializable [`Blueprint`].

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::contribution::OperationContribution;
use crate::direction::ControlPriorities;
use crate::error::{EngineError, Result};
use crate::operation::OperationChange;
use crate::value::ControlValue;

/// Unique identifier for a node
pub type NodeId = String;

/// Unique identifier for an edge
pub type EdgeId = String;

/// An operation instantiated inside a blueprint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationNode {
    pub id: NodeId,
    /// Name of the registered operation
    pub operation: String,
    /// Current value of every declared control
    pub values: BTreeMap<String, ControlValue>,
    pub control_priorities: ControlPriorities,
    /// Canvas position, owned by the UI
    pub position: (f64, f64),
}

impl OperationNode {
    /// Seed values from initial values and priorities from declaration order
    pub fn instantiate(id: impl Into<NodeId>, contribution: &OperationContribution) -> Self {
        Self {
            id: id.into(),
            operation: contribution.name.clone(),
            values: contribution
                .controls
                .iter()
                .map(|control| (control.name.clone(), control.initial_value.clone()))
                .collect(),
            control_priorities: ControlPriorities::new(contribution.control_names()),
            position: (0.0, 0.0),
        }
    }

    pub fn value(&self, control: &str) -> Option<&ControlValue> {
        self.values.get(control)
    }
}

/// A directed connection from one control to another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub source_control: String,
    pub target: NodeId,
    pub target_control: String,
}

/// One end of a connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControlEndpoint {
    pub node_id: NodeId,
    pub control: String,
}

/// A complete blueprint document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub id: String,
    pub name: String,
    pub nodes: Vec<OperationNode>,
    pub edges: Vec<ControlEdge>,
}

impl Blueprint {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn find_node(&self, id: &str) -> Option<&OperationNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn find_node_mut(&mut self, id: &str) -> Option<&mut OperationNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Edges leaving a control
    pub fn outgoing_edges<'a>(
        &'a self,
        node_id: &'a str,
        control: &'a str,
    ) -> impl Iterator<Item = &'a ControlEdge> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source == node_id && e.source_control == control)
    }

    /// Edges entering a node
    pub fn incoming_edges<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a ControlEdge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }
}

/// Storage the engine reads node state from and applies changes to
///
/// Implementations serialize their own writes. The engine additionally
/// guarantees that it never applies two invocation outcomes to the same node
/// concurrently.
pub trait GraphStore: Send + Sync {
    /// Snapshot of a node
    fn node(&self, node_id: &str) -> Option<OperationNode>;

    fn insert_node(&self, node: OperationNode) -> Result<()>;

    /// Overwrite the named control values of a node
    fn write_values(&self, node_id: &str, changes: &[OperationChange]) -> Result<()>;

    /// Move a control to the front of the node's priorities
    fn promote_control(&self, node_id: &str, control: &str) -> Result<()>;

    fn add_edge(&self, edge: ControlEdge) -> Result<()>;

    fn remove_edge(&self, edge_id: &str) -> Result<ControlEdge>;

    /// Controls connected downstream of a node's control
    fn downstream(&self, node_id: &str, control: &str) -> Vec<ControlEndpoint>;
}

/// Graph store holding a blueprint in memory
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    blueprint: RwLock<Blueprint>,
}

impl InMemoryGraphStore {
    pub fn new(blueprint: Blueprint) -> Self {
        Self {
            blueprint: RwLock::new(blueprint),
        }
    }

    /// Copy of the current document, e.g. for persistence
    pub fn snapshot(&self) -> Blueprint {
        self.blueprint.read().clone()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&*self.blueprint.read())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }
}

impl GraphStore for InMemoryGraphStore {
    fn node(&self, node_id: &str) -> Option<OperationNode> {
        self.blueprint.read().find_node(node_id).cloned()
    }

    fn insert_node(&self, node: OperationNode) -> Result<()> {
        let mut blueprint = self.blueprint.write();
        if blueprint.find_node(&node.id).is_some() {
            return Err(EngineError::DuplicateNode(node.id));
        }
        blueprint.nodes.push(node);
        Ok(())
    }

    fn write_values(&self, node_id: &str, changes: &[OperationChange]) -> Result<()> {
        let mut blueprint = self.blueprint.write();
        let node = blueprint
            .find_node_mut(node_id)
            .ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))?;
        for change in changes {
            node.values.insert(change.name.clone(), change.value.clone());
        }
        Ok(())
    }

    fn promote_control(&self, node_id: &str, control: &str) -> Result<()> {
        let mut blueprint = self.blueprint.write();
        let node = blueprint
            .find_node_mut(node_id)
            .ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))?;
        node.control_priorities.promote(control);
        Ok(())
    }

    fn add_edge(&self, edge: ControlEdge) -> Result<()> {
        let mut blueprint = self.blueprint.write();
        for endpoint in [&edge.source, &edge.target] {
            if blueprint.find_node(endpoint).is_none() {
                return Err(EngineError::UnknownNode(endpoint.clone()));
            }
        }
        blueprint.edges.push(edge);
        Ok(())
    }

    fn remove_edge(&self, edge_id: &str) -> Result<ControlEdge> {
        let mut blueprint = self.blueprint.write();
        let position = blueprint
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| EngineError::UnknownEdge(edge_id.to_string()))?;
        Ok(blueprint.edges.remove(position))
    }

    fn downstream(&self, node_id: &str, control: &str) -> Vec<ControlEndpoint> {
        self.blueprint
            .read()
            .outgoing_edges(node_id, control)
            .map(|e| ControlEndpoint {
                node_id: e.target.clone(),
                control: e.target_control.clone(),
            })
            .collect()
    }
}
