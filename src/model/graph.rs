//! Graph, node, and edge definitions, with structural validation.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Walker;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{EngineError, Result};

/// The kind of a node in a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Invokes a registered tool against the payload.
    Function,
    /// Passes state through unchanged; branching is carried by its edges.
    Conditional,
    /// The graph's entry marker. Passes state through unchanged.
    Start,
    /// A terminal marker. Passes state through unchanged.
    End,
}

/// A single named vertex in a workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Unique name within the enclosing graph.
    pub name: String,

    /// The node's kind.
    pub node_type: NodeType,

    /// Required for [`NodeType::Function`] nodes; the tool to invoke.
    ///
    /// A `FUNCTION` node with no `tool_name` is not rejected at graph
    /// construction; it is caught at execution time as a tool-failure, the
    /// same way the originating system only raises when the node actually
    /// runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Opaque per-node configuration, reserved for future node options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

/// A directed connection between two nodes, optionally guarded by a
/// condition in the sandboxed expression dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDefinition {
    /// The source node's name.
    pub from_node: String,

    /// The destination node's name.
    pub to_node: String,

    /// A boolean expression (see [`crate::condition`]) gating this edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,

    /// Purely descriptive label, never consulted by the engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// An immutable, validated workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    /// Opaque identifier, assigned at construction.
    pub graph_id: String,

    /// Human-readable graph name.
    pub name: String,

    /// Optional free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// The graph's nodes, in declaration order.
    pub nodes: Vec<NodeDefinition>,

    /// The graph's edges, in declaration order.
    pub edges: Vec<EdgeDefinition>,

    /// The node execution starts from.
    pub entry_point: String,

    /// Creation timestamp, in UTC.
    pub created_at: DateTime<Utc>,
}

impl GraphDefinition {
    /// Validate and construct a graph, assigning a fresh `graph_id`.
    ///
    /// Checks node-name uniqueness, that `entry_point` names a node, and
    /// that every edge endpoint names a node. Tool-name presence on
    /// `FUNCTION` nodes and tool existence in the registry are *not*
    /// checked here: both are runtime concerns, since the registry is
    /// mutable and a graph may be created before its tools are registered.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        nodes: Vec<NodeDefinition>,
        edges: Vec<EdgeDefinition>,
        entry_point: impl Into<String>,
    ) -> Result<Self> {
        let entry_point = entry_point.into();
        let node_names: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();

        if node_names.len() != nodes.len() {
            return Err(EngineError::GraphStructure(
                "duplicate node names".to_string(),
            ));
        }

        if !node_names.contains(entry_point.as_str()) {
            return Err(EngineError::GraphStructure(format!(
                "entry_point '{entry_point}' does not name a node"
            )));
        }

        for edge in &edges {
            if !node_names.contains(edge.from_node.as_str()) {
                return Err(EngineError::GraphStructure(format!(
                    "edge from_node '{}' does not name a node",
                    edge.from_node
                )));
            }
            if !node_names.contains(edge.to_node.as_str()) {
                return Err(EngineError::GraphStructure(format!(
                    "edge to_node '{}' does not name a node",
                    edge.to_node
                )));
            }
        }

        Ok(Self {
            graph_id: Uuid::new_v4().to_string(),
            name: name.into(),
            description,
            nodes,
            edges,
            entry_point,
            created_at: Utc::now(),
        })
    }

    /// Reconstruct a graph exactly as stored, without generating a new id
    /// or timestamp. Used by storage adapters on load.
    pub fn from_parts(
        graph_id: String,
        name: String,
        description: Option<String>,
        nodes: Vec<NodeDefinition>,
        edges: Vec<EdgeDefinition>,
        entry_point: String,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            graph_id,
            name,
            description,
            nodes,
            edges,
            entry_point,
            created_at,
        }
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Diagnostic-only: node names unreachable from `entry_point`.
    ///
    /// Loops are intended behavior for this engine, so this never rejects
    /// cycles; it only flags nodes no edge path can ever reach, which is
    /// useful feedback at `/graph/create` ingress even though it has no
    /// bearing on execution correctness.
    pub fn find_unreachable_nodes(&self) -> Vec<String> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut index_of: HashMap<&str, NodeIndex> = HashMap::new();

        for node in &self.nodes {
            let idx = graph.add_node(node.name.as_str());
            index_of.insert(node.name.as_str(), idx);
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) =
                (index_of.get(edge.from_node.as_str()), index_of.get(edge.to_node.as_str()))
            {
                graph.add_edge(from, to, ());
            }
        }

        let Some(&entry_idx) = index_of.get(self.entry_point.as_str()) else {
            return self.nodes.iter().map(|n| n.name.clone()).collect();
        };

        let reachable: HashSet<NodeIndex> =
            petgraph::visit::Dfs::new(&graph, entry_idx)
                .iter(&graph)
                .collect();

        self.nodes
            .iter()
            .filter(|n| {
                index_of
                    .get(n.name.as_str())
                    .map(|idx| !reachable.contains(idx))
                    .unwrap_or(true)
            })
            .map(|n| n.name.clone())
            .collect()
    }
}
