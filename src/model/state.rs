//! The payload that threads through node executions.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-compatible key/value payload.
pub type StateData = HashMap<String, Value>;

/// The state carried through a single run.
///
/// `data` is the mutable payload tools read and write. `metadata` is
/// reserved for engine annotations (e.g. the owning graph's name) and is
/// not expected to be read or written by tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkflowState {
    /// Tool-visible payload.
    pub data: StateData,

    /// Engine-reserved annotations.
    #[serde(default)]
    pub metadata: StateData,
}

impl WorkflowState {
    /// Construct an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a state from an initial payload and metadata map.
    pub fn with_data(data: StateData, metadata: StateData) -> Self {
        Self { data, metadata }
    }

    /// Deep-copy the payload `data`, leaving `metadata` untouched.
    ///
    /// Cloning a `serde_json::Value` tree is already a full deep copy, so
    /// this is just `data.clone()`, kept as a named method because the
    /// engine calls it at a specific point (the node-execution input
    /// snapshot) and the name documents that intent.
    pub fn snapshot_data(&self) -> StateData {
        self.data.clone()
    }
}
