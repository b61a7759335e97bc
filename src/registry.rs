//! Name-keyed directory of tool callables.
//!
//! Tools are registered once (usually at process startup) and invoked by
//! name from [`crate::engine::GraphEngine`] when it dispatches a `FUNCTION`
//! node. The registry is the only state shared between concurrently
//! executing runs; reads vastly outnumber writes, so a reader-preferring
//! lock around a plain map is enough, no lock-free structure is needed at
//! this scale.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::model::state::StateData;
use crate::{EngineError, Result};

/// A callable tool: takes the payload, returns the next payload.
///
/// Both synchronous and asynchronous tools implement this trait. A tool
/// whose body is CPU-bound or otherwise blocking should offload that work
/// itself (e.g. via `tokio::task::spawn_blocking`); [`BlockingFnTool`] does
/// this automatically for plain function pointers.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Transform the payload, producing the next payload.
    async fn call(&self, state: StateData) -> Result<StateData>;
}

/// Wraps a plain synchronous function, offloading it to `spawn_blocking`.
///
/// Tools with a genuinely async body (calling out to a database, an LLM,
/// another service) should implement [`Tool`] directly instead; this
/// wrapper exists for the common case of a pure, CPU-bound transform.
pub struct BlockingFnTool<F>(pub Arc<F>)
where
    F: Fn(StateData) -> Result<StateData> + Send + Sync + 'static;

#[async_trait]
impl<F> Tool for BlockingFnTool<F>
where
    F: Fn(StateData) -> Result<StateData> + Send + Sync + 'static,
{
    async fn call(&self, state: StateData) -> Result<StateData> {
        let f = Arc::clone(&self.0);
        tokio::task::spawn_blocking(move || f(state))
            .await
            .map_err(|e| EngineError::ToolFailure(format!("tool panicked: {e}")))?
    }
}

/// Introspection descriptor for a registered tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// The tool's registered name.
    pub name: String,
    /// Human-readable documentation supplied at registration time.
    pub description: String,
}

struct Entry {
    tool: Arc<dyn Tool>,
    info: ToolInfo,
}

/// A name-keyed directory of [`Tool`] callables.
///
/// Construct a fresh registry for tests; production code wires the
/// process-wide default returned by [`ToolRegistry::global`] at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Entry>>,
}

static DEFAULT_REGISTRY: OnceLock<ToolRegistry> = OnceLock::new();

impl ToolRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// The process-wide default registry, created on first access.
    pub fn global() -> &'static ToolRegistry {
        DEFAULT_REGISTRY.get_or_init(ToolRegistry::new)
    }

    /// Register a tool under `name`, with an explicit description for
    /// [`ToolRegistry::get_tool_info`].
    ///
    /// Fails when `name` is already registered and `override_existing` is
    /// false.
    pub fn register(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        tool: Arc<dyn Tool>,
        override_existing: bool,
    ) -> Result<()> {
        let name = name.into();
        let mut tools = self.tools.write();
        if tools.contains_key(&name) && !override_existing {
            return Err(EngineError::ToolFailure(format!(
                "tool '{name}' already registered; pass override_existing=true to replace it"
            )));
        }
        tools.insert(
            name.clone(),
            Entry {
                tool,
                info: ToolInfo {
                    name: name.clone(),
                    description: description.into(),
                },
            },
        );
        tracing::info!(tool = %name, "registered tool");
        Ok(())
    }

    /// Register a plain blocking function as a tool.
    pub fn register_fn<F>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        override_existing: bool,
        f: F,
    ) -> Result<()>
    where
        F: Fn(StateData) -> Result<StateData> + Send + Sync + 'static,
    {
        self.register(
            name,
            description,
            Arc::new(BlockingFnTool(Arc::new(f))),
            override_existing,
        )
    }

    /// Retrieve a tool by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.tool))
            .ok_or_else(|| {
                EngineError::NotFound(format!(
                    "tool '{name}' not found. Available tools: {:?}",
                    self.list_tools()
                ))
            })
    }

    /// Whether a tool named `name` is registered.
    pub fn exists(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// A snapshot of registered tool names, in unspecified order.
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Remove a tool. Fails if `name` is not registered.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let mut tools = self.tools.write();
        if tools.remove(name).is_none() {
            return Err(EngineError::NotFound(format!("tool '{name}' not found")));
        }
        tracing::info!(tool = %name, "unregistered tool");
        Ok(())
    }

    /// Remove every registered tool. Intended for test setup/teardown.
    pub fn clear(&self) {
        self.tools.write().clear();
        tracing::info!("cleared tool registry");
    }

    /// Fetch the introspection descriptor for a tool.
    pub fn get_tool_info(&self, name: &str) -> Result<ToolInfo> {
        self.tools
            .read()
            .get(name)
            .map(|entry| entry.info.clone())
            .ok_or_else(|| EngineError::NotFound(format!("tool '{name}' not found")))
    }
}
