//! ABOUTME: Owns the lifecycle of the long-lived singletons (tool registry,
//! ABOUTME: dispatch database, resource governor) and wires them into CellDeps

use std::sync::Arc;

use anyhow::Context as _;
use noetic_cell::CellDeps;
use noetic_config::NoeticConfig;
use noetic_core::collaborators::LlmCaller;
use noetic_dispatch::{Database, ResourceGovernor};
use noetic_messaging::MessageBus;
use noetic_tools::ToolRegistry;
use tracing::{info, warn};

use crate::adapters::{DagExecutorAdapter, MergeSynthesizer, PassthroughCodeRunner, ReflectivePlanner, RegistryToolCaller};

/// The host process's singletons, built once at startup and shared by every
/// cell spawned for the process's lifetime.
pub struct EngineContext {
    pub config: Arc<NoeticConfig>,
    pub tools: Arc<ToolRegistry>,
    pub dispatch_db: Option<Database>,
    pub governor: Arc<ResourceGovernor>,
    pub bus: MessageBus,
    llm: Option<Arc<dyn LlmCaller>>,
}

impl EngineContext {
    /// Builds every singleton from `config`. The dispatch database is
    /// optional: a host that never needs bulk task dispatch (answering a
    /// single query interactively) can run without Postgres configured, so
    /// a connection failure there is logged and degrades to `None` rather
    /// than failing startup.
    pub async fn build(config: NoeticConfig, llm: Option<Arc<dyn LlmCaller>>) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let tools = Arc::new(ToolRegistry::new(&config.tool_servers));
        let manifests = noetic_tools::load_manifests(&config.tool_servers.dir)
            .context("loading tool server manifests")?;
        for manifest in &manifests {
            info!(server = %manifest.name, tools = manifest.tools.len(), "registering tool server manifest");
            tools.register_manifest(manifest);
        }

        let dispatch_db = match Database::connect(&config.database) {
            Ok(db) => match db.run_migrations().await {
                Ok(()) => Some(db),
                Err(e) => {
                    warn!(error = %e, "dispatch database migration failed, continuing without task dispatch");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, "dispatch database unavailable, continuing without task dispatch");
                None
            }
        };

        let governor = Arc::new(ResourceGovernor::new(config.governor.clone()));
        let bus = MessageBus::new();

        Ok(Self { config, tools, dispatch_db, governor, bus, llm })
    }

    /// Wires the concrete adapters (tool registry, DAG executor, merge
    /// synthesizer) into the trait seams a `KernelCell` depends on.
    pub fn cell_deps(&self) -> CellDeps {
        let tool_caller = Arc::new(RegistryToolCaller::new(self.tools.clone()));
        let code_runner = Arc::new(PassthroughCodeRunner);
        let dag_runner = Arc::new(DagExecutorAdapter::new(
            tool_caller,
            code_runner,
            self.llm.clone(),
            Arc::new(self.config.executor.clone()),
            Arc::new(self.config.retry.clone()),
            self.config.tool_servers.auto_wire_accept_threshold,
        ));

        CellDeps {
            planner: Arc::new(ReflectivePlanner::new(self.llm.clone())),
            dag_runner,
            synthesizer: Arc::new(MergeSynthesizer),
            bus: self.bus.clone(),
            budget_cfg: Arc::new(self.config.budgets.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use noetic_config::{GovernorConfig, NoeticConfig};
    use noetic_core::CellId;

    /// Builds a context without touching the network: tests exercise
    /// `cell_deps()` wiring only, so `dispatch_db` is left unset.
    fn test_context() -> EngineContext {
        let config = Arc::new(NoeticConfig::default());
        EngineContext {
            tools: Arc::new(ToolRegistry::new(&config.tool_servers)),
            dispatch_db: None,
            governor: Arc::new(ResourceGovernor::new(GovernorConfig::default())),
            bus: MessageBus::new(),
            llm: None,
            config,
        }
    }

    #[tokio::test]
    async fn root_cell_with_no_llm_and_no_tool_servers_terminates() {
        let ctx = test_context();
        let deps = ctx.cell_deps();
        let cell = noetic_cell::KernelCell::root(CellId::root("ceo"), "what is the weather", None, deps);
        let envelope = cell.run().await;
        assert!(!envelope.stdout.content.is_empty() || !envelope.stderr.warnings.is_empty());
    }
}
