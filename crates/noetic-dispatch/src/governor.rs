//! ABOUTME: Gatekeeper for new cell spawns, denying work when the host is overloaded

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use noetic_config::GovernorConfig;
use parking_lot::Mutex;
use sysinfo::{Pid, System};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct SystemState {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub active_agents: usize,
    pub status: HealthStatus,
}

/// Tracks host resource pressure and active cell count; `can_spawn` is the
/// single gate every new `KernelCell` delegation should pass before it is
/// allowed to start.
pub struct ResourceGovernor {
    cfg: GovernorConfig,
    system: Mutex<System>,
    pid: Pid,
    active_agents: AtomicUsize,
}

impl ResourceGovernor {
    pub fn new(cfg: GovernorConfig) -> Self {
        let mut system = System::new_all();
        system.refresh_all();
        let pid = sysinfo::get_current_pid().unwrap_or_else(|_| Pid::from_u32(0));
        Self { cfg, system: Mutex::new(system), pid, active_agents: AtomicUsize::new(0) }
    }

    pub fn agent_started(self: &Arc<Self>) {
        self.active_agents.fetch_add(1, Ordering::SeqCst);
    }

    pub fn agent_finished(self: &Arc<Self>) {
        self.active_agents.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn check_health(&self) -> SystemState {
        let mut system = self.system.lock();
        system.refresh_cpu_all();
        system.refresh_memory();
        system.refresh_processes(sysinfo::ProcessesToUpdate::All);

        let cpu_percent = system.process(self.pid).map(|p| p.cpu_usage()).unwrap_or(0.0);
        let memory_percent = if system.total_memory() == 0 {
            0.0
        } else {
            (system.used_memory() as f64 / system.total_memory() as f64 * 100.0) as f32
        };
        let active_agents = self.active_agents.load(Ordering::SeqCst);

        let status = if cpu_percent > self.cfg.max_cpu_percent as f32
            || memory_percent > self.cfg.max_memory_percent as f32
            || active_agents as u32 >= self.cfg.max_agents
        {
            HealthStatus::Critical
        } else if cpu_percent > (self.cfg.max_cpu_percent * self.cfg.warning_fraction) as f32
            || memory_percent > (self.cfg.max_memory_percent * self.cfg.warning_fraction) as f32
        {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        SystemState { cpu_percent, memory_percent, active_agents, status }
    }

    /// Gate for spawning `requested` new cells at once.
    pub fn can_spawn(&self, requested: usize) -> bool {
        let state = self.check_health();

        if state.status == HealthStatus::Critical {
            warn!(cpu = state.cpu_percent, mem = state.memory_percent, agents = state.active_agents, "governor denied spawn: system critical");
            return false;
        }

        if (state.active_agents + requested) as u32 > self.cfg.max_agents {
            warn!(active = state.active_agents, requested, limit = self.cfg.max_agents, "governor denied spawn: agent limit reached");
            return false;
        }

        debug!(cpu = state.cpu_percent, mem = state.memory_percent, "governor approved spawn");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_active_agents_under_default_limits_allows_spawn() {
        let governor = ResourceGovernor::new(GovernorConfig::default());
        assert!(governor.can_spawn(1));
    }

    #[test]
    fn agent_count_at_limit_denies_further_spawns() {
        let cfg = GovernorConfig { max_agents: 2, ..GovernorConfig::default() };
        let governor = Arc::new(ResourceGovernor::new(cfg));
        governor.agent_started();
        governor.agent_started();
        assert!(!governor.can_spawn(1));
    }

    #[test]
    fn agent_finished_frees_up_capacity() {
        let cfg = GovernorConfig { max_agents: 1, ..GovernorConfig::default() };
        let governor = Arc::new(ResourceGovernor::new(cfg));
        governor.agent_started();
        assert!(!governor.can_spawn(1));
        governor.agent_finished();
        assert!(governor.can_spawn(1));
    }
}
