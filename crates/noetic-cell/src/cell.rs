//! ABOUTME: KernelCell — recursive executor that plans, delegates to
//! ABOUTME: children or a workflow blueprint, and synthesizes the result

use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use noetic_config::BudgetConfig;
use noetic_core::{
    CellId, EnvelopeMetadata, ErrorKind, KernelError, Result, StderrBundle, StdioEnvelope,
    StdoutPayload, Warning, WorkPackage,
};
use noetic_messaging::{Mailbox, Message, MessageBus, MessageKind, VerticalKind};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{info, instrument, warn};

use noetic_core::ArtifactStore;

use crate::budget::Budget;
use crate::governance::reallocate_surplus;
use crate::planner::{BlueprintStep, DagRunner, DelegationSpec, PlanOutcome, Planner, Synthesizer};
use crate::role::Role;
use crate::state::{can_transition, CellState};

/// Collaborators a cell needs but does not own the lifecycle of. Shared by
/// value across a whole subtree: every child gets a clone of its parent's
/// `CellDeps`, pointing at the same bus and the same planning/execution
/// services.
#[derive(Clone)]
pub struct CellDeps {
    pub planner: Arc<dyn Planner>,
    pub dag_runner: Arc<dyn DagRunner>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub bus: MessageBus,
    pub budget_cfg: Arc<BudgetConfig>,
}

pub struct KernelCell {
    pub id: CellId,
    pub role: Role,
    pub parent: Option<CellId>,
    pub domain: Option<String>,
    pub question: String,
    state: CellState,
    budget: Arc<Mutex<Budget>>,
    artifacts: ArtifactStore,
    deps: CellDeps,
}

impl KernelCell {
    pub fn root(id: CellId, question: impl Into<String>, domain: Option<String>, deps: CellDeps) -> Self {
        let role_budget = deps.budget_cfg.for_role(Role::Ceo.as_str());
        let budget = Budget::new(role_budget.tokens_total, role_budget.deadline_secs);
        Self {
            id,
            role: Role::Ceo,
            parent: None,
            domain,
            question: question.into(),
            state: CellState::Created,
            budget: Arc::new(Mutex::new(budget)),
            artifacts: ArtifactStore::new(),
            deps,
        }
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn tokens_used(&self) -> u64 {
        self.budget.lock().tokens_used
    }

    pub fn tokens_total(&self) -> u64 {
        self.budget.lock().tokens_total
    }

    fn transition(&mut self, to: CellState) {
        debug_assert!(
            can_transition(self.state, to),
            "illegal cell transition {:?} -> {:?}",
            self.state,
            to
        );
        self.state = to;
    }

    #[instrument(skip(self), fields(cell_id = %self.id, role = self.role.as_str()))]
    pub async fn run(mut self) -> StdioEnvelope {
        let mut mailbox = self.deps.bus.register(self.id.clone());

        let exhausted = self.budget.lock().is_exhausted();
        if exhausted {
            self.deps.bus.unregister(&self.id);
            let (tokens_used, tokens_total) = {
                let budget = self.budget.lock();
                (budget.tokens_used, budget.tokens_total)
            };
            return self.terminal_envelope_from_err(KernelError::BudgetExhausted {
                tokens_used,
                tokens_total,
            });
        }

        self.transition(CellState::Planning);
        let question = self.question.clone();
        let domain = self.domain.clone();
        let plan_fut = self.deps.planner.plan(&self.id, self.role, &question, domain.as_deref());
        let outcome = match self.race_cancel(plan_fut, &mut mailbox).await {
            Ok(o) => o,
            Err(e) => {
                self.deps.bus.unregister(&self.id);
                return self.terminal_envelope_from_err(e);
            }
        };

        let result = match outcome {
            PlanOutcome::Direct(answer) => self.run_direct(answer, &mut mailbox).await,
            PlanOutcome::RunBlueprint(steps) => self.run_blueprint(steps, &mut mailbox).await,
            PlanOutcome::Delegate(specs) => self.run_delegation(specs, &mut mailbox).await,
        };

        self.deps.bus.unregister(&self.id);

        match result {
            Ok(env) => self.finalize_envelope(env),
            Err(e) => self.terminal_envelope_from_err(e),
        }
    }

    /// Stamp the cell's own final token usage onto the envelope the
    /// synthesizer produced, and surface the cell's closing `tokens_total`
    /// (which may have grown via reallocation) under `extra` for callers
    /// that need to observe budget movement.
    fn finalize_envelope(&self, mut env: StdioEnvelope) -> StdioEnvelope {
        let budget = self.budget.lock();
        env.metadata.tokens_used = budget.tokens_used;
        match env.metadata.extra {
            Value::Object(ref mut map) => {
                map.insert("tokens_total".to_string(), serde_json::json!(budget.tokens_total));
            }
            _ => {
                env.metadata.extra = serde_json::json!({ "tokens_total": budget.tokens_total });
            }
        }
        env
    }

    /// Drive `fut` to completion unless a CANCEL message addressed to this
    /// cell arrives first. A RESOURCE message is logged only: the parent
    /// already applies the grant directly to the shared `Budget` before
    /// sending it, this is just the cell's own visibility into why its
    /// remaining budget moved.
    async fn race_cancel<T>(&self, fut: impl std::future::Future<Output = Result<T>>, mailbox: &mut Mailbox) -> Result<T> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                res = &mut fut => return res,
                msg = mailbox.recv() => {
                    match msg {
                        Some(Message { kind: MessageKind::Vertical(VerticalKind::Cancel), payload, .. }) => {
                            let reason = payload
                                .get("reason")
                                .and_then(|v| v.as_str())
                                .unwrap_or("cancelled by parent")
                                .to_string();
                            return Err(KernelError::Cancelled { reason });
                        }
                        Some(Message { kind: MessageKind::Vertical(VerticalKind::Resource), payload, .. }) => {
                            let granted = payload.get("tokens_granted").and_then(|v| v.as_u64()).unwrap_or(0);
                            info!(cell_id = %self.id, granted, "received budget top-up from parent");
                        }
                        Some(_) | None => {}
                    }
                }
            }
        }
    }

    async fn run_direct(&mut self, answer: String, mailbox: &mut Mailbox) -> Result<StdioEnvelope> {
        self.transition(CellState::Synthesizing);
        let findings = serde_json::json!({ "answer": answer });
        let env = self
            .race_cancel(self.deps.synthesizer.synthesize(&self.id, &findings, &[]), mailbox)
            .await?;
        self.transition(CellState::Done);
        Ok(env)
    }

    async fn run_blueprint(&mut self, steps: Vec<BlueprintStep>, mailbox: &mut Mailbox) -> Result<StdioEnvelope> {
        self.transition(CellState::Delegating);
        let artifacts = self
            .race_cancel(self.deps.dag_runner.run_blueprint(&self.id, steps), mailbox)
            .await?;
        self.artifacts.publish("blueprint", "result", artifacts.clone(), None);
        self.transition(CellState::Synthesizing);
        let env = self
            .race_cancel(self.deps.synthesizer.synthesize(&self.id, &artifacts, &[]), mailbox)
            .await?;
        self.transition(CellState::Done);
        Ok(env)
    }

    async fn run_delegation(&mut self, specs: Vec<DelegationSpec>, mailbox: &mut Mailbox) -> Result<StdioEnvelope> {
        self.transition(CellState::Delegating);
        let child_role = self.role.next_lower().ok_or_else(|| KernelError::Validation {
            message: format!("{} cannot spawn further children", self.role.as_str()),
        })?;

        let mut child_budgets: Vec<Arc<Mutex<Budget>>> = Vec::with_capacity(specs.len());
        let mut child_ids: Vec<CellId> = Vec::with_capacity(specs.len());
        let mut tasks = FuturesUnordered::new();

        for (i, spec) in specs.into_iter().enumerate() {
            let child_id = CellId::child_of(&self.id, &format!("{}-{i}", child_role.as_str()));
            let role_budget = self.deps.budget_cfg.for_role(child_role.as_str());
            let parent_remaining = self.budget.lock().remaining_tokens() as f64;
            let grant = ((parent_remaining * role_budget.share_of_parent) as u64).max(1);
            let shared_budget = Arc::new(Mutex::new(Budget::new(grant, role_budget.deadline_secs)));

            let child = KernelCell {
                id: child_id.clone(),
                role: child_role,
                parent: Some(self.id.clone()),
                domain: spec.domain,
                question: spec.question,
                state: CellState::Created,
                budget: shared_budget.clone(),
                artifacts: ArtifactStore::new(),
                deps: self.deps.clone(),
            };

            child_budgets.push(shared_budget);
            child_ids.push(child_id);
            tasks.push(async move { (i, child.run().await) });
        }

        self.transition(CellState::Waiting);

        let total = child_budgets.len();
        let mut finished = vec![false; total];
        let mut envelopes: Vec<Option<StdioEnvelope>> = (0..total).map(|_| None).collect();
        let max_factor = self.deps.budget_cfg.max_reallocation_factor;

        while finished.iter().any(|done| !done) {
            tokio::select! {
                Some((i, env)) = tasks.next() => {
                    finished[i] = true;
                    envelopes[i] = Some(env);
                    self.reallocate_to_running(&child_budgets, &finished, &child_ids, max_factor).await;
                }
                msg = mailbox.recv() => {
                    if let Some(Message { kind: MessageKind::Vertical(VerticalKind::Cancel), .. }) = msg {
                        warn!(cell_id = %self.id, "propagating cancellation to children");
                        for id in &child_ids {
                            let _ = self.deps.bus.send(
                                self.id.clone(),
                                id.clone(),
                                MessageKind::Vertical(VerticalKind::Cancel),
                                serde_json::json!({ "reason": "parent cancelled" }),
                            );
                        }
                    }
                }
                else => break,
            }
        }

        let final_envelopes: Vec<StdioEnvelope> = envelopes.into_iter().flatten().collect();
        info!(cell_id = %self.id, children = final_envelopes.len(), "delegation complete, synthesizing");
        self.transition(CellState::Synthesizing);
        let env = self
            .deps
            .synthesizer
            .synthesize(&self.id, &Value::Null, &final_envelopes)
            .await?;
        self.transition(CellState::Done);
        Ok(env)
    }

    async fn reallocate_to_running(
        &self,
        child_budgets: &[Arc<Mutex<Budget>>],
        finished: &[bool],
        child_ids: &[CellId],
        max_factor: f64,
    ) {
        let mut snapshots: Vec<Budget> = child_budgets.iter().map(|b| b.lock().clone()).collect();
        let plans = reallocate_surplus(&mut snapshots, finished, max_factor);
        for plan in plans {
            {
                let mut b = child_budgets[plan.child_index].lock();
                b.tokens_total += plan.granted;
            }
            let _ = self.deps.bus.send(
                self.id.clone(),
                child_ids[plan.child_index].clone(),
                MessageKind::Vertical(VerticalKind::Resource),
                serde_json::json!({ "tokens_granted": plan.granted }),
            );
        }
    }

    fn terminal_envelope_from_err(&mut self, err: KernelError) -> StdioEnvelope {
        let target_state = if err.kind() == ErrorKind::Cancelled {
            CellState::Cancelled
        } else {
            CellState::Failed
        };
        let warning = Warning {
            warning_type: if target_state == CellState::Cancelled { "cancelled" } else { "failed" }.to_string(),
            message: err.to_string(),
            severity: "high".to_string(),
        };
        self.transition(target_state);
        let budget = self.budget.lock();
        StdioEnvelope {
            stdout: StdoutPayload {
                content: String::new(),
                work_package: WorkPackage::empty(),
                key_findings: vec![],
            },
            stderr: StderrBundle {
                failures: vec![],
                warnings: vec![warning],
            },
            metadata: EnvelopeMetadata {
                cell_id: self.id.as_str().to_string(),
                level: self.role.depth(),
                role: self.role.as_str().to_string(),
                domain: self.domain.clone(),
                confidence: 0.0,
                duration_ms: budget.elapsed().as_millis() as u64,
                tokens_used: budget.tokens_used,
                children_count: 0,
                messages_sent: 0,
                messages_received: 0,
                extra: Value::Null,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DirectPlanner;
    #[async_trait]
    impl Planner for DirectPlanner {
        async fn plan(&self, _cell_id: &CellId, _role: Role, question: &str, _domain: Option<&str>) -> Result<PlanOutcome> {
            Ok(PlanOutcome::Direct(format!("answer to: {question}")))
        }
    }

    struct DelegatingPlanner {
        child_count: usize,
    }
    #[async_trait]
    impl Planner for DelegatingPlanner {
        async fn plan(&self, cell_id: &CellId, role: Role, _question: &str, _domain: Option<&str>) -> Result<PlanOutcome> {
            if role == Role::Staff || cell_id.as_str().matches('/').count() >= 1 {
                return Ok(PlanOutcome::Direct("leaf answer".to_string()));
            }
            let specs = (0..self.child_count)
                .map(|i| DelegationSpec {
                    role: Role::Vp,
                    question: format!("sub-question {i}"),
                    domain: None,
                })
                .collect();
            Ok(PlanOutcome::Delegate(specs))
        }
    }

    struct AlwaysDelegatePlanner;
    #[async_trait]
    impl Planner for AlwaysDelegatePlanner {
        async fn plan(&self, _cell_id: &CellId, _role: Role, _question: &str, _domain: Option<&str>) -> Result<PlanOutcome> {
            Ok(PlanOutcome::Delegate(vec![DelegationSpec {
                role: Role::Staff,
                question: "sub".to_string(),
                domain: None,
            }]))
        }
    }

    struct NoopDagRunner;
    #[async_trait]
    impl DagRunner for NoopDagRunner {
        async fn run_blueprint(&self, _cell_id: &CellId, _steps: Vec<BlueprintStep>) -> Result<Value> {
            Ok(serde_json::json!({}))
        }
    }

    struct EchoSynthesizer {
        calls: Arc<AtomicUsize>,
    }
    #[async_trait]
    impl Synthesizer for EchoSynthesizer {
        async fn synthesize(&self, cell_id: &CellId, own_findings: &Value, children: &[StdioEnvelope]) -> Result<StdioEnvelope> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(StdioEnvelope {
                stdout: StdoutPayload {
                    content: own_findings.to_string(),
                    work_package: WorkPackage::empty(),
                    key_findings: vec![],
                },
                stderr: StderrBundle::default(),
                metadata: EnvelopeMetadata {
                    cell_id: cell_id.as_str().to_string(),
                    level: 0,
                    role: "ceo".to_string(),
                    domain: None,
                    confidence: 1.0,
                    duration_ms: 0,
                    tokens_used: 0,
                    children_count: children.len() as u32,
                    messages_sent: 0,
                    messages_received: 0,
                    extra: Value::Null,
                },
            })
        }
    }

    fn test_deps(planner: Arc<dyn Planner>) -> CellDeps {
        CellDeps {
            planner,
            dag_runner: Arc::new(NoopDagRunner),
            synthesizer: Arc::new(EchoSynthesizer { calls: Arc::new(AtomicUsize::new(0)) }),
            bus: MessageBus::new(),
            budget_cfg: Arc::new(BudgetConfig::default()),
        }
    }

    #[tokio::test]
    async fn direct_plan_produces_done_envelope() {
        let deps = test_deps(Arc::new(DirectPlanner));
        let cell = KernelCell::root(CellId::from("root"), "what is rust?", None, deps);
        let env = cell.run().await;
        assert!(env.stderr.warnings.is_empty());
    }

    #[tokio::test]
    async fn delegation_spawns_children_and_synthesizes() {
        let deps = test_deps(Arc::new(DelegatingPlanner { child_count: 3 }));
        let cell = KernelCell::root(CellId::from("root"), "big question", None, deps);
        let env = cell.run().await;
        assert_eq!(env.metadata.children_count, 3);
    }

    #[tokio::test]
    async fn staff_role_cannot_delegate_further() {
        let deps = test_deps(Arc::new(AlwaysDelegatePlanner));
        let mut cell = KernelCell::root(CellId::from("root"), "q", None, deps);
        cell.role = Role::Staff;
        let env = cell.run().await;
        assert_eq!(env.stderr.warnings.len(), 1);
        assert_eq!(env.stderr.warnings[0].warning_type, "failed");
    }

    #[tokio::test]
    async fn exhausted_budget_fails_before_planning() {
        let deps = test_deps(Arc::new(DirectPlanner));
        let mut cell = KernelCell::root(CellId::from("root"), "q", None, deps);
        cell.budget = Arc::new(Mutex::new(Budget::new(0, 60)));
        let env = cell.run().await;
        assert_eq!(env.stderr.warnings[0].warning_type, "failed");
    }
}
