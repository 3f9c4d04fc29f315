//! Stage selection from depot contents, and per-stage task gating.

use tracing::info;

use crate::task::Task;
use crate::{
    AgentDef, AgentState, ContainerSnapshot, ItemId, ProductionMode, SelectionPolicy, Stage,
    StageDef,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTransition {
    Unchanged(usize),
    Advanced { from: Stage, to: usize },
    Regressed { from: Stage, to: usize },
    /// No stage is satisfiable.
    Exhausted,
}

/// Ordered production stages plus the policy that picks the current one.
#[derive(Debug, Clone)]
pub struct StageMachine {
    stages: Vec<StageDef>,
    policy: SelectionPolicy,
}

impl StageMachine {
    pub fn new(stages: Vec<StageDef>, policy: SelectionPolicy) -> Self {
        Self { stages, policy }
    }

    pub fn for_agent(def: &AgentDef) -> Self {
        Self::new(def.stages.clone(), def.policy)
    }

    pub fn stages(&self) -> &[StageDef] {
        &self.stages
    }

    pub fn policy(&self) -> SelectionPolicy {
        self.policy
    }

    pub fn stage_def(&self, stage: Stage) -> Option<&StageDef> {
        stage.index().and_then(|idx| self.stages.get(idx))
    }

    /// Result of the last stage: the finished product.
    pub fn final_result(&self) -> Option<&ItemId> {
        self.stages.last().map(StageDef::result)
    }

    pub fn stage_name(&self, stage: Stage) -> &str {
        match self.stage_def(stage) {
            Some(def) => &def.name,
            None => "Setup",
        }
    }

    /// Every item any stage consumes, first occurrence order, no duplicates.
    pub fn required_items(&self) -> Vec<ItemId> {
        let mut items: Vec<ItemId> = Vec::new();
        for input in self.stages.iter().flat_map(StageDef::inputs) {
            if !items.contains(&input.item) {
                items.push(input.item.clone());
            }
        }
        items
    }

    /// `available` holds at least one unit's worth of every input of stage `idx`.
    pub fn satisfiable(&self, idx: usize, available: &ContainerSnapshot) -> bool {
        self.stages.get(idx).is_some_and(|def| {
            def.inputs()
                .iter()
                .all(|req| available.amount(&req.item) >= req.amount)
        })
    }

    /// Picks the stage to produce next, or `None` when nothing is satisfiable.
    pub fn select(&self, current: Stage, available: &ContainerSnapshot) -> Option<usize> {
        let satisfiable = |idx: &usize| self.satisfiable(*idx, available);
        match (self.policy, current.index()) {
            (SelectionPolicy::ForwardWithFallback, Some(cur)) if cur < self.stages.len() => {
                if self.satisfiable(cur, available) {
                    return Some(cur);
                }
                (cur + 1..self.stages.len())
                    .find(satisfiable)
                    .or_else(|| (0..cur).find(satisfiable))
            }
            _ => (0..self.stages.len()).find(satisfiable),
        }
    }

    /// Re-derives the agent's stage from `available`, updating `state.stage`.
    pub fn transition(&self, state: &mut AgentState, available: &ContainerSnapshot) -> StageTransition {
        let from = state.stage;
        let Some(to) = self.select(from, available) else {
            return StageTransition::Exhausted;
        };
        let next = Stage::Production(to);
        if next == from {
            return StageTransition::Unchanged(to);
        }
        info!(
            "Stage: {} -> {}",
            self.stage_name(from),
            self.stage_name(next)
        );
        state.stage = next;
        if next > from {
            StageTransition::Advanced { from, to }
        } else {
            StageTransition::Regressed { from, to }
        }
    }
}

/// Restricts a task to the stages its production mode allows.
#[derive(Debug, Clone)]
pub struct StageGate<T> {
    stage: usize,
    mode: ProductionMode,
    inner: T,
}

impl<T> StageGate<T> {
    pub fn new(stage: usize, mode: ProductionMode, inner: T) -> Self {
        Self { stage, mode, inner }
    }

    pub fn stage(&self) -> usize {
        self.stage
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// `StepByStep` runs only at its own stage; `AllInOne` also runs for any
    /// earlier agent stage so downstream items made along the way get used.
    pub fn admits(&self, current: Stage) -> bool {
        match (current, self.mode) {
            (Stage::Setup, _) => false,
            (Stage::Production(cur), ProductionMode::StepByStep) => cur == self.stage,
            (Stage::Production(cur), ProductionMode::AllInOne) => cur <= self.stage,
        }
    }
}

impl<C, T: Task<C>> Task<C> for StageGate<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn activate(&self, client: &C, state: &AgentState) -> bool {
        self.admits(state.stage) && self.inner.activate(client, state)
    }

    fn execute(&mut self, client: &mut C, state: &mut AgentState) {
        self.inner.execute(client, state);
    }
}
