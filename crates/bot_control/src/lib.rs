use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bot_core::{
    AgentDef, AgentId, AgentState, CombinePipeline, Constants, DepotRestocker, FinishStep,
    GameClient, ProductionMode, Scheduler, Stage, StageAction, StageGate, StageMachine, Tally,
    Task, TerminalReason, TickOutcome,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Runs once at agent start and places the agent on its first stage.
pub struct SetupTask {
    start: Stage,
    done: bool,
}

impl SetupTask {
    pub fn new(def: &AgentDef) -> Self {
        let start = def
            .start_stage
            .as_ref()
            .and_then(|id| def.stage_index(id))
            .unwrap_or(0);
        Self {
            start: Stage::Production(start),
            done: false,
        }
    }
}

impl<C: GameClient> Task<C> for SetupTask {
    fn name(&self) -> &str {
        "setup"
    }

    fn activate(&self, _client: &C, _state: &AgentState) -> bool {
        !self.done
    }

    fn execute(&mut self, _client: &mut C, state: &mut AgentState) {
        self.done = true;
        state.stage = self.start;
        state.activity = "Setup complete".to_string();
        state.rebuild_requested = true;
        info!(task = "setup", stage = ?self.start, "agent ready");
    }
}

/// Task list for an agent at `stage`: the production tasks its mode allows,
/// in stage order, then the depot restocker.
pub fn build_production_tasks<C: GameClient>(
    def: &AgentDef,
    constants: &Constants,
    stage: Stage,
) -> Vec<Box<dyn Task<C>>> {
    let Some(current) = stage.index() else {
        return Vec::new();
    };
    let last = match def.mode {
        ProductionMode::AllInOne => def.stages.len(),
        ProductionMode::StepByStep => (current + 1).min(def.stages.len()),
    };
    let mut tasks: Vec<Box<dyn Task<C>>> = Vec::new();
    for (idx, stage_def) in def.stages.iter().enumerate().take(last).skip(current) {
        let timeouts = constants.timeouts.clone();
        match &stage_def.action {
            StageAction::Combine(spec) => tasks.push(Box::new(StageGate::new(
                idx,
                def.mode,
                CombinePipeline::new(spec.clone(), timeouts),
            ))),
            StageAction::Finish(spec) => tasks.push(Box::new(StageGate::new(
                idx,
                def.mode,
                FinishStep::new(spec.clone(), timeouts),
            ))),
        }
    }
    tasks.push(Box::new(DepotRestocker::new(def, constants.timeouts.clone())));
    tasks
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentTick {
    Executed(String),
    Idle,
    /// A terminal condition was reached; no task runs any more.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub agent: AgentId,
    pub ticks: u64,
    pub stage: String,
    pub activity: String,
    pub finished: Option<TerminalReason>,
    pub tally: Tally,
}

/// One bot: its definition, task list and state, driven tick by tick.
pub struct Agent<C> {
    def: AgentDef,
    constants: Constants,
    machine: StageMachine,
    scheduler: Scheduler<C>,
    state: AgentState,
    ticks: u64,
    built_for: Stage,
}

impl<C: GameClient> Agent<C> {
    pub fn new(def: AgentDef, constants: Constants) -> Self {
        let scheduler = Scheduler::new(vec![Box::new(SetupTask::new(&def)) as Box<dyn Task<C>>]);
        Self {
            machine: StageMachine::for_agent(&def),
            def,
            constants,
            scheduler,
            state: AgentState::default(),
            ticks: 0,
            built_for: Stage::Setup,
        }
    }

    pub fn def(&self) -> &AgentDef {
        &self.def
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    pub fn stage_name(&self) -> &str {
        self.machine.stage_name(self.state.stage)
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.scheduler.task_names()
    }

    /// Runs at most one task. The task list is rebuilt afterwards if the
    /// stage moved or a task asked for it.
    pub fn tick(&mut self, client: &mut C) -> AgentTick {
        if self.state.is_finished() {
            return AgentTick::Finished;
        }
        self.ticks += 1;
        let outcome = self.scheduler.tick(client, &mut self.state);
        if self.state.rebuild_requested || self.state.stage != self.built_for {
            self.rebuild();
        }
        match outcome {
            TickOutcome::Executed { task, .. } => AgentTick::Executed(task),
            TickOutcome::Idle => AgentTick::Idle,
        }
    }

    fn rebuild(&mut self) {
        self.state.rebuild_requested = false;
        self.built_for = self.state.stage;
        self.scheduler
            .replace(build_production_tasks(&self.def, &self.constants, self.state.stage));
        debug!(
            agent = %self.def.id,
            stage = self.stage_name(),
            tasks = ?self.scheduler.task_names(),
            "rebuilt task list"
        );
    }

    /// Ticks until finished, `max_ticks` is reached or `stop` is raised.
    /// `stop` is only checked between ticks.
    pub fn run(&mut self, client: &mut C, stop: &AtomicBool, max_ticks: u64) -> RunSummary {
        self.run_observed(client, stop, max_ticks, |_, _| {})
    }

    /// Like [`Agent::run`], calling `observe` after every tick.
    pub fn run_observed<F>(
        &mut self,
        client: &mut C,
        stop: &AtomicBool,
        max_ticks: u64,
        mut observe: F,
    ) -> RunSummary
    where
        F: FnMut(&Self, &AgentTick),
    {
        while self.ticks < max_ticks && !stop.load(Ordering::Relaxed) {
            let tick = self.tick(client);
            observe(self, &tick);
            match tick {
                AgentTick::Finished => break,
                AgentTick::Idle => {
                    client.pause(Duration::from_millis(self.constants.idle_backoff_ms));
                }
                AgentTick::Executed(_) => {}
            }
        }
        self.summary()
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            agent: self.def.id.clone(),
            ticks: self.ticks,
            stage: self.stage_name().to_string(),
            activity: self.state.activity.clone(),
            finished: self.state.finished,
            tally: self.state.tally.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_core::test_fixtures::{base_constants, pie_agent, quiet_client, tanner_agent};
    use bot_core::StageId;

    #[test]
    fn test_setup_runs_once_then_rebuilds() {
        let mut client = quiet_client(&pie_agent(), &[]);
        let mut agent = Agent::new(pie_agent(), base_constants());
        assert_eq!(agent.task_names(), vec!["setup"]);

        assert_eq!(agent.tick(&mut client), AgentTick::Executed("setup".to_string()));
        assert_eq!(agent.state().stage, Stage::Production(0));
        assert_eq!(
            agent.task_names(),
            vec!["dough", "shell", "filling", "cook", "restock"]
        );
        assert!(!agent.state().rebuild_requested);
    }

    #[test]
    fn test_start_stage_honored() {
        let mut def = pie_agent();
        def.start_stage = Some(StageId::new("filling"));
        let mut client = quiet_client(&def, &[]);
        let mut agent = Agent::new(def, base_constants());
        agent.tick(&mut client);
        assert_eq!(agent.state().stage, Stage::Production(2));
        assert_eq!(agent.stage_name(), "filling");
    }

    #[test]
    fn test_step_by_step_registers_current_stage_only() {
        let mut def = pie_agent();
        def.mode = ProductionMode::StepByStep;
        let tasks: Vec<Box<dyn Task<bot_core::sim::SimulatedClient>>> =
            build_production_tasks(&def, &base_constants(), Stage::Production(1));
        let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["shell", "restock"]);
    }

    #[test]
    fn test_all_in_one_registers_current_and_later_stages() {
        let tasks: Vec<Box<dyn Task<bot_core::sim::SimulatedClient>>> =
            build_production_tasks(&pie_agent(), &base_constants(), Stage::Production(2));
        let names: Vec<&str> = tasks.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["filling", "cook", "restock"]);
    }

    #[test]
    fn test_setup_stage_has_no_production_tasks() {
        let tasks: Vec<Box<dyn Task<bot_core::sim::SimulatedClient>>> =
            build_production_tasks(&tanner_agent(), &base_constants(), Stage::Setup);
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_stop_flag_checked_before_first_tick() {
        let mut client = quiet_client(&pie_agent(), &[]);
        let mut agent = Agent::new(pie_agent(), base_constants());
        let stop = AtomicBool::new(true);
        let summary = agent.run(&mut client, &stop, 100);
        assert_eq!(summary.ticks, 0);
        assert_eq!(summary.stage, "Setup");
    }

    #[test]
    fn test_stop_flag_honored_between_ticks() {
        let def = pie_agent();
        let mut client = quiet_client(&def, &[("jug_of_water", 100), ("pot_of_flour", 100)]);
        let mut agent = Agent::new(def, base_constants());
        let stop = AtomicBool::new(false);
        let summary = agent.run_observed(&mut client, &stop, 1_000, |agent, _| {
            if agent.ticks() == 3 {
                stop.store(true, Ordering::Relaxed);
            }
        });
        assert_eq!(summary.ticks, 3);
        assert!(summary.finished.is_none());
    }

    #[test]
    fn test_max_ticks_bounds_run() {
        let def = pie_agent();
        let mut client = quiet_client(&def, &[("jug_of_water", 500), ("pot_of_flour", 500)]);
        let mut agent = Agent::new(def, base_constants());
        let summary = agent.run(&mut client, &AtomicBool::new(false), 5);
        assert_eq!(summary.ticks, 5);
    }
}
