//! Units of work and the priority scheduler that runs them.

use tracing::debug;

use crate::AgentState;

/// One unit of work.
///
/// `activate` must re-derive eligibility from the client every time; a task
/// never assumes it runs again right after `execute` returns.
pub trait Task<C> {
    fn name(&self) -> &str;
    fn activate(&self, client: &C, state: &AgentState) -> bool;
    fn execute(&mut self, client: &mut C, state: &mut AgentState);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Executed { index: usize, task: String },
    /// No task was eligible; the caller may back off.
    Idle,
}

/// Ordered priority list. Each tick runs the first eligible task and nothing else.
pub struct Scheduler<C> {
    tasks: Vec<Box<dyn Task<C>>>,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self { tasks: Vec::new() }
    }
}

impl<C> Scheduler<C> {
    pub fn new(tasks: Vec<Box<dyn Task<C>>>) -> Self {
        Self { tasks }
    }

    pub fn push(&mut self, task: Box<dyn Task<C>>) {
        self.tasks.push(task);
    }

    pub fn replace(&mut self, tasks: Vec<Box<dyn Task<C>>>) {
        self.tasks = tasks;
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name()).collect()
    }

    pub fn tick(&mut self, client: &mut C, state: &mut AgentState) -> TickOutcome {
        let Some(index) = self.tasks.iter().position(|t| t.activate(client, state)) else {
            return TickOutcome::Idle;
        };
        let task = &mut self.tasks[index];
        debug!(task = task.name(), index, "executing");
        task.execute(client, state);
        TickOutcome::Executed {
            index,
            task: task.name().to_string(),
        }
    }
}
