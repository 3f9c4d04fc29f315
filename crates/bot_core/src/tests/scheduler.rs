use super::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<String>>>;

struct RecordingTask {
    name: String,
    eligible: Rc<Cell<bool>>,
    log: Log,
}

impl Task<()> for RecordingTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn activate(&self, _client: &(), _state: &AgentState) -> bool {
        self.eligible.get()
    }

    fn execute(&mut self, _client: &mut (), _state: &mut AgentState) {
        self.log.borrow_mut().push(self.name.clone());
    }
}

/// Builds a scheduler over tasks `t0..tn` with the given eligibility switches.
fn scheduler(eligible: &[bool]) -> (Scheduler<()>, Vec<Rc<Cell<bool>>>, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let switches: Vec<Rc<Cell<bool>>> = eligible.iter().map(|e| Rc::new(Cell::new(*e))).collect();
    let tasks: Vec<Box<dyn Task<()>>> = switches
        .iter()
        .enumerate()
        .map(|(i, switch)| {
            Box::new(RecordingTask {
                name: format!("t{i}"),
                eligible: Rc::clone(switch),
                log: Rc::clone(&log),
            }) as Box<dyn Task<()>>
        })
        .collect();
    (Scheduler::new(tasks), switches, log)
}

#[test]
fn test_tick_executes_only_first_eligible() {
    let (mut sched, _, log) = scheduler(&[true, true, true]);
    let mut state = AgentState::default();

    let outcome = sched.tick(&mut (), &mut state);

    assert_eq!(
        outcome,
        TickOutcome::Executed {
            index: 0,
            task: "t0".to_string()
        }
    );
    assert_eq!(*log.borrow(), vec!["t0".to_string()]);
}

#[test]
fn test_tick_idle_when_nothing_eligible() {
    let (mut sched, _, log) = scheduler(&[false, false]);
    let mut state = AgentState::default();

    assert_eq!(sched.tick(&mut (), &mut state), TickOutcome::Idle);
    assert!(log.borrow().is_empty(), "idle tick must not execute anything");
}

#[test]
fn test_empty_scheduler_is_idle() {
    let mut sched: Scheduler<()> = Scheduler::default();
    let mut state = AgentState::default();
    assert!(sched.is_empty());
    assert_eq!(sched.tick(&mut (), &mut state), TickOutcome::Idle);
}

#[test]
fn test_earlier_task_preferred_even_after_later_ran() {
    let (mut sched, switches, log) = scheduler(&[false, true, true]);
    let mut state = AgentState::default();

    sched.tick(&mut (), &mut state);
    switches[0].set(true);
    sched.tick(&mut (), &mut state);
    sched.tick(&mut (), &mut state);

    assert_eq!(
        *log.borrow(),
        vec!["t1".to_string(), "t0".to_string(), "t0".to_string()]
    );
}

#[test]
fn test_same_task_reselected_while_still_eligible() {
    let (mut sched, _, log) = scheduler(&[false, true]);
    let mut state = AgentState::default();
    for _ in 0..3 {
        sched.tick(&mut (), &mut state);
    }
    assert_eq!(log.borrow().len(), 3);
    assert!(log.borrow().iter().all(|name| name == "t1"));
}

#[test]
fn test_random_eligibility_runs_lowest_index_once() {
    let mut rng = make_rng();
    for _ in 0..200 {
        let n = rng.gen_range(1..8);
        let eligible: Vec<bool> = (0..n).map(|_| rng.gen_bool(0.4)).collect();
        let (mut sched, _, log) = scheduler(&eligible);
        let mut state = AgentState::default();

        let outcome = sched.tick(&mut (), &mut state);

        assert!(log.borrow().len() <= 1, "at most one execute per tick");
        match eligible.iter().position(|e| *e) {
            Some(first) => {
                assert_eq!(*log.borrow(), vec![format!("t{first}")]);
                assert!(matches!(outcome, TickOutcome::Executed { index, .. } if index == first));
            }
            None => assert_eq!(outcome, TickOutcome::Idle),
        }
    }
}

#[test]
fn test_task_names_in_priority_order() {
    let (sched, _, _) = scheduler(&[true, false, true]);
    assert_eq!(sched.task_names(), vec!["t0", "t1", "t2"]);
    assert_eq!(sched.len(), 3);
}
