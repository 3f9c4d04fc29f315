//! Depot visits: deposit, re-derive the stage, withdraw the next batch.

use tracing::{debug, info, warn};

use crate::ports::{depot_snapshot, inventory_snapshot, GameClient, ObserveError};
use crate::stage::{StageMachine, StageTransition};
use crate::task::Task;
use crate::{
    AgentDef, AgentState, BatchPlan, ContainerSnapshot, DepotLocator, ItemId,
    ResourceRequirement, Stage, StageDef, TerminalReason, Timeouts,
};

/// Sizes one batch of `inputs`.
///
/// `depot` and `held` are the quantities in the depot and still in the
/// inventory after depositing (kept items). `free_slots` is the inventory
/// space left after that deposit.
///
/// Non-stackable inputs cost one slot per item; a stackable input costs one
/// slot in total, and only when not already held. Units are bounded by the
/// slots and by `floor((depot + held) / amount)` for each input.
pub fn plan_batch(
    inputs: &[&ResourceRequirement],
    depot: &ContainerSnapshot,
    held: &ContainerSnapshot,
    free_slots: u32,
) -> BatchPlan {
    let new_stacks = inputs
        .iter()
        .filter(|req| req.stackable && !held.contains(&req.item))
        .count() as u32;
    let held_slots: u32 = inputs
        .iter()
        .filter(|req| !req.stackable)
        .map(|req| held.amount(&req.item))
        .sum();
    let slots = (free_slots + held_slots).saturating_sub(new_stacks);
    let slot_cost: u32 = inputs.iter().map(|req| req.slots_per_unit()).sum();
    let by_slots = if slot_cost == 0 {
        if slots > 0 {
            free_slots
        } else {
            0
        }
    } else {
        slots / slot_cost
    };

    let units = inputs
        .iter()
        .filter(|req| req.amount > 0)
        .map(|req| (depot.amount(&req.item) + held.amount(&req.item)) / req.amount)
        .fold(by_slots, u32::min);

    let withdrawals = if units == 0 {
        smallvec::SmallVec::new()
    } else {
        inputs
            .iter()
            .filter_map(|req| {
                let need = (units * req.amount).saturating_sub(held.amount(&req.item));
                (need > 0).then(|| (req.item.clone(), need))
            })
            .collect()
    };

    BatchPlan { units, withdrawals }
}

/// Why a depot visit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestockOutcome {
    OpenFailed,
    DepositFailed,
    Unobservable(ObserveError),
    /// Terminal: nothing left to produce.
    Exhausted,
    /// Terminal: the selected stage cannot fit one unit in the inventory.
    NoSpace,
    /// Left the depot open; the next visit retries from a fresh deposit.
    WithdrawFailed(ItemId),
    Restocked(BatchPlan),
}

/// Banks products, picks the stage from depot stock and withdraws its inputs.
#[derive(Debug, Clone)]
pub struct DepotRestocker {
    machine: StageMachine,
    locator: DepotLocator,
    keep: Vec<ItemId>,
    timeouts: Timeouts,
}

impl DepotRestocker {
    pub fn new(def: &AgentDef, timeouts: Timeouts) -> Self {
        Self {
            machine: StageMachine::for_agent(def),
            locator: def.depot.clone(),
            keep: def.keep.clone(),
            timeouts,
        }
    }

    pub fn machine(&self) -> &StageMachine {
        &self.machine
    }

    /// True when the inventory holds a product to offload or is missing an
    /// input of the current stage.
    pub fn needs_restock<C: GameClient>(&self, client: &C, state: &AgentState) -> bool {
        let Some(def) = self.machine.stage_def(state.stage) else {
            return false;
        };
        let holds_output = [Some(def.result()), self.machine.final_result()]
            .into_iter()
            .flatten()
            .try_fold(false, |acc, item| client.amount(item).map(|n| acc || n > 0));
        let lacks_input = def.inputs().iter().try_fold(false, |acc, req| {
            client.amount(&req.item).map(|n| acc || n < req.amount)
        });
        matches!((holds_output, lacks_input), (Ok(holds), Ok(lacks)) if holds || lacks)
    }

    pub fn run<C: GameClient>(&self, client: &mut C, state: &mut AgentState) -> RestockOutcome {
        if !self.ensure_open(client) {
            return RestockOutcome::OpenFailed;
        }
        if !self.deposit(client) {
            warn!(task = "restock", "deposit was not reflected in the inventory");
            return RestockOutcome::DepositFailed;
        }

        let items = self.machine.required_items();
        let (depot, held) = match read_stock(client, &items) {
            Ok(pair) => pair,
            Err(err) => {
                debug!(task = "restock", %err, "could not read stock");
                return RestockOutcome::Unobservable(err);
            }
        };
        for (item, amount) in depot.iter() {
            state.tally.depot_counts.insert(item.clone(), amount);
        }

        let available = depot.merged(&held);
        if self.machine.transition(state, &available) == StageTransition::Exhausted {
            client.close();
            finish(client, state, TerminalReason::OutOfMaterials);
            return RestockOutcome::Exhausted;
        }
        let Some(def) = self.machine.stage_def(state.stage) else {
            return RestockOutcome::Exhausted;
        };

        let free_slots = match client.free_slots() {
            Ok(free) => free,
            Err(err) => return RestockOutcome::Unobservable(err),
        };
        let plan = plan_batch(&def.inputs(), &depot, &held, free_slots);
        if plan.is_empty() {
            client.close();
            finish(client, state, TerminalReason::NoInventorySpace);
            return RestockOutcome::NoSpace;
        }

        state.activity = format!("Withdrawing for {}", def.name);
        if let Some(item) = self.withdraw(client, &plan, def) {
            return RestockOutcome::WithdrawFailed(item);
        }

        state.tally.laps += 1;
        client.close();
        debug!(task = "restock", units = plan.units, stage = %def.name, "restocked");
        RestockOutcome::Restocked(plan)
    }

    fn ensure_open<C: GameClient>(&self, client: &mut C) -> bool {
        if client.is_open() {
            return true;
        }
        let Some(contact) = client.open(&self.locator) else {
            debug!(task = "restock", "no depot found");
            return false;
        };
        let opened = client.wait_until(
            self.timeouts.depot_open(contact.distance_tiles),
            true,
            |c| c.is_open(),
        );
        if !opened {
            debug!(task = "restock", "depot did not open in time");
        }
        opened
    }

    /// Deposits everything except the keep set, then waits for the slots to clear.
    fn deposit<C: GameClient>(&self, client: &mut C) -> bool {
        let kept_slots: u32 = self
            .keep
            .iter()
            .map(|item| {
                let held = client.amount(item).unwrap_or(0);
                if held > 0 && self.stacks(item) {
                    1
                } else {
                    held
                }
            })
            .sum();
        if !client.deposit_all(&self.keep) {
            return false;
        }
        let expected = client.capacity_slots().saturating_sub(kept_slots);
        client.wait_until(self.timeouts.deposit(), true, |c| {
            c.free_slots().is_ok_and(|free| free >= expected)
        })
    }

    /// Whether `item` is declared stackable by any stage input.
    fn stacks(&self, item: &ItemId) -> bool {
        self.machine
            .stages()
            .iter()
            .flat_map(StageDef::inputs)
            .any(|req| req.stackable && &req.item == item)
    }

    /// Withdraws each planned input in order and returns the first that failed.
    fn withdraw<C: GameClient>(
        &self,
        client: &mut C,
        plan: &BatchPlan,
        def: &StageDef,
    ) -> Option<ItemId> {
        for (item, amount) in &plan.withdrawals {
            let before = client.amount(item).unwrap_or(0);
            let target = before + amount;
            let reflected = client.withdraw(item, *amount)
                && client.wait_until(self.timeouts.withdraw(), true, |c| {
                    c.amount(item).is_ok_and(|held| held >= target)
                });
            if !reflected {
                warn!(task = "restock", %item, amount, stage = %def.name, "withdrawal failed");
                return Some(item.clone());
            }
        }
        None
    }
}

fn read_stock<C: GameClient>(
    client: &C,
    items: &[ItemId],
) -> Result<(ContainerSnapshot, ContainerSnapshot), ObserveError> {
    Ok((depot_snapshot(client, items)?, inventory_snapshot(client, items)?))
}

fn finish<C: GameClient>(client: &mut C, state: &mut AgentState, reason: TerminalReason) {
    if state.finished.is_some() {
        return;
    }
    info!(task = "restock", %reason, laps = state.tally.laps, "finished");
    state.activity = format!("Finished: {reason}");
    state.finished = Some(reason);
    client.notify(reason, &state.tally);
}

impl<C: GameClient> Task<C> for DepotRestocker {
    fn name(&self) -> &str {
        "restock"
    }

    fn activate(&self, client: &C, state: &AgentState) -> bool {
        state.stage != Stage::Setup && !state.is_finished() && self.needs_restock(client, state)
    }

    fn execute(&mut self, client: &mut C, state: &mut AgentState) {
        state.activity = "Restocking".to_string();
        self.run(client, state);
    }
}
