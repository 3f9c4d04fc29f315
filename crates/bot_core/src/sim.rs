//! In-memory game client.
//!
//! Implements every capability trait over item maps and a simulated clock
//! that only moves inside `wait_until` and `pause`. Production consumes one
//! unit of inputs every `unit_ms` until an input runs out. Noise (failed
//! actions, poll jitter) comes from a seeded `ChaCha8Rng`, so a run is fully
//! determined by its seed.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ports::{
    DepotContact, DepotView, InventoryView, Notifier, ObserveError, Poller,
    PromptKind, PromptView, UseTarget,
};
use crate::{
    Container, DepotLocator, ItemId, StageAction, StageDef, Tally, TerminalReason,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Clock step of a non-humanized poll.
    pub poll_ms: u64,
    /// Time to produce one unit of output.
    pub unit_ms: u64,
    /// Probability that any single UI action is ignored.
    pub failure_rate: f64,
    /// Extra random delay, up to this much, added to humanized polls.
    pub jitter_ms: u64,
    pub depot_distance_tiles: f64,
    pub walk_ms_per_tile: u64,
    pub depot_name: String,
    pub depot_actions: Vec<String>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            poll_ms: 50,
            unit_ms: 600,
            failure_rate: 0.02,
            jitter_ms: 40,
            depot_distance_tiles: 6.0,
            walk_ms_per_tile: 600,
            depot_name: "Bank booth".to_string(),
            depot_actions: vec!["Bank".to_string(), "Collect".to_string()],
        }
    }
}

impl SimConfig {
    /// No failed actions and no jitter.
    pub fn deterministic() -> Self {
        Self {
            failure_rate: 0.0,
            jitter_ms: 0,
            ..Self::default()
        }
    }
}

/// Switches that make the client misbehave in specific ways.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub inventory_hidden: bool,
    pub refuse_select: bool,
    pub refuse_use: bool,
    /// The prompt never appears after a valid use.
    pub suppress_prompt: bool,
    /// Prompt options list their words in reverse order.
    pub reversed_option_names: bool,
    pub refuse_deposit: bool,
    pub refuse_withdraw: Option<ItemId>,
    /// Withdrawals report success but move nothing.
    pub silent_withdraw: bool,
    pub no_depot_in_range: bool,
}

/// Every capability call that changes the world, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    Select(ItemId),
    Deselect,
    UseOn(UseTarget),
    Confirm(ItemId),
    OpenDepot,
    CloseDepot,
    DepositAll,
    Withdraw(ItemId, u32),
}

#[derive(Debug, Clone)]
struct SimRecipe {
    select: ItemId,
    target: UseTarget,
    inputs: Vec<(ItemId, u32)>,
    result: ItemId,
}

#[derive(Debug, Clone, Copy)]
struct Production {
    recipe: usize,
    next_unit_ms: u64,
}

pub struct SimulatedClient {
    config: SimConfig,
    rng: ChaCha8Rng,
    clock_ms: u64,
    capacity: u32,
    inventory: BTreeMap<ItemId, u32>,
    depot: BTreeMap<ItemId, u32>,
    stackable: BTreeSet<ItemId>,
    recipes: Vec<SimRecipe>,
    selected: Option<ItemId>,
    prompt: Option<usize>,
    production: Option<Production>,
    depot_open: bool,
    arrival_ms: Option<u64>,
    pub faults: Faults,
    calls: Vec<SimCall>,
    notifications: Vec<(TerminalReason, Tally)>,
}

impl SimulatedClient {
    pub fn new(config: SimConfig, capacity: u32, seed: u64) -> Self {
        Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(seed),
            clock_ms: 0,
            capacity,
            inventory: BTreeMap::new(),
            depot: BTreeMap::new(),
            stackable: BTreeSet::new(),
            recipes: Vec::new(),
            selected: None,
            prompt: None,
            production: None,
            depot_open: false,
            arrival_ms: None,
            faults: Faults::default(),
            calls: Vec::new(),
            notifications: Vec::new(),
        }
    }

    /// Teaches the client how each stage's inputs combine and which inputs stack.
    pub fn register_stages(&mut self, stages: &[StageDef]) {
        for stage in stages {
            for input in stage.inputs() {
                if input.stackable {
                    self.stackable.insert(input.item.clone());
                }
            }
            let recipe = match &stage.action {
                StageAction::Combine(spec) => SimRecipe {
                    select: spec.primary.item.clone(),
                    target: UseTarget::Item(spec.secondary.item.clone()),
                    inputs: vec![
                        (spec.primary.item.clone(), spec.primary.amount),
                        (spec.secondary.item.clone(), spec.secondary.amount),
                    ],
                    result: spec.result.clone(),
                },
                StageAction::Finish(spec) => SimRecipe {
                    select: spec.input.item.clone(),
                    target: UseTarget::Station(spec.station.clone()),
                    inputs: vec![(spec.input.item.clone(), spec.input.amount)],
                    result: spec.result.clone(),
                },
            };
            self.recipes.push(recipe);
        }
    }

    pub fn set_inventory(&mut self, item: &str, amount: u32) {
        set_amount(&mut self.inventory, ItemId::new(item), amount);
    }

    pub fn set_depot(&mut self, item: &str, amount: u32) {
        set_amount(&mut self.depot, ItemId::new(item), amount);
    }

    pub fn inventory_amount(&self, item: &str) -> u32 {
        self.inventory.get(&ItemId::new(item)).copied().unwrap_or(0)
    }

    pub fn depot_amount(&self, item: &str) -> u32 {
        self.depot.get(&ItemId::new(item)).copied().unwrap_or(0)
    }

    pub fn depot_contents(&self) -> &BTreeMap<ItemId, u32> {
        &self.depot
    }

    pub fn clock_ms(&self) -> u64 {
        self.clock_ms
    }

    pub fn calls(&self) -> &[SimCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// The withdraw calls made so far, in order.
    pub fn withdrawals(&self) -> Vec<(ItemId, u32)> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                SimCall::Withdraw(item, amount) => Some((item.clone(), *amount)),
                _ => None,
            })
            .collect()
    }

    pub fn notifications(&self) -> &[(TerminalReason, Tally)] {
        &self.notifications
    }

    /// Opens the depot immediately, skipping the walk.
    pub fn force_depot_open(&mut self) {
        self.depot_open = true;
        self.arrival_ms = None;
    }

    fn used_slots(&self) -> u32 {
        self.inventory
            .iter()
            .map(|(item, amount)| {
                if self.stackable.contains(item) {
                    u32::from(*amount > 0)
                } else {
                    *amount
                }
            })
            .sum()
    }

    fn free(&self) -> u32 {
        self.capacity.saturating_sub(self.used_slots())
    }

    fn flaky(&mut self) -> bool {
        let rate = self.config.failure_rate.clamp(0.0, 1.0);
        rate > 0.0 && self.rng.gen_bool(rate)
    }

    fn option_label(&self, item: &ItemId) -> String {
        let mut words: Vec<&str> = item.0.split('_').filter(|w| !w.is_empty()).collect();
        if self.faults.reversed_option_names {
            words.reverse();
        }
        words.join(" ")
    }

    fn advance(&mut self, ms: u64) {
        self.clock_ms += ms;
        if self.arrival_ms.is_some_and(|at| at <= self.clock_ms) {
            self.arrival_ms = None;
            self.depot_open = true;
        }
        while let Some(mut production) = self.production {
            if production.next_unit_ms > self.clock_ms {
                break;
            }
            if !self.produce_unit(production.recipe) {
                self.production = None;
                break;
            }
            production.next_unit_ms += self.config.unit_ms.max(1);
            self.production = Some(production);
        }
    }

    fn produce_unit(&mut self, recipe: usize) -> bool {
        let Some(recipe) = self.recipes.get(recipe) else {
            return false;
        };
        let enough = recipe
            .inputs
            .iter()
            .all(|(item, amount)| self.inventory.get(item).copied().unwrap_or(0) >= *amount);
        if !enough {
            return false;
        }
        let (inputs, result) = (recipe.inputs.clone(), recipe.result.clone());
        for (item, amount) in inputs {
            let held = self.inventory.get(&item).copied().unwrap_or(0);
            set_amount(&mut self.inventory, item, held - amount);
        }
        *self.inventory.entry(result).or_insert(0) += 1;
        true
    }
}

fn set_amount(map: &mut BTreeMap<ItemId, u32>, item: ItemId, amount: u32) {
    if amount == 0 {
        map.remove(&item);
    } else {
        map.insert(item, amount);
    }
}

// ---------------------------------------------------------------------------
// Capability impls
// ---------------------------------------------------------------------------

impl InventoryView for SimulatedClient {
    fn amount(&self, item: &ItemId) -> Result<u32, ObserveError> {
        if self.faults.inventory_hidden {
            return Err(ObserveError::NotVisible {
                container: Container::Inventory,
            });
        }
        Ok(self.inventory.get(item).copied().unwrap_or(0))
    }

    fn capacity_slots(&self) -> u32 {
        self.capacity
    }

    fn free_slots(&self) -> Result<u32, ObserveError> {
        if self.faults.inventory_hidden {
            return Err(ObserveError::NotVisible {
                container: Container::Inventory,
            });
        }
        Ok(self.free())
    }

    fn select(&mut self, item: &ItemId) -> bool {
        self.calls.push(SimCall::Select(item.clone()));
        if self.faults.refuse_select || !self.inventory.contains_key(item) || self.flaky() {
            return false;
        }
        self.selected = Some(item.clone());
        true
    }

    fn deselect(&mut self) -> bool {
        self.calls.push(SimCall::Deselect);
        self.selected = None;
        true
    }

    fn use_selected_on(&mut self, target: &UseTarget) -> bool {
        self.calls.push(SimCall::UseOn(target.clone()));
        let Some(selected) = self.selected.take() else {
            return false;
        };
        if self.faults.refuse_use || self.flaky() {
            return false;
        }
        if let UseTarget::Item(item) = target {
            if !self.inventory.contains_key(item) {
                return false;
            }
        }
        let Some(recipe) = self
            .recipes
            .iter()
            .position(|r| r.select == selected && &r.target == target)
        else {
            return false;
        };
        if !self.faults.suppress_prompt {
            self.prompt = Some(recipe);
        }
        true
    }
}

impl DepotView for SimulatedClient {
    fn is_open(&self) -> bool {
        self.depot_open
    }

    fn open(&mut self, locator: &DepotLocator) -> Option<DepotContact> {
        self.calls.push(SimCall::OpenDepot);
        if self.faults.no_depot_in_range
            || !locator.matches(&self.config.depot_name, &self.config.depot_actions)
            || self.flaky()
        {
            return None;
        }
        if self.depot_open {
            return Some(DepotContact {
                distance_tiles: 0.0,
            });
        }
        let distance = self.config.depot_distance_tiles.max(0.0);
        let walk = (distance * self.config.walk_ms_per_tile as f64) as u64;
        self.prompt = None;
        self.production = None;
        self.arrival_ms = Some(self.clock_ms + walk);
        Some(DepotContact {
            distance_tiles: distance,
        })
    }

    fn close(&mut self) {
        self.calls.push(SimCall::CloseDepot);
        self.depot_open = false;
        self.arrival_ms = None;
    }

    fn deposit_all(&mut self, keep: &[ItemId]) -> bool {
        self.calls.push(SimCall::DepositAll);
        if !self.depot_open || self.faults.refuse_deposit || self.flaky() {
            return false;
        }
        let (kept, banked): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.inventory)
            .into_iter()
            .partition(|(item, _)| keep.contains(item));
        self.inventory = kept;
        for (item, amount) in banked {
            *self.depot.entry(item).or_insert(0) += amount;
        }
        true
    }

    fn withdraw(&mut self, item: &ItemId, amount: u32) -> bool {
        self.calls.push(SimCall::Withdraw(item.clone(), amount));
        if !self.depot_open
            || self.faults.refuse_withdraw.as_ref() == Some(item)
            || self.flaky()
        {
            return false;
        }
        if self.faults.silent_withdraw {
            return true;
        }
        let stock = self.depot.get(item).copied().unwrap_or(0);
        let room = if self.stackable.contains(item) {
            if self.inventory.contains_key(item) || self.free() > 0 {
                u32::MAX
            } else {
                0
            }
        } else {
            self.free()
        };
        let moved = amount.min(stock).min(room);
        if moved == 0 {
            return false;
        }
        set_amount(&mut self.depot, item.clone(), stock - moved);
        *self.inventory.entry(item.clone()).or_insert(0) += moved;
        true
    }

    fn stock(&self, item: &ItemId) -> Result<u32, ObserveError> {
        if !self.depot_open {
            return Err(ObserveError::NotVisible {
                container: Container::Depot,
            });
        }
        Ok(self.depot.get(item).copied().unwrap_or(0))
    }
}

impl PromptView for SimulatedClient {
    fn current_prompt(&self) -> PromptKind {
        if self.prompt.is_some() {
            PromptKind::ItemOption
        } else {
            PromptKind::None
        }
    }

    fn prompt_options(&self) -> Vec<String> {
        let Some(open) = self.prompt.and_then(|idx| self.recipes.get(idx)) else {
            return Vec::new();
        };
        self.recipes
            .iter()
            .filter(|r| r.select == open.select && r.target == open.target)
            .map(|r| self.option_label(&r.result))
            .collect()
    }

    fn confirm_option(&mut self, index: usize) -> bool {
        let Some(open) = self.prompt.and_then(|idx| self.recipes.get(idx)) else {
            return false;
        };
        let Some(recipe) = self
            .recipes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.select == open.select && r.target == open.target)
            .nth(index)
            .map(|(idx, _)| idx)
        else {
            return false;
        };
        let result = self.recipes[recipe].result.clone();
        self.calls.push(SimCall::Confirm(result));
        if self.flaky() {
            return false;
        }
        self.prompt = None;
        self.production = Some(Production {
            recipe,
            next_unit_ms: self.clock_ms + self.config.unit_ms.max(1),
        });
        true
    }
}

impl Poller for SimulatedClient {
    fn wait_until<F>(&mut self, timeout: Duration, humanized: bool, mut condition: F) -> bool
    where
        F: FnMut(&Self) -> bool,
    {
        let deadline = self.clock_ms + timeout.as_millis() as u64;
        loop {
            if condition(self) {
                return true;
            }
            if self.clock_ms >= deadline {
                return false;
            }
            let mut step = self.config.poll_ms.max(1);
            if humanized && self.config.jitter_ms > 0 {
                step += self.rng.gen_range(0..=self.config.jitter_ms);
            }
            self.advance(step.min(deadline - self.clock_ms));
        }
    }

    fn pause(&mut self, duration: Duration) {
        self.advance(duration.as_millis() as u64);
    }
}

impl Notifier for SimulatedClient {
    fn notify(&mut self, reason: TerminalReason, tally: &Tally) {
        info!(%reason, items_made = tally.items_made, laps = tally.laps, "agent finished");
        self.notifications.push((reason, tally.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> SimulatedClient {
        SimulatedClient::new(SimConfig::deterministic(), 28, 0)
    }

    #[test]
    fn test_wait_until_is_bounded_by_timeout() {
        let mut sim = client();
        let met = sim.wait_until(Duration::from_millis(1_000), true, |_| false);
        assert!(!met);
        assert_eq!(sim.clock_ms(), 1_000, "clock should stop at the deadline");
    }

    #[test]
    fn test_depot_opens_after_walking() {
        let mut sim = client();
        let contact = sim.open(&DepotLocator::default()).expect("depot in range");
        assert!(!sim.is_open(), "walking first");
        let walk = (contact.distance_tiles * 600.0) as u64;
        assert!(sim.wait_until(Duration::from_millis(walk + 100), false, |c| c.is_open()));
        assert!(sim.clock_ms() >= walk);
    }

    #[test]
    fn test_stock_unreadable_while_depot_closed() {
        let sim = client();
        assert!(matches!(
            sim.stock(&ItemId::new("flour")),
            Err(ObserveError::NotVisible {
                container: Container::Depot
            })
        ));
    }

    #[test]
    fn test_stackable_items_use_one_slot() {
        let mut sim = client();
        sim.stackable.insert(ItemId::new("coins"));
        sim.set_inventory("coins", 5_000);
        sim.set_inventory("cowhide", 3);
        assert_eq!(sim.free_slots(), Ok(24));
    }

    #[test]
    fn test_withdraw_limited_by_free_slots() {
        let mut sim = client();
        sim.set_depot("cowhide", 100);
        sim.force_depot_open();
        assert!(sim.withdraw(&ItemId::new("cowhide"), 50));
        assert_eq!(sim.inventory_amount("cowhide"), 28);
        assert_eq!(sim.depot_amount("cowhide"), 72);
    }

    #[test]
    fn test_reversed_option_names_fault() {
        let mut sim = client();
        let item = ItemId::new("uncooked_berry_pie");
        assert_eq!(sim.option_label(&item), "uncooked berry pie");
        sim.faults.reversed_option_names = true;
        assert_eq!(sim.option_label(&item), "pie berry uncooked");
    }
}
