//! Type definitions for `bot_core`.
//!
//! Item and stage identifiers, the immutable production configuration
//! (`PipelineSpec`, `StageDef`, `AgentDef`), derived values (`ContainerSnapshot`,
//! `BatchPlan`) and the per-agent mutable state (`AgentState`, `Tally`).

use std::collections::BTreeMap;
use std::time::Duration;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::sim::SimConfig;

// ---------------------------------------------------------------------------
// ID newtypes
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(ItemId);
string_id!(StageId);
string_id!(AgentId);

// ---------------------------------------------------------------------------
// Core enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Container {
    Inventory,
    Depot,
}

impl std::fmt::Display for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Container::Inventory => f.write_str("inventory"),
            Container::Depot => f.write_str("depot"),
        }
    }
}

/// Which tally a pipeline's yield counts toward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldKind {
    #[default]
    Product,
    Intermediate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Always restart from the earliest satisfiable stage.
    #[default]
    EarliestFirst,
    /// Stay on the current stage while it is satisfiable, then move forward,
    /// and only fall back to earlier stages when nothing later is satisfiable.
    ForwardWithFallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductionMode {
    /// Every stage at or after the current one is registered.
    #[default]
    AllInOne,
    /// Only the current stage is registered.
    StepByStep,
}

/// The agent's position in its production sequence.
///
/// `Setup` sorts before every production stage; production stages sort by
/// their index in `AgentDef::stages`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Setup,
    Production(usize),
}

impl Stage {
    pub fn index(self) -> Option<usize> {
        match self {
            Stage::Setup => None,
            Stage::Production(idx) => Some(idx),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// No stage's inputs remain in the depot.
    OutOfMaterials,
    /// A stage is satisfiable but one unit of it does not fit the inventory.
    NoInventorySpace,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalReason::OutOfMaterials => f.write_str("out of materials"),
            TerminalReason::NoInventorySpace => f.write_str("no inventory space"),
        }
    }
}

// ---------------------------------------------------------------------------
// Production configuration
// ---------------------------------------------------------------------------

/// How much of an item one unit of output consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    pub item: ItemId,
    pub amount: u32,
    /// Stackable items occupy a single inventory slot regardless of quantity.
    #[serde(default)]
    pub stackable: bool,
}

impl ResourceRequirement {
    pub fn new(item: impl Into<String>, amount: u32) -> Self {
        Self {
            item: ItemId::new(item),
            amount,
            stackable: false,
        }
    }

    pub fn stackable(item: impl Into<String>, amount: u32) -> Self {
        Self {
            item: ItemId::new(item),
            amount,
            stackable: true,
        }
    }

    /// Inventory slots one unit of output costs for this input.
    pub fn slots_per_unit(&self) -> u32 {
        if self.stackable {
            0
        } else {
            self.amount
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Selected first and used on `secondary`.
    pub primary: ResourceRequirement,
    pub secondary: ResourceRequirement,
    pub result: ItemId,
    pub label: String,
    #[serde(default)]
    pub yield_kind: YieldKind,
}

/// Terminal stage: a single input used on a named station (a range, a furnace).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishSpec {
    pub input: ResourceRequirement,
    pub station: String,
    pub result: ItemId,
    pub label: String,
    #[serde(default)]
    pub yield_kind: YieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageAction {
    Combine(PipelineSpec),
    Finish(FinishSpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDef {
    pub id: StageId,
    pub name: String,
    pub action: StageAction,
}

impl StageDef {
    pub fn inputs(&self) -> SmallVec<[&ResourceRequirement; 2]> {
        match &self.action {
            StageAction::Combine(spec) => smallvec::smallvec![&spec.primary, &spec.secondary],
            StageAction::Finish(spec) => smallvec::smallvec![&spec.input],
        }
    }

    pub fn result(&self) -> &ItemId {
        match &self.action {
            StageAction::Combine(spec) => &spec.result,
            StageAction::Finish(spec) => &spec.result,
        }
    }

    pub fn label(&self) -> &str {
        match &self.action {
            StageAction::Combine(spec) => &spec.label,
            StageAction::Finish(spec) => &spec.label,
        }
    }

    /// Inventory slots one unit of this stage's output costs in inputs.
    pub fn slots_per_unit(&self) -> u32 {
        self.inputs().iter().map(|r| r.slots_per_unit()).sum()
    }
}

/// Case-insensitive whitelist used to pick a depot object in the world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepotLocator {
    pub names: Vec<String>,
    pub actions: Vec<String>,
}

impl DepotLocator {
    pub fn matches(&self, name: &str, actions: &[String]) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
            && actions
                .iter()
                .any(|a| self.actions.iter().any(|wanted| wanted.eq_ignore_ascii_case(a)))
    }
}

impl Default for DepotLocator {
    fn default() -> Self {
        Self {
            names: ["Bank", "Bank booth", "Bank chest", "Bank counter"]
                .map(String::from)
                .to_vec(),
            actions: ["bank", "open", "use"].map(String::from).to_vec(),
        }
    }
}

/// Immutable definition of one bot: its ordered stages and depot behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentDef {
    pub id: AgentId,
    pub name: String,
    /// Order matters: it is both the production order and the selection precedence.
    pub stages: Vec<StageDef>,
    #[serde(default)]
    pub depot: DepotLocator,
    /// Items left in the inventory when depositing.
    #[serde(default)]
    pub keep: Vec<ItemId>,
    #[serde(default)]
    pub policy: SelectionPolicy,
    #[serde(default)]
    pub mode: ProductionMode,
    #[serde(default)]
    pub start_stage: Option<StageId>,
}

impl AgentDef {
    pub fn stage_index(&self, id: &StageId) -> Option<usize> {
        self.stages.iter().position(|s| &s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Bounded-wait budgets, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub prompt_ms: u64,
    pub prompt_settle_ms: u64,
    pub confirm_settle_ms: u64,
    pub production_ms: u64,
    pub deposit_ms: u64,
    pub withdraw_ms: u64,
    pub depot_open_base_ms: u64,
    pub depot_open_per_tile_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            prompt_ms: 3_000,
            prompt_settle_ms: 600,
            confirm_settle_ms: 1_200,
            production_ms: 60_000,
            deposit_ms: 3_000,
            withdraw_ms: 3_000,
            depot_open_base_ms: 500,
            depot_open_per_tile_ms: 1_000,
        }
    }
}

impl Timeouts {
    pub fn prompt(&self) -> Duration {
        Duration::from_millis(self.prompt_ms)
    }

    pub fn prompt_settle(&self) -> Duration {
        Duration::from_millis(self.prompt_settle_ms)
    }

    pub fn confirm_settle(&self) -> Duration {
        Duration::from_millis(self.confirm_settle_ms)
    }

    pub fn production(&self) -> Duration {
        Duration::from_millis(self.production_ms)
    }

    pub fn deposit(&self) -> Duration {
        Duration::from_millis(self.deposit_ms)
    }

    pub fn withdraw(&self) -> Duration {
        Duration::from_millis(self.withdraw_ms)
    }

    /// Opening a depot means walking to it first; farther depots get longer.
    pub fn depot_open(&self, distance_tiles: f64) -> Duration {
        let walk = (distance_tiles.max(0.0) * self.depot_open_per_tile_ms as f64) as u64;
        Duration::from_millis(self.depot_open_base_ms + walk)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Constants {
    pub inventory_capacity: u32,
    /// How long the agent loop sleeps after a tick where no task was eligible.
    pub idle_backoff_ms: u64,
    #[serde(default)]
    pub timeouts: Timeouts,
    /// Behavior of the simulated client the binaries run against.
    #[serde(default)]
    pub sim: SimConfig,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            inventory_capacity: 28,
            idle_backoff_ms: 100,
            timeouts: Timeouts::default(),
            sim: SimConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived values
// ---------------------------------------------------------------------------

/// Point-in-time read of item quantities in one container. Never cached across ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    pub container: Container,
    amounts: AHashMap<ItemId, u32>,
}

impl ContainerSnapshot {
    pub fn new(container: Container) -> Self {
        Self {
            container,
            amounts: AHashMap::new(),
        }
    }

    pub fn from_pairs<'a>(
        container: Container,
        pairs: impl IntoIterator<Item = (&'a str, u32)>,
    ) -> Self {
        let mut snapshot = Self::new(container);
        for (item, amount) in pairs {
            snapshot.set(ItemId::new(item), amount);
        }
        snapshot
    }

    pub fn set(&mut self, item: ItemId, amount: u32) {
        self.amounts.insert(item, amount);
    }

    pub fn amount(&self, item: &ItemId) -> u32 {
        self.amounts.get(item).copied().unwrap_or(0)
    }

    pub fn contains(&self, item: &ItemId) -> bool {
        self.amount(item) > 0
    }

    /// Adds `other`'s quantities into a copy of `self`.
    pub fn merged(&self, other: &ContainerSnapshot) -> ContainerSnapshot {
        let mut merged = self.clone();
        for (item, amount) in &other.amounts {
            let entry = merged.amounts.entry(item.clone()).or_insert(0);
            *entry = entry.saturating_add(*amount);
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemId, u32)> {
        self.amounts.iter().map(|(item, amount)| (item, *amount))
    }
}

/// What one restock withdraws: `units` of output worth of inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub units: u32,
    /// Withdrawals in stage-input order; inputs already held in full are omitted.
    pub withdrawals: SmallVec<[(ItemId, u32); 2]>,
}

impl BatchPlan {
    pub fn is_empty(&self) -> bool {
        self.units == 0
    }
}

// ---------------------------------------------------------------------------
// Agent state
// ---------------------------------------------------------------------------

/// Cumulative counters, written only by the task that is currently executing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    pub items_made: u64,
    pub intermediates_made: u64,
    pub by_label: BTreeMap<String, u64>,
    /// Completed restock cycles.
    pub laps: u64,
    /// Depot stock observed at the last visit, for every stage input.
    pub depot_counts: BTreeMap<ItemId, u32>,
}

impl Tally {
    pub fn record_yield(&mut self, label: &str, kind: YieldKind, count: u32) {
        let count = u64::from(count);
        match kind {
            YieldKind::Product => self.items_made += count,
            YieldKind::Intermediate => self.intermediates_made += count,
        }
        *self.by_label.entry(label.to_string()).or_insert(0) += count;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentState {
    pub stage: Stage,
    /// Human-readable description of what the agent is doing.
    pub activity: String,
    pub tally: Tally,
    pub finished: Option<TerminalReason>,
    /// Set by a task that changed what the task list should contain.
    pub rebuild_requested: bool,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            stage: Stage::Setup,
            activity: "Starting...".to_string(),
            tally: Tally::default(),
            finished: None,
            rebuild_requested: false,
        }
    }
}

impl AgentState {
    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }
}
