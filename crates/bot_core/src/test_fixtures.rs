//! Shared test fixtures for bot_core and downstream crates.
//!
//! `pie_agent()` is a four-stage redberry pie maker (dough, shell, filling,
//! cooking). `tanner_agent()` is a single-stage agent with a stackable,
//! kept currency input.

use crate::sim::{SimConfig, SimulatedClient};
use crate::{
    AgentDef, AgentId, Constants, DepotLocator, FinishSpec, ItemId, PipelineSpec,
    ProductionMode, ResourceRequirement, SelectionPolicy, StageAction, StageDef, StageId,
    Timeouts, YieldKind,
};

pub const FLOUR: &str = "pot_of_flour";
pub const WATER: &str = "jug_of_water";
pub const DOUGH: &str = "pastry_dough";
pub const DISH: &str = "pie_dish";
pub const SHELL: &str = "pie_shell";
pub const BERRIES: &str = "redberries";
pub const UNCOOKED: &str = "uncooked_berry_pie";
pub const PIE: &str = "redberry_pie";

pub fn combine_stage(
    id: &str,
    primary: ResourceRequirement,
    secondary: ResourceRequirement,
    result: &str,
    yield_kind: YieldKind,
) -> StageDef {
    StageDef {
        id: StageId::new(id),
        name: id.to_string(),
        action: StageAction::Combine(PipelineSpec {
            primary,
            secondary,
            result: ItemId::new(result),
            label: id.to_string(),
            yield_kind,
        }),
    }
}

pub fn pie_stages() -> Vec<StageDef> {
    vec![
        combine_stage(
            "dough",
            ResourceRequirement::new(WATER, 1),
            ResourceRequirement::new(FLOUR, 1),
            DOUGH,
            YieldKind::Intermediate,
        ),
        combine_stage(
            "shell",
            ResourceRequirement::new(DOUGH, 1),
            ResourceRequirement::new(DISH, 1),
            SHELL,
            YieldKind::Intermediate,
        ),
        combine_stage(
            "filling",
            ResourceRequirement::new(BERRIES, 1),
            ResourceRequirement::new(SHELL, 1),
            UNCOOKED,
            YieldKind::Intermediate,
        ),
        StageDef {
            id: StageId::new("cook"),
            name: "cook".to_string(),
            action: StageAction::Finish(FinishSpec {
                input: ResourceRequirement::new(UNCOOKED, 1),
                station: "Range".to_string(),
                result: ItemId::new(PIE),
                label: "cook".to_string(),
                yield_kind: YieldKind::Product,
            }),
        },
    ]
}

pub fn pie_agent() -> AgentDef {
    AgentDef {
        id: AgentId::new("pie_maker"),
        name: "Pie Maker".to_string(),
        stages: pie_stages(),
        depot: DepotLocator::default(),
        keep: vec![],
        policy: SelectionPolicy::EarliestFirst,
        mode: ProductionMode::AllInOne,
        start_stage: None,
    }
}

pub fn tanner_agent() -> AgentDef {
    AgentDef {
        id: AgentId::new("tanner"),
        name: "Tanner".to_string(),
        stages: vec![combine_stage(
            "tan",
            ResourceRequirement::new("cowhide", 1),
            ResourceRequirement::stackable("coins", 3),
            "leather",
            YieldKind::Product,
        )],
        depot: DepotLocator::default(),
        keep: vec![ItemId::new("coins")],
        policy: SelectionPolicy::EarliestFirst,
        mode: ProductionMode::StepByStep,
        start_stage: None,
    }
}

/// Default timeouts, 28-slot inventory, noise-free simulation.
pub fn base_constants() -> Constants {
    Constants {
        inventory_capacity: 28,
        idle_backoff_ms: 100,
        timeouts: Timeouts::default(),
        sim: SimConfig::deterministic(),
    }
}

/// A noise-free client that knows `def`'s recipes, with `depot` pre-stocked.
pub fn quiet_client(def: &AgentDef, depot: &[(&str, u32)]) -> SimulatedClient {
    let constants = base_constants();
    let mut client = SimulatedClient::new(constants.sim, constants.inventory_capacity, 0);
    client.register_stages(&def.stages);
    for (item, amount) in depot {
        client.set_depot(item, *amount);
    }
    client
}
