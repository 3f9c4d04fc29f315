use super::*;
use crate::sim::SimulatedClient;
use crate::test_fixtures::{
    base_constants, combine_stage, pie_agent, quiet_client, tanner_agent, BERRIES, DISH, DOUGH,
    FLOUR, PIE, SHELL, UNCOOKED, WATER,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

mod scheduler;

// --- Shared test helpers ------------------------------------------------

fn item(id: &str) -> ItemId {
    ItemId::new(id)
}

fn depot(pairs: &[(&str, u32)]) -> ContainerSnapshot {
    ContainerSnapshot::from_pairs(Container::Depot, pairs.iter().copied())
}

fn held(pairs: &[(&str, u32)]) -> ContainerSnapshot {
    ContainerSnapshot::from_pairs(Container::Inventory, pairs.iter().copied())
}

fn at_stage(idx: usize) -> AgentState {
    AgentState {
        stage: Stage::Production(idx),
        ..AgentState::default()
    }
}

/// Pipeline for the pie maker's first stage: water used on flour.
fn dough_pipeline() -> CombinePipeline {
    match &pie_agent().stages[0].action {
        StageAction::Combine(spec) => CombinePipeline::new(spec.clone(), Timeouts::default()),
        StageAction::Finish(_) => unreachable!("dough is a combine stage"),
    }
}

fn pie_client_with_inventory(pairs: &[(&str, u32)]) -> SimulatedClient {
    let mut client = quiet_client(&pie_agent(), &[]);
    for (id, amount) in pairs {
        client.set_inventory(id, *amount);
    }
    client
}

fn make_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}
