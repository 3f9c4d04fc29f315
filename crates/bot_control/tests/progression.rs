//! Whole-agent runs against the simulated client.
//!
//! Each test stocks a depot, runs an agent until it reports a terminal
//! condition and checks that every raw material ended up as finished product.

use std::sync::atomic::AtomicBool;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use bot_control::{Agent, AgentTick, RunSummary};
use bot_core::sim::{SimConfig, SimulatedClient};
use bot_core::test_fixtures::{
    base_constants, pie_agent, quiet_client, tanner_agent, BERRIES, DISH, DOUGH, FLOUR, PIE,
    SHELL, UNCOOKED, WATER,
};
use bot_core::*;

const PIE_DEPOT: [(&str, u32); 4] = [(WATER, 30), (FLOUR, 30), (DISH, 30), (BERRIES, 30)];

fn run_to_end(def: AgentDef, client: &mut SimulatedClient, max_ticks: u64) -> RunSummary {
    let mut agent = Agent::new(def, base_constants());
    agent.run(client, &AtomicBool::new(false), max_ticks)
}

fn assert_all_pies_made(client: &SimulatedClient, summary: &RunSummary) {
    assert_eq!(summary.finished, Some(TerminalReason::OutOfMaterials));
    assert_eq!(client.depot_amount(PIE), 30, "every raw set becomes a pie");
    for leftover in [WATER, FLOUR, DOUGH, DISH, SHELL, BERRIES, UNCOOKED] {
        assert_eq!(client.depot_amount(leftover), 0, "{leftover} left over");
        assert_eq!(client.inventory_amount(leftover), 0, "{leftover} still held");
    }
    assert_eq!(client.notifications().len(), 1);
}

#[test]
fn test_pie_maker_turns_raw_materials_into_pies() {
    let def = pie_agent();
    let mut client = quiet_client(&def, &PIE_DEPOT);

    let summary = run_to_end(def, &mut client, 500);

    assert_all_pies_made(&client, &summary);
    assert_eq!(summary.tally.items_made, 30);
    assert_eq!(summary.tally.intermediates_made, 90);
    assert_eq!(summary.tally.by_label.get("cook"), Some(&30));
    assert_eq!(summary.tally.depot_counts.get(&ItemId::new(WATER)), Some(&0));
}

#[test]
fn test_step_by_step_mode_produces_same_output() {
    let mut def = pie_agent();
    def.mode = ProductionMode::StepByStep;
    let mut client = quiet_client(&def, &PIE_DEPOT);

    let summary = run_to_end(def, &mut client, 500);

    assert_all_pies_made(&client, &summary);
    assert_eq!(summary.tally.items_made, 30);
}

#[test]
fn test_forward_policy_produces_same_output() {
    let mut def = pie_agent();
    def.policy = SelectionPolicy::ForwardWithFallback;
    let mut client = quiet_client(&def, &PIE_DEPOT);

    let summary = run_to_end(def, &mut client, 500);

    assert_all_pies_made(&client, &summary);
}

#[test]
fn test_noisy_client_still_finishes() {
    for seed in 0..5 {
        let def = pie_agent();
        let constants = base_constants();
        let mut client = SimulatedClient::new(SimConfig::default(), constants.inventory_capacity, seed);
        client.register_stages(&def.stages);
        for (item, amount) in PIE_DEPOT {
            client.set_depot(item, amount);
        }

        let summary = run_to_end(def, &mut client, 5_000);

        assert_eq!(
            summary.finished,
            Some(TerminalReason::OutOfMaterials),
            "seed {seed} did not finish in {} ticks",
            summary.ticks
        );
        assert_eq!(client.depot_amount(PIE), 30, "seed {seed}");
    }
}

#[test]
fn test_no_work_after_terminal_notify() {
    let def = pie_agent();
    let mut client = quiet_client(&def, &[(WATER, 3), (FLOUR, 3)]);
    let mut agent = Agent::new(def, base_constants());
    agent.run(&mut client, &AtomicBool::new(false), 100);
    assert!(agent.is_finished());

    let calls_before = client.calls().len();
    for _ in 0..10 {
        assert_eq!(agent.tick(&mut client), AgentTick::Finished);
    }
    assert_eq!(client.calls().len(), calls_before, "finished agent touched the world");
    assert_eq!(client.notifications().len(), 1);
    assert_eq!(client.depot_amount(DOUGH), 3);
}

#[test]
fn test_tanner_keeps_coins_between_trips() {
    let def = tanner_agent();
    let mut client = quiet_client(&def, &[("cowhide", 40)]);
    client.set_inventory("coins", 300);

    let summary = run_to_end(def, &mut client, 200);

    assert_eq!(summary.finished, Some(TerminalReason::OutOfMaterials));
    assert_eq!(client.depot_amount("leather"), 40);
    assert_eq!(client.inventory_amount("coins"), 180);
    assert_eq!(client.depot_amount("coins"), 0, "coins never banked");
    assert_eq!(summary.tally.laps, 2);
}

#[test]
fn test_topping_up_raw_material_regresses_stage() {
    let def = pie_agent();
    let mut client = quiet_client(&def, &[(DOUGH, 10), (DISH, 10)]);
    let mut agent = Agent::new(def, base_constants());
    let stop = AtomicBool::new(false);

    // setup, restock onto the shell stage
    agent.run(&mut client, &stop, 2);
    assert_eq!(agent.stage_name(), "shell");

    client.set_depot(WATER, 5);
    client.set_depot(FLOUR, 5);
    // make shells, then restock: raw material is back
    agent.run(&mut client, &stop, 4);
    assert_eq!(agent.stage_name(), "dough");
}

#[test]
fn test_uneven_stock_yields_min_of_raw_sets() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    for _ in 0..10 {
        let stock: Vec<(&str, u32)> = [WATER, FLOUR, DISH, BERRIES]
            .into_iter()
            .map(|item| (item, rng.gen_range(0..=40)))
            .collect();
        let expected = stock.iter().map(|(_, n)| *n).min().unwrap_or(0);
        let def = pie_agent();
        let mut client = quiet_client(&def, &stock);

        let summary = run_to_end(def, &mut client, 2_000);

        assert_eq!(
            summary.finished,
            Some(TerminalReason::OutOfMaterials),
            "stock {stock:?}"
        );
        assert_eq!(client.depot_amount(PIE), expected, "stock {stock:?}");
        assert_eq!(summary.tally.items_made, u64::from(expected));
    }
}

#[test]
fn test_run_summary_serializes_for_output_files() {
    let def = tanner_agent();
    let mut client = quiet_client(&def, &[("cowhide", 5), ("coins", 15)]);

    let summary = run_to_end(def, &mut client, 100);
    let json = serde_json::to_value(&summary).unwrap();

    assert_eq!(json["agent"], "tanner");
    assert_eq!(json["finished"], "out_of_materials");
    assert_eq!(json["tally"]["items_made"], 5);
    let back: RunSummary = serde_json::from_value(json).unwrap();
    assert_eq!(back, summary);
}
