use anyhow::{Context, Result};
use bot_control::{Agent, RunSummary};
use bot_core::{AgentDef, ItemId};
use bot_world::Content;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use uuid::Uuid;

/// Everything shared by the seeds of one scenario.
pub struct RunPlan<'a> {
    pub content: &'a Content,
    pub def: &'a AgentDef,
    pub stock: &'a [(ItemId, u32)],
    pub max_ticks: u64,
    pub scenario_name: &'a str,
    pub scenario_params: &'a serde_json::Value,
}

pub struct SeedResult {
    pub seed: u64,
    pub summary: RunSummary,
    /// Simulated time the agent spent, in milliseconds.
    pub sim_ms: u64,
    #[allow(dead_code)]
    pub wall_time_ms: u64,
    pub run_id: String,
}

#[derive(Debug, Serialize)]
struct RunResult<'a> {
    run_schema_version: u32,
    run_status: &'static str,
    run_id: &'a str,
    seed: u64,
    scenario_name: &'a str,
    scenario_params: &'a serde_json::Value,
    wall_time_ms: u64,
    sim_ms: u64,
    summary: &'a RunSummary,
}

impl RunResult<'_> {
    fn write_atomic(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self).context("serializing run result")?;
        let mut file = std::fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("writing {}", tmp.display()))?;
        file.sync_all()?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("renaming {} to {}", tmp.display(), path.display()))?;
        Ok(())
    }
}

pub fn run_seed(plan: &RunPlan<'_>, seed: u64, seed_dir: &Path) -> Result<SeedResult> {
    let run_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    std::fs::create_dir_all(seed_dir)
        .with_context(|| format!("creating seed directory: {}", seed_dir.display()))?;

    bot_world::write_run_info(
        seed_dir,
        &format!("seed_{seed}"),
        seed,
        &plan.content.content_version,
        serde_json::json!({
            "runner": "bot_bench",
            "agent": plan.def.id,
            "max_ticks": plan.max_ticks,
        }),
    )?;

    let mut client = bot_world::build_client(plan.content, plan.def, plan.stock, seed);
    let mut agent = Agent::new(plan.def.clone(), plan.content.constants.clone());
    let summary = agent.run(&mut client, &AtomicBool::new(false), plan.max_ticks);
    let sim_ms = client.clock_ms();

    let wall_time_ms = start.elapsed().as_millis() as u64;

    RunResult {
        run_schema_version: 1,
        run_status: if summary.finished.is_some() {
            "finished"
        } else {
            "tick_limit"
        },
        run_id: &run_id,
        seed,
        scenario_name: plan.scenario_name,
        scenario_params: plan.scenario_params,
        wall_time_ms,
        sim_ms,
        summary: &summary,
    }
    .write_atomic(&seed_dir.join("run_result.json"))
    .context("writing run_result.json")?;

    Ok(SeedResult {
        seed,
        summary,
        sim_ms,
        wall_time_ms,
        run_id,
    })
}
