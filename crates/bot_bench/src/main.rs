use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod runner;
mod scenario;
mod summary;

#[derive(Parser)]
#[command(
    name = "bot_bench",
    about = "Runs one agent scenario across many seeds of the simulated client"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file across multiple seeds.
    Run {
        /// Path to the scenario JSON file.
        #[arg(long)]
        scenario: String,
        /// Output directory (default: runs/).
        #[arg(long, default_value = "runs")]
        output_dir: String,
    },
}

/// One line of seeds.csv.
#[derive(Serialize)]
struct SeedRow<'a> {
    seed: u64,
    run_id: &'a str,
    finished: String,
    ticks: u64,
    sim_ms: u64,
    items_made: u64,
    intermediates_made: u64,
    laps: u64,
    final_stage: &'a str,
}

fn write_seed_table(path: &Path, results: &[runner::SeedResult]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("creating {}", path.display()))?;
    for result in results {
        let summary = &result.summary;
        writer
            .serialize(SeedRow {
                seed: result.seed,
                run_id: &result.run_id,
                finished: summary
                    .finished
                    .map(|reason| reason.to_string())
                    .unwrap_or_default(),
                ticks: summary.ticks,
                sim_ms: result.sim_ms,
                items_made: summary.tally.items_made,
                intermediates_made: summary.tally.intermediates_made,
                laps: summary.tally.laps,
                final_stage: &summary.stage,
            })
            .context("writing seed row")?;
    }
    writer.flush().context("flushing seeds.csv")?;
    Ok(())
}

fn write_json_atomic(path: &Path, value: &serde_json::Value) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(value).context("serializing batch summary")?;
    let mut file =
        std::fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    file.write_all(json.as_bytes())
        .context("writing batch summary")?;
    file.sync_all()?;
    std::fs::rename(&tmp, path).context("renaming batch summary")?;
    Ok(())
}

fn run(scenario_path: &str, output_dir: &str) -> Result<()> {
    let scenario = scenario::load_scenario(Path::new(scenario_path))?;
    let seeds = scenario.seeds.expand();

    println!(
        "Loading scenario '{}': agent '{}', {} seeds × up to {} ticks",
        scenario.name,
        scenario.agent,
        seeds.len(),
        scenario.max_ticks
    );

    let mut content = bot_world::load_content(&scenario.content_dir)?;
    scenario.apply_overrides(&mut content);
    let entry = content
        .agent(&scenario.agent)
        .with_context(|| format!("scenario names unknown agent '{}'", scenario.agent))?;
    let stock = scenario.stock_for(entry);
    let scenario_params = scenario.params();

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_dir = PathBuf::from(output_dir).join(format!("{}_{}", scenario.name, timestamp));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("creating output directory: {}", run_dir.display()))?;
    std::fs::copy(scenario_path, run_dir.join("scenario.json")).context("copying scenario file")?;

    println!("Output: {}", run_dir.display());
    println!("Running {} seeds in parallel...", seeds.len());

    let plan = runner::RunPlan {
        content: &content,
        def: &entry.def,
        stock: &stock,
        max_ticks: scenario.max_ticks,
        scenario_name: &scenario.name,
        scenario_params: &scenario_params,
    };
    let results: Vec<Result<runner::SeedResult>> = seeds
        .par_iter()
        .map(|&seed| runner::run_seed(&plan, seed, &run_dir.join(format!("seed_{seed}"))))
        .collect();

    let mut seed_results = Vec::new();
    for result in results {
        match result {
            Ok(seed_result) => seed_results.push(seed_result),
            Err(err) => eprintln!("Seed failed: {err:#}"),
        }
    }

    if seed_results.is_empty() {
        anyhow::bail!("all seeds failed");
    }

    let stats = summary::compute_summary(&seed_results);
    summary::print_summary(&scenario.name, &scenario.agent, scenario.max_ticks, &stats);

    let seeds_path = run_dir.join("seeds.csv");
    write_seed_table(&seeds_path, &seed_results)?;

    let summary_path = run_dir.join("summary.json");
    let summary_json = serde_json::to_string_pretty(&stats).context("serializing summary")?;
    std::fs::write(&summary_path, summary_json)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let run_ids: Vec<&str> = seed_results.iter().map(|r| r.run_id.as_str()).collect();
    let batch_summary = serde_json::json!({
        "batch_schema_version": 1,
        "batch_id": Uuid::new_v4().to_string(),
        "scenario_name": scenario.name,
        "scenario_params": scenario_params,
        "content_version": content.content_version,
        "seed_count": seed_results.len(),
        "run_ids": run_ids,
        "finished_count": stats.finished_count,
        "aggregated_metrics": summary::build_aggregated_metrics(&stats),
    });
    let batch_path = run_dir.join("batch_summary.json");
    write_json_atomic(&batch_path, &batch_summary)?;

    println!("Seed table written to {}", seeds_path.display());
    println!("Summary written to {}", summary_path.display());
    println!("Batch summary written to {}", batch_path.display());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            scenario,
            output_dir,
        } => run(&scenario, &output_dir)?,
    }
    Ok(())
}
