use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use anyhow::{bail, Context, Result};
use bot_control::{Agent, AgentTick, RunSummary};
use bot_core::sim::SimulatedClient;
use bot_world::{build_client, load_content, parse_stock, write_run_info, Content};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "bot_cli", about = "Depot-restocking production bots against a simulated client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the agents defined in the content directory.
    List {
        #[arg(long, default_value = "./content")]
        content_dir: String,
    },
    /// Run one agent until it finishes or the tick limit is reached.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Agent id from agents.json.
    #[arg(long)]
    agent: String,
    #[arg(long, default_value_t = 1_000)]
    ticks: u64,
    /// Seed for the simulated client's noise. Random when omitted.
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long, default_value = "./content")]
    content_dir: String,
    /// Depot stock as `item=amount,...`. Defaults to the agent's demo stock.
    #[arg(long)]
    stock: Option<String>,
    /// Override the simulated per-action failure probability.
    #[arg(long)]
    failure_rate: Option<f64>,
    #[arg(long, default_value_t = 10)]
    print_every: u64,
    /// Skip writing run_info.json and summary.json under runs/.
    #[arg(long)]
    no_output: bool,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn list(content_dir: &str) -> Result<()> {
    let content = load_content(content_dir)?;
    println!("content_version={}", content.content_version);
    for entry in &content.agents {
        let stages: Vec<&str> = entry.def.stages.iter().map(|s| s.id.0.as_str()).collect();
        println!(
            "{:<24} {:<24} mode={:?} policy={:?} stages=[{}]",
            entry.def.id.0,
            entry.def.name,
            entry.def.mode,
            entry.def.policy,
            stages.join(", ")
        );
    }
    Ok(())
}

fn create_run_dir(agent: &str, seed: u64) -> Result<PathBuf> {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let dir = PathBuf::from("runs").join(format!("{timestamp}_{agent}_seed{seed}"));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("creating run directory: {}", dir.display()))?;
    Ok(dir)
}

fn write_summary(dir: &std::path::Path, summary: &RunSummary) -> Result<()> {
    let path = dir.join("summary.json");
    let json = serde_json::to_string_pretty(summary).context("serializing run summary")?;
    std::fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn check_failure_rate(rate: f64) -> Result<f64> {
    if !(0.0..=1.0).contains(&rate) {
        bail!("--failure-rate must be within 0..=1, got {rate}");
    }
    Ok(rate)
}

fn run(args: &RunArgs) -> Result<()> {
    let mut content: Content = load_content(&args.content_dir)?;
    if let Some(rate) = args.failure_rate {
        content.constants.sim.failure_rate = check_failure_rate(rate)?;
    }
    let entry = content
        .agent(&args.agent)
        .with_context(|| format!("unknown agent '{}'", args.agent))?
        .clone();
    let stock = match &args.stock {
        Some(spec) => parse_stock(spec).context("parsing --stock")?,
        None => entry.demo_stock(),
    };
    let seed = args.seed.unwrap_or_else(rand::random);

    let run_dir = if args.no_output {
        None
    } else {
        let dir = create_run_dir(&args.agent, seed)?;
        write_run_info(
            &dir,
            &format!("{}_seed{seed}", args.agent),
            seed,
            &content.content_version,
            serde_json::json!({
                "runner": "bot_cli",
                "agent": args.agent,
                "ticks": args.ticks,
                "stock": stock.iter().map(|(item, n)| format!("{item}={n}")).collect::<Vec<_>>(),
            }),
        )?;
        println!("Run directory: {}", dir.display());
        Some(dir)
    };

    let mut client = build_client(&content, &entry.def, &stock, seed);
    let mut agent = Agent::new(entry.def.clone(), content.constants.clone());
    info!(agent = %entry.def.id, seed, ticks = args.ticks, "starting run");

    println!(
        "Starting agent: {} seed={seed} ticks={} content_version={}",
        entry.def.name, args.ticks, content.content_version
    );
    println!("{}", "-".repeat(80));

    let print_every = args.print_every.max(1);
    let stop = AtomicBool::new(false);
    let summary = agent.run_observed(&mut client, &stop, args.ticks, |agent, tick| {
        if agent.ticks() % print_every == 0 || *tick == AgentTick::Finished {
            print_status(agent);
        }
    });

    println!("{}", "-".repeat(80));
    println!("Done after {} ticks:", summary.ticks);
    print_summary(&summary, &client);

    if let Some(dir) = run_dir {
        write_summary(&dir, &summary)?;
        println!("Summary written to {}", dir.join("summary.json").display());
    }
    Ok(())
}

fn print_status(agent: &Agent<SimulatedClient>) {
    let state = agent.state();
    println!(
        "[tick={:05}]  stage={:<14} made={:4}  intermediates={:4}  laps={:3}  {}",
        agent.ticks(),
        agent.stage_name(),
        state.tally.items_made,
        state.tally.intermediates_made,
        state.tally.laps,
        state.activity,
    );
}

fn print_summary(summary: &RunSummary, client: &SimulatedClient) {
    let secs = client.clock_ms() / 1000;
    println!(
        "  simulated time: {:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    );
    match summary.finished {
        Some(reason) => println!("  finished: {reason}"),
        None => println!("  still running at stage '{}'", summary.stage),
    }
    println!(
        "  made={}  intermediates={}  laps={}",
        summary.tally.items_made, summary.tally.intermediates_made, summary.tally.laps
    );
    for (label, count) in &summary.tally.by_label {
        println!("    {label:<16} {count}");
    }
    if !client.depot_contents().is_empty() {
        let depot: Vec<String> = client
            .depot_contents()
            .iter()
            .map(|(item, n)| format!("{item}={n}"))
            .collect();
        println!("  depot: {}", depot.join(", "));
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List { content_dir } => list(&content_dir)?,
        Commands::Run(args) => run(&args)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_rate_accepts_unit_interval() {
        assert!(check_failure_rate(0.0).is_ok());
        assert!(check_failure_rate(0.25).is_ok());
        assert!(check_failure_rate(1.0).is_ok());
    }

    #[test]
    fn test_failure_rate_rejects_out_of_range() {
        for rate in [-0.1, 1.5, f64::NAN] {
            let err = check_failure_rate(rate).unwrap_err();
            assert!(err.to_string().contains("--failure-rate"), "{err}");
        }
    }

    #[test]
    fn test_run_args_parse_failure_rate() {
        let cli = Cli::try_parse_from([
            "bot_cli",
            "run",
            "--agent",
            "pie_maker",
            "--failure-rate",
            "2",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected the run command");
        };
        assert!(check_failure_rate(args.failure_rate.unwrap()).is_err());
    }
}
