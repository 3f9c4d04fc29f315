use crate::runner::SeedResult;
use bot_control::RunSummary;
use serde::Serialize;

type Extractor = (&'static str, fn(&RunSummary, u64) -> f64);

const EXTRACTORS: [Extractor; 6] = [
    ("items_made", |s: &RunSummary, _: u64| s.tally.items_made as f64),
    ("intermediates_made", |s: &RunSummary, _: u64| s.tally.intermediates_made as f64),
    ("laps", |s: &RunSummary, _: u64| s.tally.laps as f64),
    ("ticks", |s: &RunSummary, _: u64| s.ticks as f64),
    ("sim_minutes", |_: &RunSummary, sim_ms: u64| sim_ms as f64 / 60_000.0),
    ("items_per_hour", |s: &RunSummary, sim_ms: u64| {
        if sim_ms == 0 {
            0.0
        } else {
            s.tally.items_made as f64 / (sim_ms as f64 / 3_600_000.0)
        }
    }),
];

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub seed_count: usize,
    /// Seeds whose agent reached a terminal condition within the tick limit.
    pub finished_count: usize,
    pub metrics: Vec<MetricSummary>,
}

#[derive(Debug, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub stddev: f64,
}

pub fn compute_summary(results: &[SeedResult]) -> SummaryStats {
    let finished_count = results
        .iter()
        .filter(|r| r.summary.finished.is_some())
        .count();

    let metrics = EXTRACTORS
        .iter()
        .map(|(name, extract)| {
            let values: Vec<f64> = results
                .iter()
                .map(|r| extract(&r.summary, r.sim_ms))
                .collect();
            compute_metric_summary(name, &values)
        })
        .collect();

    SummaryStats {
        seed_count: results.len(),
        finished_count,
        metrics,
    }
}

fn compute_metric_summary(name: &str, values: &[f64]) -> MetricSummary {
    let count = values.len() as f64;
    let mean = values.iter().sum::<f64>() / count;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count;

    MetricSummary {
        name: name.to_string(),
        mean,
        min,
        max,
        stddev: variance.sqrt(),
    }
}

/// `{ "metric": { "mean": .., "min": .., "max": .., "stddev": .. }, .. }`
pub fn build_aggregated_metrics(stats: &SummaryStats) -> serde_json::Value {
    let map = stats
        .metrics
        .iter()
        .map(|m| {
            (
                m.name.clone(),
                serde_json::json!({
                    "mean": m.mean,
                    "min": m.min,
                    "max": m.max,
                    "stddev": m.stddev,
                }),
            )
        })
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(map)
}

pub fn print_summary(scenario_name: &str, agent: &str, max_ticks: u64, stats: &SummaryStats) {
    println!(
        "\n=== {} ({}, {} seeds, up to {} ticks each) ===\n",
        scenario_name, agent, stats.seed_count, max_ticks
    );
    println!(
        "{:<24} {:>10} {:>10} {:>10} {:>10}",
        "Metric", "Mean", "Min", "Max", "StdDev"
    );
    println!("{}", "-".repeat(68));
    for metric in &stats.metrics {
        println!(
            "{:<24} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            metric.name, metric.mean, metric.min, metric.max, metric.stddev
        );
    }
    println!(
        "{:<24} {}/{}",
        "finished_rate", stats.finished_count, stats.seed_count
    );
}
