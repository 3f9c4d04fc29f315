use anyhow::{bail, Context, Result};
use bot_core::ItemId;
use bot_world::{AgentEntry, Content};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    /// Agent id from the content's agents.json.
    pub agent: String,
    pub max_ticks: u64,
    pub seeds: SeedSpec,
    #[serde(default = "default_content_dir")]
    pub content_dir: String,
    /// Depot stock for every seed. Falls back to the agent's demo stock.
    #[serde(default)]
    pub stock: Option<BTreeMap<String, u32>>,
    #[serde(default)]
    pub failure_rate: Option<f64>,
}

fn default_content_dir() -> String {
    "./content".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SeedSpec {
    List(Vec<u64>),
    Range { range: [u64; 2] },
}

impl SeedSpec {
    pub fn expand(&self) -> Vec<u64> {
        match self {
            SeedSpec::List(seeds) => seeds.clone(),
            SeedSpec::Range { range } => (range[0]..=range[1]).collect(),
        }
    }
}

impl Scenario {
    /// Applies the scenario's simulation overrides to loaded content.
    pub fn apply_overrides(&self, content: &mut Content) {
        if let Some(rate) = self.failure_rate {
            content.constants.sim.failure_rate = rate;
        }
    }

    pub fn stock_for(&self, entry: &AgentEntry) -> Vec<(ItemId, u32)> {
        match &self.stock {
            Some(stock) => stock
                .iter()
                .map(|(item, amount)| (ItemId::new(item), *amount))
                .collect(),
            None => entry.demo_stock(),
        }
    }

    pub fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "agent": self.agent,
            "max_ticks": self.max_ticks,
            "content_dir": self.content_dir,
            "stock": self.stock,
            "failure_rate": self.failure_rate,
        })
    }
}

pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario file: {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&json)
        .with_context(|| format!("parsing scenario file: {}", path.display()))?;
    if scenario.name.is_empty() {
        bail!("scenario 'name' must not be empty");
    }
    if scenario.agent.is_empty() {
        bail!("scenario 'agent' must not be empty");
    }
    if scenario.max_ticks == 0 {
        bail!("scenario 'max_ticks' must be > 0");
    }
    if let Some(rate) = scenario.failure_rate {
        if !(0.0..=1.0).contains(&rate) {
            bail!("scenario 'failure_rate' must be within 0..=1, got {rate}");
        }
    }
    let seeds = scenario.seeds.expand();
    if seeds.is_empty() {
        bail!("scenario 'seeds' must produce at least one seed");
    }
    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_scenario(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_scenario_with_seed_list() {
        let file = write_temp_scenario(
            r#"{
            "name": "test_scenario",
            "agent": "tanner",
            "max_ticks": 1000,
            "seeds": [1, 2, 3]
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.name, "test_scenario");
        assert_eq!(scenario.agent, "tanner");
        assert_eq!(scenario.max_ticks, 1000);
        assert_eq!(scenario.seeds.expand(), vec![1, 2, 3]);
        assert_eq!(scenario.content_dir, "./content");
        assert!(scenario.stock.is_none());
        assert!(scenario.failure_rate.is_none());
    }

    #[test]
    fn test_load_scenario_with_seed_range() {
        let file = write_temp_scenario(
            r#"{
            "name": "range_test",
            "agent": "tanner",
            "max_ticks": 500,
            "seeds": {"range": [1, 5]}
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        assert_eq!(scenario.seeds.expand(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_stock_override_replaces_demo_stock() {
        let file = write_temp_scenario(
            r#"{
            "name": "stocked",
            "agent": "tanner",
            "max_ticks": 100,
            "seeds": [42],
            "stock": {"cowhide": 12, "coins": 60}
        }"#,
        );
        let scenario = load_scenario(file.path()).unwrap();
        let entry: AgentEntry = serde_json::from_value(serde_json::json!({
            "id": "tanner",
            "name": "Tanner",
            "stages": [],
            "demo_stock": {"cowhide": 1}
        }))
        .unwrap();
        assert_eq!(
            scenario.stock_for(&entry),
            vec![(ItemId::new("coins"), 60), (ItemId::new("cowhide"), 12)]
        );
    }

    #[test]
    fn test_load_scenario_empty_name_fails() {
        let file = write_temp_scenario(
            r#"{
            "name": "",
            "agent": "tanner",
            "max_ticks": 100,
            "seeds": [1]
        }"#,
        );
        let result = load_scenario(file.path());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("name"));
    }

    #[test]
    fn test_load_scenario_zero_ticks_fails() {
        let file = write_temp_scenario(
            r#"{
            "name": "bad",
            "agent": "tanner",
            "max_ticks": 0,
            "seeds": [1]
        }"#,
        );
        assert!(load_scenario(file.path()).is_err());
    }

    #[test]
    fn test_load_scenario_bad_failure_rate_fails() {
        let file = write_temp_scenario(
            r#"{
            "name": "bad",
            "agent": "tanner",
            "max_ticks": 10,
            "seeds": [1],
            "failure_rate": 1.5
        }"#,
        );
        let err = load_scenario(file.path()).unwrap_err();
        assert!(err.to_string().contains("failure_rate"));
    }

    #[test]
    fn test_shipped_scenarios_parse() {
        for name in ["pie_baseline.json", "tanner_noisy.json"] {
            let path = Path::new("../../scenarios").join(name);
            let scenario = load_scenario(&path).unwrap();
            assert!(!scenario.seeds.expand().is_empty(), "{name}");
        }
    }
}
