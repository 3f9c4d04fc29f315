//! Content loading and client construction shared between bot_cli and bot_bench.

use anyhow::{bail, Context, Result};
use bot_core::sim::SimulatedClient;
use bot_core::{AgentDef, AgentId, Constants, ItemId, StageId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// One agent as authored in `agents.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    #[serde(flatten)]
    pub def: AgentDef,
    /// Depot contents used when no stock is given on the command line.
    #[serde(default)]
    pub demo_stock: BTreeMap<String, u32>,
}

impl AgentEntry {
    pub fn demo_stock(&self) -> Vec<(ItemId, u32)> {
        self.demo_stock
            .iter()
            .map(|(item, amount)| (ItemId::new(item.as_str()), *amount))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Content {
    pub content_version: String,
    pub constants: Constants,
    pub agents: Vec<AgentEntry>,
}

impl Content {
    pub fn agent(&self, id: &str) -> Option<&AgentEntry> {
        self.agents.iter().find(|entry| entry.def.id.0 == id)
    }
}

#[derive(Deserialize)]
struct AgentsFile {
    content_version: String,
    agents: Vec<AgentEntry>,
}

/// Authoring mistakes in agent definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("agent '{0}' is defined more than once")]
    DuplicateAgent(AgentId),
    #[error("agent '{0}' has no stages")]
    NoStages(AgentId),
    #[error("agent '{0}' has an empty depot locator")]
    EmptyLocator(AgentId),
    #[error("agent '{agent}' defines stage '{stage}' more than once")]
    DuplicateStage { agent: AgentId, stage: StageId },
    #[error("agent '{agent}' stage '{stage}' requires zero of '{item}'")]
    ZeroAmount {
        agent: AgentId,
        stage: StageId,
        item: ItemId,
    },
    #[error("agent '{agent}' stage '{stage}' uses '{item}' on itself")]
    SameInputs {
        agent: AgentId,
        stage: StageId,
        item: ItemId,
    },
    #[error("agent '{agent}' start_stage '{stage}' is not one of its stages")]
    UnknownStartStage { agent: AgentId, stage: StageId },
    #[error(
        "agent '{agent}' stage '{stage}' needs {slots} inventory slots per unit, capacity is {capacity}"
    )]
    DoesNotFit {
        agent: AgentId,
        stage: StageId,
        slots: u32,
        capacity: u32,
    },
}

/// Checks every agent definition against the loaded constants.
///
/// Catches mistakes like: a stage that consumes zero of an item, a combine
/// that uses an item on itself, or a stage whose single unit cannot fit the
/// inventory (which would otherwise end every run with no inventory space).
pub fn validate_content(content: &Content) -> Result<(), ContentError> {
    let mut agent_ids: HashSet<&AgentId> = HashSet::new();
    for entry in &content.agents {
        let def = &entry.def;
        if !agent_ids.insert(&def.id) {
            return Err(ContentError::DuplicateAgent(def.id.clone()));
        }
        validate_agent(def, content.constants.inventory_capacity)?;
    }
    Ok(())
}

fn validate_agent(def: &AgentDef, capacity: u32) -> Result<(), ContentError> {
    if def.stages.is_empty() {
        return Err(ContentError::NoStages(def.id.clone()));
    }
    if def.depot.names.is_empty() || def.depot.actions.is_empty() {
        return Err(ContentError::EmptyLocator(def.id.clone()));
    }
    if let Some(start) = &def.start_stage {
        if def.stage_index(start).is_none() {
            return Err(ContentError::UnknownStartStage {
                agent: def.id.clone(),
                stage: start.clone(),
            });
        }
    }

    let mut stage_ids: HashSet<&StageId> = HashSet::new();
    for stage in &def.stages {
        if !stage_ids.insert(&stage.id) {
            return Err(ContentError::DuplicateStage {
                agent: def.id.clone(),
                stage: stage.id.clone(),
            });
        }
        let inputs = stage.inputs();
        if let Some(zero) = inputs.iter().find(|req| req.amount == 0) {
            return Err(ContentError::ZeroAmount {
                agent: def.id.clone(),
                stage: stage.id.clone(),
                item: zero.item.clone(),
            });
        }
        if let [primary, secondary] = inputs.as_slice() {
            if primary.item == secondary.item {
                return Err(ContentError::SameInputs {
                    agent: def.id.clone(),
                    stage: stage.id.clone(),
                    item: primary.item.clone(),
                });
            }
        }
        let stacks = inputs.iter().filter(|req| req.stackable).count() as u32;
        let slots = stage.slots_per_unit() + stacks;
        if slots > capacity {
            return Err(ContentError::DoesNotFit {
                agent: def.id.clone(),
                stage: stage.id.clone(),
                slots,
                capacity,
            });
        }
    }
    Ok(())
}

pub fn load_content(content_dir: &str) -> Result<Content> {
    let dir = Path::new(content_dir);
    let constants: Constants = serde_json::from_str(
        &std::fs::read_to_string(dir.join("constants.json")).context("reading constants.json")?,
    )
    .context("parsing constants.json")?;
    let agents_file: AgentsFile = serde_json::from_str(
        &std::fs::read_to_string(dir.join("agents.json")).context("reading agents.json")?,
    )
    .context("parsing agents.json")?;
    let content = Content {
        content_version: agents_file.content_version,
        constants,
        agents: agents_file.agents,
    };
    validate_content(&content).context("validating agents.json")?;
    Ok(content)
}

/// A simulated client configured from `content`, knowing `def`'s recipes,
/// with the depot holding `stock`.
pub fn build_client(
    content: &Content,
    def: &AgentDef,
    stock: &[(ItemId, u32)],
    seed: u64,
) -> SimulatedClient {
    let mut client = SimulatedClient::new(
        content.constants.sim.clone(),
        content.constants.inventory_capacity,
        seed,
    );
    client.register_stages(&def.stages);
    for (item, amount) in stock {
        client.set_depot(&item.0, *amount);
    }
    client
}

/// Parses `"flour=30,water=30"` into depot stock.
pub fn parse_stock(spec: &str) -> Result<Vec<(ItemId, u32)>> {
    let mut stock = Vec::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((item, amount)) = entry.split_once('=') else {
            bail!("stock entry '{entry}' must look like item=amount");
        };
        let item = item.trim();
        if item.is_empty() {
            bail!("stock entry '{entry}' has no item name");
        }
        let amount: u32 = amount
            .trim()
            .parse()
            .with_context(|| format!("parsing amount in stock entry '{entry}'"))?;
        stock.push((ItemId::new(item), amount));
    }
    Ok(stock)
}

pub fn write_run_info(
    dir: &Path,
    run_id: &str,
    seed: u64,
    content_version: &str,
    args: serde_json::Value,
) -> Result<()> {
    let info = serde_json::json!({
        "run_id": run_id,
        "seed": seed,
        "start_time": chrono::Utc::now().to_rfc3339(),
        "content_version": content_version,
        "args": args,
    });
    let path = dir.join("run_info.json");
    let file =
        std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, &info)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
