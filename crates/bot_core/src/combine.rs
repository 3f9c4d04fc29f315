//! Item conversion tasks: two-input combines and single-input finishing.
//!
//! Both run the same engine: select an item, use it on a target, confirm the
//! result in the option prompt, then wait until an input runs short. Every
//! attempt starts from what the inventory shows now, so an aborted attempt is
//! simply retried on a later tick.

use smallvec::SmallVec;
use tracing::{debug, info};

use crate::ports::{unordered_name, GameClient, PromptKind, UseTarget};
use crate::task::Task;
use crate::{
    AgentState, FinishSpec, ItemId, PipelineSpec, ResourceRequirement, Timeouts, YieldKind,
};

/// The step at which a conversion attempt gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineStep {
    Deselect,
    ReadInventory,
    SelectPrimary,
    UseOnTarget,
    AwaitPrompt,
    ConfirmResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineOutcome {
    /// Production ran; carries the increase in result items (possibly zero).
    Completed(u32),
    /// The depot view was open. It has been closed and nothing else happened.
    DepotClosed,
    Aborted(CombineStep),
}

struct Conversion<'a> {
    label: &'a str,
    select: &'a ItemId,
    target: UseTarget,
    /// The batch is over once any of these drops below one unit's amount.
    consumed: SmallVec<[&'a ResourceRequirement; 2]>,
    result: &'a ItemId,
    yield_kind: YieldKind,
}

impl Conversion<'_> {
    fn run<C: GameClient>(
        &self,
        client: &mut C,
        state: &mut AgentState,
        timeouts: &Timeouts,
    ) -> CombineOutcome {
        if client.is_open() {
            client.close();
            debug!(task = self.label, "closed depot before producing");
            return CombineOutcome::DepotClosed;
        }
        if !client.deselect() {
            return self.abort(CombineStep::Deselect);
        }
        let Ok(before) = client.amount(self.result) else {
            return self.abort(CombineStep::ReadInventory);
        };
        if !client.select(self.select) {
            return self.abort(CombineStep::SelectPrimary);
        }
        if !client.use_selected_on(&self.target) {
            return self.abort(CombineStep::UseOnTarget);
        }
        if !client.wait_until(timeouts.prompt(), true, |c| {
            c.current_prompt() == PromptKind::ItemOption
        }) {
            return self.abort(CombineStep::AwaitPrompt);
        }
        client.pause(timeouts.prompt_settle());
        if !confirm_result(client, self.result) {
            return self.abort(CombineStep::ConfirmResult);
        }
        client.pause(timeouts.confirm_settle());

        let consumed = &self.consumed;
        let drained = client.wait_until(timeouts.production(), true, |c| {
            consumed
                .iter()
                .any(|req| c.amount(&req.item).is_ok_and(|held| held < req.amount))
        });
        if !drained {
            debug!(task = self.label, "inputs still present after production wait");
        }

        let Ok(after) = client.amount(self.result) else {
            return self.abort(CombineStep::ReadInventory);
        };
        let yielded = after.saturating_sub(before);
        if yielded > 0 {
            state
                .tally
                .record_yield(self.label, self.yield_kind, yielded);
            info!(task = self.label, yielded, "batch complete");
        }
        CombineOutcome::Completed(yielded)
    }

    fn abort(&self, step: CombineStep) -> CombineOutcome {
        debug!(task = self.label, ?step, "conversion step failed");
        CombineOutcome::Aborted(step)
    }
}

/// Confirms `result` in the open prompt, falling back to a word-order-insensitive match.
fn confirm_result<C: GameClient>(client: &mut C, result: &ItemId) -> bool {
    if client.confirm_choice(result) {
        return true;
    }
    let wanted = unordered_name(&result.0);
    let position = client
        .prompt_options()
        .iter()
        .position(|option| unordered_name(option) == wanted);
    position.is_some_and(|index| client.confirm_option(index))
}

fn holds_requirement<C: GameClient>(client: &C, requirement: &ResourceRequirement) -> bool {
    client
        .amount(&requirement.item)
        .is_ok_and(|held| held >= requirement.amount)
}

// ---------------------------------------------------------------------------
// CombinePipeline
// ---------------------------------------------------------------------------

/// Uses `primary` on `secondary` and confirms `result`, once per batch.
#[derive(Debug, Clone)]
pub struct CombinePipeline {
    spec: PipelineSpec,
    timeouts: Timeouts,
}

impl CombinePipeline {
    pub fn new(spec: PipelineSpec, timeouts: Timeouts) -> Self {
        Self { spec, timeouts }
    }

    pub fn spec(&self) -> &PipelineSpec {
        &self.spec
    }

    /// Both inputs are in the inventory in at least one unit's worth.
    /// An unreadable inventory counts as not present.
    pub fn inputs_present<C: GameClient>(&self, client: &C) -> bool {
        holds_requirement(client, &self.spec.primary)
            && holds_requirement(client, &self.spec.secondary)
    }

    pub fn run<C: GameClient>(&self, client: &mut C, state: &mut AgentState) -> CombineOutcome {
        let conversion = Conversion {
            label: &self.spec.label,
            select: &self.spec.primary.item,
            target: UseTarget::Item(self.spec.secondary.item.clone()),
            consumed: smallvec::smallvec![&self.spec.primary, &self.spec.secondary],
            result: &self.spec.result,
            yield_kind: self.spec.yield_kind,
        };
        conversion.run(client, state, &self.timeouts)
    }
}

impl<C: GameClient> Task<C> for CombinePipeline {
    fn name(&self) -> &str {
        &self.spec.label
    }

    fn activate(&self, client: &C, _state: &AgentState) -> bool {
        self.inputs_present(client)
    }

    fn execute(&mut self, client: &mut C, state: &mut AgentState) {
        state.activity = format!("Making {}", self.spec.label);
        self.run(client, state);
    }
}

// ---------------------------------------------------------------------------
// FinishStep
// ---------------------------------------------------------------------------

/// Uses a single input on a station, e.g. cooking on a range.
#[derive(Debug, Clone)]
pub struct FinishStep {
    spec: FinishSpec,
    timeouts: Timeouts,
}

impl FinishStep {
    pub fn new(spec: FinishSpec, timeouts: Timeouts) -> Self {
        Self { spec, timeouts }
    }

    pub fn spec(&self) -> &FinishSpec {
        &self.spec
    }

    pub fn run<C: GameClient>(&self, client: &mut C, state: &mut AgentState) -> CombineOutcome {
        let conversion = Conversion {
            label: &self.spec.label,
            select: &self.spec.input.item,
            target: UseTarget::Station(self.spec.station.clone()),
            consumed: smallvec::smallvec![&self.spec.input],
            result: &self.spec.result,
            yield_kind: self.spec.yield_kind,
        };
        conversion.run(client, state, &self.timeouts)
    }
}

impl<C: GameClient> Task<C> for FinishStep {
    fn name(&self) -> &str {
        &self.spec.label
    }

    fn activate(&self, client: &C, _state: &AgentState) -> bool {
        holds_requirement(client, &self.spec.input)
    }

    fn execute(&mut self, client: &mut C, state: &mut AgentState) {
        state.activity = format!("{} at {}", self.spec.label, self.spec.station);
        self.run(client, state);
    }
}
