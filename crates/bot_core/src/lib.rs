//! `bot_core` — agent core for depot-restocking production bots.
//!
//! No IO, no network. The world is reached only through the capability
//! traits in [`ports`]; [`sim::SimulatedClient`] implements them in memory.

mod combine;
pub mod ports;
mod restock;
pub mod sim;
mod stage;
mod task;
mod types;

pub use combine::{CombineOutcome, CombinePipeline, CombineStep, FinishStep};
pub use ports::{GameClient, ObserveError, PromptKind, UseTarget};
pub use restock::{plan_batch, DepotRestocker, RestockOutcome};
pub use stage::{StageGate, StageMachine, StageTransition};
pub use task::{Scheduler, Task, TickOutcome};
pub use types::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

#[cfg(test)]
mod tests;
