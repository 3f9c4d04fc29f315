//! Capability interfaces the agent core drives.
//!
//! Everything the core knows about the world it learns through these traits.
//! A live game client implements them over screen and widget reads; the
//! simulated client in [`crate::sim`] implements them over in-memory maps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Container, ContainerSnapshot, DepotLocator, ItemId, Tally, TerminalReason};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserveError {
    #[error("{container} is not visible")]
    NotVisible { container: Container },
}

/// What the selected item is used on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UseTarget {
    Item(ItemId),
    /// A world object such as a range or furnace, matched by name.
    Station(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    None,
    /// "How many / which one would you like to make?"
    ItemOption,
    Other,
}

/// Returned by [`DepotView::open`] once the agent is heading to a depot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepotContact {
    pub distance_tiles: f64,
}

pub trait InventoryView {
    fn amount(&self, item: &ItemId) -> Result<u32, ObserveError>;

    fn contains(&self, item: &ItemId) -> Result<bool, ObserveError> {
        Ok(self.amount(item)? > 0)
    }

    fn capacity_slots(&self) -> u32;
    fn free_slots(&self) -> Result<u32, ObserveError>;
    fn select(&mut self, item: &ItemId) -> bool;
    fn deselect(&mut self) -> bool;
    fn use_selected_on(&mut self, target: &UseTarget) -> bool;
}

pub trait DepotView {
    fn is_open(&self) -> bool;
    /// Interacts with the nearest depot object matching `locator`.
    fn open(&mut self, locator: &DepotLocator) -> Option<DepotContact>;
    fn close(&mut self);
    fn deposit_all(&mut self, keep: &[ItemId]) -> bool;
    fn withdraw(&mut self, item: &ItemId, amount: u32) -> bool;
    fn stock(&self, item: &ItemId) -> Result<u32, ObserveError>;
}

pub trait PromptView {
    fn current_prompt(&self) -> PromptKind;
    /// Display text of each option in the open prompt, in order.
    fn prompt_options(&self) -> Vec<String>;
    fn confirm_option(&mut self, index: usize) -> bool;

    /// Confirms the option whose text names `item` exactly (case and
    /// separators ignored).
    fn confirm_choice(&mut self, item: &ItemId) -> bool {
        let wanted = normalized_name(&item.0);
        match self
            .prompt_options()
            .iter()
            .position(|option| normalized_name(option) == wanted)
        {
            Some(index) => self.confirm_option(index),
            None => false,
        }
    }
}

/// The sole suspension primitive. Every wait is bounded by `timeout`.
pub trait Poller {
    fn wait_until<F>(&mut self, timeout: Duration, humanized: bool, condition: F) -> bool
    where
        Self: Sized,
        F: FnMut(&Self) -> bool;

    fn pause(&mut self, duration: Duration);
}

pub trait Notifier {
    fn notify(&mut self, reason: TerminalReason, tally: &Tally);
}

/// Everything an agent needs from its host.
pub trait GameClient: InventoryView + DepotView + PromptView + Poller + Notifier {}

impl<T: InventoryView + DepotView + PromptView + Poller + Notifier> GameClient for T {}

/// Lowercase words joined by single spaces: `"Pie_shell"` and `"pie shell"` compare equal.
pub fn normalized_name(name: &str) -> String {
    name_words(name).join(" ")
}

/// Sorted lowercase words, for matching option text regardless of word order.
pub fn unordered_name(name: &str) -> Vec<String> {
    let mut words = name_words(name);
    words.sort_unstable();
    words
}

fn name_words(name: &str) -> Vec<String> {
    name.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn inventory_snapshot<C: InventoryView>(
    client: &C,
    items: &[ItemId],
) -> Result<ContainerSnapshot, ObserveError> {
    let mut snapshot = ContainerSnapshot::new(Container::Inventory);
    for item in items {
        snapshot.set(item.clone(), client.amount(item)?);
    }
    Ok(snapshot)
}

pub fn depot_snapshot<C: DepotView>(
    client: &C,
    items: &[ItemId],
) -> Result<ContainerSnapshot, ObserveError> {
    let mut snapshot = ContainerSnapshot::new(Container::Depot);
    for item in items {
        snapshot.set(item.clone(), client.stock(item)?);
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_name_ignores_case_and_separators() {
        assert_eq!(normalized_name("Pie_shell"), "pie shell");
        assert_eq!(normalized_name("  Pie   shell "), "pie shell");
    }

    #[test]
    fn test_unordered_name_matches_reversed_words() {
        assert_eq!(unordered_name("uncooked_berry_pie"), unordered_name("Pie berry uncooked"));
        assert_ne!(unordered_name("pie_shell"), unordered_name("pie_dish"));
    }
}
