//! Reconciliation of derived next-quarter rows with pre-existing ones.

use std::collections::HashMap;

use super::carryover::{self, OpeningBalances};
use super::{ItemKey, LineItem, ProjectType};

/// Builds the next quarter's item list from the current quarter's rows and
/// whatever the next quarter already holds.
///
/// For every current row the opening balances are computed and looked up in
/// the existing list by [`ItemKey`]:
///
/// - a matching existing row is kept wholesale — manual edits to the future
///   quarter survive — with only the opening-balance fields (and a freshly
///   computed `baseForNptck`, when one is supplied) overwritten;
/// - a missing row is synthesized from the blank template with a fresh id,
///   copying the code, description and coefficient from the current row.
///
/// Existing rows with no counterpart in the current quarter are appended
/// unchanged, in their original order. The key stays unique in the output
/// whenever it was unique in both inputs.
pub fn resolve(
    current_items: &[LineItem],
    existing_items: Vec<LineItem>,
    kind: &ProjectType,
    base_values: &HashMap<ItemKey, i64>,
) -> Vec<LineItem> {
    let mut index: HashMap<ItemKey, usize> = HashMap::new();
    for (pos, item) in existing_items.iter().enumerate() {
        index.insert(item.key(), pos);
    }
    let mut slots: Vec<Option<LineItem>> = existing_items.into_iter().map(Some).collect();

    let mut out = Vec::with_capacity(slots.len() + current_items.len());
    for current in current_items {
        let key = current.key();
        let opening = carryover::opening_balances(current, kind);

        let mut row = match index.get(&key).and_then(|pos| slots[*pos].take()) {
            Some(existing) => with_opening(existing, opening),
            None => {
                let mut fresh = LineItem::blank();
                fresh.project = current.project.clone();
                fresh.description = current.description.clone();
                fresh.hskh = current.hskh.clone();
                with_opening(fresh, opening)
            }
        };
        if let Some(base) = base_values.get(&key) {
            row.base_for_nptck = Some(*base);
        }
        out.push(row);
    }

    out.extend(slots.into_iter().flatten());
    out
}

fn with_opening(mut row: LineItem, opening: OpeningBalances) -> LineItem {
    row.inventory = opening.inventory;
    row.debt = opening.debt;
    row.carryover = opening.carryover;
    row
}
