//! Manual display order for sites and nodes.
//!
//! Order is carried by a nullable integer rank. Moving an item swaps its rank
//! with its neighbour's; a collection containing unranked rows, or a pair
//! sharing a rank, is renumbered first.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::db::{Collection, RankEntry, Store};
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(Error::InvalidInput(format!("invalid direction: {}", other))),
        }
    }
}

/// Rank ascending with unranked rows last, then name, then id.
fn display_cmp(a: &RankEntry, b: &RankEntry) -> Ordering {
    let rank = match (a.sort_order, b.sort_order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    rank.then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort entries into display order.
pub fn display_order(mut entries: Vec<RankEntry>) -> Vec<RankEntry> {
    entries.sort_by(display_cmp);
    entries
}

/// Positions of the item and its neighbour in `direction`, or `None` when the
/// item is already at that end.
fn neighbour(
    ordered: &[RankEntry],
    id: i64,
    direction: Direction,
) -> Result<Option<(usize, usize)>, Error> {
    let current = ordered
        .iter()
        .position(|e| e.id == id)
        .ok_or(Error::NotFound)?;

    let adjacent = match direction {
        Direction::Up => current.checked_sub(1),
        Direction::Down => Some(current + 1).filter(|&i| i < ordered.len()),
    };

    Ok(adjacent.map(|a| (current, a)))
}

/// Ranks `0..n` in the given order.
fn renumbered(ordered: &[RankEntry]) -> Vec<(i64, i64)> {
    ordered
        .iter()
        .enumerate()
        .map(|(i, e)| (e.id, i as i64))
        .collect()
}

/// Exchange the ranks of two rows. Both must be ranked.
fn swapped(a: &RankEntry, b: &RankEntry) -> Option<[(i64, i64); 2]> {
    Some([(a.id, b.sort_order?), (b.id, a.sort_order?)])
}

/// Move `id` one step in `direction` within `collection`.
///
/// Moving past either end succeeds without writing anything. A collection
/// with unranked rows, or where the two rows share a rank, is renumbered
/// `0..n` in display order before the swap.
pub fn reorder(
    store: &Store,
    collection: Collection,
    id: i64,
    direction: Direction,
) -> Result<(), Error> {
    let mut ordered = display_order(store.get_rank_entries(collection)?);
    let Some(mut pair) = neighbour(&ordered, id, direction)? else {
        return Ok(());
    };

    let tied = ordered[pair.0].sort_order == ordered[pair.1].sort_order;
    if tied || ordered.iter().any(|e| e.sort_order.is_none()) {
        store.set_ranks(collection, &renumbered(&ordered))?;

        ordered = display_order(store.get_rank_entries(collection)?);
        pair = match neighbour(&ordered, id, direction)? {
            Some(p) => p,
            None => return Ok(()),
        };
    }

    let (current, adjacent) = pair;
    match swapped(&ordered[current], &ordered[adjacent]) {
        Some(writes) => store.set_ranks(collection, &writes)?,
        // a row added concurrently without a rank; the next move renumbers
        None => tracing::warn!("Reorder of {:?} {} skipped: unranked neighbour", collection, id),
    }

    Ok(())
}
