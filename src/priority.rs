//! Priority allocation.
//!
//! The remote store only knows how to sort children by a numeric priority.
//! Turning "insert at index 3" or "move from 5 to 1" into priorities is the
//! job of this module. All functions here are pure: they look at the current
//! priorities, in list order, and decide what to write.
//!
//! The common case is a single new priority: one less than the first, one
//! more than the last, or the midpoint of two neighbors. Repeated midpoint
//! insertion halves the gap every time, so once two neighbors are closer
//! than the configured minimum gap the allocator gives up on subdividing and
//! renumbers the whole list to integer positions instead. A renumbering must
//! reach the store as one atomic write.

/// A record's sort key in the remote store.
pub type Priority = f64;

/// The default minimum gap between neighbors before a renumbering.
pub const MIN_PRIORITY_GAP: Priority = 0.00000005;

/// Where a new record should go, relative to the current list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Placement {
    /// Before the first record.
    First,
    /// After the last record. Also used for an empty list.
    Last,
    /// Between the records at `index - 1` and `index`.
    Between(usize),
}

impl Placement {
    /// Classify an insertion index against a list of `len` records.
    pub fn for_index(index: usize, len: usize) -> Placement {
        if len == 0 || index >= len {
            return Placement::Last;
        }
        if index == 0 {
            return Placement::First;
        }
        return Placement::Between(index);
    }
}

/// The outcome of an allocation.
#[derive(Clone, Debug, PartialEq)]
pub enum Allocation {
    /// Write a single priority for the new or moved record.
    Single(Priority),
    /// Rewrite every priority.
    ///
    /// `priorities[i]` is the new priority of the record currently at index
    /// `i`, and `slot` is the priority the new or moved record takes. For a
    /// move, `priorities` also covers the moved record itself, whose entry
    /// equals `slot`.
    Renumber {
        priorities: Vec<Priority>,
        slot: Priority,
    },
}

/// Allocate a priority for a record inserted at `index`.
///
/// `priorities` holds the current priorities in list order. An index at or
/// past the end appends.
pub fn allocate_insert(priorities: &[Priority], index: usize, min_gap: Priority) -> Allocation {
    let placement = Placement::for_index(index, priorities.len());
    if let Some(priority) = single(priorities, placement, min_gap) {
        tracing::debug!(?placement, priority, "allocated priority");
        return Allocation::Single(priority);
    }

    let index = index.min(priorities.len());
    tracing::debug!(index, len = priorities.len(), "priorities too dense, renumbering");
    let renumbered = priorities
        .iter()
        .enumerate()
        .map(|(i, _)| if i >= index { (i + 1) as Priority } else { i as Priority })
        .collect();
    return Allocation::Renumber {
        priorities: renumbered,
        slot: index as Priority,
    };
}

/// Allocate a priority for moving the record at `from` so that it lands in
/// front of the record currently at `to`.
///
/// Returns `None` when the move is a no-op: `from` out of range, or `to`
/// equal to `from` or `from + 1`. A `to` past the end moves the record to
/// the end. Neighbor priorities are taken from the list with the moving
/// record already taken out, so a record never sees itself as a neighbor.
pub fn allocate_move(priorities: &[Priority], from: usize, to: usize, min_gap: Priority) -> Option<Allocation> {
    if from >= priorities.len() || to == from || to == from + 1 {
        return None;
    }

    let others: Vec<Priority> = priorities
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != from)
        .map(|(_, p)| *p)
        .collect();
    if others.is_empty() {
        return None;
    }

    let target = if to > from { to - 1 } else { to };
    let target = target.min(others.len());
    let placement = Placement::for_index(target, others.len());
    if let Some(priority) = single(&others, placement, min_gap) {
        tracing::debug!(from, to, ?placement, priority, "allocated move priority");
        return Some(Allocation::Single(priority));
    }

    tracing::debug!(from, to, len = priorities.len(), "priorities too dense, renumbering for move");
    let mut renumbered = Vec::with_capacity(priorities.len());
    let mut position = 0;
    for i in 0..priorities.len() {
        if i == from {
            renumbered.push(target as Priority);
            continue;
        }
        if position == target {
            position += 1;
        }
        renumbered.push(position as Priority);
        position += 1;
    }
    return Some(Allocation::Renumber {
        priorities: renumbered,
        slot: target as Priority,
    });
}

/// Plan the one-time backfill for a collection attached without ordering.
///
/// Given the optional priorities of a snapshot, in snapshot order, returns
/// sequential integer priorities for every child if any child lacks one.
pub fn plan_backfill(priorities: &[Option<Priority>]) -> Option<Vec<Priority>> {
    if priorities.iter().all(|p| p.is_some()) {
        return None;
    }
    return Some((0..priorities.len()).map(|i| i as Priority).collect());
}

/// Try to find a single priority for `placement`. Returns `None` when the
/// neighbors are too close together to separate.
fn single(priorities: &[Priority], placement: Placement, min_gap: Priority) -> Option<Priority> {
    match placement {
        Placement::Last => {
            let Some(&last) = priorities.last() else {
                return Some(0.0);
            };
            return distinct(last + 1.0, last);
        }
        Placement::First => {
            let first = priorities[0];
            return distinct(first - 1.0, first);
        }
        Placement::Between(index) => {
            let prev = priorities[index - 1];
            let next = priorities[index];
            if next - prev < min_gap {
                return None;
            }
            let midpoint = (prev + next) / 2.0;
            // Adjacent floats have no midpoint of their own.
            if midpoint <= prev || midpoint >= next {
                return None;
            }
            return Some(midpoint);
        }
    }
}

/// Priorities so large that adding one no longer changes them count as
/// exhausted, the same as a gap below the minimum.
fn distinct(candidate: Priority, neighbor: Priority) -> Option<Priority> {
    if candidate == neighbor || !candidate.is_finite() {
        return None;
    }
    return Some(candidate);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renumbered(allocation: Allocation) -> (Vec<Priority>, Priority) {
        match allocation {
            Allocation::Renumber { priorities, slot } => return (priorities, slot),
            Allocation::Single(p) => panic!("expected renumber, got single {}", p),
        }
    }

    #[test]
    fn empty_list_starts_at_zero() {
        assert_eq!(allocate_insert(&[], 0, MIN_PRIORITY_GAP), Allocation::Single(0.0));
        assert_eq!(allocate_insert(&[], 7, MIN_PRIORITY_GAP), Allocation::Single(0.0));
    }

    #[test]
    fn append_is_last_plus_one() {
        let list = [0.0, 1.0, 2.5];
        assert_eq!(allocate_insert(&list, 3, MIN_PRIORITY_GAP), Allocation::Single(3.5));
        assert_eq!(allocate_insert(&list, 99, MIN_PRIORITY_GAP), Allocation::Single(3.5));
    }

    #[test]
    fn prepend_is_first_minus_one() {
        let list = [4.0, 5.0];
        assert_eq!(allocate_insert(&list, 0, MIN_PRIORITY_GAP), Allocation::Single(3.0));
    }

    #[test]
    fn between_is_midpoint() {
        let list = [1.0, 2.0, 3.0];
        assert_eq!(allocate_insert(&list, 1, MIN_PRIORITY_GAP), Allocation::Single(1.5));
        assert_eq!(allocate_insert(&list, 2, MIN_PRIORITY_GAP), Allocation::Single(2.5));
    }

    #[test]
    fn gap_exactly_at_minimum_still_subdivides() {
        let list = [0.0, MIN_PRIORITY_GAP];
        assert_eq!(allocate_insert(&list, 1, MIN_PRIORITY_GAP), Allocation::Single(MIN_PRIORITY_GAP / 2.0));
    }

    #[test]
    fn dense_gap_renumbers_everything() {
        let list = [0.0, 0.00000001, 0.00000002];
        let (priorities, slot) = renumbered(allocate_insert(&list, 1, MIN_PRIORITY_GAP));
        assert_eq!(priorities, vec![0.0, 2.0, 3.0]);
        assert_eq!(slot, 1.0);
    }

    #[test]
    fn huge_priorities_renumber_on_append() {
        let list = [0.0, 1e17];
        let (priorities, slot) = renumbered(allocate_insert(&list, 2, MIN_PRIORITY_GAP));
        assert_eq!(priorities, vec![0.0, 1.0]);
        assert_eq!(slot, 2.0);
    }

    #[test]
    fn adjacent_floats_renumber() {
        let prev = 1e17;
        let next = prev + 16.0;
        let list = [prev, next];
        let (priorities, slot) = renumbered(allocate_insert(&list, 1, MIN_PRIORITY_GAP));
        assert_eq!(priorities, vec![0.0, 2.0]);
        assert_eq!(slot, 1.0);
    }

    #[test]
    fn move_to_own_position_is_noop() {
        let list = [0.0, 1.0, 2.0];
        assert_eq!(allocate_move(&list, 1, 1, MIN_PRIORITY_GAP), None);
        assert_eq!(allocate_move(&list, 1, 2, MIN_PRIORITY_GAP), None);
        assert_eq!(allocate_move(&list, 3, 0, MIN_PRIORITY_GAP), None);
    }

    #[test]
    fn move_to_end_is_last_plus_one() {
        let list = [0.0, 1.0, 2.0];
        assert_eq!(allocate_move(&list, 0, 100, MIN_PRIORITY_GAP), Some(Allocation::Single(3.0)));
        assert_eq!(allocate_move(&list, 0, 3, MIN_PRIORITY_GAP), Some(Allocation::Single(3.0)));
    }

    #[test]
    fn move_to_front_is_first_minus_one() {
        let list = [0.0, 1.0, 2.0];
        assert_eq!(allocate_move(&list, 2, 0, MIN_PRIORITY_GAP), Some(Allocation::Single(-1.0)));
    }

    #[test]
    fn move_to_front_ignores_itself() {
        // Moving the first record to index 0 is a no-op, but moving the
        // second record to the front must look past the first only.
        let list = [5.0, 6.0, 7.0];
        assert_eq!(allocate_move(&list, 1, 0, MIN_PRIORITY_GAP), Some(Allocation::Single(4.0)));
    }

    #[test]
    fn move_between_uses_remaining_neighbors() {
        let list = [0.0, 1.0, 2.0, 3.0];
        // Record 0 lands between 2.0 and 3.0.
        assert_eq!(allocate_move(&list, 0, 3, MIN_PRIORITY_GAP), Some(Allocation::Single(2.5)));
        // Record 3 lands between 0.0 and 1.0.
        assert_eq!(allocate_move(&list, 3, 1, MIN_PRIORITY_GAP), Some(Allocation::Single(0.5)));
    }

    #[test]
    fn dense_move_forward_renumbers() {
        let list = [0.0, 1e-9, 2e-9, 3e-9];
        let (priorities, slot) = renumbered(allocate_move(&list, 0, 3, MIN_PRIORITY_GAP).unwrap());
        // Final order: b, c, a, d.
        assert_eq!(priorities, vec![2.0, 0.0, 1.0, 3.0]);
        assert_eq!(slot, 2.0);
    }

    #[test]
    fn dense_move_backward_renumbers() {
        let list = [0.0, 1e-9, 2e-9, 3e-9];
        let (priorities, slot) = renumbered(allocate_move(&list, 3, 1, MIN_PRIORITY_GAP).unwrap());
        // Final order: a, d, b, c.
        assert_eq!(priorities, vec![0.0, 2.0, 3.0, 1.0]);
        assert_eq!(slot, 1.0);
    }

    #[test]
    fn huge_priorities_renumber_on_move_to_end() {
        let list = [0.0, 1e17, 2e17];
        let (priorities, slot) = renumbered(allocate_move(&list, 0, 100, MIN_PRIORITY_GAP).unwrap());
        // Final order: b, c, a.
        assert_eq!(priorities, vec![2.0, 0.0, 1.0]);
        assert_eq!(slot, 2.0);
    }

    #[test]
    fn huge_priorities_renumber_on_move_to_front() {
        let list = [-2e17, -1e17, 0.0];
        let (priorities, slot) = renumbered(allocate_move(&list, 2, 0, MIN_PRIORITY_GAP).unwrap());
        // Final order: c, a, b.
        assert_eq!(priorities, vec![1.0, 2.0, 0.0]);
        assert_eq!(slot, 0.0);
    }

    #[test]
    fn backfill_only_when_a_priority_is_missing() {
        assert_eq!(plan_backfill(&[Some(0.0), Some(1.0)]), None);
        assert_eq!(plan_backfill(&[]), None);
        assert_eq!(plan_backfill(&[Some(3.0), None, Some(1.0)]), Some(vec![0.0, 1.0, 2.0]));
    }

    #[test]
    fn placement_classification() {
        assert_eq!(Placement::for_index(0, 0), Placement::Last);
        assert_eq!(Placement::for_index(0, 3), Placement::First);
        assert_eq!(Placement::for_index(2, 3), Placement::Between(2));
        assert_eq!(Placement::for_index(3, 3), Placement::Last);
    }
}
