//! Interval Algebra (§4.B) — a pure function that places a new interval into
//! an existing timeline and reports the adjustments it forces on neighbors.
//! No I/O, no backend handles; the Version Manager is the only caller.

use bitemporal_core::constants::TIMESTAMP_UPPER_BOUND;

/// An already-resolved interval as read back from the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingInterval {
    pub source_id: String,
    pub valid_from: i64,
    pub valid_to: i64,
}

/// The interval being placed. `valid_to` starts unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInterval {
    pub source_id: String,
    pub valid_from: i64,
}

/// The outcome of placing a `NewInterval` into a timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInterval {
    pub source_id: String,
    pub valid_from: i64,
    pub valid_to: i64,
}

/// A `valid_to` change forced on an existing source by a newly placed one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Adjustment {
    pub source_id: String,
    pub valid_from: i64,
    pub valid_to: i64,
}

/// Places `new` into `existing` (§4.B).
///
/// `existing` need not be pre-sorted; this function sorts its own working
/// copy descending by `valid_from`, mirroring the reference implementation's
/// `sorted(..., key=valid_from, reverse=True)`.
pub fn place_interval(new: NewInterval, existing: &[ExistingInterval]) -> (ResolvedInterval, Vec<Adjustment>) {
    let mut sorted: Vec<&ExistingInterval> = existing.iter().collect();
    sorted.sort_by(|a, b| b.valid_from.cmp(&a.valid_from));

    let mut valid_to: Option<i64> = None;
    let mut prev_valid_from: Option<i64> = None;

    for n in &sorted {
        if new.valid_from == n.valid_from {
            valid_to = Some(n.valid_to);
        } else if new.valid_from > n.valid_from {
            valid_to = prev_valid_from;
        } else {
            prev_valid_from = Some(n.valid_from);
        }
    }

    let resolved_valid_to = valid_to.unwrap_or_else(|| prev_valid_from.unwrap_or(TIMESTAMP_UPPER_BOUND));

    let mut adjustments = Vec::new();
    if resolved_valid_to == TIMESTAMP_UPPER_BOUND {
        for n in &sorted {
            if new.valid_from > n.valid_from && n.valid_to == TIMESTAMP_UPPER_BOUND {
                adjustments.push(Adjustment {
                    source_id: n.source_id.clone(),
                    valid_from: n.valid_from,
                    valid_to: new.valid_from,
                });
            }
        }
    } else {
        for n in &sorted {
            if new.valid_from > n.valid_from && new.valid_from < n.valid_to && resolved_valid_to >= n.valid_to {
                adjustments.push(Adjustment {
                    source_id: n.source_id.clone(),
                    valid_from: n.valid_from,
                    valid_to: new.valid_from,
                });
            }
        }
    }

    (
        ResolvedInterval { source_id: new.source_id, valid_from: new.valid_from, valid_to: resolved_valid_to },
        adjustments,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn existing(source_id: &str, valid_from: i64, valid_to: i64) -> ExistingInterval {
        ExistingInterval { source_id: source_id.to_string(), valid_from, valid_to }
    }

    #[test]
    fn first_ingestion_has_no_adjustments() {
        let (resolved, adjustments) = place_interval(NewInterval { source_id: "s1".into(), valid_from: 100 }, &[]);
        assert_eq!(resolved.valid_to, TIMESTAMP_UPPER_BOUND);
        assert!(adjustments.is_empty());
    }

    #[test]
    fn supersede_current_archives_previous_current() {
        let existing = vec![existing("s1", 100, TIMESTAMP_UPPER_BOUND)];
        let (resolved, adjustments) =
            place_interval(NewInterval { source_id: "s2".into(), valid_from: 200 }, &existing);

        assert_eq!(resolved.valid_to, TIMESTAMP_UPPER_BOUND);
        assert_eq!(adjustments, vec![Adjustment { source_id: "s1".into(), valid_from: 100, valid_to: 200 }]);
    }

    #[test]
    fn insert_historical_shortens_only_the_enclosing_interval() {
        let existing = vec![existing("s1", 100, 200), existing("s2", 200, TIMESTAMP_UPPER_BOUND)];
        let (resolved, adjustments) =
            place_interval(NewInterval { source_id: "s3".into(), valid_from: 150 }, &existing);

        assert_eq!(resolved.valid_to, 200);
        assert_eq!(adjustments, vec![Adjustment { source_id: "s1".into(), valid_from: 100, valid_to: 150 }]);
    }

    #[test]
    fn reingest_same_timestamp_is_a_noop_for_adjustments() {
        let existing = vec![existing("s1", 100, 200), existing("s2", 200, TIMESTAMP_UPPER_BOUND)];
        let (resolved, adjustments) =
            place_interval(NewInterval { source_id: "s1-prime".into(), valid_from: 100 }, &existing);

        assert_eq!(resolved.valid_to, 200);
        assert!(adjustments.is_empty());
    }

    #[test]
    fn earliest_arrival_adopts_next_higher_valid_from() {
        let existing = vec![existing("s1", 100, 200), existing("s2", 200, TIMESTAMP_UPPER_BOUND)];
        let (resolved, adjustments) = place_interval(NewInterval { source_id: "s0".into(), valid_from: 50 }, &existing);

        assert_eq!(resolved.valid_to, 100);
        assert!(adjustments.is_empty());
    }

    #[rstest]
    #[case(100, vec![], TIMESTAMP_UPPER_BOUND)]
    #[case(50, vec![existing("s1", 100, TIMESTAMP_UPPER_BOUND)], 100)]
    fn placements_always_resolve_a_concrete_valid_to(
        #[case] valid_from: i64,
        #[case] existing: Vec<ExistingInterval>,
        #[case] expected_valid_to: i64,
    ) {
        let (resolved, _) = place_interval(NewInterval { source_id: "s".into(), valid_from }, &existing);
        assert_eq!(resolved.valid_to, expected_valid_to);
    }

    /// P3: idempotence. Replaying the same arrival against a timeline that
    /// already contains its own resolved interval produces no adjustments.
    #[test]
    fn idempotent_under_replay() {
        let timeline = vec![existing("s1", 100, 200), existing("s2", 200, TIMESTAMP_UPPER_BOUND)];
        let (resolved, adjustments) =
            place_interval(NewInterval { source_id: "s3".into(), valid_from: 150 }, &timeline);
        assert_eq!(adjustments.len(), 1);

        let mut replay_existing = timeline;
        replay_existing[0] = existing("s1", 100, 150);
        replay_existing.push(existing("s3", 150, resolved.valid_to));

        let (_, replay_adjustments) =
            place_interval(NewInterval { source_id: "s3".into(), valid_from: 150 }, &replay_existing);
        assert!(replay_adjustments.is_empty());
    }

    /// P2: after any run, at most one interval per identity ends at UPPER.
    #[test]
    fn at_most_one_current_interval_after_sequential_arrivals() {
        let mut timeline: Vec<ExistingInterval> = Vec::new();
        for (id, valid_from) in [("s1", 100), ("s2", 300), ("s3", 200), ("s4", 50)] {
            let (resolved, adjustments) =
                place_interval(NewInterval { source_id: id.into(), valid_from }, &timeline);
            for adjustment in adjustments {
                let existing = timeline.iter_mut().find(|e| e.source_id == adjustment.source_id).unwrap();
                existing.valid_to = adjustment.valid_to;
            }
            timeline.push(ExistingInterval { source_id: id.into(), valid_from: resolved.valid_from, valid_to: resolved.valid_to });
        }

        let current_count = timeline.iter().filter(|i| i.valid_to == TIMESTAMP_UPPER_BOUND).count();
        assert_eq!(current_count, 1);

        // P1: pairwise disjoint.
        let mut sorted = timeline.clone();
        sorted.sort_by_key(|i| i.valid_from);
        for pair in sorted.windows(2) {
            assert!(pair[0].valid_to <= pair[1].valid_from, "{:?} overlaps {:?}", pair[0], pair[1]);
        }
    }
}
