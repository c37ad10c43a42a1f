//! Sorted action index and playback-position lookup
//!
//! During normal playback the position advances monotonically in small
//! steps, so consecutive lookups almost always land in the same action
//! interval or the immediately following one. The timeline exploits this
//! with a caller-held cursor hint, falling back to binary search after
//! seeks or idle resets.

use super::Action;
use crate::error::{Error, Result};

/// Immutable sorted index over a funscript's actions
///
/// **Design:**
/// - Actions sorted by timestamp ascending (stable, so authoring order is
///   preserved among equal timestamps)
/// - A parallel timestamp vector backs the binary search
/// - Built once per script; shared read-only across tasks (`Arc`), all
///   per-playback state lives in the caller's cursor
#[derive(Debug, Clone)]
pub struct ActionTimeline {
    /// Actions sorted by `at` ascending
    actions: Vec<Action>,
    /// `actions[i].at` for each `i`, kept separate for cache-friendly search
    timestamps: Vec<i64>,
}

impl ActionTimeline {
    /// Build a timeline from a script's action list
    ///
    /// Actions are sorted by timestamp; the input order is otherwise
    /// irrelevant. An empty list is rejected because lookup is defined to
    /// always return an action.
    pub fn build(mut actions: Vec<Action>) -> Result<Self> {
        if actions.is_empty() {
            return Err(Error::Script("action list is empty".to_string()));
        }
        actions.sort_by_key(|a| a.at);
        let timestamps = actions.iter().map(|a| a.at).collect();
        Ok(Self {
            actions,
            timestamps,
        })
    }

    /// Number of actions in the timeline
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Always false for a built timeline; kept for API completeness
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Action at `index`, if in range
    pub fn get(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    /// Find the action active at `position_ms`
    ///
    /// Returns the greatest index whose timestamp is `<= position_ms`,
    /// clamped to index 0 when the position precedes the first action (the
    /// first action is treated as already active).
    ///
    /// **Algorithm:**
    /// 1. With a cursor `hint` and no jump, check the hinted interval and
    ///    the one after it (O(1) hot path covering monotonic playback)
    /// 2. Otherwise binary-search the timestamp vector (O(log n) cold path)
    ///
    /// Both paths return identical results for the same `position_ms`; the
    /// hint only affects cost, never the answer.
    ///
    /// # Arguments
    /// * `position_ms` - Current playback position in milliseconds
    /// * `hint` - Index returned by the previous lookup, if any
    /// * `jumped` - True when a discontinuity was detected; skips the hint
    ///
    /// # Examples
    /// ```
    /// use funsync::script::{Action, ActionTimeline};
    ///
    /// let timeline = ActionTimeline::build(vec![
    ///     Action { at: 0, pos: 0 },
    ///     Action { at: 1000, pos: 100 },
    /// ])
    /// .unwrap();
    ///
    /// let (index, action) = timeline.lookup(500.0, None, false);
    /// assert_eq!((index, action.pos), (0, 0));
    ///
    /// // The returned index seeds the next lookup's hot path
    /// let (index, action) = timeline.lookup(1200.0, Some(index), false);
    /// assert_eq!((index, action.pos), (1, 100));
    /// ```
    pub fn lookup(&self, position_ms: f64, hint: Option<usize>, jumped: bool) -> (usize, &Action) {
        if !jumped {
            if let Some(i) = hint {
                // HOT PATH: position still within the hinted interval, or
                // advanced into the immediately following one
                if let Some(&next_at) = self.timestamps.get(i + 1) {
                    if (self.timestamps[i] as f64) <= position_ms {
                        if position_ms < next_at as f64 {
                            return (i, &self.actions[i]);
                        }
                        if let Some(&after_at) = self.timestamps.get(i + 2) {
                            if position_ms < after_at as f64 {
                                return (i + 1, &self.actions[i + 1]);
                            }
                        }
                    }
                }
            }
        }

        // COLD PATH: binary search over the full timestamp vector
        let index = self.search(position_ms);
        (index, &self.actions[index])
    }

    /// Greatest index with timestamp `<= position_ms`, clamped to 0
    fn search(&self, position_ms: f64) -> usize {
        self.timestamps
            .partition_point(|&at| (at as f64) <= position_ms)
            .saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(at: i64, pos: u8) -> Action {
        Action { at, pos }
    }

    fn fixture() -> ActionTimeline {
        ActionTimeline::build(vec![
            action(100, 10),
            action(500, 90),
            action(1500, 20),
            action(3000, 70),
        ])
        .unwrap()
    }

    #[test]
    fn empty_action_list_is_rejected() {
        assert!(matches!(
            ActionTimeline::build(vec![]),
            Err(Error::Script(_))
        ));
    }

    #[test]
    fn build_sorts_unsorted_input() {
        let timeline =
            ActionTimeline::build(vec![action(500, 2), action(100, 1), action(900, 3)]).unwrap();
        let positions: Vec<u8> = (0..timeline.len())
            .map(|i| timeline.get(i).unwrap().pos)
            .collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn position_before_first_action_clamps_to_index_zero() {
        let timeline = fixture();
        let (index, found) = timeline.lookup(0.0, None, false);
        assert_eq!(index, 0);
        assert_eq!(found.at, 100);
    }

    #[test]
    fn position_past_last_action_returns_last_index() {
        let timeline = fixture();
        let (index, found) = timeline.lookup(1_000_000.0, None, false);
        assert_eq!(index, 3);
        assert_eq!(found.at, 3000);
    }

    #[test]
    fn exact_timestamp_selects_that_action() {
        let timeline = fixture();
        for (expected, at) in [(0, 100.0), (1, 500.0), (2, 1500.0), (3, 3000.0)] {
            let (index, _) = timeline.lookup(at, None, false);
            assert_eq!(index, expected, "exact boundary at {}", at);
        }
    }

    #[test]
    fn duplicate_timestamps_resolve_to_last_of_the_run() {
        let timeline = ActionTimeline::build(vec![
            action(100, 1),
            action(200, 2),
            action(200, 3),
            action(400, 4),
        ])
        .unwrap();
        let (index, found) = timeline.lookup(250.0, None, false);
        assert_eq!(index, 2);
        assert_eq!(found.pos, 3);
    }

    #[test]
    fn hint_hit_stays_on_current_interval() {
        let timeline = fixture();
        let (index, found) = timeline.lookup(600.0, Some(1), false);
        assert_eq!(index, 1);
        assert_eq!(found.at, 500);
    }

    #[test]
    fn hint_advances_one_interval() {
        let timeline = fixture();
        let (index, found) = timeline.lookup(1600.0, Some(1), false);
        assert_eq!(index, 2);
        assert_eq!(found.at, 1500);
    }

    #[test]
    fn stale_hint_falls_back_to_search() {
        let timeline = fixture();
        // Hint points far behind the position
        let (index, _) = timeline.lookup(3200.0, Some(0), false);
        assert_eq!(index, 3);
        // Hint points ahead of the position
        let (index, _) = timeline.lookup(150.0, Some(2), false);
        assert_eq!(index, 0);
    }

    #[test]
    fn jump_flag_bypasses_the_hint() {
        let timeline = fixture();
        let (index, _) = timeline.lookup(600.0, Some(1), true);
        assert_eq!(index, 1);
        let (index, _) = timeline.lookup(150.0, Some(3), true);
        assert_eq!(index, 0);
    }

    #[test]
    fn out_of_range_hint_is_harmless() {
        let timeline = fixture();
        let (index, _) = timeline.lookup(600.0, Some(99), false);
        assert_eq!(index, 1);
    }

    #[test]
    fn single_action_timeline_always_returns_it() {
        let timeline = ActionTimeline::build(vec![action(700, 42)]).unwrap();
        for t in [0.0, 700.0, 5000.0] {
            let (index, found) = timeline.lookup(t, None, false);
            assert_eq!(index, 0);
            assert_eq!(found.pos, 42);
        }
        // Hint on the last (only) action cannot use the hot path
        let (index, _) = timeline.lookup(900.0, Some(0), false);
        assert_eq!(index, 0);
    }
}
