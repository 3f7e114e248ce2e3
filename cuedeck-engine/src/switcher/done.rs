//! Done-condition evaluation
//!
//! Decides, from a tracker snapshot and a source's done-on policy, whether
//! the source is finished now — including the early trigger that fires the
//! follow action `transitionTime` before the literal last frame, so the
//! outgoing crossfade completes exactly as the source would naturally end.
//! Also resolves the follow-action target and its effective transition time.

use crate::switcher::registry::{SourceRef, SourceRegistry};
use crate::switcher::tracker::PlaybackTracker;
use cuedeck_common::model::{DoneOn, FollowAction, SourceRecord};
use serde::{Deserialize, Serialize};

/// Off-by-one policy for "frames remaining in loop"
///
/// The registry of host players disagrees on whether the last valid frame is
/// `total - 1` (zero-based playheads) or `total` (one-based). Zero-based is
/// the default; the alternative is selectable at runtime and tested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrameIndexing {
    #[default]
    ZeroBased,
    OneBased,
}

impl FrameIndexing {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameIndexing::ZeroBased => "zero_based",
            FrameIndexing::OneBased => "one_based",
        }
    }

    pub fn from_str_or_default(s: &str) -> Self {
        match s {
            "one_based" => FrameIndexing::OneBased,
            _ => FrameIndexing::ZeroBased,
        }
    }
}

/// Stateless policy evaluator; per-playthrough state (the done latch) lives
/// on the tracker it inspects.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoneEvaluator {
    frame_indexing: FrameIndexing,
}

impl DoneEvaluator {
    pub fn new(frame_indexing: FrameIndexing) -> Self {
        Self { frame_indexing }
    }

    pub fn frame_indexing(&self) -> FrameIndexing {
        self.frame_indexing
    }

    pub fn set_frame_indexing(&mut self, frame_indexing: FrameIndexing) {
        self.frame_indexing = frame_indexing;
    }

    /// Frames left before the end of the current loop.
    pub fn frames_remaining(&self, total: u64, current: u64) -> u64 {
        match self.frame_indexing {
            FrameIndexing::ZeroBased => total.saturating_sub(1).saturating_sub(current),
            FrameIndexing::OneBased => total.saturating_sub(current),
        }
    }

    /// PlayNTimes completion, checked on a loop rising edge.
    pub fn loop_edge_done(&self, tracker: &PlaybackTracker, done_on: &DoneOn) -> bool {
        matches!(done_on, DoneOn::PlayNTimes { .. })
            && !tracker.done_triggered()
            && tracker.loop_count() >= tracker.play_n_times()
    }

    /// Early trigger, checked on every frame advance.
    ///
    /// Fires when this is the final loop and the frames left (at least one)
    /// fit inside the follow-action target's transition window, so the
    /// crossfade lands on the natural end of the source instead of running
    /// past it.
    pub fn early_trigger(
        &self,
        tracker: &PlaybackTracker,
        done_on: &DoneOn,
        effective_transition_secs: f64,
    ) -> bool {
        if !matches!(done_on, DoneOn::PlayNTimes { .. }) || tracker.done_triggered() {
            return false;
        }
        if effective_transition_secs <= 0.0 {
            return false;
        }

        let transition_frames = effective_transition_secs * tracker.sample_rate();
        let remaining =
            self.frames_remaining(tracker.total_frames(), tracker.current_frame());
        let final_loop = tracker.loop_count() >= tracker.play_n_times().saturating_sub(1);

        final_loop && remaining > 0 && (remaining as f64) <= transition_frames
    }

    /// Timer completion applies only under a Timer policy, once.
    pub fn timer_done(&self, tracker: &PlaybackTracker, done_on: &DoneOn) -> bool {
        matches!(done_on, DoneOn::Timer { .. }) && !tracker.done_triggered()
    }

    /// External completion applies only under an ExternalSignal policy, once.
    pub fn external_done(&self, tracker: &PlaybackTracker, done_on: &DoneOn) -> bool {
        matches!(done_on, DoneOn::ExternalSignal) && !tracker.done_triggered()
    }
}

/// Resolve the follow-action target as a switch reference.
///
/// `PlayNext` from an inline source (no registry index) wraps to the first
/// registry entry. Out-of-range targets resolve to None: the follow action
/// becomes a no-op rather than an error.
pub fn follow_target(
    registry: &SourceRegistry,
    current_index: Option<usize>,
    action: &FollowAction,
) -> Option<SourceRef> {
    match action {
        FollowAction::None => None,
        FollowAction::PlayNext => {
            let next = current_index.map(|i| i + 1).unwrap_or(0);
            (next < registry.len()).then_some(SourceRef::Index(next))
        }
        FollowAction::GotoIndex { index } => {
            (*index < registry.len()).then_some(SourceRef::Index(*index))
        }
        FollowAction::GotoName { name } => registry
            .index_of(name)
            .map(|_| SourceRef::Name(name.clone())),
    }
}

/// Effective transition time for a record: the global time when the record
/// opts in, otherwise its own setting.
pub fn effective_transition_secs(record: &SourceRecord, global_secs: f64) -> f64 {
    if record.settings.use_global_transition_time {
        global_secs
    } else {
        record.settings.transition_time_secs
    }
}

/// Transition time of the follow-action target, used for the early-trigger
/// lookahead. No target means no early trigger (0.0).
pub fn follow_transition_secs(
    registry: &SourceRegistry,
    current_index: Option<usize>,
    action: &FollowAction,
    global_secs: f64,
) -> f64 {
    let Some(target) = follow_target(registry, current_index, action) else {
        return 0.0;
    };
    match registry.resolve(&target) {
        crate::switcher::registry::Resolve::Registered { record, .. } => {
            effective_transition_secs(record, global_secs)
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switcher::tracker::{Telemetry, TelemetryChannel};

    fn tracker_at(total: u64, current: u64, rate: f64, n: u32) -> PlaybackTracker {
        let mut tracker = PlaybackTracker::new();
        tracker.start(&DoneOn::PlayNTimes { count: n });
        tracker.set_metadata(total, rate);
        tracker.apply(Telemetry {
            channel: TelemetryChannel::Index,
            value: current as f64,
        });
        tracker
    }

    fn registry_with(names: &[&str]) -> SourceRegistry {
        let records = names.iter().map(|n| SourceRecord::named(*n)).collect();
        SourceRegistry::from_parts(records, 0, None, SourceRecord::named("new_source"))
    }

    #[test]
    fn test_early_trigger_timing() {
        // total=100, rate=30, transition=1.0s => 30 frames.
        // Done must fire exactly when frames_remaining first becomes <= 30
        // and > 0, i.e. at frame 69 (remaining = 30), not before.
        let evaluator = DoneEvaluator::new(FrameIndexing::ZeroBased);
        let policy = DoneOn::PlayNTimes { count: 1 };

        let tracker = tracker_at(100, 68, 30.0, 1);
        assert!(!evaluator.early_trigger(&tracker, &policy, 1.0));

        let tracker = tracker_at(100, 69, 30.0, 1);
        assert!(evaluator.early_trigger(&tracker, &policy, 1.0));

        // At the very last frame remaining is 0: no trigger
        let tracker = tracker_at(100, 99, 30.0, 1);
        assert!(!evaluator.early_trigger(&tracker, &policy, 1.0));
    }

    #[test]
    fn test_early_trigger_respects_frame_indexing() {
        let policy = DoneOn::PlayNTimes { count: 1 };

        // One-based: remaining = total - current, so the window opens one
        // frame later
        let evaluator = DoneEvaluator::new(FrameIndexing::OneBased);
        let tracker = tracker_at(100, 69, 30.0, 1);
        assert!(!evaluator.early_trigger(&tracker, &policy, 1.0));
        let tracker = tracker_at(100, 70, 30.0, 1);
        assert!(evaluator.early_trigger(&tracker, &policy, 1.0));
    }

    #[test]
    fn test_early_trigger_needs_final_loop() {
        let evaluator = DoneEvaluator::default();
        let policy = DoneOn::PlayNTimes { count: 2 };

        // First of two loops: no trigger even inside the window
        let tracker = tracker_at(100, 90, 30.0, 2);
        assert!(!evaluator.early_trigger(&tracker, &policy, 1.0));

        // After one loop edge we are on the final loop
        let mut tracker = tracker_at(100, 90, 30.0, 2);
        tracker.apply(Telemetry {
            channel: TelemetryChannel::LastFrame,
            value: 1.0,
        });
        assert!(evaluator.early_trigger(&tracker, &policy, 1.0));
    }

    #[test]
    fn test_early_trigger_needs_transition_time() {
        let evaluator = DoneEvaluator::default();
        let policy = DoneOn::PlayNTimes { count: 1 };
        let tracker = tracker_at(100, 95, 30.0, 1);
        assert!(!evaluator.early_trigger(&tracker, &policy, 0.0));
    }

    #[test]
    fn test_early_trigger_latched_after_done() {
        let evaluator = DoneEvaluator::default();
        let policy = DoneOn::PlayNTimes { count: 1 };
        let mut tracker = tracker_at(100, 80, 30.0, 1);
        tracker.latch_done();
        assert!(!evaluator.early_trigger(&tracker, &policy, 1.0));
    }

    #[test]
    fn test_loop_edge_done_on_final_edge_only() {
        let evaluator = DoneEvaluator::default();
        let policy = DoneOn::PlayNTimes { count: 2 };
        let mut tracker = PlaybackTracker::new();
        tracker.start(&policy);

        tracker.apply(Telemetry {
            channel: TelemetryChannel::LastFrame,
            value: 1.0,
        });
        assert!(!evaluator.loop_edge_done(&tracker, &policy));

        tracker.apply(Telemetry {
            channel: TelemetryChannel::LastFrame,
            value: 0.0,
        });
        tracker.apply(Telemetry {
            channel: TelemetryChannel::LastFrame,
            value: 1.0,
        });
        assert!(evaluator.loop_edge_done(&tracker, &policy));
        assert_eq!(tracker.loop_count(), 2);
        assert_eq!(tracker.loops_remaining(), 0);
    }

    #[test]
    fn test_follow_target_play_next() {
        let registry = registry_with(&["A", "B", "C"]);
        assert_eq!(
            follow_target(&registry, Some(0), &FollowAction::PlayNext),
            Some(SourceRef::Index(1))
        );
        // Last source has no next
        assert_eq!(
            follow_target(&registry, Some(2), &FollowAction::PlayNext),
            None
        );
        // Inline source (no registry index) wraps to the first entry
        assert_eq!(
            follow_target(&registry, None, &FollowAction::PlayNext),
            Some(SourceRef::Index(0))
        );
    }

    #[test]
    fn test_follow_target_goto() {
        let registry = registry_with(&["A", "B"]);
        assert_eq!(
            follow_target(&registry, Some(0), &FollowAction::GotoIndex { index: 1 }),
            Some(SourceRef::Index(1))
        );
        assert_eq!(
            follow_target(&registry, Some(0), &FollowAction::GotoIndex { index: 9 }),
            None
        );
        assert_eq!(
            follow_target(
                &registry,
                Some(0),
                &FollowAction::GotoName {
                    name: "B".to_string()
                }
            ),
            Some(SourceRef::Name("B".to_string()))
        );
        assert_eq!(
            follow_target(
                &registry,
                Some(0),
                &FollowAction::GotoName {
                    name: "Missing".to_string()
                }
            ),
            None
        );
    }

    #[test]
    fn test_effective_transition_time() {
        let mut record = SourceRecord::named("A");
        record.settings.transition_time_secs = 0.5;
        assert_eq!(effective_transition_secs(&record, 2.0), 0.5);

        record.settings.use_global_transition_time = true;
        assert_eq!(effective_transition_secs(&record, 2.0), 2.0);
    }

    #[test]
    fn test_follow_transition_secs_without_target() {
        let registry = registry_with(&["A"]);
        let secs = follow_transition_secs(&registry, Some(0), &FollowAction::PlayNext, 2.0);
        assert_eq!(secs, 0.0);
    }
}
