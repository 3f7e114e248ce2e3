//! Transition state machine
//!
//! Owns the global Idle/Transitioning phase, the live-buffer selector, and
//! the FIFO pending queue. This type only decides; arming buffers and
//! configuring the renderer are the engine's side effects, which keeps every
//! decision path directly testable.

use crate::switcher::registry::SourceRef;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Global switcher phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Transitioning,
}

/// One of the two physical playback buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BufferId {
    #[default]
    A,
    B,
}

impl BufferId {
    pub fn other(self) -> BufferId {
        match self {
            BufferId::A => BufferId::B,
            BufferId::B => BufferId::A,
        }
    }

    /// Slot index for per-buffer arrays.
    pub fn index(self) -> usize {
        match self {
            BufferId::A => 0,
            BufferId::B => 1,
        }
    }
}

/// What to do with an incoming switch request
#[derive(Debug, PartialEq)]
pub enum SwitchDecision {
    /// Start the transition now (on the currently inactive buffer)
    Begin(SourceRef),
    /// Deferred behind the in-flight transition
    Queued { depth: usize },
    /// Identical to the queue tail; dropped
    DuplicateDropped,
}

#[derive(Debug)]
pub struct TransitionMachine {
    phase: Phase,
    live: BufferId,
    pending: VecDeque<SourceRef>,
    queue_enabled: bool,
}

impl TransitionMachine {
    pub fn new(live: BufferId, queue_enabled: bool) -> Self {
        Self {
            phase: Phase::Idle,
            live,
            pending: VecDeque::new(),
            queue_enabled,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_transitioning(&self) -> bool {
        self.phase == Phase::Transitioning
    }

    pub fn live(&self) -> BufferId {
        self.live
    }

    /// The buffer a new transition would be armed on.
    pub fn standby(&self) -> BufferId {
        self.live.other()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn queue_enabled(&self) -> bool {
        self.queue_enabled
    }

    pub fn set_queue_enabled(&mut self, enabled: bool) {
        self.queue_enabled = enabled;
    }

    /// Route a switch request.
    ///
    /// `force` clears the queue and begins regardless of phase. While a
    /// transition is in flight, requests queue FIFO (consecutive duplicates
    /// of the tail are dropped) when queueing is enabled, otherwise they
    /// interrupt immediately.
    pub fn request(&mut self, reference: SourceRef, force: bool) -> SwitchDecision {
        if force {
            self.pending.clear();
            return SwitchDecision::Begin(reference);
        }

        if self.phase == Phase::Transitioning {
            if self.queue_enabled {
                if self.pending.back() == Some(&reference) {
                    return SwitchDecision::DuplicateDropped;
                }
                self.pending.push_back(reference);
                return SwitchDecision::Queued {
                    depth: self.pending.len(),
                };
            }
            return SwitchDecision::Begin(reference);
        }

        SwitchDecision::Begin(reference)
    }

    /// Commit a begun transition: phase moves to Transitioning and the live
    /// buffer flips to the freshly armed one. Returns the new live buffer.
    pub fn begin(&mut self) -> BufferId {
        self.phase = Phase::Transitioning;
        self.live = self.live.other();
        self.live
    }

    /// Transition renderer finished: back to Idle; the caller serves the
    /// popped head, if any, as the next request.
    pub fn complete(&mut self) -> Option<SourceRef> {
        self.phase = Phase::Idle;
        self.pending.pop_front()
    }

    /// Resolution failed after a Begin decision: no side effects remain.
    pub fn abort(&mut self) {
        self.phase = Phase::Idle;
    }

    /// Drop every pending switch. Returns how many were cleared.
    pub fn clear_pending(&mut self) -> usize {
        let cleared = self.pending.len();
        self.pending.clear();
        cleared
    }

    /// Keep only the final destination in the queue.
    pub fn skip_to_last_pending(&mut self) -> usize {
        if self.pending.len() > 1 {
            let last = self.pending.pop_back();
            self.pending.clear();
            if let Some(last) = last {
                self.pending.push_back(last);
            }
        }
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn by_index(i: usize) -> SourceRef {
        SourceRef::Index(i)
    }

    #[test]
    fn test_idle_request_begins() {
        let mut machine = TransitionMachine::new(BufferId::A, true);
        assert_eq!(
            machine.request(by_index(0), false),
            SwitchDecision::Begin(by_index(0))
        );
        assert_eq!(machine.begin(), BufferId::B);
        assert!(machine.is_transitioning());
    }

    #[test]
    fn test_requests_queue_fifo_while_transitioning() {
        let mut machine = TransitionMachine::new(BufferId::A, true);
        machine.request(by_index(0), false);
        machine.begin();

        assert_eq!(
            machine.request(by_index(1), false),
            SwitchDecision::Queued { depth: 1 }
        );
        assert_eq!(
            machine.request(by_index(2), false),
            SwitchDecision::Queued { depth: 2 }
        );

        // Drain strictly FIFO
        assert_eq!(machine.complete(), Some(by_index(1)));
        machine.begin();
        assert_eq!(machine.complete(), Some(by_index(2)));
        machine.begin();
        assert_eq!(machine.complete(), None);
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_only_consecutive_duplicates_dropped() {
        let mut machine = TransitionMachine::new(BufferId::A, true);
        machine.request(by_index(0), false);
        machine.begin();

        machine.request(by_index(1), false);
        assert_eq!(
            machine.request(by_index(1), false),
            SwitchDecision::DuplicateDropped
        );
        machine.request(by_index(2), false);
        // Same as an earlier entry but not the tail: kept
        assert_eq!(
            machine.request(by_index(1), false),
            SwitchDecision::Queued { depth: 3 }
        );
    }

    #[test]
    fn test_force_clears_queue_and_begins() {
        let mut machine = TransitionMachine::new(BufferId::A, true);
        machine.request(by_index(0), false);
        machine.begin();
        machine.request(by_index(1), false);
        machine.request(by_index(2), false);

        assert_eq!(
            machine.request(by_index(5), true),
            SwitchDecision::Begin(by_index(5))
        );
        assert_eq!(machine.pending_len(), 0);
    }

    #[test]
    fn test_queue_disabled_interrupts() {
        let mut machine = TransitionMachine::new(BufferId::A, false);
        machine.request(by_index(0), false);
        machine.begin();
        assert_eq!(
            machine.request(by_index(1), false),
            SwitchDecision::Begin(by_index(1))
        );
    }

    #[test]
    fn test_buffer_flip_ping_pongs() {
        let mut machine = TransitionMachine::new(BufferId::A, true);
        assert_eq!(machine.standby(), BufferId::B);
        assert_eq!(machine.begin(), BufferId::B);
        assert_eq!(machine.begin(), BufferId::A);
        assert_eq!(machine.begin(), BufferId::B);
    }

    #[test]
    fn test_abort_returns_to_idle() {
        let mut machine = TransitionMachine::new(BufferId::A, true);
        machine.request(by_index(9), false);
        machine.begin();
        machine.abort();
        assert_eq!(machine.phase(), Phase::Idle);
    }

    #[test]
    fn test_skip_to_last_pending() {
        let mut machine = TransitionMachine::new(BufferId::A, true);
        machine.request(by_index(0), false);
        machine.begin();
        machine.request(by_index(1), false);
        machine.request(by_index(2), false);
        machine.request(by_index(3), false);

        assert_eq!(machine.skip_to_last_pending(), 1);
        assert_eq!(machine.complete(), Some(by_index(3)));
    }

    #[test]
    fn test_clear_pending() {
        let mut machine = TransitionMachine::new(BufferId::A, true);
        machine.request(by_index(0), false);
        machine.begin();
        machine.request(by_index(1), false);
        assert_eq!(machine.clear_pending(), 1);
        assert_eq!(machine.complete(), None);
    }
}
