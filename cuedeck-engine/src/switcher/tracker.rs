//! Per-buffer playback tracking
//!
//! Each physical buffer owns one tracker. It consumes the telemetry stream
//! from the playback collaborator (frame index, length, rate, last-frame
//! flag, open/preload flags) plus timer-fraction callbacks, and derives the
//! display values the UI binds to. Loop counting is edge-triggered: a
//! last-frame flag held high across ticks counts once.

use cuedeck_common::model::{DoneOn, SourceKind};
use cuedeck_common::timecode;
use serde::{Deserialize, Serialize};

/// Fallback rate when the media reports none
const DEFAULT_SAMPLE_RATE: f64 = 30.0;

/// Telemetry channels emitted by the playback collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryChannel {
    /// Current frame position
    Index,
    /// Total frame count
    Length,
    /// Frames per second
    SampleRate,
    /// 1.0 while the playhead sits on the last frame
    LastFrame,
    /// 1.0 once the file is open
    Open,
    /// 1.0 while preloading has completed enough to report metadata
    Preloading,
}

/// One telemetry sample
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Telemetry {
    pub channel: TelemetryChannel,
    pub value: f64,
}

/// What a telemetry sample meant for this buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerEvent {
    None,
    /// Playhead advanced (early-trigger evaluation point)
    FrameAdvanced,
    /// Rising edge of the last-frame flag: one loop completed
    LoopEdge,
    /// File open/preload finished; metadata can be snapshotted
    MetadataReady,
}

/// Runtime playback state for one buffer
#[derive(Debug, Clone)]
pub struct PlaybackTracker {
    current_frame: u64,
    total_frames: u64,
    sample_rate: f64,
    loop_count: u32,
    loops_remaining: u32,
    timer_progress: f64,
    timer_length_secs: f64,
    timer_time_remaining_secs: f64,
    done_triggered: bool,
    last_frame_edge: f64,
    play_n_times: u32,
}

impl PlaybackTracker {
    pub fn new() -> Self {
        Self {
            current_frame: 0,
            total_frames: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            loop_count: 0,
            loops_remaining: 0,
            timer_progress: 0.0,
            timer_length_secs: 0.0,
            timer_time_remaining_secs: 0.0,
            done_triggered: false,
            last_frame_edge: 0.0,
            play_n_times: 1,
        }
    }

    /// Re-arm for a new playthrough of a source with the given done policy.
    ///
    /// Resets counters and the done latch; `loops_remaining` starts at
    /// `play_n_times - 1` (the first playthrough is already underway).
    pub fn start(&mut self, done_on: &DoneOn) {
        self.done_triggered = false;
        self.last_frame_edge = 0.0;
        self.current_frame = 0;
        self.loop_count = 0;
        self.play_n_times = done_on.play_n_times();
        self.loops_remaining = self.play_n_times.saturating_sub(1);
        self.timer_progress = 0.0;
        self.timer_length_secs = done_on.timer_seconds().unwrap_or(0.0);
        self.timer_time_remaining_secs = self.timer_length_secs;
    }

    /// Apply one telemetry sample.
    pub fn apply(&mut self, telemetry: Telemetry) -> TrackerEvent {
        match telemetry.channel {
            TelemetryChannel::Index => {
                self.current_frame = telemetry.value.max(0.0) as u64;
                TrackerEvent::FrameAdvanced
            }
            TelemetryChannel::Length => {
                self.total_frames = telemetry.value.max(0.0) as u64;
                TrackerEvent::None
            }
            TelemetryChannel::SampleRate => {
                self.sample_rate = if telemetry.value > 0.0 {
                    telemetry.value
                } else {
                    DEFAULT_SAMPLE_RATE
                };
                TrackerEvent::None
            }
            TelemetryChannel::LastFrame => {
                let mut event = TrackerEvent::None;
                if telemetry.value == 1.0 && self.last_frame_edge == 0.0 {
                    self.loop_count += 1;
                    self.loops_remaining =
                        self.play_n_times.saturating_sub(self.loop_count);
                    event = TrackerEvent::LoopEdge;
                }
                self.last_frame_edge = telemetry.value;
                event
            }
            TelemetryChannel::Open | TelemetryChannel::Preloading => {
                if telemetry.value == 1.0 {
                    TrackerEvent::MetadataReady
                } else {
                    TrackerEvent::None
                }
            }
        }
    }

    /// Snapshot file metadata (length/rate) directly from the source.
    ///
    /// Used on open/preload and on the deferred metadata refresh; valid for
    /// display regardless of whether this buffer is live.
    pub fn set_metadata(&mut self, total_frames: u64, sample_rate: f64) {
        self.total_frames = total_frames;
        self.sample_rate = if sample_rate > 0.0 {
            sample_rate
        } else {
            DEFAULT_SAMPLE_RATE
        };
    }

    /// Timer-fraction callback from the timer collaborator.
    pub fn timer_fraction(&mut self, fraction: f64) {
        self.timer_progress = fraction.clamp(0.0, 1.0);
        self.timer_time_remaining_secs =
            self.timer_length_secs * (1.0 - self.timer_progress);
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn loops_remaining(&self) -> u32 {
        self.loops_remaining
    }

    pub fn play_n_times(&self) -> u32 {
        self.play_n_times
    }

    pub fn timer_progress(&self) -> f64 {
        self.timer_progress
    }

    pub fn done_triggered(&self) -> bool {
        self.done_triggered
    }

    /// Latch the done edge; at most one follow-action per playthrough.
    pub fn latch_done(&mut self) {
        self.done_triggered = true;
    }

    /// Derive display values for this buffer's current state.
    pub fn display(
        &self,
        kind: SourceKind,
        done_on: &DoneOn,
        next: Option<&str>,
    ) -> DisplayState {
        let next = next.map(str::to_string);
        match kind {
            SourceKind::File => self.file_display(done_on, next),
            SourceKind::Procedural => self.procedural_display(done_on, next),
            SourceKind::None => DisplayState::not_applicable(),
        }
    }

    fn file_display(&self, done_on: &DoneOn, next: Option<String>) -> DisplayState {
        let timecode = timecode::format_frames(self.current_frame, self.sample_rate);
        match done_on {
            DoneOn::PlayNTimes { .. } => {
                let n = self.play_n_times as u64;
                let total_all = self.total_frames * n;
                let completed = self.loop_count as u64 * self.total_frames + self.current_frame;
                let progress = if total_all > 1 {
                    ((completed as f64 / (total_all - 1) as f64) * 100.0).clamp(0.0, 100.0)
                } else if total_all == 1 {
                    100.0
                } else {
                    0.0
                };

                let remaining_current = self.frames_left_in_loop();
                let remaining_future = self.loops_remaining as u64 * self.total_frames;
                DisplayState {
                    timecode,
                    time_remaining: timecode::format_frames(
                        remaining_current + remaining_future,
                        self.sample_rate,
                    ),
                    progress_percent: Some(progress),
                    loop_count: Some(self.loop_count),
                    loops_remaining: Some(self.loops_remaining),
                    next,
                }
            }
            DoneOn::Timer { .. } => DisplayState {
                timecode,
                time_remaining: timecode::format_seconds(self.timer_time_remaining_secs),
                progress_percent: Some((self.timer_progress * 100.0).clamp(0.0, 100.0)),
                loop_count: Some(self.loop_count),
                loops_remaining: None,
                next,
            },
            _ => {
                let progress = if self.total_frames > 1 {
                    ((self.current_frame as f64 / (self.total_frames - 1) as f64) * 100.0)
                        .clamp(0.0, 100.0)
                } else if self.total_frames == 1 {
                    100.0
                } else {
                    0.0
                };
                DisplayState {
                    timecode,
                    time_remaining: timecode::format_frames(
                        self.frames_left_in_loop(),
                        self.sample_rate,
                    ),
                    progress_percent: Some(progress),
                    loop_count: Some(self.loop_count),
                    loops_remaining: None,
                    next,
                }
            }
        }
    }

    fn procedural_display(&self, done_on: &DoneOn, next: Option<String>) -> DisplayState {
        match done_on {
            DoneOn::Timer { .. } => DisplayState {
                timecode: timecode::format_seconds(
                    self.timer_length_secs * self.timer_progress,
                ),
                time_remaining: timecode::format_seconds(self.timer_time_remaining_secs),
                progress_percent: Some((self.timer_progress * 100.0).clamp(0.0, 100.0)),
                loop_count: None,
                loops_remaining: None,
                next,
            },
            _ => DisplayState {
                next,
                ..DisplayState::not_applicable()
            },
        }
    }

    /// Frames left before the last valid frame of the current loop
    /// (0-indexed: last valid frame is `total - 1`).
    fn frames_left_in_loop(&self) -> u64 {
        (self.total_frames.saturating_sub(1)).saturating_sub(self.current_frame)
    }
}

impl Default for PlaybackTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Display values derived from tracker state, ready for UI binding
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DisplayState {
    pub timecode: String,
    pub time_remaining: String,
    pub progress_percent: Option<f64>,
    pub loop_count: Option<u32>,
    pub loops_remaining: Option<u32>,
    pub next: Option<String>,
}

impl DisplayState {
    pub fn not_applicable() -> Self {
        Self {
            timecode: "N/A".to_string(),
            time_remaining: "N/A".to_string(),
            progress_percent: None,
            loop_count: None,
            loops_remaining: None,
            next: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(channel: TelemetryChannel, value: f64) -> Telemetry {
        Telemetry { channel, value }
    }

    #[test]
    fn test_start_resets_state() {
        let mut tracker = PlaybackTracker::new();
        tracker.apply(sample(TelemetryChannel::Index, 42.0));
        tracker.apply(sample(TelemetryChannel::LastFrame, 1.0));
        tracker.latch_done();

        tracker.start(&DoneOn::PlayNTimes { count: 3 });
        assert_eq!(tracker.current_frame(), 0);
        assert_eq!(tracker.loop_count(), 0);
        assert_eq!(tracker.loops_remaining(), 2);
        assert!(!tracker.done_triggered());
    }

    #[test]
    fn test_loop_counting_is_edge_triggered() {
        let mut tracker = PlaybackTracker::new();
        tracker.start(&DoneOn::PlayNTimes { count: 2 });

        // Held at 1.0 across ticks: exactly one increment
        assert_eq!(
            tracker.apply(sample(TelemetryChannel::LastFrame, 1.0)),
            TrackerEvent::LoopEdge
        );
        assert_eq!(
            tracker.apply(sample(TelemetryChannel::LastFrame, 1.0)),
            TrackerEvent::None
        );
        assert_eq!(tracker.loop_count(), 1);
        assert_eq!(tracker.loops_remaining(), 1);

        // Falling then rising again: second loop
        tracker.apply(sample(TelemetryChannel::LastFrame, 0.0));
        assert_eq!(
            tracker.apply(sample(TelemetryChannel::LastFrame, 1.0)),
            TrackerEvent::LoopEdge
        );
        assert_eq!(tracker.loop_count(), 2);
        assert_eq!(tracker.loops_remaining(), 0);
    }

    #[test]
    fn test_sample_rate_fallback() {
        let mut tracker = PlaybackTracker::new();
        tracker.apply(sample(TelemetryChannel::SampleRate, 0.0));
        assert_eq!(tracker.sample_rate(), 30.0);

        tracker.apply(sample(TelemetryChannel::SampleRate, 24.0));
        assert_eq!(tracker.sample_rate(), 24.0);

        tracker.set_metadata(100, -5.0);
        assert_eq!(tracker.sample_rate(), 30.0);
    }

    #[test]
    fn test_metadata_ready_on_open() {
        let mut tracker = PlaybackTracker::new();
        assert_eq!(
            tracker.apply(sample(TelemetryChannel::Open, 1.0)),
            TrackerEvent::MetadataReady
        );
        assert_eq!(
            tracker.apply(sample(TelemetryChannel::Open, 0.0)),
            TrackerEvent::None
        );
        assert_eq!(
            tracker.apply(sample(TelemetryChannel::Preloading, 1.0)),
            TrackerEvent::MetadataReady
        );
    }

    #[test]
    fn test_timer_fraction() {
        let mut tracker = PlaybackTracker::new();
        tracker.start(&DoneOn::Timer { seconds: 10.0 });
        tracker.timer_fraction(0.25);
        assert!((tracker.timer_time_remaining_secs - 7.5).abs() < 1e-9);
        assert_eq!(tracker.timer_progress(), 0.25);

        tracker.timer_fraction(1.5);
        assert_eq!(tracker.timer_progress(), 1.0);
    }

    #[test]
    fn test_play_n_times_progress_formula() {
        let mut tracker = PlaybackTracker::new();
        tracker.start(&DoneOn::PlayNTimes { count: 2 });
        tracker.set_metadata(100, 30.0);
        tracker.apply(sample(TelemetryChannel::Index, 50.0));

        let display = tracker.display(
            SourceKind::File,
            &DoneOn::PlayNTimes { count: 2 },
            Some("B"),
        );
        // (0*100 + 50) / (200 - 1) * 100
        let expected = 50.0 / 199.0 * 100.0;
        assert!((display.progress_percent.unwrap() - expected).abs() < 1e-9);
        assert_eq!(display.loops_remaining, Some(1));
        assert_eq!(display.next.as_deref(), Some("B"));
        // 49 frames left this loop + 100 in the next = 149 @ 30fps
        assert_eq!(display.time_remaining, "00:00:04:29");
    }

    #[test]
    fn test_degenerate_single_frame_progress() {
        let mut tracker = PlaybackTracker::new();
        tracker.start(&DoneOn::PlayNTimes { count: 1 });
        tracker.set_metadata(1, 30.0);
        let display =
            tracker.display(SourceKind::File, &DoneOn::PlayNTimes { count: 1 }, None);
        assert_eq!(display.progress_percent, Some(100.0));
    }

    #[test]
    fn test_timer_display_for_procedural() {
        let mut tracker = PlaybackTracker::new();
        tracker.start(&DoneOn::Timer { seconds: 60.0 });
        tracker.timer_fraction(0.5);
        let display = tracker.display(
            SourceKind::Procedural,
            &DoneOn::Timer { seconds: 60.0 },
            None,
        );
        assert_eq!(display.progress_percent, Some(50.0));
        assert_eq!(display.timecode, "00:00:30:00");
        assert_eq!(display.time_remaining, "00:00:30:00");
        assert_eq!(display.loop_count, None);
    }

    #[test]
    fn test_none_kind_displays_na() {
        let tracker = PlaybackTracker::new();
        let display = tracker.display(SourceKind::None, &DoneOn::None, None);
        assert_eq!(display.timecode, "N/A");
        assert_eq!(display.progress_percent, None);
    }
}
