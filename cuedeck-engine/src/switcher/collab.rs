//! Collaborator contracts
//!
//! The engine drives media playback, done timers, and transition rendering
//! through these traits. Implementations are injected at construction time
//! (no global singletons); their asynchronous callbacks come back into the
//! engine as messages on its event channel, never as re-entrant calls.

use crate::error::Result;
use crate::switcher::machine::BufferId;
use cuedeck_common::model::{SourceRecord, TransitionConfig, TransitionShape};
use serde::{Deserialize, Serialize};

/// File metadata reported by the playback collaborator once a source opens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub total_frames: u64,
    pub sample_rate: f64,
}

/// Everything the transition renderer needs for one transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionSetup {
    pub transition: TransitionConfig,
    pub duration_secs: f64,
    pub shape: TransitionShape,
}

/// Per-buffer playback engine
///
/// `load` points the buffer at a source's content; `start` begins playback
/// from frame zero. Telemetry (frame index, length, rate, last-frame, open)
/// arrives separately as engine messages tagged with the buffer id.
pub trait PlaybackControl: Send + Sync {
    fn load(&mut self, buffer: BufferId, record: &SourceRecord) -> Result<()>;
    fn start(&mut self, buffer: BufferId) -> Result<()>;
    fn stop(&mut self, buffer: BufferId) -> Result<()>;
    /// One-shot metadata query; None while the media is still opening.
    fn metadata(&self, buffer: BufferId) -> Option<MediaMetadata>;
}

/// Done timer per buffer
///
/// Fires a completion message when the configured duration elapses and, while
/// running, progress-fraction messages.
pub trait TimerService: Send + Sync {
    fn initialize(&mut self, buffer: BufferId, seconds: f64) -> Result<()>;
    fn start(&mut self, buffer: BufferId) -> Result<()>;
    fn stop(&mut self, buffer: BufferId) -> Result<()>;
}

/// Transition renderer
///
/// Accepts a configuration for the upcoming transition and later raises a
/// transition-complete message on its own schedule.
pub trait TransitionRenderer: Send + Sync {
    fn configure(&mut self, setup: &TransitionSetup) -> Result<()>;
}
