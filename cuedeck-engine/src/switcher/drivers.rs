//! Default collaborator implementations
//!
//! Tokio-backed drivers for hosts that integrate over the message channel:
//! a wall-clock done timer, a wall-clock transition renderer (completes when
//! its duration elapses), and a headless playback stub for running the
//! engine without a media backend. Real hosts replace any of these with
//! their own implementations and feed telemetry through the same channel.

use crate::error::{Error, Result};
use crate::switcher::collab::{
    MediaMetadata, PlaybackControl, TimerService, TransitionRenderer, TransitionSetup,
};
use crate::switcher::engine::EngineMsg;
use crate::switcher::machine::BufferId;
use cuedeck_common::model::{SourceKind, SourceRecord};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};
use tracing::debug;

/// Progress tick period for the wall-clock timer
const TIMER_TICK_MS: u64 = 100;

/// Wall-clock done timer driven by tokio tasks
pub struct TokioTimerService {
    tx: UnboundedSender<EngineMsg>,
    durations: [f64; 2],
    tasks: [Option<JoinHandle<()>>; 2],
}

impl TokioTimerService {
    pub fn new(tx: UnboundedSender<EngineMsg>) -> Self {
        Self {
            tx,
            durations: [0.0, 0.0],
            tasks: [None, None],
        }
    }

    fn abort_task(&mut self, buffer: BufferId) {
        if let Some(task) = self.tasks[buffer.index()].take() {
            task.abort();
        }
    }
}

impl TimerService for TokioTimerService {
    fn initialize(&mut self, buffer: BufferId, seconds: f64) -> Result<()> {
        self.abort_task(buffer);
        self.durations[buffer.index()] = seconds.max(0.0);
        Ok(())
    }

    fn start(&mut self, buffer: BufferId) -> Result<()> {
        self.abort_task(buffer);
        let duration = self.durations[buffer.index()];
        let tx = self.tx.clone();

        if duration <= 0.0 {
            // Zero-length timer completes immediately
            let _ = tx.send(EngineMsg::TimerDone { buffer });
            return Ok(());
        }

        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut tick = interval(Duration::from_millis(TIMER_TICK_MS));
            loop {
                tick.tick().await;
                let elapsed = started.elapsed().as_secs_f64();
                let fraction = (elapsed / duration).clamp(0.0, 1.0);
                if tx
                    .send(EngineMsg::TimerProgress { buffer, fraction })
                    .is_err()
                {
                    break;
                }
                if elapsed >= duration {
                    let _ = tx.send(EngineMsg::TimerDone { buffer });
                    break;
                }
            }
        });
        self.tasks[buffer.index()] = Some(task);
        Ok(())
    }

    fn stop(&mut self, buffer: BufferId) -> Result<()> {
        self.abort_task(buffer);
        Ok(())
    }
}

/// Wall-clock transition renderer
///
/// Stands in for a compositing backend: accepts the setup, waits out the
/// configured duration, then raises transition-complete. A new configure
/// supersedes the previous clock.
pub struct ClockTransitionRenderer {
    tx: UnboundedSender<EngineMsg>,
    task: Option<JoinHandle<()>>,
}

impl ClockTransitionRenderer {
    pub fn new(tx: UnboundedSender<EngineMsg>) -> Self {
        Self { tx, task: None }
    }
}

impl TransitionRenderer for ClockTransitionRenderer {
    fn configure(&mut self, setup: &TransitionSetup) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        debug!(
            "Transition configured: {} over {:.2}s",
            setup.transition.kind_str(),
            setup.duration_secs
        );

        let tx = self.tx.clone();
        let duration = setup.duration_secs.max(0.0);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(duration)).await;
            let _ = tx.send(EngineMsg::TransitionFinished);
        }));
        Ok(())
    }
}

/// Headless playback stub
///
/// No decoding happens; file sources with an empty path fail to open (the
/// degraded-state path), everything else loads silently and reports no
/// metadata. Timer and external done conditions keep the engine fully
/// usable without a media backend.
#[derive(Default)]
pub struct HeadlessPlayback;

impl PlaybackControl for HeadlessPlayback {
    fn load(&mut self, buffer: BufferId, record: &SourceRecord) -> Result<()> {
        if record.settings.kind == SourceKind::File && record.file.path.is_empty() {
            return Err(Error::Collaborator(format!(
                "no file path configured for '{}'",
                record.name()
            )));
        }
        debug!("Loaded '{}' into {:?}", record.name(), buffer);
        Ok(())
    }

    fn start(&mut self, _buffer: BufferId) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self, _buffer: BufferId) -> Result<()> {
        Ok(())
    }

    fn metadata(&self, _buffer: BufferId) -> Option<MediaMetadata> {
        None
    }
}
