//! Shared test helpers: recording mock collaborators and engine spawning.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use cuedeck_engine::config::RuntimeSettings;
use cuedeck_engine::db;
use cuedeck_engine::error::{Error, Result};
use cuedeck_engine::state::SharedState;
use cuedeck_engine::switcher::collab::{
    MediaMetadata, PlaybackControl, TimerService, TransitionRenderer, TransitionSetup,
};
use cuedeck_engine::switcher::done::FrameIndexing;
use cuedeck_engine::switcher::engine::EngineMsg;
use cuedeck_engine::switcher::machine::BufferId;
use cuedeck_engine::switcher::{Collaborators, EngineHandle, SwitchEngine};
use cuedeck_common::model::SourceRecord;
use sqlx::{Pool, Sqlite};
use tokio::sync::mpsc::UnboundedSender;

/// Playback mock: records calls, serves configurable metadata, and can be
/// told to fail loads for specific source names.
#[derive(Clone, Default)]
pub struct RecordingPlayback {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub metadata: Arc<Mutex<[Option<MediaMetadata>; 2]>>,
    pub fail_loads: Arc<Mutex<HashSet<String>>>,
}

impl RecordingPlayback {
    pub fn set_metadata(&self, buffer: BufferId, total_frames: u64, sample_rate: f64) {
        self.metadata.lock().unwrap()[buffer.index()] = Some(MediaMetadata {
            total_frames,
            sample_rate,
        });
    }

    pub fn fail_load_of(&self, name: &str) {
        self.fail_loads.lock().unwrap().insert(name.to_string());
    }
}

impl PlaybackControl for RecordingPlayback {
    fn load(&mut self, buffer: BufferId, record: &SourceRecord) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("load {:?} {}", buffer, record.name()));
        if self.fail_loads.lock().unwrap().contains(record.name()) {
            return Err(Error::Collaborator(format!(
                "cannot open '{}'",
                record.name()
            )));
        }
        Ok(())
    }

    fn start(&mut self, buffer: BufferId) -> Result<()> {
        self.calls.lock().unwrap().push(format!("start {:?}", buffer));
        Ok(())
    }

    fn stop(&mut self, buffer: BufferId) -> Result<()> {
        self.calls.lock().unwrap().push(format!("stop {:?}", buffer));
        Ok(())
    }

    fn metadata(&self, buffer: BufferId) -> Option<MediaMetadata> {
        self.metadata.lock().unwrap()[buffer.index()]
    }
}

/// Timer mock: records calls, fires nothing on its own. Tests drive
/// completion by sending `EngineMsg::TimerDone` directly.
#[derive(Clone, Default)]
pub struct RecordingTimer {
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl TimerService for RecordingTimer {
    fn initialize(&mut self, buffer: BufferId, seconds: f64) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("initialize {:?} {:.1}", buffer, seconds));
        Ok(())
    }

    fn start(&mut self, buffer: BufferId) -> Result<()> {
        self.calls.lock().unwrap().push(format!("start {:?}", buffer));
        Ok(())
    }

    fn stop(&mut self, buffer: BufferId) -> Result<()> {
        self.calls.lock().unwrap().push(format!("stop {:?}", buffer));
        Ok(())
    }
}

/// Renderer mock: records setups; completion is driven by tests sending
/// `EngineMsg::TransitionFinished`.
#[derive(Clone, Default)]
pub struct RecordingRenderer {
    pub setups: Arc<Mutex<Vec<TransitionSetup>>>,
}

impl TransitionRenderer for RecordingRenderer {
    fn configure(&mut self, setup: &TransitionSetup) -> Result<()> {
        self.setups.lock().unwrap().push(setup.clone());
        Ok(())
    }
}

/// A running engine plus every mock surface a test needs to poke.
pub struct TestDeck {
    pub handle: EngineHandle,
    pub state: Arc<SharedState>,
    pub pool: Pool<Sqlite>,
    pub sender: UnboundedSender<EngineMsg>,
    pub playback: RecordingPlayback,
    pub timers: RecordingTimer,
    pub renderer: RecordingRenderer,
}

impl TestDeck {
    /// Wait until every previously sent message has been processed.
    ///
    /// Commands round-trip through the engine channel, so awaiting one
    /// flushes all fire-and-forget messages queued before it.
    pub async fn sync(&self) {
        self.handle.sources().await.unwrap();
    }

    /// The currently live buffer (the one armed by the latest take).
    pub async fn live_buffer(&self) -> BufferId {
        self.state.snapshot().await.live_buffer
    }

    pub fn finish_transition(&self) {
        self.sender.send(EngineMsg::TransitionFinished).unwrap();
    }
}

pub async fn test_pool() -> Pool<Sqlite> {
    // Single connection: every handle sees the same in-memory database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::init::init_db(&pool).await.unwrap();
    pool
}

pub fn default_runtime() -> RuntimeSettings {
    RuntimeSettings {
        global_transition_time_secs: 2.0,
        queue_enabled: true,
        safety_enabled: false,
        frame_indexing: FrameIndexing::ZeroBased,
    }
}

/// Spawn an engine over the given records with recording collaborators.
pub async fn spawn_deck(records: Vec<SourceRecord>) -> TestDeck {
    let pool = test_pool().await;
    db::registry::save_sources(&pool, &records).await.unwrap();
    spawn_deck_on(pool, default_runtime()).await
}

/// Spawn an engine on an existing pool (restart scenarios).
pub async fn spawn_deck_on(pool: Pool<Sqlite>, runtime: RuntimeSettings) -> TestDeck {
    let state = Arc::new(SharedState::new());
    let playback = RecordingPlayback::default();
    let timers = RecordingTimer::default();
    let renderer = RecordingRenderer::default();

    let (playback_c, timers_c, renderer_c) =
        (playback.clone(), timers.clone(), renderer.clone());
    let (engine, handle) = SwitchEngine::new(
        pool.clone(),
        Arc::clone(&state),
        move |_tx| Collaborators {
            playback: Box::new(playback_c),
            timers: Box::new(timers_c),
            renderer: Box::new(renderer_c),
        },
        &runtime,
    )
    .await
    .unwrap();

    let sender = handle.sender();
    tokio::spawn(engine.run());

    TestDeck {
        handle,
        state,
        pool,
        sender,
        playback,
        timers,
        renderer,
    }
}
