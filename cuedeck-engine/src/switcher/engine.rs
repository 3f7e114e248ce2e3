//! Switch engine orchestration
//!
//! Single-owner actor coordinating the source registry, the two playback
//! trackers, the done evaluator, and the transition machine. Host telemetry,
//! timer callbacks, renderer completion, and API commands all arrive as
//! messages on one channel and are processed to completion in order, which
//! makes every registry mutation and transition-state change atomic with
//! respect to the others.

use crate::config::RuntimeSettings;
use crate::db;
use crate::error::{Error, Result};
use crate::state::{SharedState, SwitcherSnapshot};
use crate::switcher::collab::{PlaybackControl, TimerService, TransitionRenderer, TransitionSetup};
use crate::switcher::done::{self, DoneEvaluator};
use crate::switcher::machine::{BufferId, SwitchDecision, TransitionMachine};
use crate::switcher::registry::{Resolve, SourceRef, SourceRegistry};
use crate::switcher::tracker::{PlaybackTracker, Telemetry, TrackerEvent};
use crate::switcher::transfer::{self, ExportSelection, ImportMode};
use chrono::Utc;
use cuedeck_common::events::{DeckEvent, LogEntry};
use cuedeck_common::model::{DoneOn, SourceRecord};
use serde_json::json;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Messages delivered to the engine task
#[derive(Debug)]
pub enum EngineMsg {
    /// API command with a reply channel
    Command(Command),
    /// Telemetry sample from the playback collaborator
    Telemetry {
        buffer: BufferId,
        telemetry: Telemetry,
    },
    /// Timer progress fraction for a buffer
    TimerProgress { buffer: BufferId, fraction: f64 },
    /// Timer completion for a buffer
    TimerDone { buffer: BufferId },
    /// Transition renderer finished the in-flight transition
    TransitionFinished,
    /// Deferred metadata read after arming a buffer (apply-next-cycle)
    RefreshMetadata { buffer: BufferId },
    /// Scheduled switch from a delayed take
    DelayedTake { reference: SourceRef },
}

type Reply<T> = oneshot::Sender<Result<T>>;

/// API commands; every operation reports success/failure via its reply value
#[derive(Debug)]
pub enum Command {
    Take {
        reference: SourceRef,
        force: bool,
        reply: Reply<TakeOutcome>,
    },
    DelayTake {
        reference: SourceRef,
        delay_frames: u64,
        reply: Reply<()>,
    },
    AddSource {
        record: Option<SourceRecord>,
        confirm: bool,
        reply: Reply<MutationOutcome>,
    },
    DeleteSource {
        index: Option<usize>,
        confirm: bool,
        reply: Reply<MutationOutcome>,
    },
    MoveSource {
        from: usize,
        to: usize,
        confirm: bool,
        reply: Reply<MutationOutcome>,
    },
    RenameSource {
        index: usize,
        name: String,
        confirm: bool,
        reply: Reply<MutationOutcome>,
    },
    DuplicateSource {
        index: Option<usize>,
        reply: Reply<MutationOutcome>,
    },
    PasteSource {
        after: Option<usize>,
        data: SourceRecord,
        confirm: bool,
        reply: Reply<MutationOutcome>,
    },
    StoreSource {
        index: usize,
        record: SourceRecord,
        reply: Reply<MutationOutcome>,
    },
    SelectSource {
        index: usize,
        reply: Reply<MutationOutcome>,
    },
    StoreDefault {
        index: Option<usize>,
        reply: Reply<MutationOutcome>,
    },
    InitRegistry {
        confirm: bool,
        reply: Reply<MutationOutcome>,
    },
    ClearPending { reply: Reply<usize> },
    SkipToLastPending { reply: Reply<usize> },
    ToggleSafety { reply: Reply<bool> },
    /// External completion signal for the live source
    ExternalDone { reply: Reply<bool> },
    GetSources {
        reply: Reply<Vec<SourceRecord>>,
    },
    GetLog {
        reply: Reply<Vec<LogEntry>>,
    },
    ClearLog { reply: Reply<()> },
    Import {
        records: Vec<SourceRecord>,
        mode: ImportMode,
        reply: Reply<MutationOutcome>,
    },
    Export {
        selection: ExportSelection,
        reply: Reply<Vec<SourceRecord>>,
    },
}

/// Result of a switch request
#[derive(Debug, Clone, PartialEq)]
pub enum TakeOutcome {
    /// Transition began toward the named source
    Switching {
        index: Option<usize>,
        name: String,
    },
    /// Deferred behind the in-flight transition
    Queued { depth: usize },
    /// Identical to the queue tail; dropped
    DuplicateDropped,
}

/// Result of a registry mutation
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    Applied { index: usize, name: String },
    /// Safety is on and the request did not confirm
    ConfirmationRequired,
}

/// Collaborator bundle injected at construction
pub struct Collaborators {
    pub playback: Box<dyn PlaybackControl>,
    pub timers: Box<dyn TimerService>,
    pub renderer: Box<dyn TransitionRenderer>,
}

/// What is loaded into a physical buffer
#[derive(Debug, Clone)]
struct ArmedSource {
    record: SourceRecord,
    /// Registry index at arm time; None for inline sources
    index: Option<usize>,
}

/// The switching engine actor
pub struct SwitchEngine {
    db_pool: Pool<Sqlite>,
    state: Arc<SharedState>,
    registry: SourceRegistry,
    machine: TransitionMachine,
    trackers: [PlaybackTracker; 2],
    evaluator: DoneEvaluator,
    armed: [Option<ArmedSource>; 2],
    collaborators: Collaborators,
    safety: bool,
    global_transition_secs: f64,
    rx: mpsc::UnboundedReceiver<EngineMsg>,
    tx: mpsc::UnboundedSender<EngineMsg>,
}

impl SwitchEngine {
    /// Construct the engine from persisted state.
    ///
    /// Collaborators are built from the engine's own message sender so their
    /// callbacks (telemetry, timer ticks, transition completion) arrive on
    /// the engine channel. Structured startup: any database or settings
    /// failure propagates to the caller instead of being logged and
    /// swallowed.
    pub async fn new(
        db_pool: Pool<Sqlite>,
        state: Arc<SharedState>,
        make_collaborators: impl FnOnce(mpsc::UnboundedSender<EngineMsg>) -> Collaborators,
        runtime: &RuntimeSettings,
    ) -> Result<(Self, EngineHandle)> {
        info!("Creating switch engine");

        let records = db::registry::load_sources(&db_pool).await?;
        let selected = db::settings::get_selected_index(&db_pool).await?;
        let active = db::settings::get_active_index(&db_pool).await?;
        let template = db::settings::get_default_template(&db_pool)
            .await?
            .unwrap_or_else(|| SourceRecord::named("new_source"));

        info!("Loaded registry: {} sources", records.len());
        let registry = SourceRegistry::from_parts(records, selected, active, template);

        let (tx, rx) = mpsc::unbounded_channel();
        let collaborators = make_collaborators(tx.clone());
        let engine = Self {
            db_pool,
            state,
            registry,
            machine: TransitionMachine::new(BufferId::A, runtime.queue_enabled),
            trackers: [PlaybackTracker::new(), PlaybackTracker::new()],
            evaluator: DoneEvaluator::new(runtime.frame_indexing),
            armed: [None, None],
            collaborators,
            safety: runtime.safety_enabled,
            global_transition_secs: runtime.global_transition_time_secs,
            rx,
            tx: tx.clone(),
        };
        engine.publish_snapshot().await;

        Ok((engine, EngineHandle { tx }))
    }

    /// Run the engine message loop.
    pub async fn run(mut self) {
        info!("Switch engine running");
        while let Some(msg) = self.rx.recv().await {
            self.handle_msg(msg).await;
        }
        debug!("Switch engine loop ended");
    }

    async fn handle_msg(&mut self, msg: EngineMsg) {
        match msg {
            EngineMsg::Command(command) => self.handle_command(command).await,
            EngineMsg::Telemetry { buffer, telemetry } => {
                self.handle_telemetry(buffer, telemetry).await;
            }
            EngineMsg::TimerProgress { buffer, fraction } => {
                self.trackers[buffer.index()].timer_fraction(fraction);
                if buffer == self.machine.live() {
                    self.publish_display().await;
                }
            }
            EngineMsg::TimerDone { buffer } => self.handle_timer_done(buffer).await,
            EngineMsg::TransitionFinished => self.handle_transition_finished().await,
            EngineMsg::RefreshMetadata { buffer } => {
                if let Some(metadata) = self.collaborators.playback.metadata(buffer) {
                    self.trackers[buffer.index()]
                        .set_metadata(metadata.total_frames, metadata.sample_rate);
                }
            }
            EngineMsg::DelayedTake { reference } => {
                if let Err(e) = self.request_switch(reference, false).await {
                    warn!("Delayed take failed: {}", e);
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Telemetry and done-condition flow
    // ------------------------------------------------------------------

    async fn handle_telemetry(&mut self, buffer: BufferId, telemetry: Telemetry) {
        use crate::switcher::tracker::TelemetryChannel;

        let is_metadata_channel = matches!(
            telemetry.channel,
            TelemetryChannel::Open | TelemetryChannel::Preloading
        );
        // Metadata snapshots apply to any buffer; playback telemetry only
        // while the buffer is live.
        if !is_metadata_channel && buffer != self.machine.live() {
            return;
        }

        let event = self.trackers[buffer.index()].apply(telemetry);
        match event {
            TrackerEvent::MetadataReady => {
                if let Some(metadata) = self.collaborators.playback.metadata(buffer) {
                    self.trackers[buffer.index()]
                        .set_metadata(metadata.total_frames, metadata.sample_rate);
                }
            }
            TrackerEvent::LoopEdge => {
                let done = {
                    let armed = match &self.armed[buffer.index()] {
                        Some(armed) => armed,
                        None => return,
                    };
                    self.evaluator.loop_edge_done(
                        &self.trackers[buffer.index()],
                        &armed.record.settings.done_on,
                    )
                };
                if done {
                    self.fire_done(buffer).await;
                }
            }
            TrackerEvent::FrameAdvanced => {
                let early = {
                    let armed = match &self.armed[buffer.index()] {
                        Some(armed) => armed,
                        None => return,
                    };
                    let follow_secs = done::follow_transition_secs(
                        &self.registry,
                        self.registry.active(),
                        &armed.record.settings.follow_action,
                        self.global_transition_secs,
                    );
                    self.evaluator.early_trigger(
                        &self.trackers[buffer.index()],
                        &armed.record.settings.done_on,
                        follow_secs,
                    )
                };
                if early {
                    debug!("Early trigger fired on {:?}", buffer);
                    self.fire_done(buffer).await;
                }
            }
            TrackerEvent::None => {}
        }

        if buffer == self.machine.live() {
            self.publish_display().await;
        }
    }

    async fn handle_timer_done(&mut self, buffer: BufferId) {
        if buffer != self.machine.live() {
            return;
        }
        self.trackers[buffer.index()].timer_fraction(1.0);
        let fires = match &self.armed[buffer.index()] {
            Some(armed) => self
                .evaluator
                .timer_done(&self.trackers[buffer.index()], &armed.record.settings.done_on),
            None => false,
        };
        if fires {
            self.fire_done(buffer).await;
        }
    }

    /// The live source reached its done condition: latch, notify, and let
    /// the follow action issue the actual switch request.
    async fn fire_done(&mut self, buffer: BufferId) {
        self.trackers[buffer.index()].latch_done();

        let (name, follow_action) = match &self.armed[buffer.index()] {
            Some(armed) => (
                armed.record.name().to_string(),
                armed.record.settings.follow_action.clone(),
            ),
            None => return,
        };
        let index = self.registry.active();

        self.emit(DeckEvent::SourceDone {
            index,
            name: name.clone(),
            timestamp: Utc::now(),
        });
        self.log(LogEntry::new(
            "SourceDone",
            json!({ "index": index, "name": name }),
        ))
        .await;

        if let Some(target) = done::follow_target(&self.registry, index, &follow_action) {
            if let Err(e) = self.request_switch(target, false).await {
                warn!("Follow action switch failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Switching
    // ------------------------------------------------------------------

    async fn request_switch(&mut self, reference: SourceRef, force: bool) -> Result<TakeOutcome> {
        match self.machine.request(reference, force) {
            SwitchDecision::Begin(reference) => self.begin_transition(reference).await,
            SwitchDecision::Queued { depth } => {
                self.emit(DeckEvent::PendingQueueChanged {
                    depth,
                    timestamp: Utc::now(),
                });
                self.publish_snapshot().await;
                Ok(TakeOutcome::Queued { depth })
            }
            SwitchDecision::DuplicateDropped => Ok(TakeOutcome::DuplicateDropped),
        }
    }

    async fn begin_transition(&mut self, reference: SourceRef) -> Result<TakeOutcome> {
        // Resolve before touching any state: an unresolvable target is a
        // logged no-op, never fatal.
        let (index, record) = match self.registry.resolve(&reference) {
            Resolve::Registered { index, record } => (Some(index), record.clone()),
            Resolve::Inline(record) => (None, record.clone()),
            Resolve::NotFound => {
                warn!("Switch target not found: {:?}", reference);
                self.log(LogEntry::error("TakeFailed", json!({ "target": format!("{:?}", reference) })))
                    .await;
                return Err(Error::Lookup("switch target not found".to_string()));
            }
        };

        let standby = self.machine.standby();
        let slot = standby.index();

        // Arm the incoming buffer
        self.trackers[slot].start(&record.settings.done_on);
        self.armed[slot] = Some(ArmedSource {
            record: record.clone(),
            index,
        });

        // Collaborator failures degrade playback but never kill the switch:
        // timer and external done paths still function.
        if let Err(e) = self.collaborators.playback.load(standby, &record) {
            error!("Failed to load source '{}': {}", record.name(), e);
            self.emit(DeckEvent::FileOpenFailed {
                index,
                name: record.name().to_string(),
                path: record.file.path.clone(),
                timestamp: Utc::now(),
            });
            self.log(LogEntry::error(
                "FileOpenFailed",
                json!({ "index": index, "name": record.name(), "file": record.file.path }),
            ))
            .await;
        } else if let Err(e) = self.collaborators.playback.start(standby) {
            error!("Failed to start playback on {:?}: {}", standby, e);
        }

        if let DoneOn::Timer { seconds } = record.settings.done_on {
            let mut timer_result = self.collaborators.timers.initialize(standby, seconds);
            if timer_result.is_ok() {
                timer_result = self.collaborators.timers.start(standby);
            }
            if let Err(e) = timer_result {
                error!("Timer collaborator failed on {:?}: {}", standby, e);
            }
        }

        let duration_secs = done::effective_transition_secs(&record, self.global_transition_secs);
        let setup = TransitionSetup {
            transition: record.settings.transition.clone(),
            duration_secs,
            shape: record.settings.transition_shape.clone(),
        };
        if let Err(e) = self.collaborators.renderer.configure(&setup) {
            error!("Transition renderer rejected setup: {}", e);
        }

        // Commit: phase moves to Transitioning, live flips to the armed
        // buffer, and the registry active pointer follows.
        self.machine.begin();
        self.registry.set_active(index);
        self.persist_selection().await;

        // Media open is asynchronous in the collaborator; read the derived
        // length/rate on the next cycle rather than immediately.
        let _ = self.tx.send(EngineMsg::RefreshMetadata { buffer: standby });

        let name = record.name().to_string();
        self.emit(DeckEvent::SourceSwitched {
            index,
            name: name.clone(),
            source_id: index.map(|_| record.id),
            timestamp: Utc::now(),
        });
        self.log(LogEntry::new(
            "Take",
            json!({ "index": index, "name": name }),
        ))
        .await;
        self.publish_snapshot().await;
        self.publish_display().await;

        Ok(TakeOutcome::Switching { index, name })
    }

    async fn handle_transition_finished(&mut self) {
        let popped = self.machine.complete();

        let (index, name) = (
            self.registry.active(),
            self.registry
                .active_record()
                .map(|r| r.name().to_string())
                .or_else(|| {
                    self.armed[self.machine.live().index()]
                        .as_ref()
                        .map(|a| a.record.name().to_string())
                })
                .unwrap_or_default(),
        );

        self.emit(DeckEvent::TransitionComplete {
            index,
            name: name.clone(),
            timestamp: Utc::now(),
        });
        self.log(LogEntry::new(
            "TransitionComplete",
            json!({ "index": index, "name": name }),
        ))
        .await;

        // The outgoing buffer is no longer visible; release its collaborators.
        let standby = self.machine.standby();
        if self.armed[standby.index()].is_some() {
            if let Err(e) = self.collaborators.playback.stop(standby) {
                warn!("Failed to stop outgoing buffer {:?}: {}", standby, e);
            }
            let _ = self.collaborators.timers.stop(standby);
        }

        self.publish_snapshot().await;

        if let Some(next) = popped {
            self.emit(DeckEvent::PendingQueueChanged {
                depth: self.machine.pending_len(),
                timestamp: Utc::now(),
            });
            if let Err(e) = self.request_switch(next, false).await {
                warn!("Queued switch failed: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Safety gate for destructive operations.
    fn gate(&self, confirm: bool) -> bool {
        !self.safety || confirm
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Take {
                reference,
                force,
                reply,
            } => {
                let result = self.request_switch(reference, force).await;
                let _ = reply.send(result);
            }
            Command::DelayTake {
                reference,
                delay_frames,
                reply,
            } => {
                let rate = self.trackers[self.machine.live().index()].sample_rate();
                let delay = std::time::Duration::from_secs_f64(delay_frames as f64 / rate);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(EngineMsg::DelayedTake { reference });
                });
                let _ = reply.send(Ok(()));
            }
            Command::AddSource {
                record,
                confirm,
                reply,
            } => {
                if !self.gate(confirm) {
                    let _ = reply.send(Ok(MutationOutcome::ConfirmationRequired));
                    return;
                }
                let (index, name) = self.registry.add(record);
                self.log(LogEntry::new(
                    "AddSource",
                    json!({ "index": index, "name": name }),
                ))
                .await;
                self.after_registry_change().await;
                let _ = reply.send(Ok(MutationOutcome::Applied { index, name }));
            }
            Command::DeleteSource {
                index,
                confirm,
                reply,
            } => {
                if !self.gate(confirm) {
                    let _ = reply.send(Ok(MutationOutcome::ConfirmationRequired));
                    return;
                }
                let index = index.unwrap_or(self.registry.selected());
                match self.registry.delete(index) {
                    Ok(removed) => {
                        self.log(LogEntry::new(
                            "DeleteSource",
                            json!({ "index": index, "name": removed.name() }),
                        ))
                        .await;
                        self.after_registry_change().await;
                        let _ = reply.send(Ok(MutationOutcome::Applied {
                            index,
                            name: removed.name().to_string(),
                        }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::MoveSource {
                from,
                to,
                confirm,
                reply,
            } => {
                if !self.gate(confirm) {
                    let _ = reply.send(Ok(MutationOutcome::ConfirmationRequired));
                    return;
                }
                match self.registry.move_record(from, to) {
                    Ok((resolved_to, name)) => {
                        self.log(LogEntry::new(
                            "MoveSource",
                            json!({ "name": name, "from": from, "to": resolved_to }),
                        ))
                        .await;
                        self.after_registry_change().await;
                        let _ = reply.send(Ok(MutationOutcome::Applied {
                            index: resolved_to,
                            name,
                        }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::RenameSource {
                index,
                name,
                confirm,
                reply,
            } => {
                if !self.gate(confirm) {
                    let _ = reply.send(Ok(MutationOutcome::ConfirmationRequired));
                    return;
                }
                match self.registry.rename(index, &name) {
                    Ok((old, new)) => {
                        self.log(LogEntry::new(
                            "RenameSource",
                            json!({ "index": index, "from": old, "to": new }),
                        ))
                        .await;
                        self.after_registry_change().await;
                        let _ = reply.send(Ok(MutationOutcome::Applied { index, name: new }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::DuplicateSource { index, reply } => {
                let index = index.unwrap_or(self.registry.selected());
                match self.registry.duplicate(index) {
                    Ok((inserted, name)) => {
                        self.after_registry_change().await;
                        let _ = reply.send(Ok(MutationOutcome::Applied {
                            index: inserted,
                            name,
                        }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::PasteSource {
                after,
                data,
                confirm,
                reply,
            } => {
                if !self.gate(confirm) {
                    let _ = reply.send(Ok(MutationOutcome::ConfirmationRequired));
                    return;
                }
                let after = after.unwrap_or(self.registry.selected());
                let (index, name) = self.registry.paste(after, data);
                self.log(LogEntry::new(
                    "PasteSource",
                    json!({ "index": index, "name": name }),
                ))
                .await;
                self.after_registry_change().await;
                let _ = reply.send(Ok(MutationOutcome::Applied { index, name }));
            }
            Command::StoreSource {
                index,
                record,
                reply,
            } => {
                match self.registry.store(index, record) {
                    Ok(()) => {
                        self.refresh_live_if_edited(index).await;
                        self.after_registry_change().await;
                        let name = self.registry.get(index).map(|r| r.name().to_string());
                        let _ = reply.send(Ok(MutationOutcome::Applied {
                            index,
                            name: name.unwrap_or_default(),
                        }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::SelectSource { index, reply } => {
                let (index, name) = self.registry.select(index);
                self.emit(DeckEvent::SourceSelected {
                    index,
                    name: name.clone(),
                    timestamp: Utc::now(),
                });
                self.persist_selection().await;
                self.publish_snapshot().await;
                let _ = reply.send(Ok(MutationOutcome::Applied { index, name }));
            }
            Command::StoreDefault { index, reply } => {
                let index = index.unwrap_or(self.registry.selected());
                match self.registry.store_default(index) {
                    Ok(name) => {
                        if let Err(e) = db::settings::set_default_template(
                            &self.db_pool,
                            self.registry.template(),
                        )
                        .await
                        {
                            error!("Failed to persist default template: {}", e);
                        }
                        self.log(LogEntry::new(
                            "StoreDefault",
                            json!({ "index": index, "name": name }),
                        ))
                        .await;
                        let _ = reply.send(Ok(MutationOutcome::Applied { index, name }));
                    }
                    Err(e) => {
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::InitRegistry { confirm, reply } => {
                if !self.gate(confirm) {
                    let _ = reply.send(Ok(MutationOutcome::ConfirmationRequired));
                    return;
                }
                self.registry.init();
                self.machine.clear_pending();
                if self.machine.is_transitioning() {
                    self.machine.abort();
                }
                for buffer in [BufferId::A, BufferId::B] {
                    let _ = self.collaborators.playback.stop(buffer);
                    let _ = self.collaborators.timers.stop(buffer);
                    self.trackers[buffer.index()] = PlaybackTracker::new();
                    self.armed[buffer.index()] = None;
                }
                if let Err(e) = db::log::clear(&self.db_pool).await {
                    error!("Failed to clear log: {}", e);
                }
                self.log(LogEntry::new("Init", json!({}))).await;
                self.after_registry_change().await;
                self.publish_display().await;
                let _ = reply.send(Ok(MutationOutcome::Applied {
                    index: 0,
                    name: "Source 0".to_string(),
                }));
            }
            Command::ClearPending { reply } => {
                let cleared = self.machine.clear_pending();
                self.emit(DeckEvent::PendingQueueChanged {
                    depth: 0,
                    timestamp: Utc::now(),
                });
                self.publish_snapshot().await;
                let _ = reply.send(Ok(cleared));
            }
            Command::SkipToLastPending { reply } => {
                let remaining = self.machine.skip_to_last_pending();
                self.emit(DeckEvent::PendingQueueChanged {
                    depth: remaining,
                    timestamp: Utc::now(),
                });
                self.publish_snapshot().await;
                let _ = reply.send(Ok(remaining));
            }
            Command::ToggleSafety { reply } => {
                self.safety = !self.safety;
                if let Err(e) = db::settings::set_safety(&self.db_pool, self.safety).await {
                    error!("Failed to persist safety flag: {}", e);
                }
                self.emit(DeckEvent::SafetyChanged {
                    enabled: self.safety,
                    timestamp: Utc::now(),
                });
                self.publish_snapshot().await;
                let _ = reply.send(Ok(self.safety));
            }
            Command::ExternalDone { reply } => {
                let live = self.machine.live();
                let fires = match &self.armed[live.index()] {
                    Some(armed) => self.evaluator.external_done(
                        &self.trackers[live.index()],
                        &armed.record.settings.done_on,
                    ),
                    None => false,
                };
                if fires {
                    self.fire_done(live).await;
                }
                let _ = reply.send(Ok(fires));
            }
            Command::GetSources { reply } => {
                let _ = reply.send(Ok(self.registry.records().to_vec()));
            }
            Command::GetLog { reply } => {
                let result = db::log::recent(&self.db_pool).await;
                let _ = reply.send(result);
            }
            Command::ClearLog { reply } => {
                let result = db::log::clear(&self.db_pool).await;
                let _ = reply.send(result);
            }
            Command::Import {
                records,
                mode,
                reply,
            } => {
                let (first, count) = transfer::apply_import(&mut self.registry, records, mode);
                self.log(LogEntry::new(
                    "Import",
                    json!({ "first_index": first, "count": count }),
                ))
                .await;
                self.after_registry_change().await;
                let name = self
                    .registry
                    .get(first)
                    .map(|r| r.name().to_string())
                    .unwrap_or_default();
                let _ = reply.send(Ok(MutationOutcome::Applied { index: first, name }));
            }
            Command::Export { selection, reply } => {
                let result = transfer::export_slice(&self.registry, selection);
                let _ = reply.send(result);
            }
        }
    }

    /// If the edited record is the live one, push the change into the live
    /// buffer immediately (mirrors edit-while-active behavior).
    async fn refresh_live_if_edited(&mut self, index: usize) {
        if self.registry.active() != Some(index) {
            return;
        }
        let live = self.machine.live();
        if let Some(record) = self.registry.get(index).cloned() {
            if let Some(armed) = &mut self.armed[live.index()] {
                armed.record = record.clone();
            }
            if let Err(e) = self.collaborators.playback.load(live, &record) {
                error!("Failed to refresh live source '{}': {}", record.name(), e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Persistence, events, snapshots
    // ------------------------------------------------------------------

    async fn after_registry_change(&mut self) {
        self.persist_registry().await;
        self.emit(DeckEvent::RegistryChanged {
            names: self.registry.names(),
            selected: self.registry.selected(),
            active: self.registry.active(),
            timestamp: Utc::now(),
        });
        self.publish_snapshot().await;
    }

    async fn persist_registry(&self) {
        if let Err(e) = db::registry::save_sources(&self.db_pool, self.registry.records()).await {
            error!("Failed to persist registry: {}", e);
        }
        self.persist_selection().await;
    }

    async fn persist_selection(&self) {
        if let Err(e) = db::settings::save_selection(
            &self.db_pool,
            self.registry.selected(),
            self.registry.active(),
        )
        .await
        {
            error!("Failed to persist selection: {}", e);
        }
    }

    fn emit(&self, event: DeckEvent) {
        self.state.broadcast_event(event);
    }

    async fn log(&self, entry: LogEntry) {
        match entry.level {
            cuedeck_common::events::LogLevel::Error => {
                error!("{}: {}", entry.event, entry.detail)
            }
            cuedeck_common::events::LogLevel::Warning => {
                warn!("{}: {}", entry.event, entry.detail)
            }
            cuedeck_common::events::LogLevel::Info => info!("{}: {}", entry.event, entry.detail),
        }
        if let Err(e) = db::log::append(&self.db_pool, &entry).await {
            error!("Failed to append log entry: {}", e);
        }
        self.emit(DeckEvent::LogAppended { entry });
    }

    async fn publish_snapshot(&self) {
        let active = self.registry.active();
        let snapshot = SwitcherSnapshot {
            phase: self.machine.phase(),
            live_buffer: self.machine.live(),
            pending_depth: self.machine.pending_len(),
            active_index: active,
            active_name: self
                .registry
                .active_record()
                .map(|r| r.name().to_string())
                .or_else(|| {
                    // Inline sources play outside the registry
                    if active.is_none() {
                        self.armed[self.machine.live().index()]
                            .as_ref()
                            .map(|a| a.record.name().to_string())
                    } else {
                        None
                    }
                }),
            selected_index: self.registry.selected(),
            selected_name: self.registry.selected_record().name().to_string(),
            safety_enabled: self.safety,
            source_names: self.registry.names(),
        };
        self.state.set_snapshot(snapshot).await;
    }

    async fn publish_display(&self) {
        let live = self.machine.live();
        let display = match &self.armed[live.index()] {
            Some(armed) => {
                let next = done::follow_target(
                    &self.registry,
                    self.registry.active(),
                    &armed.record.settings.follow_action,
                )
                .and_then(|target| match self.registry.resolve(&target) {
                    Resolve::Registered { record, .. } => Some(record.name().to_string()),
                    _ => None,
                });
                self.trackers[live.index()].display(
                    armed.record.settings.kind,
                    &armed.record.settings.done_on,
                    next.as_deref(),
                )
            }
            None => crate::switcher::tracker::DisplayState::not_applicable(),
        };
        self.state.set_display(display).await;
    }
}

/// Cloneable handle for issuing commands to a running engine
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<EngineMsg>,
}

impl EngineHandle {
    /// Raw message sender for collaborators (telemetry, timer, renderer).
    pub fn sender(&self) -> mpsc::UnboundedSender<EngineMsg> {
        self.tx.clone()
    }

    fn send(&self, msg: EngineMsg) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| Error::EngineGone("engine task has stopped".to_string()))
    }

    async fn command<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.send(EngineMsg::Command(build(tx)))?;
        rx.await
            .map_err(|_| Error::EngineGone("engine dropped the reply".to_string()))?
    }

    /// Fire-and-forget telemetry ingestion.
    pub fn send_telemetry(&self, buffer: BufferId, telemetry: Telemetry) -> Result<()> {
        self.send(EngineMsg::Telemetry { buffer, telemetry })
    }

    pub async fn take(&self, reference: SourceRef, force: bool) -> Result<TakeOutcome> {
        self.command(|reply| Command::Take {
            reference,
            force,
            reply,
        })
        .await
    }

    pub async fn delay_take(&self, reference: SourceRef, delay_frames: u64) -> Result<()> {
        self.command(|reply| Command::DelayTake {
            reference,
            delay_frames,
            reply,
        })
        .await
    }

    pub async fn add_source(
        &self,
        record: Option<SourceRecord>,
        confirm: bool,
    ) -> Result<MutationOutcome> {
        self.command(|reply| Command::AddSource {
            record,
            confirm,
            reply,
        })
        .await
    }

    pub async fn delete_source(
        &self,
        index: Option<usize>,
        confirm: bool,
    ) -> Result<MutationOutcome> {
        self.command(|reply| Command::DeleteSource {
            index,
            confirm,
            reply,
        })
        .await
    }

    pub async fn move_source(
        &self,
        from: usize,
        to: usize,
        confirm: bool,
    ) -> Result<MutationOutcome> {
        self.command(|reply| Command::MoveSource {
            from,
            to,
            confirm,
            reply,
        })
        .await
    }

    pub async fn rename_source(
        &self,
        index: usize,
        name: String,
        confirm: bool,
    ) -> Result<MutationOutcome> {
        self.command(|reply| Command::RenameSource {
            index,
            name,
            confirm,
            reply,
        })
        .await
    }

    pub async fn duplicate_source(&self, index: Option<usize>) -> Result<MutationOutcome> {
        self.command(|reply| Command::DuplicateSource { index, reply })
            .await
    }

    pub async fn paste_source(
        &self,
        after: Option<usize>,
        data: SourceRecord,
        confirm: bool,
    ) -> Result<MutationOutcome> {
        self.command(|reply| Command::PasteSource {
            after,
            data,
            confirm,
            reply,
        })
        .await
    }

    pub async fn store_source(&self, index: usize, record: SourceRecord) -> Result<MutationOutcome> {
        self.command(|reply| Command::StoreSource {
            index,
            record,
            reply,
        })
        .await
    }

    pub async fn select_source(&self, index: usize) -> Result<MutationOutcome> {
        self.command(|reply| Command::SelectSource { index, reply })
            .await
    }

    pub async fn store_default(&self, index: Option<usize>) -> Result<MutationOutcome> {
        self.command(|reply| Command::StoreDefault { index, reply })
            .await
    }

    pub async fn init_registry(&self, confirm: bool) -> Result<MutationOutcome> {
        self.command(|reply| Command::InitRegistry { confirm, reply })
            .await
    }

    pub async fn clear_pending(&self) -> Result<usize> {
        self.command(|reply| Command::ClearPending { reply }).await
    }

    pub async fn skip_to_last_pending(&self) -> Result<usize> {
        self.command(|reply| Command::SkipToLastPending { reply })
            .await
    }

    pub async fn toggle_safety(&self) -> Result<bool> {
        self.command(|reply| Command::ToggleSafety { reply }).await
    }

    pub async fn external_done(&self) -> Result<bool> {
        self.command(|reply| Command::ExternalDone { reply }).await
    }

    pub async fn sources(&self) -> Result<Vec<SourceRecord>> {
        self.command(|reply| Command::GetSources { reply }).await
    }

    pub async fn log_entries(&self) -> Result<Vec<LogEntry>> {
        self.command(|reply| Command::GetLog { reply }).await
    }

    pub async fn clear_log(&self) -> Result<()> {
        self.command(|reply| Command::ClearLog { reply }).await
    }

    pub async fn import(
        &self,
        records: Vec<SourceRecord>,
        mode: ImportMode,
    ) -> Result<MutationOutcome> {
        self.command(|reply| Command::Import {
            records,
            mode,
            reply,
        })
        .await
    }

    pub async fn export(&self, selection: ExportSelection) -> Result<Vec<SourceRecord>> {
        self.command(|reply| Command::Export { selection, reply })
            .await
    }
}
