//! Shared switcher state
//!
//! Read-side snapshots and the event bus shared between the engine task and
//! the HTTP/SSE surface. The engine is the only writer; handlers read
//! snapshots without a round-trip through the engine channel.

use crate::switcher::machine::{BufferId, Phase};
use crate::switcher::tracker::DisplayState;
use cuedeck_common::events::DeckEvent;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

/// Point-in-time view of the switcher for API reads
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitcherSnapshot {
    pub phase: Phase,
    pub live_buffer: BufferId,
    pub pending_depth: usize,
    pub active_index: Option<usize>,
    pub active_name: Option<String>,
    pub selected_index: usize,
    pub selected_name: String,
    pub safety_enabled: bool,
    pub source_names: Vec<String>,
}

/// Shared state accessible by all components
///
/// Uses RwLock for concurrent read access with rare writes.
pub struct SharedState {
    /// Latest switcher snapshot (engine-maintained)
    pub switcher: RwLock<SwitcherSnapshot>,

    /// Display values for the live buffer (engine-maintained)
    pub display: RwLock<DisplayState>,

    /// Event broadcaster for SSE events
    pub event_tx: broadcast::Sender<DeckEvent>,
}

impl SharedState {
    /// Create new shared state with default values
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(100); // Buffer up to 100 events
        Self {
            switcher: RwLock::new(SwitcherSnapshot::default()),
            display: RwLock::new(DisplayState::not_applicable()),
            event_tx,
        }
    }

    /// Broadcast an event to all SSE listeners
    pub fn broadcast_event(&self, event: DeckEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.event_tx.send(event);
    }

    /// Subscribe to event stream for SSE
    pub fn subscribe_events(&self) -> broadcast::Receiver<DeckEvent> {
        self.event_tx.subscribe()
    }

    pub async fn snapshot(&self) -> SwitcherSnapshot {
        self.switcher.read().await.clone()
    }

    pub async fn set_snapshot(&self, snapshot: SwitcherSnapshot) {
        *self.switcher.write().await = snapshot;
    }

    pub async fn display(&self) -> DisplayState {
        self.display.read().await.clone()
    }

    pub async fn set_display(&self, display: DisplayState) {
        *self.display.write().await = display;
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}
