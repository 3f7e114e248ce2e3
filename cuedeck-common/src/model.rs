//! Source data model
//!
//! A source is a named, configured unit of playable content (file-based or
//! procedural) plus its transition, done-condition, and follow-action policy.
//! The dynamic parameter pages of the host environment become typed structs
//! here; serde attribute mapping is the explicit translation table for
//! import/export JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of content a source plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// No content configured (placeholder slot)
    #[default]
    None,
    /// File-backed media (movie or still)
    File,
    /// Procedural/generative content produced by a host node
    Procedural,
}

/// Condition that defines "finished" for a source
///
/// `None` means the source never finishes on its own; switching away is
/// always manual (or driven by an external take).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DoneOn {
    #[default]
    None,
    /// Done after the file has played through `count` times
    PlayNTimes { count: u32 },
    /// Done when a timer of `seconds` elapses
    Timer { seconds: f64 },
    /// Done when an external completion signal fires
    ExternalSignal,
}

impl DoneOn {
    /// Play count for loop bookkeeping; non-loop policies count as 1.
    pub fn play_n_times(&self) -> u32 {
        match self {
            DoneOn::PlayNTimes { count } => (*count).max(1),
            _ => 1,
        }
    }

    pub fn timer_seconds(&self) -> Option<f64> {
        match self {
            DoneOn::Timer { seconds } => Some(*seconds),
            _ => None,
        }
    }
}

/// Rule determining what plays after the current source finishes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum FollowAction {
    #[default]
    None,
    /// Play the next source in registry order
    PlayNext,
    /// Jump to an explicit registry index
    GotoIndex { index: usize },
    /// Jump to a source by name
    GotoName { name: String },
}

/// Direction for slide/wipe transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDirection {
    #[default]
    Left,
    Right,
    Up,
    Down,
}

/// Transition kind plus its kind-specific parameters
///
/// One tagged enum instead of a kind string and a bag of loose parameters:
/// each variant carries exactly the fields its renderer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionConfig {
    /// Plain crossfade between outgoing and incoming
    #[default]
    Fade,
    /// Dip through a solid color
    Dip { color: [f32; 3] },
    /// Incoming slides over the outgoing
    Slide { direction: TransitionDirection },
    /// Wipe boundary travels across the frame
    Wipe { direction: TransitionDirection },
    /// Luma-keyed transition driven by a file on disk
    File { path: String },
    /// Transition driven by a procedural host node
    Generator { path: String },
    /// Cross-blur between outgoing and incoming
    Blur { amount: f64 },
}

impl TransitionConfig {
    /// Stable lowercase identifier, used in logs and renderer dispatch.
    pub fn kind_str(&self) -> &'static str {
        match self {
            TransitionConfig::Fade => "fade",
            TransitionConfig::Dip { .. } => "dip",
            TransitionConfig::Slide { .. } => "slide",
            TransitionConfig::Wipe { .. } => "wipe",
            TransitionConfig::File { .. } => "file",
            TransitionConfig::Generator { .. } => "generator",
            TransitionConfig::Blur { .. } => "blur",
        }
    }
}

/// Easing shape applied to transition progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionShape {
    Linear,
    EaseIn,
    EaseOut,
    #[default]
    EaseInOut,
    /// Host-defined easing curve, referenced by name
    Custom(String),
}

/// Per-source settings page
///
/// `name` is unique across the registry at all times; mutation routines that
/// could violate uniqueness resolve collisions deterministically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub name: String,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub transition: TransitionConfig,
    #[serde(default = "default_transition_time")]
    pub transition_time_secs: f64,
    #[serde(default)]
    pub use_global_transition_time: bool,
    #[serde(default)]
    pub transition_shape: TransitionShape,
    #[serde(default)]
    pub follow_action: FollowAction,
    #[serde(default)]
    pub done_on: DoneOn,
}

fn default_transition_time() -> f64 {
    1.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: SourceKind::None,
            transition: TransitionConfig::Fade,
            transition_time_secs: default_transition_time(),
            use_global_transition_time: false,
            transition_shape: TransitionShape::EaseInOut,
            follow_action: FollowAction::None,
            done_on: DoneOn::None,
        }
    }
}

/// File-source page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilePage {
    /// Path to the media file
    #[serde(default)]
    pub path: String,
    /// Loop playback at the end of the file
    #[serde(default = "default_true")]
    pub loop_enabled: bool,
}

impl Default for FilePage {
    fn default() -> Self {
        Self {
            path: String::new(),
            loop_enabled: true,
        }
    }
}

/// Procedural-source page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeneratorPage {
    /// Host path of the procedural node
    #[serde(default)]
    pub path: String,
    /// Send a cue pulse to the node when the source starts
    #[serde(default)]
    pub cue_on_start: bool,
}

fn default_true() -> bool {
    true
}

/// One source in the registry: settings plus typed per-kind pages
///
/// `id` is the stable identity of the record; it survives move/rename and is
/// what events and persistence key on. Registry position is presentation
/// order, not identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub settings: Settings,
    #[serde(default)]
    pub file: FilePage,
    #[serde(default)]
    pub generator: GeneratorPage,
}

impl SourceRecord {
    /// Create a record with default pages and the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings: Settings {
                name: name.into(),
                ..Settings::default()
            },
            file: FilePage::default(),
            generator: GeneratorPage::default(),
        }
    }

    /// Create a file source with the given name and path.
    pub fn file_source(name: impl Into<String>, path: impl Into<String>) -> Self {
        let mut record = Self::named(name);
        record.settings.kind = SourceKind::File;
        record.file.path = path.into();
        record
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Structurally independent copy under a fresh identity.
    ///
    /// Used by duplicate/paste paths; plain `clone()` keeps the id and is
    /// reserved for snapshots of the same logical record.
    pub fn duplicated(&self) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy
    }
}

impl Default for SourceRecord {
    fn default() -> Self {
        Self::named("new_source")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trip() {
        let mut record = SourceRecord::file_source("Intro", "/media/intro.mov");
        record.settings.done_on = DoneOn::PlayNTimes { count: 3 };
        record.settings.follow_action = FollowAction::GotoName {
            name: "Main Loop".to_string(),
        };
        record.settings.transition = TransitionConfig::Dip {
            color: [0.0, 0.0, 0.0],
        };

        let json = serde_json::to_string(&record).unwrap();
        let back: SourceRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_partial_record_deserializes_with_defaults() {
        // Imported data may omit pages entirely
        let json = r#"{"settings": {"name": "Bare"}}"#;
        let record: SourceRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.name(), "Bare");
        assert_eq!(record.settings.kind, SourceKind::None);
        assert_eq!(record.settings.done_on, DoneOn::None);
        assert!(record.file.loop_enabled);
    }

    #[test]
    fn test_duplicated_gets_fresh_id() {
        let record = SourceRecord::named("A");
        let copy = record.duplicated();
        assert_ne!(record.id, copy.id);
        assert_eq!(record.settings, copy.settings);
    }

    #[test]
    fn test_play_n_times_floor() {
        assert_eq!(DoneOn::PlayNTimes { count: 0 }.play_n_times(), 1);
        assert_eq!(DoneOn::PlayNTimes { count: 4 }.play_n_times(), 4);
        assert_eq!(DoneOn::None.play_n_times(), 1);
    }

    #[test]
    fn test_transition_kind_str() {
        assert_eq!(TransitionConfig::Fade.kind_str(), "fade");
        assert_eq!(
            TransitionConfig::Blur { amount: 8.0 }.kind_str(),
            "blur"
        );
    }
}
