//! # Cuedeck Common Library
//!
//! Shared code for the Cuedeck source-switching engine:
//! - Source data model (records, settings, transition configuration)
//! - Event types (DeckEvent enum)
//! - Timecode formatting
//! - Common error type

pub mod error;
pub mod events;
pub mod model;
pub mod timecode;

pub use error::{Error, Result};
pub use model::SourceRecord;
