//! Registry import/export
//!
//! Sources travel as a JSON array of records. Import supports three
//! insertion modes, each re-resolving name uniqueness for every inserted
//! record; export can take the whole registry, the selected record, or an
//! inclusive index range.

use crate::error::{Error, Result};
use crate::switcher::registry::SourceRegistry;
use cuedeck_common::model::SourceRecord;
use serde::{Deserialize, Serialize};

/// Where imported records land in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Before the first record
    Prepend,
    /// Directly after the selected record
    InsertAfterSelected,
    /// After the last record
    #[default]
    Append,
}

/// Which records to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportSelection {
    #[default]
    All,
    Selected,
    /// Inclusive index range
    Range { start: usize, end: usize },
}

/// Insert records per the chosen mode. Returns `(first_index, count)`.
///
/// Records are admitted one at a time in input order, so collision renames
/// are deterministic regardless of mode.
pub fn apply_import(
    registry: &mut SourceRegistry,
    records: Vec<SourceRecord>,
    mode: ImportMode,
) -> (usize, usize) {
    let count = records.len();
    let base = match mode {
        ImportMode::Prepend => 0,
        ImportMode::InsertAfterSelected => registry.selected() + 1,
        ImportMode::Append => registry.len(),
    };

    for (offset, record) in records.into_iter().enumerate() {
        registry.insert_at(record, base + offset);
    }

    (base, count)
}

/// Deep-copied records for the chosen selection.
pub fn export_slice(
    registry: &SourceRegistry,
    selection: ExportSelection,
) -> Result<Vec<SourceRecord>> {
    match selection {
        ExportSelection::All => Ok(registry.records().to_vec()),
        ExportSelection::Selected => Ok(vec![registry.selected_record().clone()]),
        ExportSelection::Range { start, end } => {
            if start > end || end >= registry.len() {
                return Err(Error::Lookup(format!(
                    "export range {}..={} out of bounds (len {})",
                    start,
                    end,
                    registry.len()
                )));
            }
            Ok(registry.records()[start..=end].to_vec())
        }
    }
}

/// Serialize records as the interchange JSON array.
pub fn to_json(records: &[SourceRecord]) -> Result<String> {
    serde_json::to_string_pretty(records)
        .map_err(|e| Error::Common(cuedeck_common::Error::from(e)))
}

/// Parse an interchange JSON array.
pub fn from_json(json: &str) -> Result<Vec<SourceRecord>> {
    serde_json::from_str(json).map_err(|e| Error::Common(cuedeck_common::Error::from(e)))
}
