//! Source registry
//!
//! Ordered collection of source records with selected/active index
//! bookkeeping. Every mutation is a barrier: name uniqueness and index
//! consistency are restored before the call returns. The registry never
//! holds zero records once initialized, the active index never dangles past
//! the end, and no two records share a name.

use crate::error::{Error, Result};
use cuedeck_common::model::SourceRecord;
use uuid::Uuid;

/// Reference to a source: by position, by name, or an inline record that is
/// not a registry member (reported with active index None).
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRef {
    Index(usize),
    Name(String),
    Inline(Box<SourceRecord>),
}

/// Tri-state lookup result; callers branch, nothing throws.
#[derive(Debug)]
pub enum Resolve<'a> {
    /// A registry member at `index`
    Registered {
        index: usize,
        record: &'a SourceRecord,
    },
    /// An ephemeral record outside the registry
    Inline(&'a SourceRecord),
    NotFound,
}

/// Ordered source records plus selection/active bookkeeping
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    sources: Vec<SourceRecord>,
    /// Record being edited; always valid while the registry is non-empty
    selected: usize,
    /// Record currently playing, None when nothing from the registry is live
    active: Option<usize>,
    /// Template used by `add` when no record is supplied
    template: SourceRecord,
}

impl SourceRegistry {
    /// Registry with a single default record, selected, nothing active.
    pub fn new() -> Self {
        let template = SourceRecord::named("new_source");
        let mut first = template.duplicated();
        first.settings.name = "Source 0".to_string();
        Self {
            sources: vec![first],
            selected: 0,
            active: None,
            template,
        }
    }

    /// Rebuild from persisted parts, re-enforcing invariants defensively.
    ///
    /// Duplicate names in stored data are renamed in order; out-of-range
    /// indices are clamped/dropped rather than trusted.
    pub fn from_parts(
        records: Vec<SourceRecord>,
        selected: usize,
        active: Option<usize>,
        template: SourceRecord,
    ) -> Self {
        let mut registry = Self {
            sources: Vec::new(),
            selected: 0,
            active: None,
            template,
        };
        for record in records {
            let admitted = registry.admit(record, None);
            registry.sources.push(admitted);
        }
        if registry.sources.is_empty() {
            let mut first = registry.template.duplicated();
            first.settings.name = "Source 0".to_string();
            registry.sources.push(first);
        }
        registry.selected = selected.min(registry.sources.len() - 1);
        registry.active = active.filter(|a| *a < registry.sources.len());
        registry
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn records(&self) -> &[SourceRecord] {
        &self.sources
    }

    pub fn get(&self, index: usize) -> Option<&SourceRecord> {
        self.sources.get(index)
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn selected_record(&self) -> &SourceRecord {
        &self.sources[self.selected]
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn active_record(&self) -> Option<&SourceRecord> {
        self.active.and_then(|a| self.sources.get(a))
    }

    pub fn set_active(&mut self, active: Option<usize>) {
        self.active = active.filter(|a| *a < self.sources.len());
    }

    pub fn template(&self) -> &SourceRecord {
        &self.template
    }

    /// Replace the add-template with a copy of the record at `index`.
    pub fn store_default(&mut self, index: usize) -> Result<String> {
        let record = self
            .sources
            .get(index)
            .ok_or_else(|| Error::Lookup(format!("source index {} out of range", index)))?;
        let name = record.name().to_string();
        self.template = record.duplicated();
        Ok(name)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// Resolve a reference to a record without taking ownership.
    pub fn resolve<'a>(&'a self, reference: &'a SourceRef) -> Resolve<'a> {
        match reference {
            SourceRef::Index(index) => match self.sources.get(*index) {
                Some(record) => Resolve::Registered {
                    index: *index,
                    record,
                },
                None => Resolve::NotFound,
            },
            SourceRef::Name(name) => {
                match self.sources.iter().position(|s| s.name() == name) {
                    Some(index) => Resolve::Registered {
                        index,
                        record: &self.sources[index],
                    },
                    None => Resolve::NotFound,
                }
            }
            SourceRef::Inline(record) => Resolve::Inline(record),
        }
    }

    /// Position of a record by name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.sources.iter().position(|s| s.name() == name)
    }

    // ------------------------------------------------------------------
    // Name uniqueness
    // ------------------------------------------------------------------

    /// Deterministic collision resolution: strip any trailing digit/space
    /// suffix to get the base, then take the first free `"{base} {i}"`.
    fn unique_name(&self, name: &str, exclude: Option<usize>) -> String {
        let taken: Vec<&str> = self
            .sources
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != exclude)
            .map(|(_, s)| s.name())
            .collect();

        if !taken.contains(&name) {
            return name.to_string();
        }

        let base = name.trim_end_matches(|c: char| c.is_ascii_digit() || c == ' ');
        let base = if base.is_empty() { "Source" } else { base };
        let mut i = 1;
        loop {
            let candidate = format!("{} {}", base, i);
            if !taken.contains(&candidate.as_str()) {
                return candidate;
            }
            i += 1;
        }
    }

    /// Make a record safe to insert: unique name, unique id.
    fn admit(&self, mut record: SourceRecord, exclude: Option<usize>) -> SourceRecord {
        record.settings.name = self.unique_name(record.name(), exclude);
        if self.sources.iter().any(|s| s.id == record.id) {
            record.id = Uuid::new_v4();
        }
        record
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Insert at `index` (clamped to `[0, len]`), shifting selected/active
    /// so they keep pointing at the same logical record. Returns the final
    /// insertion index.
    pub fn insert_at(&mut self, record: SourceRecord, index: usize) -> usize {
        let index = index.min(self.sources.len());
        let was_empty = self.sources.is_empty();
        let record = self.admit(record, None);
        self.sources.insert(index, record);

        if let Some(active) = self.active {
            if index <= active {
                self.active = Some(active + 1);
            }
        }
        if !was_empty && index <= self.selected {
            self.selected += 1;
        }
        index
    }

    /// Add a record (or a template copy) after the selected source and
    /// select it. Returns `(index, name)`.
    pub fn add(&mut self, record: Option<SourceRecord>) -> (usize, String) {
        let record = record.unwrap_or_else(|| self.template.duplicated());
        let insert_index = if self.sources.is_empty() {
            0
        } else {
            self.selected + 1
        };
        let index = self.insert_at(record, insert_index);
        self.selected = index;
        (index, self.sources[index].name().to_string())
    }

    /// Delete the record at `index`. Refuses to empty the registry.
    pub fn delete(&mut self, index: usize) -> Result<SourceRecord> {
        if index >= self.sources.len() {
            return Err(Error::Lookup(format!(
                "source index {} out of range",
                index
            )));
        }
        if self.sources.len() <= 1 {
            return Err(Error::Registry(
                "cannot delete the last remaining source".to_string(),
            ));
        }

        let removed = self.sources.remove(index);

        self.active = match self.active {
            Some(active) if active == index => None,
            Some(active) if active > index => Some(active - 1),
            other => other,
        };

        if self.selected > index {
            self.selected -= 1;
        }
        self.selected = self.selected.min(self.sources.len() - 1);

        Ok(removed)
    }

    /// Move `from` to `to` with pop-then-insert semantics. Returns the
    /// resolved destination index and the moved record's name.
    pub fn move_record(&mut self, from: usize, to: usize) -> Result<(usize, String)> {
        if from >= self.sources.len() {
            return Err(Error::Lookup(format!("source index {} out of range", from)));
        }
        let mut to = to.min(self.sources.len());

        let moving_selected = self.selected == from;
        let record = self.sources.remove(from);
        let name = record.name().to_string();
        if from < to {
            to -= 1;
        }
        self.sources.insert(to, record);

        self.active = match self.active {
            Some(active) if active == from => Some(to),
            Some(active) if from < active && active <= to => Some(active - 1),
            Some(active) if to <= active && active < from => Some(active + 1),
            other => other,
        };

        if moving_selected {
            self.selected = to;
        } else if from < self.selected && self.selected <= to {
            self.selected -= 1;
        } else if to <= self.selected && self.selected < from {
            self.selected += 1;
        }

        Ok((to, name))
    }

    /// Move the selected record up one position.
    pub fn move_up(&mut self) -> Result<(usize, String)> {
        if self.selected == 0 {
            return Err(Error::Registry("already at the top".to_string()));
        }
        self.move_record(self.selected, self.selected - 1)
    }

    /// Move the selected record down one position.
    pub fn move_down(&mut self) -> Result<(usize, String)> {
        if self.selected + 1 >= self.sources.len() {
            return Err(Error::Registry("already at the bottom".to_string()));
        }
        self.move_record(self.selected, self.selected + 2)
    }

    /// Rename with collision resolution excluding the record itself.
    /// Returns `(old_name, final_name)`.
    pub fn rename(&mut self, index: usize, new_name: &str) -> Result<(String, String)> {
        if index >= self.sources.len() {
            return Err(Error::Lookup(format!(
                "source index {} out of range",
                index
            )));
        }
        let old = self.sources[index].name().to_string();
        let resolved = self.unique_name(new_name, Some(index));
        self.sources[index].settings.name = resolved.clone();
        Ok((old, resolved))
    }

    /// Duplicate the record at `index`; the copy takes its slot (the
    /// original shifts down) and becomes selected.
    pub fn duplicate(&mut self, index: usize) -> Result<(usize, String)> {
        let record = self
            .sources
            .get(index)
            .ok_or_else(|| Error::Lookup(format!("source index {} out of range", index)))?
            .duplicated();
        let inserted = self.insert_at(record, index);
        self.selected = inserted;
        Ok((inserted, self.sources[inserted].name().to_string()))
    }

    /// Deep-copy of a record for the clipboard; None when not found.
    pub fn copy_data(&self, reference: &SourceRef) -> Option<SourceRecord> {
        match self.resolve(reference) {
            Resolve::Registered { record, .. } => Some(record.clone()),
            Resolve::Inline(record) => Some(record.clone()),
            Resolve::NotFound => None,
        }
    }

    /// Paste a structurally independent copy after `after`, select it.
    pub fn paste(&mut self, after: usize, data: SourceRecord) -> (usize, String) {
        let index = self.insert_at(data.duplicated(), after.saturating_add(1));
        self.selected = index;
        (index, self.sources[index].name().to_string())
    }

    /// Replace the record at `index` wholesale, keeping its identity and
    /// re-resolving name uniqueness.
    pub fn store(&mut self, index: usize, mut record: SourceRecord) -> Result<()> {
        let existing = self
            .sources
            .get(index)
            .ok_or_else(|| Error::Lookup(format!("source index {} out of range", index)))?;
        record.id = existing.id;
        record.settings.name = self.unique_name(record.name(), Some(index));
        self.sources[index] = record;
        Ok(())
    }

    /// Select a source for editing; the index clamps into range.
    pub fn select(&mut self, index: usize) -> (usize, String) {
        self.selected = index.min(self.sources.len() - 1);
        (
            self.selected,
            self.sources[self.selected].name().to_string(),
        )
    }

    pub fn select_up(&mut self) -> (usize, String) {
        let target = self.selected.saturating_sub(1);
        self.select(target)
    }

    pub fn select_down(&mut self) -> (usize, String) {
        self.select(self.selected + 1)
    }

    /// Reset to exactly one template record, selected, nothing active.
    pub fn init(&mut self) {
        let mut first = self.template.duplicated();
        first.settings.name = "Source 0".to_string();
        self.sources = vec![first];
        self.selected = 0;
        self.active = None;
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
