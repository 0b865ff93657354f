//! Evidence record store
//!
//! Flat arena of committed items plus an index by id. There is no removal:
//! evidence is only ever superseded by later ledger entries.

use crate::types::{ArtifactKind, EvidenceId, EvidenceItem};
use crate::{Error, Result};
use std::collections::HashMap;

/// Insertion-ordered evidence set
#[derive(Debug, Default, Clone)]
pub struct EvidenceStore {
    items: Vec<EvidenceItem>,
    index: HashMap<EvidenceId, usize>,
}

impl EvidenceStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item; ids are never reused
    pub fn put(&mut self, item: EvidenceItem) -> Result<()> {
        if self.index.contains_key(&item.id) {
            return Err(Error::DuplicateId(item.id.to_string()));
        }

        self.index.insert(item.id, self.items.len());
        self.items.push(item);
        Ok(())
    }

    /// Look up by id
    pub fn get(&self, id: EvidenceId) -> Option<&EvidenceItem> {
        self.index.get(&id).map(|&pos| &self.items[pos])
    }

    /// True if `id` is already taken
    pub fn contains(&self, id: EvidenceId) -> bool {
        self.index.contains_key(&id)
    }

    /// All items in insertion order
    pub fn list(&self) -> &[EvidenceItem] {
        &self.items
    }

    /// Items of one kind, in insertion order
    pub fn by_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &EvidenceItem> {
        self.items.iter().filter(move |item| item.kind == kind)
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
