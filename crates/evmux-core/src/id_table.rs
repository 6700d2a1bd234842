use std::collections::{BTreeMap, BTreeSet};

use evmux_types::{LocalIndex, SourceId};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::policy::CollisionPolicy;

/// Name to local-index entries of one source.
pub type SourceEntries = BTreeMap<String, LocalIndex>;

/// Maps collection names to the source and local index that provide them.
///
/// Sub-tables are kept in registration order, which is also the lookup order:
/// when several sources provide the same name, the earliest registered one
/// serves it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTable {
    sources: Vec<(SourceId, SourceEntries)>,
}

/// A name provided by more than one source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collision {
    pub name: String,
    pub existing: SourceId,
    pub incoming: SourceId,
}

impl IdTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `entries` under `source`.
    ///
    /// A source id that is already present is extended rather than appended
    /// again. Under [`CollisionPolicy::Reject`] the table is left untouched when
    /// any name is already provided by another source. Under
    /// [`CollisionPolicy::FirstWins`] the shadowed names are returned.
    pub fn insert_source(
        &mut self,
        source: SourceId,
        entries: SourceEntries,
        policy: CollisionPolicy,
    ) -> CoreResult<Vec<Collision>> {
        let collisions: Vec<Collision> = entries
            .keys()
            .filter_map(|name| {
                self.sources
                    .iter()
                    .find(|(id, table)| *id != source && table.contains_key(name))
                    .map(|(id, _)| Collision {
                        name: name.clone(),
                        existing: *id,
                        incoming: source,
                    })
            })
            .collect();

        if policy == CollisionPolicy::Reject {
            if let Some(first) = collisions.into_iter().next() {
                return Err(CoreError::DuplicateCollection {
                    name: first.name,
                    existing: first.existing,
                    incoming: first.incoming,
                });
            }
            self.merge(source, entries);
            return Ok(Vec::new());
        }

        self.merge(source, entries);
        Ok(collisions)
    }

    fn merge(&mut self, source: SourceId, entries: SourceEntries) {
        match self.sources.iter_mut().find(|(id, _)| *id == source) {
            Some((_, table)) => table.extend(entries),
            None => self.sources.push((source, entries)),
        }
    }

    /// The source and local index serving `name`.
    pub fn lookup(&self, name: &str) -> Option<(SourceId, LocalIndex)> {
        self.sources
            .iter()
            .find_map(|(id, table)| table.get(name).map(|idx| (*id, *idx)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Entries of one source.
    pub fn source(&self, source: SourceId) -> Option<&SourceEntries> {
        self.sources
            .iter()
            .find(|(id, _)| *id == source)
            .map(|(_, table)| table)
    }

    /// All sub-tables in registration order.
    pub fn sources(&self) -> impl Iterator<Item = (SourceId, &SourceEntries)> {
        self.sources.iter().map(|(id, table)| (*id, table))
    }

    /// Every known name, deduplicated and sorted.
    pub fn names(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self.sources.iter().flat_map(|(_, t)| t.keys()).collect();
        set.into_iter().cloned().collect()
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.names().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.iter().all(|(_, t)| t.is_empty())
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }
}
