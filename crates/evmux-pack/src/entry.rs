use evmux_core::IdTable;
use evmux_types::{CollectionBuffers, LocalIndex};
use serde::{Deserialize, Serialize};

/// Type tag of a pack record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordKind {
    /// The pack's collection table.
    IdTable,
    /// One event.
    Event,
    /// Per-collection metadata.
    Metadata,
}

impl RecordKind {
    pub fn tag(self) -> u8 {
        match self {
            Self::IdTable => 1,
            Self::Event => 2,
            Self::Metadata => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::IdTable),
            2 => Some(Self::Event),
            3 => Some(Self::Metadata),
            _ => None,
        }
    }
}

/// One collection stored in an event record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedEntry {
    pub index: LocalIndex,
    pub buffers: CollectionBuffers,
}

/// Payload of an event record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedEvent {
    pub entries: Vec<PackedEntry>,
}

impl PackedEvent {
    /// Buffers stored under `index`, if this event has them.
    pub fn get(&self, index: LocalIndex) -> Option<&CollectionBuffers> {
        self.entries
            .iter()
            .find(|e| e.index == index)
            .map(|e| &e.buffers)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Payload of the id-table record.
///
/// `collections[i]` is the name stored under local index `i`. `sources` keeps
/// the identity table of the run that wrote the pack, when it was given one.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedTable {
    pub collections: Vec<String>,
    pub sources: Option<IdTable>,
}

impl PackedTable {
    pub fn name_of(&self, index: LocalIndex) -> Option<&str> {
        self.collections.get(index.as_usize()).map(String::as_str)
    }
}
