use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Identifies the source that produced a collection.
///
/// Sources are numbered in registration order starting at zero. Collections
/// that are created while processing an event, rather than read, live under
/// the virtual [`SourceId::RUNTIME`] source.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceId(i32);

impl SourceId {
    /// The virtual source of runtime-created collections.
    pub const RUNTIME: SourceId = SourceId(-1);

    /// Source id for the source registered at `position`.
    pub fn from_position(position: usize) -> Result<Self, TypeError> {
        i32::try_from(position)
            .map(Self)
            .map_err(|_| TypeError::SourceOverflow(position))
    }

    /// The raw numeric id.
    pub const fn get(self) -> i32 {
        self.0
    }

    /// Returns `true` for the virtual runtime source.
    pub const fn is_runtime(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_runtime() {
            write!(f, "SourceId(runtime)")
        } else {
            write!(f, "SourceId({})", self.0)
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of a collection within one source's per-event output.
///
/// Only meaningful together with the [`SourceId`] it belongs to; two sources
/// may hand out the same local index for unrelated collections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalIndex(u32);

impl LocalIndex {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Convert a container position into a local index.
    pub fn from_position(position: usize) -> Result<Self, TypeError> {
        u32::try_from(position)
            .map(Self)
            .map_err(|_| TypeError::IndexOverflow(position))
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// The index as a container position.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LocalIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for LocalIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}
