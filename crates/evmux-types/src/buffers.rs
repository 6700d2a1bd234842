use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// One vector-member payload, keyed by the member it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMember {
    pub name: String,
    pub payload: Bytes,
}

impl VectorMember {
    pub fn new(name: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Format-agnostic raw payload of one collection.
///
/// Every field distinguishes "never set" (`None`) from "set to empty"
/// (`Some` of an empty list). Empty relation and vector-member lists are valid;
/// absent ones are not. A freshly created value is invalid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionBuffers {
    /// Primary data block.
    pub data: Option<Bytes>,
    /// Relationship blocks, in order.
    pub relations: Option<Vec<Bytes>>,
    /// Auxiliary vector-member blocks, in order.
    pub vector_members: Option<Vec<VectorMember>>,
    /// Schema version the payload was written with.
    pub schema_version: Option<u32>,
}

impl CollectionBuffers {
    /// Empty, invalid buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fully populated buffers.
    pub fn complete(
        data: impl Into<Bytes>,
        relations: Vec<Bytes>,
        vector_members: Vec<VectorMember>,
        schema_version: u32,
    ) -> Self {
        Self {
            data: Some(data.into()),
            relations: Some(relations),
            vector_members: Some(vector_members),
            schema_version: Some(schema_version),
        }
    }

    /// All four fields are present.
    pub fn is_valid(&self) -> bool {
        self.data.is_some()
            && self.relations.is_some()
            && self.vector_members.is_some()
            && self.schema_version.is_some()
    }

    /// Schema version with `-1` standing in for "unset", for formats that
    /// store a plain signed integer.
    pub fn raw_schema_version(&self) -> i64 {
        self.schema_version.map_or(-1, i64::from)
    }

    /// Total payload bytes across all blocks.
    pub fn payload_len(&self) -> usize {
        let data = self.data.as_ref().map_or(0, Bytes::len);
        let relations: usize = self.relations.iter().flatten().map(Bytes::len).sum();
        let members: usize = self
            .vector_members
            .iter()
            .flatten()
            .map(|m| m.payload.len())
            .sum();
        data + relations + members
    }
}
