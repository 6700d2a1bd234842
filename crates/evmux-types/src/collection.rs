use bytes::Bytes;

use crate::buffers::{CollectionBuffers, VectorMember};

/// Schema version stamped on collections created at runtime.
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;

/// A structured collection built from [`CollectionBuffers`].
///
/// Lifecycle when reading: constructed from buffers, then
/// [`prepare_after_read`](Self::prepare_after_read) computes validity and
/// [`set_references`](Self::set_references) binds relationship targets. Only a
/// valid collection can become resolved.
///
/// Lifecycle when writing: [`prepare_for_write`](Self::prepare_for_write)
/// fills every unset buffer field once; further calls are no-ops until the
/// collection is mutated again.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Collection {
    buffers: CollectionBuffers,
    valid: bool,
    resolved: bool,
    prepared: bool,
}

impl Collection {
    /// An empty, invalid collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full unpacking: take ownership of the buffers, compute validity, then
    /// resolve references.
    pub fn from_buffers(buffers: CollectionBuffers) -> Self {
        let mut coll = Self {
            buffers,
            ..Self::default()
        };
        coll.prepare_after_read();
        coll.set_references();
        coll
    }

    pub fn set_data(&mut self, data: impl Into<Bytes>) {
        self.buffers.data = Some(data.into());
        self.touch();
    }

    pub fn set_relations(&mut self, relations: Vec<Bytes>) {
        self.buffers.relations = Some(relations);
        self.touch();
    }

    pub fn set_vector_members(&mut self, members: Vec<VectorMember>) {
        self.buffers.vector_members = Some(members);
        self.touch();
    }

    pub fn set_schema_version(&mut self, version: u32) {
        self.buffers.schema_version = Some(version);
        self.touch();
    }

    /// Recompute validity from the current buffers.
    pub fn prepare_after_read(&mut self) {
        self.valid = self.buffers.is_valid();
    }

    /// Bind relationship targets. Has no effect on an invalid collection.
    pub fn set_references(&mut self) {
        self.resolved = self.valid;
    }

    /// Fill every unset buffer field so the collection can be exported.
    pub fn prepare_for_write(&mut self) -> &CollectionBuffers {
        if self.prepared {
            return &self.buffers;
        }
        let b = &mut self.buffers;
        b.data.get_or_insert_with(Bytes::new);
        b.relations.get_or_insert_with(Vec::new);
        b.vector_members.get_or_insert_with(Vec::new);
        b.schema_version.get_or_insert(DEFAULT_SCHEMA_VERSION);
        self.prepared = true;
        &self.buffers
    }

    pub fn buffers(&self) -> &CollectionBuffers {
        &self.buffers
    }

    pub fn into_buffers(self) -> CollectionBuffers {
        self.buffers
    }

    pub fn data(&self) -> Option<&Bytes> {
        self.buffers.data.as_ref()
    }

    pub fn relations(&self) -> &[Bytes] {
        self.buffers.relations.as_deref().unwrap_or_default()
    }

    pub fn vector_members(&self) -> &[VectorMember] {
        self.buffers.vector_members.as_deref().unwrap_or_default()
    }

    pub fn schema_version(&self) -> Option<u32> {
        self.buffers.schema_version
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    // Any mutation invalidates the read and write preparation.
    fn touch(&mut self) {
        self.valid = false;
        self.resolved = false;
        self.prepared = false;
    }
}
