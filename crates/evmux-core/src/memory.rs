use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use evmux_types::{CollectionBuffers, LocalIndex, VectorMember};
use serde::{Deserialize, Serialize};
use tracing::{debug, Span};

use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::id_table::IdTable;
use crate::raw::{typed_decoder, DecodeFn, RawHandle};
use crate::traits::{Reader, Writer};

/// Stored form of one collection in one event.
///
/// Relation and vector-member blocks may be omitted; they read back as empty
/// lists. A missing schema version reads back as unset, which makes the
/// decoded buffers invalid.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCell {
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relations: Option<Vec<Bytes>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_members: Option<Vec<VectorMember>>,
    #[serde(default)]
    pub schema_version: Option<u32>,
}

impl TableCell {
    pub fn new(data: impl Into<Bytes>, schema_version: u32) -> Self {
        Self {
            data: data.into(),
            relations: None,
            vector_members: None,
            schema_version: Some(schema_version),
        }
    }

    pub fn from_buffers(buffers: &CollectionBuffers) -> Self {
        Self {
            data: buffers.data.clone().unwrap_or_default(),
            relations: buffers.relations.clone(),
            vector_members: buffers.vector_members.clone(),
            schema_version: buffers.schema_version,
        }
    }

    pub fn to_buffers(&self) -> CollectionBuffers {
        CollectionBuffers {
            data: Some(self.data.clone()),
            relations: Some(self.relations.clone().unwrap_or_default()),
            vector_members: Some(self.vector_members.clone().unwrap_or_default()),
            schema_version: self.schema_version,
        }
    }
}

/// One event: a cell per collection, indexed by local index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow(pub Vec<Option<TableCell>>);

impl TableRow {
    pub fn cell(&self, index: LocalIndex) -> Option<&TableCell> {
        self.0.get(index.as_usize()).and_then(Option::as_ref)
    }
}

/// JSON document holding a whole table of events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDocument {
    pub collections: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub rows: Vec<TableRow>,
}

impl TableDocument {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read(path)?;
        serde_json::from_slice(&raw)
            .map_err(|e| CoreError::Source(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| CoreError::Sink(format!("{}: {e}", path.display())))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// In-memory reader over a table of events.
///
/// Decoding is stateless: every raw handle is the event's own row, so the
/// shared decode function never touches reader state.
#[derive(Debug, Default)]
pub struct TableReader {
    name: String,
    collections: Vec<String>,
    rows: VecDeque<TableRow>,
    metadata: BTreeMap<String, String>,
}

impl TableReader {
    pub fn new<I, S>(name: impl Into<String>, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut reader = Self {
            name: name.into(),
            ..Self::default()
        };
        for collection in collections {
            let collection = collection.into();
            if !reader.collections.contains(&collection) {
                reader.collections.push(collection);
            }
        }
        reader
    }

    /// A reader that still has to be pointed at a file with
    /// [`Reader::open_file`].
    pub fn unopened(name: impl Into<String>) -> Self {
        Self::new(name, Vec::<String>::new())
    }

    pub fn from_document(name: impl Into<String>, doc: TableDocument) -> Self {
        let mut reader = Self::new(name, doc.collections);
        reader.rows = doc.rows.into();
        reader.metadata = doc.metadata;
        reader
    }

    pub fn push_event(&mut self, row: TableRow) {
        self.rows.push_back(row);
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl Reader for TableReader {
    fn open_file(&mut self, path: &Path) -> CoreResult<()> {
        let doc = TableDocument::load(path)?;
        debug!(
            path = %path.display(),
            collections = doc.collections.len(),
            rows = doc.rows.len(),
            "opened table"
        );
        let name = std::mem::take(&mut self.name);
        *self = Self::from_document(name, doc);
        Ok(())
    }

    fn next_event(&mut self) -> CoreResult<Option<RawHandle>> {
        Ok(self
            .rows
            .pop_front()
            .map(|row| Box::new(row) as RawHandle))
    }

    fn decode_fn(&self) -> DecodeFn {
        typed_decoder(|row: &TableRow, index| {
            row.cell(index)
                .map(TableCell::to_buffers)
                .ok_or_else(|| CoreError::Decode {
                    index,
                    reason: "collection not stored in this event".into(),
                })
        })
    }

    fn id_table(&self) -> BTreeMap<String, LocalIndex> {
        self.collections
            .iter()
            .cloned()
            .zip((0u32..).map(LocalIndex::new))
            .collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-memory writer that only writes the collections registered with it.
#[derive(Debug)]
pub struct TableWriter {
    name: String,
    registered: Vec<String>,
    rows: Vec<TableRow>,
    metadata: BTreeMap<String, String>,
    id_table: Option<IdTable>,
    output: Option<PathBuf>,
    span: Span,
}

impl TableWriter {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let span = tracing::debug_span!("table_writer", name = %name);
        Self {
            name,
            registered: Vec::new(),
            rows: Vec::new(),
            metadata: BTreeMap::new(),
            id_table: None,
            output: None,
            span,
        }
    }

    /// A writer that saves its table to `path` on [`Writer::finish`].
    pub fn to_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let mut writer = Self::new(name);
        writer.output = Some(path.into());
        writer
    }

    pub fn registered(&self) -> &[String] {
        &self.registered
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn id_table(&self) -> Option<&IdTable> {
        self.id_table.as_ref()
    }

    pub fn document(&self) -> TableDocument {
        TableDocument {
            collections: self.registered.clone(),
            metadata: self.metadata.clone(),
            rows: self.rows.clone(),
        }
    }

    fn register(&mut self, name: &str) {
        if !self.registered.iter().any(|n| n == name) {
            self.registered.push(name.to_string());
        }
    }
}

impl Writer for TableWriter {
    fn register_for_write(&mut self, name: &str) -> CoreResult<()> {
        self.register(name);
        debug!(parent: &self.span, collection = name, "registered for write");
        Ok(())
    }

    fn write_event(&mut self, event: &mut Event, names: &[String]) -> CoreResult<()> {
        let selected: Vec<String> = if names.is_empty() {
            self.registered.clone()
        } else {
            names
                .iter()
                .filter(|n| self.registered.contains(n))
                .cloned()
                .collect()
        };

        let mut row = TableRow(vec![None; self.registered.len()]);
        // An empty selection would mean "everything" to the event.
        if !selected.is_empty() {
            for (name, buffers) in event.collections_for_write(&selected)? {
                if let Some(pos) = self.registered.iter().position(|n| *n == name) {
                    row.0[pos] = Some(TableCell::from_buffers(&buffers));
                }
            }
        }
        self.rows.push(row);
        Ok(())
    }

    fn write_id_table(&mut self, table: &IdTable) -> CoreResult<()> {
        for name in table.names() {
            self.register(&name);
        }
        self.id_table = Some(table.clone());
        Ok(())
    }

    fn write_collection_metadata(&mut self, metadata: &BTreeMap<String, String>) -> CoreResult<()> {
        self.metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn finish(&mut self) -> CoreResult<()> {
        if let Some(path) = &self.output {
            self.document().save(path)?;
            debug!(parent: &self.span, path = %path.display(), rows = self.rows.len(), "saved table");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
