use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use evmux_core::{CoreError, CoreResult, Event, IdTable, Writer};
use evmux_types::LocalIndex;
use tracing::{debug, debug_span, Span};

use crate::entry::{PackedEntry, PackedEvent, PackedTable, RecordKind};
use crate::error::{PackError, PackResult};
use crate::format::{encode_record, header, TRAILER_MAGIC};

/// Streams events into a pack.
///
/// A per-call writer: every [`Writer::write_event`] writes exactly the names
/// it is given (all of the event's collections when empty). Local indices are
/// assigned to names in first-seen order. The collection table and metadata
/// are written as trailing records by [`Writer::finish`].
pub struct PackWriter<W: Write = BufWriter<File>> {
    name: String,
    out: W,
    hasher: blake3::Hasher,
    table: PackedTable,
    indices: HashMap<String, LocalIndex>,
    metadata: BTreeMap<String, String>,
    events_written: u64,
    checksum: Option<[u8; 32]>,
    span: Span,
}

impl PackWriter<BufWriter<File>> {
    /// Create a pack file at `path`, truncating any existing file.
    pub fn create(path: &Path) -> PackResult<Self> {
        let file = File::create(path)?;
        Self::new(path.display().to_string(), BufWriter::new(file))
    }
}

impl<W: Write> PackWriter<W> {
    /// Start a pack on `out`. The header is written immediately.
    pub fn new(name: impl Into<String>, out: W) -> PackResult<Self> {
        let name = name.into();
        let span = debug_span!("pack_writer", name = %name);
        let mut writer = Self {
            name,
            out,
            hasher: blake3::Hasher::new(),
            table: PackedTable::default(),
            indices: HashMap::new(),
            metadata: BTreeMap::new(),
            events_written: 0,
            checksum: None,
            span,
        };
        writer.emit(&header())?;
        Ok(writer)
    }

    fn emit(&mut self, bytes: &[u8]) -> PackResult<()> {
        self.hasher.update(bytes);
        self.out.write_all(bytes)?;
        Ok(())
    }

    fn index_for(&mut self, name: &str) -> PackResult<LocalIndex> {
        if let Some(index) = self.indices.get(name) {
            return Ok(*index);
        }
        let index = LocalIndex::from_position(self.table.collections.len())?;
        self.table.collections.push(name.to_string());
        self.indices.insert(name.to_string(), index);
        Ok(index)
    }

    fn ensure_open(&self) -> PackResult<()> {
        match self.checksum {
            Some(_) => Err(PackError::Finished),
            None => Ok(()),
        }
    }

    /// Append one already packed event.
    pub fn write_packed_event(&mut self, event: &PackedEvent) -> PackResult<()> {
        self.ensure_open()?;
        let record = encode_record(RecordKind::Event, event)?;
        self.emit(&record)?;
        self.events_written += 1;
        Ok(())
    }

    /// Write the trailing records and the checksum, then flush.
    ///
    /// Returns the pack checksum. Calling it again returns the same checksum
    /// without writing anything.
    pub fn finish_pack(&mut self) -> PackResult<[u8; 32]> {
        if let Some(checksum) = self.checksum {
            return Ok(checksum);
        }
        let table = encode_record(RecordKind::IdTable, &self.table)?;
        self.emit(&table)?;
        let metadata = encode_record(RecordKind::Metadata, &self.metadata)?;
        self.emit(&metadata)?;
        self.emit(TRAILER_MAGIC)?;

        let checksum = *self.hasher.finalize().as_bytes();
        self.out.write_all(&checksum)?;
        self.out.flush()?;
        self.checksum = Some(checksum);
        debug!(
            parent: &self.span,
            events = self.events_written,
            collections = self.table.collections.len(),
            "finished pack"
        );
        Ok(checksum)
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// Names in local-index order.
    pub fn collections(&self) -> &[String] {
        &self.table.collections
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Writer for PackWriter<W> {
    fn write_event(&mut self, event: &mut Event, names: &[String]) -> CoreResult<()> {
        self.ensure_open().map_err(PackError::into_sink)?;
        let mut packed = PackedEvent::default();
        for (name, buffers) in event.collections_for_write(names)? {
            let index = self.index_for(&name).map_err(PackError::into_sink)?;
            packed.entries.push(PackedEntry { index, buffers });
        }
        debug!(parent: event.span(), entries = packed.len(), "packing event");
        self.write_packed_event(&packed).map_err(PackError::into_sink)
    }

    fn write_id_table(&mut self, table: &IdTable) -> CoreResult<()> {
        for name in table.names() {
            self.index_for(&name).map_err(PackError::into_sink)?;
        }
        self.table.sources = Some(table.clone());
        Ok(())
    }

    fn write_collection_metadata(&mut self, metadata: &BTreeMap<String, String>) -> CoreResult<()> {
        if self.checksum.is_some() {
            return Err(CoreError::Sink(PackError::Finished.to_string()));
        }
        self.metadata
            .extend(metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    fn finish(&mut self) -> CoreResult<()> {
        self.finish_pack().map(|_| ()).map_err(PackError::into_sink)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
