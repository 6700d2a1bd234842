use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use bytes::Bytes;
use evmux_core::{typed_decoder, CoreError, CoreResult, DecodeFn, IdTable, RawHandle, Reader};
use evmux_types::LocalIndex;
use tracing::debug;

use crate::entry::{PackedEvent, PackedTable, RecordKind};
use crate::error::{PackError, PackResult};
use crate::format::{
    split_records, RawRecord, CHECKSUM_LEN, HEADER_LEN, MAGIC, TRAILER_LEN, TRAILER_MAGIC, VERSION,
};

/// Reads events from a pack, in file order.
#[derive(Debug, Default)]
pub struct PackReader {
    name: String,
    events: Vec<RawRecord>,
    table: PackedTable,
    metadata: BTreeMap<String, String>,
    checksum: [u8; 32],
    cursor: usize,
}

impl PackReader {
    /// Open and verify the pack at `path`.
    pub fn open(path: &Path) -> PackResult<Self> {
        let data = std::fs::read(path)?;
        let mut reader = Self::from_bytes(data)?;
        reader.name = path.display().to_string();
        Ok(reader)
    }

    /// Verify and index pack bytes. Event payloads stay compressed.
    pub fn from_bytes(data: impl Into<Bytes>) -> PackResult<Self> {
        let data: Bytes = data.into();
        if data.len() < HEADER_LEN + TRAILER_LEN {
            return Err(PackError::CorruptRecord {
                offset: 0,
                reason: "pack data too short".into(),
            });
        }
        if &data[..4] != MAGIC {
            return Err(PackError::InvalidMagic {
                expected: String::from_utf8_lossy(MAGIC).into(),
                actual: String::from_utf8_lossy(&data[..4]).into(),
            });
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }

        let checksum_at = data.len() - CHECKSUM_LEN;
        let trailer_at = data.len() - TRAILER_LEN;
        if &data[trailer_at..checksum_at] != TRAILER_MAGIC {
            return Err(PackError::CorruptRecord {
                offset: trailer_at as u64,
                reason: "missing trailer".into(),
            });
        }
        let mut checksum = [0u8; 32];
        checksum.copy_from_slice(&data[checksum_at..]);
        if blake3::hash(&data[..checksum_at]).as_bytes() != &checksum {
            return Err(PackError::ChecksumMismatch);
        }

        let body = data.slice(HEADER_LEN..trailer_at);
        let mut reader = Self {
            checksum,
            ..Self::default()
        };
        for record in split_records(&body, HEADER_LEN as u64)? {
            match record.kind {
                RecordKind::Event => reader.events.push(record),
                RecordKind::IdTable => reader.table = record.decode()?,
                RecordKind::Metadata => {
                    let metadata: BTreeMap<String, String> = record.decode()?;
                    reader.metadata.extend(metadata);
                }
            }
        }
        debug!(
            events = reader.events.len(),
            collections = reader.table.collections.len(),
            "indexed pack"
        );
        Ok(reader)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Names in local-index order.
    pub fn collections(&self) -> &[String] {
        &self.table.collections
    }

    pub fn name_of(&self, index: LocalIndex) -> Option<&str> {
        self.table.name_of(index)
    }

    /// Identity table of the run that wrote this pack, if it recorded one.
    pub fn source_table(&self) -> Option<&IdTable> {
        self.table.sources.as_ref()
    }

    pub fn collection_metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn checksum(&self) -> &[u8; 32] {
        &self.checksum
    }

    /// Decode event `n` directly, independent of the read cursor.
    pub fn read_event(&self, n: usize) -> PackResult<PackedEvent> {
        self.events
            .get(n)
            .ok_or(PackError::EventOutOfRange(n))?
            .decode()
    }

    /// Restart reading from the first event.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

/// Raw handle of one pack event.
///
/// The record is decompressed on the first decode and the result shared by
/// every later decode, from any thread.
#[derive(Debug)]
pub struct PackedEventHandle {
    record: RawRecord,
    unpacked: OnceLock<Result<PackedEvent, String>>,
}

impl PackedEventHandle {
    fn new(record: RawRecord) -> Self {
        Self {
            record,
            unpacked: OnceLock::new(),
        }
    }

    pub fn unpack(&self) -> Result<&PackedEvent, &str> {
        self.unpacked
            .get_or_init(|| self.record.decode().map_err(|e| e.to_string()))
            .as_ref()
            .map_err(String::as_str)
    }

    pub fn is_unpacked(&self) -> bool {
        self.unpacked.get().is_some()
    }
}

impl Reader for PackReader {
    fn open_file(&mut self, path: &Path) -> CoreResult<()> {
        let opened = Self::open(path).map_err(PackError::into_source)?;
        let name = std::mem::take(&mut self.name);
        *self = opened;
        if !name.is_empty() {
            self.name = name;
        }
        Ok(())
    }

    fn next_event(&mut self) -> CoreResult<Option<RawHandle>> {
        let Some(record) = self.events.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;
        Ok(Some(Box::new(PackedEventHandle::new(record.clone()))))
    }

    fn decode_fn(&self) -> DecodeFn {
        typed_decoder(|handle: &PackedEventHandle, index: LocalIndex| {
            let event = handle.unpack().map_err(|reason| CoreError::Decode {
                index,
                reason: reason.to_string(),
            })?;
            event.get(index).cloned().ok_or_else(|| CoreError::Decode {
                index,
                reason: "collection not stored in this event".into(),
            })
        })
    }

    fn id_table(&self) -> BTreeMap<String, LocalIndex> {
        self.table
            .collections
            .iter()
            .cloned()
            .zip((0u32..).map(LocalIndex::new))
            .collect()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
