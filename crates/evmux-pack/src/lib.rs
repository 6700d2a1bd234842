//! Pack event files for evmux.
//!
//! A pack is a sequence of zstd-compressed, CRC-checked records behind a
//! small header and in front of a BLAKE3 trailer. Event records hold the
//! buffers of one event; the collection table and collection metadata follow
//! them as trailing records, written when the pack is finished.
//!
//! - [`PackWriter`] -- a per-call [`Writer`](evmux_core::Writer) that streams
//!   events to any `io::Write`
//! - [`PackReader`] -- a [`Reader`](evmux_core::Reader) over a verified pack;
//!   each event is decompressed at most once, on its first decode

pub mod entry;
pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

pub use entry::{PackedEntry, PackedEvent, PackedTable, RecordKind};
pub use error::{PackError, PackResult};
pub use reader::{PackReader, PackedEventHandle};
pub use writer::PackWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use evmux_core::{
        CoreError, Event, EventStore, Reader, StoreConfig, TableCell, TableReader, TableRow, Writer,
    };
    use evmux_types::{Collection, LocalIndex, SourceId};

    fn cell(data: &'static [u8]) -> Option<TableCell> {
        Some(TableCell::new(data, 2))
    }

    fn source() -> TableReader {
        let mut r = TableReader::new("table", ["X", "Y"]);
        r.push_event(TableRow(vec![cell(b"x0"), cell(b"y0")]));
        r.push_event(TableRow(vec![cell(b"x1"), cell(b"y1")]));
        r.push_event(TableRow(vec![cell(b"x2"), None]));
        r
    }

    fn write_run(names: &[String]) -> Vec<u8> {
        let mut store = EventStore::new(StoreConfig::default());
        store.register_source(Box::new(source())).unwrap();
        store
            .register_runtime_collections(&["Made".to_string()])
            .unwrap();

        let mut writer = PackWriter::new("mem", Vec::new()).unwrap();
        writer.write_id_table(store.id_table()).unwrap();
        while let Some(mut ev) = store.next_event(|_| Event::lazy(), None).unwrap() {
            let mut made = Collection::new();
            made.set_data(&b"runtime"[..]);
            ev.put(made, "Made").unwrap();
            writer.write_event(&mut ev, names).unwrap();
        }
        let mut meta = BTreeMap::new();
        meta.insert("X".to_string(), "kind=x".to_string());
        writer.write_collection_metadata(&meta).unwrap();
        writer.finish().unwrap();
        writer.into_inner()
    }

    #[test]
    fn pack_feeds_a_new_store() {
        let reader = PackReader::from_bytes(write_run(&[])).unwrap();
        assert_eq!(reader.event_count(), 3);
        assert_eq!(reader.collections(), &["Made", "X", "Y"]);
        assert_eq!(reader.collection_metadata()["X"], "kind=x");
        let origin = reader.source_table().unwrap();
        assert_eq!(origin.source(SourceId::RUNTIME).unwrap().len(), 1);

        let mut store = EventStore::new(StoreConfig::default());
        store.register_source(Box::new(reader)).unwrap();
        assert_eq!(store.collection_names(), vec!["Made", "X", "Y"]);

        let mut ev = store.next_event(|_| Event::eager(), None).unwrap().unwrap();
        let x = ev.get("X").unwrap().unwrap();
        assert_eq!(x.data().unwrap().as_ref(), b"x0");
        assert_eq!(x.schema_version(), Some(2));
        let made = ev.get("Made").unwrap().unwrap();
        assert!(made.is_valid());
        assert_eq!(made.data().unwrap().as_ref(), b"runtime");

        store.next_event(|_| Event::eager(), None).unwrap();
        let mut last = store.next_event(|_| Event::lazy(), None).unwrap().unwrap();
        // Y failed to decode in the source, so it was never written.
        let y = last.get("Y").unwrap().unwrap();
        assert!(!y.is_valid());
        assert!(store.next_event(|_| Event::lazy(), None).unwrap().is_none());
    }

    #[test]
    fn explicit_names_limit_what_is_written() {
        let reader = PackReader::from_bytes(write_run(&["Y".to_string()])).unwrap();
        let first = reader.read_event(0).unwrap();
        assert_eq!(first.len(), 1);
        let y = reader.id_table()["Y"];
        assert_eq!(first.entries[0].index, y);
        assert_eq!(reader.name_of(y), Some("Y"));
    }

    #[test]
    fn indices_follow_first_seen_order() {
        let mut writer = PackWriter::new("mem", Vec::new()).unwrap();
        for names in [&["B"][..], &["A", "B"][..]] {
            let mut ev = Event::lazy();
            for name in names {
                ev.put(Collection::new(), *name).unwrap();
            }
            writer.write_event(&mut ev, &[]).unwrap();
        }
        assert_eq!(writer.collections(), &["B", "A"]);
        writer.finish().unwrap();

        let reader = PackReader::from_bytes(writer.into_inner()).unwrap();
        assert_eq!(reader.id_table()["B"], LocalIndex::new(0));
        assert!(reader.source_table().is_none());
    }

    #[test]
    fn empty_pack() {
        let mut writer = PackWriter::new("mem", Vec::new()).unwrap();
        writer.finish().unwrap();
        let reader = PackReader::from_bytes(writer.into_inner()).unwrap();
        assert_eq!(reader.event_count(), 0);
        assert!(reader.collections().is_empty());
    }

    #[test]
    fn finish_is_idempotent_and_final() {
        let mut writer = PackWriter::new("mem", Vec::new()).unwrap();
        let first = writer.finish_pack().unwrap();
        assert_eq!(writer.finish_pack().unwrap(), first);

        let err = writer.write_event(&mut Event::lazy(), &[]).unwrap_err();
        assert!(matches!(err, CoreError::Sink(_)));
        let bytes = writer.into_inner();
        assert_eq!(PackReader::from_bytes(bytes).unwrap().checksum(), &first);
    }

    #[test]
    fn bad_magic() {
        let mut data = write_run(&[]);
        data[..4].copy_from_slice(b"NOPE");
        let err = PackReader::from_bytes(data).unwrap_err();
        assert!(matches!(err, PackError::InvalidMagic { .. }));
    }

    #[test]
    fn bad_version() {
        let mut data = write_run(&[]);
        data[4..8].copy_from_slice(&7u32.to_be_bytes());
        let err = PackReader::from_bytes(data).unwrap_err();
        assert!(matches!(err, PackError::UnsupportedVersion(7)));
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let mut data = write_run(&[]);
        let mid = data.len() / 2;
        data[mid] ^= 0x01;
        let err = PackReader::from_bytes(data).unwrap_err();
        assert!(matches!(err, PackError::ChecksumMismatch));
    }

    #[test]
    fn truncated_pack() {
        let mut data = write_run(&[]);
        data.truncate(data.len() - 10);
        assert!(PackReader::from_bytes(data).is_err());
        let err = PackReader::from_bytes(vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, PackError::CorruptRecord { .. }));
    }

    #[test]
    fn disk_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.evmp");

        let mut writer = PackWriter::create(&path).unwrap();
        let mut ev = Event::lazy();
        let mut c = Collection::new();
        c.set_data(&b"on disk"[..]);
        ev.put(c, "D").unwrap();
        writer.write_event(&mut ev, &[]).unwrap();
        writer.finish().unwrap();
        drop(writer);

        let reader = PackReader::open(&path).unwrap();
        let event = reader.read_event(0).unwrap();
        assert_eq!(event.entries[0].buffers.data.as_ref().unwrap().as_ref(), b"on disk");
    }
}
