use std::collections::BTreeMap;

use anyhow::{bail, Context};
use bytes::Bytes;
use evmux_core::{Event, TableWriter, Writer};
use evmux_pack::PackWriter;
use evmux_types::{Collection, CollectionBuffers, VectorMember, DEFAULT_SCHEMA_VERSION};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::{FileKind, GenerateArgs};

#[derive(Clone, Debug, Serialize)]
pub struct GenerateSummary {
    pub events: usize,
    pub collections: Vec<String>,
    /// Collections written, summed over events.
    pub written: usize,
    /// BLAKE3 checksum of a pack output, hex encoded.
    pub checksum: Option<String>,
}

/// Write `args.events` synthetic events. The same seed gives the same file.
pub fn generate(args: &GenerateArgs) -> anyhow::Result<GenerateSummary> {
    if args.collections.is_empty() {
        bail!("at least one collection is needed");
    }
    if !(0.0..=1.0).contains(&args.drop_rate) {
        bail!("drop rate must be between 0 and 1, got {}", args.drop_rate);
    }

    let mut rng = StdRng::seed_from_u64(args.seed);
    let (written, checksum) = match args.kind {
        FileKind::Pack => {
            let mut writer = PackWriter::create(&args.output)
                .with_context(|| format!("creating {}", args.output.display()))?;
            let written = write_events(&mut writer, args, &mut rng)?;
            writer.write_collection_metadata(&metadata(args))?;
            (written, Some(hex::encode(writer.finish_pack()?)))
        }
        FileKind::Table => {
            let mut writer = TableWriter::to_file("generate", &args.output);
            for name in &args.collections {
                writer.register_for_write(name)?;
            }
            let written = write_events(&mut writer, args, &mut rng)?;
            writer.write_collection_metadata(&metadata(args))?;
            writer.finish()?;
            (written, None)
        }
    };
    info!(events = args.events, written, path = %args.output.display(), "generated events");

    Ok(GenerateSummary {
        events: args.events,
        collections: args.collections.clone(),
        written,
        checksum,
    })
}

fn write_events(
    writer: &mut dyn Writer,
    args: &GenerateArgs,
    rng: &mut StdRng,
) -> anyhow::Result<usize> {
    let mut written = 0;
    for number in 0..args.events {
        let mut event = Event::lazy();
        for name in &args.collections {
            if args.drop_rate > 0.0 && rng.gen_bool(args.drop_rate) {
                debug!(event = number, collection = %name, "dropped");
                continue;
            }
            event.put(synthetic(name, number, args.payload_size, rng), name.clone())?;
            written += 1;
        }
        writer.write_event(&mut event, &[])?;
    }
    Ok(written)
}

fn synthetic(name: &str, number: usize, size: usize, rng: &mut StdRng) -> Collection {
    let mut data = vec![0u8; size];
    rng.fill_bytes(&mut data);
    let relations = (0..rng.gen_range(0..3))
        .map(|_| Bytes::copy_from_slice(&rng.gen::<u64>().to_le_bytes()))
        .collect();
    let members = vec![VectorMember::new(
        format!("{name}Members"),
        Bytes::copy_from_slice(&(number as u64).to_le_bytes()),
    )];
    Collection::from_buffers(CollectionBuffers::complete(
        data,
        relations,
        members,
        DEFAULT_SCHEMA_VERSION,
    ))
}

fn metadata(args: &GenerateArgs) -> BTreeMap<String, String> {
    args.collections
        .iter()
        .map(|name| {
            (
                name.clone(),
                format!("synthetic payload_size={} seed={}", args.payload_size, args.seed),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmux_core::TableDocument;
    use evmux_pack::PackReader;
    use std::path::Path;

    fn args(output: &Path, kind: FileKind) -> GenerateArgs {
        GenerateArgs {
            output: output.to_path_buf(),
            events: 5,
            collections: vec!["Hits".into(), "Tracks".into()],
            seed: 7,
            payload_size: 16,
            drop_rate: 0.0,
            kind,
        }
    }

    #[test]
    fn pack_has_every_event_and_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.evmp");
        let summary = generate(&args(&path, FileKind::Pack)).unwrap();
        assert_eq!(summary.written, 10);

        let reader = PackReader::open(&path).unwrap();
        assert_eq!(reader.event_count(), 5);
        assert_eq!(reader.collections(), &["Hits", "Tracks"]);
        assert_eq!(hex::encode(reader.checksum()), summary.checksum.unwrap());
        let event = reader.read_event(4).unwrap();
        assert_eq!(event.len(), 2);
        assert_eq!(event.entries[0].buffers.data.as_ref().unwrap().len(), 16);
        assert!(reader.collection_metadata()["Hits"].contains("seed=7"));
    }

    #[test]
    fn same_seed_same_pack() {
        let dir = tempfile::tempdir().unwrap();
        let a = generate(&args(&dir.path().join("a.evmp"), FileKind::Pack)).unwrap();
        let b = generate(&args(&dir.path().join("b.evmp"), FileKind::Pack)).unwrap();
        assert_eq!(a.checksum, b.checksum);

        let mut other = args(&dir.path().join("c.evmp"), FileKind::Pack);
        other.seed = 8;
        assert_ne!(generate(&other).unwrap().checksum, a.checksum);
    }

    #[test]
    fn drop_rate_leaves_gaps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gen.json");
        let mut a = args(&path, FileKind::Table);
        a.events = 40;
        a.drop_rate = 0.5;
        let summary = generate(&a).unwrap();
        assert!(summary.written > 0 && summary.written < 80);

        let doc = TableDocument::load(&path).unwrap();
        assert_eq!(doc.rows.len(), 40);
        let cells: usize = doc
            .rows
            .iter()
            .map(|r| r.0.iter().filter(|c| c.is_some()).count())
            .sum();
        assert_eq!(cells, summary.written);
    }

    #[test]
    fn rejects_bad_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = args(&dir.path().join("x.evmp"), FileKind::Pack);
        a.drop_rate = 1.5;
        assert!(generate(&a).is_err());
        a.drop_rate = 0.0;
        a.collections.clear();
        assert!(generate(&a).is_err());
    }
}
