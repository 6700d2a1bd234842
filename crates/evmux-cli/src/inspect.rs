use anyhow::{bail, Context};
use colored::Colorize;
use evmux_pack::{PackReader, PackedEvent};
use evmux_types::SourceId;
use serde_json::{json, Value};

use crate::cli::{InspectArgs, OutputFormat};

const PREVIEW_BYTES: usize = 8;

/// Parse an entry selection: `0,2,5` or the half-open range `1:4`. Either
/// end of a range may be left out. Indices past `count` are an error.
pub fn parse_entries(selection: Option<&str>, count: usize) -> anyhow::Result<Vec<usize>> {
    let Some(selection) = selection.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok((0..count).collect());
    };

    let entries: Vec<usize> = if let Some((start, end)) = selection.split_once(':') {
        let start = parse_bound(start, 0)?;
        let end = parse_bound(end, count)?;
        if start > end {
            bail!("empty entry range {selection}");
        }
        (start..end).collect()
    } else {
        selection
            .split(',')
            .map(|n| n.trim().parse::<usize>().with_context(|| format!("bad entry {n:?}")))
            .collect::<anyhow::Result<_>>()?
    };

    if let Some(bad) = entries.iter().find(|&&n| n >= count) {
        bail!("entry {bad} out of range, the file has {count} events");
    }
    Ok(entries)
}

fn parse_bound(text: &str, default: usize) -> anyhow::Result<usize> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(default);
    }
    text.parse().with_context(|| format!("bad range bound {text:?}"))
}

pub fn inspect(args: &InspectArgs, format: OutputFormat) -> anyhow::Result<()> {
    let reader = PackReader::open(&args.path)
        .with_context(|| format!("opening {}", args.path.display()))?;
    let entries = parse_entries(args.entries.as_deref(), reader.event_count())?;

    match format {
        OutputFormat::Json => {
            let report = json_report(&reader, &entries, args.detailed)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Text => print_text(&reader, &entries, args.detailed)?,
    }
    Ok(())
}

fn json_report(reader: &PackReader, entries: &[usize], detailed: bool) -> anyhow::Result<Value> {
    let mut events = Vec::with_capacity(entries.len());
    for &n in entries {
        let event = reader.read_event(n)?;
        let collections: Vec<Value> = event
            .entries
            .iter()
            .map(|entry| {
                let b = &entry.buffers;
                let mut value = json!({
                    "name": reader.name_of(entry.index),
                    "index": entry.index.get(),
                    "valid": b.is_valid(),
                    "bytes": b.payload_len(),
                    "relations": b.relations.as_ref().map_or(0, Vec::len),
                    "schema_version": b.raw_schema_version(),
                });
                if detailed {
                    value["preview"] = json!(preview(b.data.as_deref()));
                    value["vector_members"] = json!(b
                        .vector_members
                        .iter()
                        .flatten()
                        .map(|m| m.name.as_str())
                        .collect::<Vec<_>>());
                }
                value
            })
            .collect();
        events.push(json!({ "event": n, "collections": collections }));
    }

    let sources = reader.source_table().map(|table| {
        table
            .sources()
            .map(|(id, entries)| {
                json!({
                    "source": id.get(),
                    "collections": entries.keys().collect::<Vec<_>>(),
                })
            })
            .collect::<Vec<_>>()
    });

    Ok(json!({
        "checksum": hex::encode(reader.checksum()),
        "events": reader.event_count(),
        "collections": reader.collections(),
        "metadata": reader.collection_metadata(),
        "sources": sources,
        "entries": events,
    }))
}

fn print_text(reader: &PackReader, entries: &[usize], detailed: bool) -> anyhow::Result<()> {
    println!("{} {}", "checksum:".bold(), hex::encode(reader.checksum()).dimmed());
    println!("{} {}", "events:".bold(), reader.event_count());
    println!("{}", "collections:".bold());
    for (index, name) in reader.collections().iter().enumerate() {
        let meta = reader
            .collection_metadata()
            .get(name)
            .map(|m| format!("  {}", m.dimmed()))
            .unwrap_or_default();
        println!("  {:>3} {}{}", index, name.cyan(), meta);
    }
    if let Some(table) = reader.source_table() {
        println!("{}", "sources:".bold());
        for (id, entries) in table.sources() {
            let label = if id == SourceId::RUNTIME {
                "runtime".to_string()
            } else {
                id.get().to_string()
            };
            let names: Vec<&str> = entries.keys().map(String::as_str).collect();
            println!("  {} {}", label.yellow(), names.join(", "));
        }
    }

    for &n in entries {
        print_event(reader, n, &reader.read_event(n)?, detailed);
    }
    Ok(())
}

fn print_event(reader: &PackReader, n: usize, event: &PackedEvent, detailed: bool) {
    println!("{} {} ({} collections)", "event".bold(), n.to_string().yellow(), event.len());
    for entry in &event.entries {
        let b = &entry.buffers;
        let name = reader.name_of(entry.index).unwrap_or("?");
        let status = if b.is_valid() { "✓".green() } else { "✗".red() };
        println!(
            "  {} {:<16} {:>8} bytes  v{}",
            status,
            name,
            b.payload_len(),
            b.raw_schema_version()
        );
        if detailed {
            println!("      data: {}", preview(b.data.as_deref()).dimmed());
            for member in b.vector_members.iter().flatten() {
                println!("      member: {} ({} bytes)", member.name, member.payload.len());
            }
        }
    }
}

fn preview(data: Option<&[u8]>) -> String {
    match data {
        None => "unset".to_string(),
        Some(d) if d.len() > PREVIEW_BYTES => format!("{}…", hex::encode(&d[..PREVIEW_BYTES])),
        Some(d) => hex::encode(d),
    }
}
