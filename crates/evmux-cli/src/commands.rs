use anyhow::{bail, Context};
use colored::Colorize;
use evmux_core::{Reader, TableReader, TableWriter, Writer};
use evmux_pack::{PackReader, PackWriter};

use crate::cli::*;
use crate::config::RunConfig;
use crate::generate::generate;
use crate::inspect::inspect;
use crate::pipeline::Pipeline;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Generate(args) => cmd_generate(args, cli.format),
        Command::Run(args) => cmd_run(args, cli.format),
        Command::Inspect(args) => inspect(&args, cli.format),
    }
}

fn cmd_generate(args: GenerateArgs, format: OutputFormat) -> anyhow::Result<()> {
    let summary = generate(&args)?;
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "{} Wrote {} events to {}",
        "✓".green().bold(),
        summary.events,
        args.output.display().to_string().bold()
    );
    println!("  Collections: {}", summary.collections.join(", ").cyan());
    println!("  Stored: {} collections", summary.written);
    if let Some(checksum) = summary.checksum {
        println!("  Checksum: {}", checksum.yellow());
    }
    Ok(())
}

fn cmd_run(args: RunArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    config.apply_args(&args);

    let mut sources: Vec<Box<dyn Reader>> = Vec::new();
    for path in &args.packs {
        let mut reader = PackReader::default();
        reader
            .open_file(path)
            .with_context(|| format!("opening pack {}", path.display()))?;
        sources.push(Box::new(reader));
    }
    for path in &args.tables {
        let mut reader = TableReader::unopened(path.display().to_string());
        reader
            .open_file(path)
            .with_context(|| format!("opening table {}", path.display()))?;
        sources.push(Box::new(reader));
    }
    if sources.is_empty() {
        bail!("no sources given, pass --pack or --table");
    }

    let mut writers: Vec<Box<dyn Writer>> = Vec::new();
    if let Some(path) = &args.output {
        writers.push(Box::new(PackWriter::create(path)?));
    }
    if let Some(path) = &args.table_output {
        writers.push(Box::new(TableWriter::to_file(
            path.display().to_string(),
            path,
        )));
    }

    let pipeline = Pipeline::new(config, sources, writers)?;
    let names = pipeline.collection_names();
    let summary = pipeline.run()?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    println!(
        "{} Processed {} events from {} sources",
        "✓".green().bold(),
        summary.events.to_string().bold(),
        summary.sources
    );
    println!("  Collections: {}", names.join(", ").cyan());
    println!("  Found: {} valid collections", summary.collections_found);
    println!(
        "  Threads: {}  Writers: {}  Time: {:.2?}",
        summary.threads, summary.writers, summary.elapsed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use evmux_core::TableDocument;

    fn cli(argv: &[&str]) -> Cli {
        let mut full = vec!["evmux"];
        full.extend_from_slice(argv);
        Cli::parse_from(full)
    }

    #[test]
    fn generate_run_and_inspect() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.evmp");
        let b = dir.path().join("b.json");
        let out = dir.path().join("out.evmp");
        let table = dir.path().join("out.json");
        let a = a.to_str().unwrap();
        let b = b.to_str().unwrap();

        run_command(cli(&["generate", "-o", a, "-n", "4", "--collections", "Hits,Tracks"])).unwrap();
        run_command(cli(&[
            "generate", "-o", b, "-n", "3", "--collections", "Clusters", "--kind", "table",
        ]))
        .unwrap();
        run_command(cli(&[
            "run",
            "--pack",
            a,
            "--table",
            b,
            "--event-kind",
            "lazy",
            "--new-collection",
            "Made",
            "-o",
            out.to_str().unwrap(),
            "--table-output",
            table.to_str().unwrap(),
            "--format",
            "json",
        ]))
        .unwrap();

        let reader = PackReader::open(&out).unwrap();
        assert_eq!(reader.event_count(), 3);
        let doc = TableDocument::load(&table).unwrap();
        assert_eq!(doc.rows.len(), 3);
        assert!(doc.collections.contains(&"Made".to_string()));

        run_command(cli(&["inspect", out.to_str().unwrap(), "--entries", "0:2"])).unwrap();
    }

    #[test]
    fn run_without_sources_fails() {
        let err = run_command(cli(&["run"])).unwrap_err();
        assert!(err.to_string().contains("no sources"));
    }
}
