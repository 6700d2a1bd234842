use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use evmux_core::EventKind;

#[derive(Parser)]
#[command(
    name = "evmux",
    about = "evmux: combine event collections from many sources and decode them on demand",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a synthetic event file
    Generate(GenerateArgs),
    /// Read events from every source, process them and write them out
    Run(RunArgs),
    /// Show the tables, metadata and events of a pack file
    Inspect(InspectArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FileKind {
    /// Compressed pack file
    Pack,
    /// JSON table document
    Table,
}

#[derive(Args)]
pub struct GenerateArgs {
    #[arg(short, long)]
    pub output: PathBuf,
    #[arg(short = 'n', long, default_value = "10")]
    pub events: usize,
    #[arg(long, value_delimiter = ',', default_value = "Hits,Tracks,Clusters")]
    pub collections: Vec<String>,
    #[arg(long, default_value = "42")]
    pub seed: u64,
    #[arg(long, default_value = "64")]
    pub payload_size: usize,
    /// Probability that a collection is left out of an event
    #[arg(long, default_value = "0.0")]
    pub drop_rate: f64,
    #[arg(long, default_value = "pack")]
    pub kind: FileKind,
}

#[derive(Args)]
pub struct RunArgs {
    /// Pack file to read (repeatable)
    #[arg(long = "pack")]
    pub packs: Vec<PathBuf>,
    /// JSON table document to read (repeatable)
    #[arg(long = "table")]
    pub tables: Vec<PathBuf>,
    #[arg(long)]
    pub event_kind: Option<EventKind>,
    /// Reset and reuse one event instead of allocating per event
    #[arg(long)]
    pub reuse: bool,
    #[arg(short = 'j', long)]
    pub threads: Option<usize>,
    #[arg(long)]
    pub max_events: Option<u64>,
    /// Collection created by every event at runtime (repeatable)
    #[arg(long = "new-collection")]
    pub new_collections: Vec<String>,
    /// Collection to write (repeatable, default all)
    #[arg(long = "write")]
    pub write: Vec<String>,
    /// Pack file to write
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// JSON table document to write
    #[arg(long)]
    pub table_output: Option<PathBuf>,
    /// TOML run configuration
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct InspectArgs {
    pub path: PathBuf,
    /// Events to show: a list (`0,2,5`) or a half-open range (`1:4`)
    #[arg(long)]
    pub entries: Option<String>,
    /// Show payload previews and vector-member names
    #[arg(long)]
    pub detailed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run() {
        let cli = Cli::try_parse_from([
            "evmux", "run", "--pack", "a.evmp", "--pack", "b.evmp", "--event-kind", "lazy",
            "--write", "X", "-j", "4", "--new-collection", "Made",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.packs.len(), 2);
        assert_eq!(args.event_kind, Some(EventKind::Lazy));
        assert_eq!(args.threads, Some(4));
        assert_eq!(args.write, vec!["X"]);
        assert_eq!(args.new_collections, vec!["Made"]);
    }

    #[test]
    fn parse_generate_defaults() {
        let cli = Cli::try_parse_from(["evmux", "generate", "-o", "out.evmp"]).unwrap();
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.events, 10);
        assert_eq!(args.collections, vec!["Hits", "Tracks", "Clusters"]);
        assert_eq!(args.kind, FileKind::Pack);
    }

    #[test]
    fn parse_inspect_json() {
        let cli = Cli::try_parse_from([
            "evmux", "inspect", "run.evmp", "--entries", "1:3", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Command::Inspect(ref a) if a.entries.as_deref() == Some("1:3")));
    }

    #[test]
    fn bad_event_kind_is_rejected() {
        assert!(Cli::try_parse_from(["evmux", "run", "--event-kind", "greedy"]).is_err());
    }
}
