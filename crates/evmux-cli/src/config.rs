use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use evmux_core::StoreConfig;
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;

/// Configuration of one `evmux run`.
///
/// Loaded from TOML; command-line flags override file values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub store: StoreConfig,
    /// Worker threads; 1 runs the loop on the calling thread.
    pub threads: usize,
    pub max_events: Option<u64>,
    /// Collections every event creates at runtime.
    pub new_collections: Vec<String>,
    /// Collections handed to writers; empty writes everything.
    pub write_collections: Vec<String>,
    /// Collection metadata written once at the end of the run.
    pub metadata: BTreeMap<String, String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            threads: 1,
            max_events: None,
            new_collections: Vec::new(),
            write_collections: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

impl RunConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Apply command-line overrides.
    pub fn apply_args(&mut self, args: &RunArgs) {
        if let Some(kind) = args.event_kind {
            self.store.event_kind = kind;
        }
        if args.reuse {
            self.store.reuse_events = true;
        }
        if let Some(threads) = args.threads {
            self.threads = threads;
        }
        if args.max_events.is_some() {
            self.max_events = args.max_events;
        }
        extend_unique(&mut self.new_collections, &args.new_collections);
        extend_unique(&mut self.write_collections, &args.write);
        self.threads = self.threads.max(1);
    }
}

fn extend_unique(into: &mut Vec<String>, names: &[String]) {
    for name in names {
        if !into.contains(name) {
            into.push(name.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;
    use evmux_core::{EventKind, PutPolicy};

    fn run_args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["evmux", "run"];
        full.extend_from_slice(argv);
        match Cli::parse_from(full).command {
            Command::Run(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn default_config() {
        let c = RunConfig::default();
        assert_eq!(c.threads, 1);
        assert!(c.max_events.is_none());
        assert!(c.write_collections.is_empty());
        assert_eq!(c.store, StoreConfig::default());
    }

    #[test]
    fn load_nested_store_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(
            &path,
            r#"
            threads = 3
            new_collections = ["Made"]

            [store]
            event_kind = "lazy"
            put_policy = "keep-original"

            [metadata]
            Made = "created per event"
            "#,
        )
        .unwrap();
        let c = RunConfig::load(&path).unwrap();
        assert_eq!(c.threads, 3);
        assert_eq!(c.store.event_kind, EventKind::Lazy);
        assert_eq!(c.store.put_policy, PutPolicy::KeepOriginal);
        assert_eq!(c.metadata["Made"], "created per event");
    }

    #[test]
    fn flags_override_file() {
        let mut c = RunConfig {
            threads: 3,
            new_collections: vec!["Made".into()],
            ..Default::default()
        };
        c.apply_args(&run_args(&[
            "--event-kind", "lazy", "--reuse", "-j", "0", "--new-collection", "Made",
            "--new-collection", "Other", "--max-events", "5",
        ]));
        assert_eq!(c.store.event_kind, EventKind::Lazy);
        assert!(c.store.reuse_events);
        assert_eq!(c.threads, 1);
        assert_eq!(c.max_events, Some(5));
        assert_eq!(c.new_collections, vec!["Made", "Other"]);
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = RunConfig::load(Path::new("/nonexistent/run.toml")).unwrap_err();
        assert!(err.to_string().contains("run.toml"));
    }
}
