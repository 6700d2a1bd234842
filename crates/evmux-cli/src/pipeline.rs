use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use bytes::Bytes;
use evmux_core::{
    event_factory, CoreError, CoreResult, Event, EventStore, Reader, Writer,
};
use evmux_types::{Collection, CollectionBuffers, VectorMember, DEFAULT_SCHEMA_VERSION};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Span};

use crate::config::RunConfig;

/// A name no source provides; every event asks for it.
pub const MISSING_COLLECTION: &str = "NotPresent";

/// Outcome of one run.
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub events: u64,
    /// Valid collections found across all events.
    pub collections_found: u64,
    pub threads: usize,
    pub sources: usize,
    pub writers: usize,
    pub elapsed: Duration,
}

/// The framework loop: registered sources in, processed events out.
pub struct Pipeline {
    store: EventStore,
    writers: Vec<Box<dyn Writer>>,
    config: RunConfig,
    span: Span,
}

impl Pipeline {
    /// Register sources, runtime collections and writers.
    ///
    /// Requested write collections that no source provides and no event
    /// creates are logged and skipped.
    pub fn new(
        config: RunConfig,
        sources: Vec<Box<dyn Reader>>,
        mut writers: Vec<Box<dyn Writer>>,
    ) -> anyhow::Result<Self> {
        let span = info_span!("pipeline");
        let mut store = EventStore::with_span(config.store.clone(), span.clone());
        for reader in sources {
            let name = reader.name().to_string();
            store
                .register_source(reader)
                .with_context(|| format!("registering source {name}"))?;
        }
        store.register_runtime_collections(&config.new_collections)?;

        let mut config = config;
        config.write_collections.retain(|name| {
            let known = store.id_table().contains(name);
            if !known {
                warn!(parent: &span, collection = %name, "no source or event provides collection, not writing it");
            }
            known
        });

        for writer in &mut writers {
            for name in &config.write_collections {
                match writer.register_for_write(name) {
                    Ok(()) => {}
                    Err(CoreError::RegistrationUnsupported(_)) => {
                        debug!(parent: &span, writer = writer.name(), "writer selects collections per event");
                        break;
                    }
                    Err(err) => return Err(err).context(format!("registering {name} on {}", writer.name())),
                }
            }
            writer.write_id_table(store.id_table())?;
        }

        Ok(Self {
            store,
            writers,
            config,
            span,
        })
    }

    pub fn collection_names(&self) -> Vec<String> {
        self.store.collection_names()
    }

    /// Process events until a source runs dry or the event limit is hit.
    pub fn run(self) -> anyhow::Result<RunSummary> {
        let started = Instant::now();
        let threads = self.config.threads.max(1);
        let sources = self.store.source_count();
        let writer_count = self.writers.len();
        info!(parent: &self.span, threads, sources, writers = writer_count, "starting run");

        let (events, collections_found, mut writers, config) = if threads == 1 {
            self.run_sequential()?
        } else {
            self.run_parallel(threads)?
        };

        let metadata = run_metadata(&config);
        for writer in &mut writers {
            writer.write_collection_metadata(&metadata)?;
            writer
                .finish()
                .with_context(|| format!("finishing {}", writer.name()))?;
        }

        Ok(RunSummary {
            events,
            collections_found,
            threads,
            sources,
            writers: writer_count,
            elapsed: started.elapsed(),
        })
    }

    fn run_sequential(mut self) -> anyhow::Result<(u64, u64, Vec<Box<dyn Writer>>, RunConfig)> {
        let factory = self.config.store.event_factory();
        let known = self.store.collection_names();
        let mut slot = None;
        let mut found = 0u64;
        loop {
            if limit_reached(&self.store, self.config.max_events) {
                break;
            }
            let Some(mut event) = self.store.next_event(factory, slot.take())? else {
                break;
            };
            found += process_event(&mut event, &known, &self.config.new_collections)? as u64;
            for writer in &mut self.writers {
                writer.write_event(&mut event, &self.config.write_collections)?;
            }
            slot = Some(event);
        }
        Ok((self.store.events_read(), found, self.writers, self.config))
    }

    fn run_parallel(
        self,
        threads: usize,
    ) -> anyhow::Result<(u64, u64, Vec<Box<dyn Writer>>, RunConfig)> {
        let Self {
            store,
            writers,
            config,
            span,
        } = self;
        if config.store.reuse_events {
            info!(parent: &span, "event reuse is disabled with more than one thread");
        }

        let shared = Arc::new(Shared {
            known: store.collection_names(),
            store: Mutex::new(store),
            writers: Mutex::new(writers),
            config,
        });

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(threads)
            .max_blocking_threads(threads)
            .enable_all()
            .build()?;
        let found = runtime.block_on(async {
            let mut tasks = tokio::task::JoinSet::new();
            for worker in 0..threads {
                let shared = Arc::clone(&shared);
                tasks.spawn_blocking(move || worker_loop(worker, &shared));
            }
            let mut found = 0u64;
            while let Some(joined) = tasks.join_next().await {
                found += joined??;
            }
            Ok::<u64, anyhow::Error>(found)
        })?;

        let shared = unwrap_shared(shared)?;
        let store = shared
            .store
            .into_inner()
            .map_err(|_| anyhow!("event store lock poisoned"))?;
        let writers = shared
            .writers
            .into_inner()
            .map_err(|_| anyhow!("writer lock poisoned"))?;
        Ok((store.events_read(), found, writers, shared.config))
    }
}

struct Shared {
    store: Mutex<EventStore>,
    writers: Mutex<Vec<Box<dyn Writer>>>,
    known: Vec<String>,
    config: RunConfig,
}

fn unwrap_shared(shared: Arc<Shared>) -> anyhow::Result<Shared> {
    Arc::try_unwrap(shared).map_err(|_| anyhow!("workers still hold the event store"))
}

fn lock<T>(mutex: &Mutex<T>) -> anyhow::Result<std::sync::MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| anyhow!("lock poisoned by a failed worker"))
}

fn limit_reached(store: &EventStore, max_events: Option<u64>) -> bool {
    max_events.is_some_and(|max| store.events_read() >= max)
}

/// One worker: each event is fetched, processed and written by the same
/// worker. Events from different workers reach the writers in any order.
fn worker_loop(worker: usize, shared: &Shared) -> anyhow::Result<u64> {
    let store_config = &shared.config.store;
    let factory = event_factory(store_config.event_kind, store_config.put_policy, false);
    let mut found = 0u64;
    let mut processed = 0u64;
    loop {
        let next = {
            let mut store = lock(&shared.store)?;
            if limit_reached(&store, shared.config.max_events) {
                None
            } else {
                store.next_event(factory, None)?
            }
        };
        let Some(mut event) = next else {
            break;
        };
        found += process_event(&mut event, &shared.known, &shared.config.new_collections)? as u64;

        let mut writers = lock(&shared.writers)?;
        for writer in writers.iter_mut() {
            writer.write_event(&mut event, &shared.config.write_collections)?;
        }
        processed += 1;
    }
    debug!(worker, processed, "worker done");
    Ok(found)
}

/// Touch every known collection plus one nobody provides, then add the
/// runtime collections. Returns the number of valid collections found.
pub fn process_event(
    event: &mut Event,
    known: &[String],
    new_collections: &[String],
) -> CoreResult<usize> {
    let mut found = 0;
    let mut missing = 0;
    for name in known.iter().map(String::as_str).chain([MISSING_COLLECTION]) {
        match event.get(name)?.map(Collection::is_valid) {
            Some(true) => found += 1,
            Some(false) => debug!(parent: event.span(), collection = name, "collection is invalid"),
            None => missing += 1,
        }
    }

    for name in new_collections {
        event.put(runtime_collection(name, found), name.clone())?;
    }
    event.parameters_mut().set("collections_found", found as i32);
    event.parameters_mut().set("collections_missing", missing as i32);
    Ok(found)
}

fn runtime_collection(name: &str, found: usize) -> Collection {
    Collection::from_buffers(CollectionBuffers::complete(
        Bytes::from(format!("{name}:{found}")),
        Vec::new(),
        vec![VectorMember::new(
            "found",
            Bytes::copy_from_slice(&(found as u32).to_le_bytes()),
        )],
        DEFAULT_SCHEMA_VERSION,
    ))
}

fn run_metadata(config: &RunConfig) -> BTreeMap<String, String> {
    let mut metadata = config.metadata.clone();
    for name in &config.new_collections {
        metadata
            .entry(name.clone())
            .or_insert_with(|| "created at runtime".to_string());
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmux_core::{EventKind, TableCell, TableDocument, TableReader, TableRow, TableWriter};
    use std::path::Path;

    fn source(name: &str, collections: &[&str], events: usize) -> Box<dyn Reader> {
        let mut r = TableReader::new(name, collections.iter().copied());
        for n in 0..events {
            let row = collections
                .iter()
                .map(|c| Some(TableCell::new(Bytes::from(format!("{c}{n}")), 1)))
                .collect();
            r.push_event(TableRow(row));
        }
        Box::new(r)
    }

    fn table_output(path: &Path) -> Vec<Box<dyn Writer>> {
        vec![Box::new(TableWriter::to_file("out", path))]
    }

    fn run_to_table(config: RunConfig, path: &Path) -> RunSummary {
        let sources = vec![source("a", &["X", "Y"], 6), source("b", &["Z"], 4)];
        Pipeline::new(config, sources, table_output(path))
            .unwrap()
            .run()
            .unwrap()
    }

    #[test]
    fn process_event_counts_and_puts() {
        let mut store = EventStore::new(Default::default());
        store.register_source(source("a", &["X", "Y"], 1)).unwrap();
        let known = store.collection_names();
        let mut event = store.next_event(|_| Event::lazy(), None).unwrap().unwrap();

        let found = process_event(&mut event, &known, &["Made".to_string()]).unwrap();
        assert_eq!(found, 2);
        assert_eq!(event.parameters().get::<i32>("collections_missing"), Some(&1));
        let made = event.get("Made").unwrap().unwrap();
        assert!(made.is_valid());
        assert_eq!(made.data().unwrap().as_ref(), b"Made:2");
    }

    #[test]
    fn sequential_run_stops_at_shortest_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let summary = run_to_table(RunConfig::default(), &path);
        assert_eq!(summary.events, 4);
        assert_eq!(summary.collections_found, 12);
        assert_eq!(summary.sources, 2);

        let doc = TableDocument::load(&path).unwrap();
        assert_eq!(doc.rows.len(), 4);
        assert_eq!(doc.collections, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn runtime_and_selected_collections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let config = RunConfig {
            new_collections: vec!["Made".into()],
            write_collections: vec!["Made".into(), "Z".into(), "Ghost".into()],
            max_events: Some(2),
            ..Default::default()
        };
        let summary = run_to_table(config, &path);
        assert_eq!(summary.events, 2);

        let doc = TableDocument::load(&path).unwrap();
        assert_eq!(doc.rows.len(), 2);
        assert!(!doc.collections.contains(&"Ghost".to_string()));
        let made = doc.collections.iter().position(|c| c == "Made").unwrap();
        let x = doc.collections.iter().position(|c| c == "X").unwrap();
        assert!(doc.rows[0].0[made].is_some());
        assert!(doc.rows[0].0[x].is_none(), "X was not selected for writing");
        assert_eq!(doc.metadata["Made"], "created at runtime");
    }

    #[test]
    fn reuse_gives_same_result() {
        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("plain.json");
        let reused = dir.path().join("reused.json");
        run_to_table(RunConfig::default(), &plain);
        let mut config = RunConfig::default();
        config.store.reuse_events = true;
        config.store.event_kind = EventKind::Lazy;
        run_to_table(config, &reused);

        assert_eq!(
            TableDocument::load(&plain).unwrap().rows,
            TableDocument::load(&reused).unwrap().rows
        );
    }

    #[test]
    fn parallel_run_processes_every_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let config = RunConfig {
            threads: 3,
            new_collections: vec!["Made".into()],
            ..Default::default()
        };
        let summary = run_to_table(config, &path);
        assert_eq!(summary.events, 4);
        assert_eq!(summary.threads, 3);
        assert_eq!(summary.collections_found, 12);

        let doc = TableDocument::load(&path).unwrap();
        assert_eq!(doc.rows.len(), 4);
        // Output order is not fixed, so compare as sets.
        let z = doc.collections.iter().position(|c| c == "Z").unwrap();
        let mut zs: Vec<Vec<u8>> = doc
            .rows
            .iter()
            .map(|r| r.0[z].as_ref().unwrap().data.to_vec())
            .collect();
        zs.sort();
        assert_eq!(zs, vec![b"Z0".to_vec(), b"Z1".to_vec(), b"Z2".to_vec(), b"Z3".to_vec()]);
    }

    #[test]
    fn parallel_run_honours_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let config = RunConfig {
            threads: 2,
            max_events: Some(3),
            ..Default::default()
        };
        let summary = run_to_table(config, &path);
        assert_eq!(summary.events, 3);
        assert_eq!(TableDocument::load(&path).unwrap().rows.len(), 3);
    }

    #[test]
    fn colliding_sources_rejected_by_policy() {
        let mut config = RunConfig::default();
        config.store.collision_policy = evmux_core::CollisionPolicy::Reject;
        let sources = vec![source("a", &["X"], 1), source("b", &["X"], 1)];
        let err = Pipeline::new(config, sources, Vec::new()).err().unwrap();
        assert!(err.to_string().contains("registering source b"));
    }
}
