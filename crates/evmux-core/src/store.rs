use std::collections::BTreeMap;
use std::sync::Arc;

use evmux_types::{LocalIndex, SourceId};
use tracing::{debug, debug_span, info, warn, Span};

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::id_table::IdTable;
use crate::raw::{DecodeFn, EventRawData};
use crate::traits::Reader;

struct RegisteredReader {
    source: SourceId,
    reader: Box<dyn Reader>,
    decode: DecodeFn,
}

/// Owns the registered sources and produces one event per call to
/// [`next_event`](Self::next_event).
///
/// Registration is only allowed before the first event is requested. From
/// then on the identity table is frozen and shared read-only by every event.
pub struct EventStore {
    readers: Vec<RegisteredReader>,
    id_table: Arc<IdTable>,
    config: StoreConfig,
    started: bool,
    exhausted: bool,
    events_read: u64,
    span: Span,
}

impl EventStore {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_span(config, debug_span!("event_store"))
    }

    /// A store logging under `span`.
    pub fn with_span(config: StoreConfig, span: Span) -> Self {
        Self {
            readers: Vec::new(),
            id_table: Arc::new(IdTable::new()),
            config,
            started: false,
            exhausted: false,
            events_read: 0,
            span,
        }
    }

    /// Register a source and merge its identity table.
    ///
    /// The reader's `id_table` and `decode_fn` are each called exactly once.
    pub fn register_source(&mut self, reader: Box<dyn Reader>) -> CoreResult<SourceId> {
        if self.started {
            return Err(CoreError::RegistrationClosed);
        }
        let source = SourceId::from_position(self.readers.len())?;
        let collisions = Arc::make_mut(&mut self.id_table).insert_source(
            source,
            reader.id_table(),
            self.config.collision_policy,
        )?;
        for c in collisions {
            warn!(
                parent: &self.span,
                collection = %c.name,
                existing = %c.existing,
                incoming = %c.incoming,
                "collection provided by several sources, first registered wins"
            );
        }
        let decode = reader.decode_fn();
        info!(
            parent: &self.span,
            reader = reader.name(),
            %source,
            collections = self.id_table.source(source).map_or(0, BTreeMap::len),
            "registered source"
        );
        self.readers.push(RegisteredReader {
            source,
            reader,
            decode,
        });
        Ok(source)
    }

    /// Declare collections that events will create at runtime.
    ///
    /// They are recorded under [`SourceId::RUNTIME`] so sinks see them in the
    /// identity table, but no source ever decodes them.
    pub fn register_runtime_collections(&mut self, names: &[String]) -> CoreResult<()> {
        if self.started {
            return Err(CoreError::RegistrationClosed);
        }
        let existing = self.id_table.source(SourceId::RUNTIME);
        let offset = existing.map_or(0, BTreeMap::len);
        let mut entries = BTreeMap::new();
        for name in names {
            if existing.is_some_and(|t| t.contains_key(name)) || entries.contains_key(name) {
                continue;
            }
            let index = LocalIndex::from_position(offset + entries.len())?;
            entries.insert(name.clone(), index);
        }
        if entries.is_empty() {
            return Ok(());
        }

        let added = entries.len();
        let collisions = Arc::make_mut(&mut self.id_table).insert_source(
            SourceId::RUNTIME,
            entries,
            self.config.collision_policy,
        )?;
        for c in collisions {
            warn!(
                parent: &self.span,
                collection = %c.name,
                existing = %c.existing,
                "runtime collection name is already provided by a source"
            );
        }
        debug!(parent: &self.span, added, "registered runtime collections");
        Ok(())
    }

    /// Pull the next event from every source.
    ///
    /// `factory` turns the optional reusable `slot` into the event to fill.
    /// Returns `Ok(None)` once any source is exhausted.
    pub fn next_event<F>(&mut self, factory: F, slot: Option<Event>) -> CoreResult<Option<Event>>
    where
        F: FnOnce(Option<Event>) -> Event,
    {
        if self.readers.is_empty() {
            return Err(CoreError::NoSources);
        }
        if self.exhausted {
            return Ok(None);
        }
        if !self.started {
            self.started = true;
            debug!(parent: &self.span, sources = self.readers.len(), "event processing started");
        }

        let span = debug_span!(parent: &self.span, "event", number = self.events_read);
        let mut raw = EventRawData::new(Arc::clone(&self.id_table), span);
        let store_span = self.span.clone();
        let events_read = self.events_read;
        let mut dry = None;
        for r in &mut self.readers {
            match r.reader.next_event()? {
                Some(handle) => raw.push_source(r.source, handle, Arc::clone(&r.decode)),
                None => {
                    dry = Some(r.reader.name().to_string());
                    break;
                }
            }
        }
        if let Some(reader) = dry {
            info!(parent: &store_span, reader = %reader, events = events_read, "source exhausted");
            self.exhausted = true;
            return Ok(None);
        }
        self.events_read += 1;

        let mut event = factory(slot);
        event.set_raw_data(raw);
        Ok(Some(event))
    }

    /// Every collection name known across all sources, sorted.
    pub fn collection_names(&self) -> Vec<String> {
        self.id_table.names()
    }

    pub fn id_table(&self) -> &Arc<IdTable> {
        &self.id_table
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn source_count(&self) -> usize {
        self.readers.len()
    }

    pub fn events_read(&self) -> u64 {
        self.events_read
    }

    pub fn is_started(&self) -> bool {
        self.started
    }
}
