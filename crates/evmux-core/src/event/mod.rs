//! Per-event façade over decoded collections.
//!
//! An [`Event`] is either [`EagerEvent`] or [`LazyEvent`]. Both expose the same
//! name-keyed access; they differ only in when collections get decoded.

mod eager;
mod lazy;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use evmux_types::{Collection, CollectionBuffers, Parameters};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn, Span};

use crate::error::{CoreError, CoreResult};
use crate::policy::PutPolicy;
use crate::raw::EventRawData;

pub use eager::EagerEvent;
pub use lazy::LazyEvent;

/// Materialization strategy of an event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Eager,
    Lazy,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Eager => f.write_str("eager"),
            EventKind::Lazy => f.write_str("lazy"),
        }
    }
}

impl std::str::FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "eager" => Ok(EventKind::Eager),
            "lazy" => Ok(EventKind::Lazy),
            other => Err(CoreError::Config(format!("unknown event kind {other:?}"))),
        }
    }
}

/// State shared by both event variants.
#[derive(Debug)]
pub(crate) struct CollectionCache {
    collections: HashMap<String, Collection>,
    /// Names whose cached collection was decoded from raw data.
    sourced: HashSet<String>,
    put_policy: PutPolicy,
    parameters: Parameters,
    span: Span,
}

impl Default for CollectionCache {
    fn default() -> Self {
        Self::with_policy(PutPolicy::default())
    }
}

impl CollectionCache {
    fn with_policy(put_policy: PutPolicy) -> Self {
        Self {
            collections: HashMap::new(),
            sourced: HashSet::new(),
            put_policy,
            parameters: Parameters::new(),
            span: Span::none(),
        }
    }

    /// Turn a decode result into a collection. A failed decode yields an
    /// invalid collection so the name still resolves.
    fn decoded(&self, name: &str, result: CoreResult<CollectionBuffers>) -> Collection {
        match result {
            Ok(buffers) => Collection::from_buffers(buffers),
            Err(err) => {
                warn!(parent: &self.span, collection = name, error = %err, "failed to decode collection");
                Collection::from_buffers(CollectionBuffers::new())
            }
        }
    }

    /// Cache a collection decoded from raw data. A collection already cached
    /// under `name` is kept.
    fn insert_decoded(&mut self, name: String, collection: Collection) {
        if let Entry::Vacant(slot) = self.collections.entry(name) {
            self.sourced.insert(slot.key().clone());
            slot.insert(collection);
        }
    }

    fn put(&mut self, collection: Collection, name: String) -> CoreResult<&Collection> {
        let span = self.span.clone();
        match self.collections.entry(name) {
            Entry::Vacant(slot) => Ok(slot.insert(collection)),
            Entry::Occupied(mut slot) => match self.put_policy {
                PutPolicy::Replace => {
                    debug!(parent: &span, collection = %slot.key(), "replacing collection");
                    self.sourced.remove(slot.key());
                    slot.insert(collection);
                    Ok(slot.into_mut())
                }
                PutPolicy::KeepOriginal => {
                    debug!(parent: &span, collection = %slot.key(), "keeping existing collection");
                    Ok(slot.into_mut())
                }
                PutPolicy::Reject => Err(CoreError::CollectionExists(slot.key().clone())),
            },
        }
    }

    /// Buffers of a cached collection, ready to write.
    ///
    /// A collection read from a source is written only if it is valid, so a
    /// failed read never turns into default-filled data.
    fn buffers_for_write(&mut self, name: &str) -> Option<CollectionBuffers> {
        let valid = self.collections.get(name)?.is_valid();
        if !valid && self.sourced.contains(name) {
            debug!(parent: &self.span, collection = name, "skipping invalid collection");
            return None;
        }
        let collection = self.collections.get_mut(name)?;
        Some(collection.prepare_for_write().clone())
    }

    /// Forget everything decoded from the previous raw data, keeping
    /// collections put at runtime.
    fn drop_sourced(&mut self) {
        for name in self.sourced.drain() {
            self.collections.remove(&name);
        }
    }

    fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.keys().cloned().collect();
        names.sort();
        names
    }

    fn clear(&mut self) {
        self.collections.clear();
        self.sourced.clear();
        self.parameters.clear();
        self.span = Span::none();
    }
}

/// The per-event view handed to consumers.
#[derive(Debug)]
pub enum Event {
    Eager(EagerEvent),
    Lazy(LazyEvent),
}

impl Default for Event {
    fn default() -> Self {
        Self::new(EventKind::default())
    }
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        let cache = CollectionCache::with_policy(PutPolicy::default());
        match kind {
            EventKind::Eager => Event::Eager(EagerEvent::with_cache(cache)),
            EventKind::Lazy => Event::Lazy(LazyEvent::with_cache(cache)),
        }
    }

    pub fn eager() -> Self {
        Self::new(EventKind::Eager)
    }

    pub fn lazy() -> Self {
        Self::new(EventKind::Lazy)
    }

    pub fn with_put_policy(mut self, policy: PutPolicy) -> Self {
        self.cache_mut().put_policy = policy;
        self
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Eager(_) => EventKind::Eager,
            Event::Lazy(_) => EventKind::Lazy,
        }
    }

    fn cache(&self) -> &CollectionCache {
        match self {
            Event::Eager(e) => &e.cache,
            Event::Lazy(e) => &e.cache,
        }
    }

    fn cache_mut(&mut self) -> &mut CollectionCache {
        match self {
            Event::Eager(e) => &mut e.cache,
            Event::Lazy(e) => &mut e.cache,
        }
    }

    /// Hand this event the raw data of its sources. Collections decoded from
    /// earlier raw data are dropped; collections put at runtime are kept.
    pub fn set_raw_data(&mut self, raw: EventRawData) {
        match self {
            Event::Eager(e) => e.set_raw_data(raw),
            Event::Lazy(e) => e.set_raw_data(raw),
        }
    }

    /// Whether raw data has been received since creation or the last reuse.
    pub fn has_raw_data(&self) -> bool {
        match self {
            Event::Eager(e) => e.has_raw_data(),
            Event::Lazy(e) => e.has_raw_data(),
        }
    }

    /// Look up a collection by name.
    ///
    /// Returns `Ok(None)` when no source provides the name. An eager event
    /// fails with [`CoreError::NoRawData`] if it has to materialize without
    /// ever having received raw data; a lazy one just returns `Ok(None)`.
    pub fn get(&mut self, name: &str) -> CoreResult<Option<&Collection>> {
        match self {
            Event::Eager(e) => e.get(name),
            Event::Lazy(e) => e.get(name),
        }
    }

    /// Add a runtime-created collection under `name`, subject to the
    /// event's [`PutPolicy`]. Returns the collection now stored under `name`.
    pub fn put(&mut self, collection: Collection, name: impl Into<String>) -> CoreResult<&Collection> {
        self.cache_mut().put(collection, name.into())
    }

    /// Whether `name` is cached, without decoding anything.
    pub fn contains(&self, name: &str) -> bool {
        self.cache().collections.contains_key(name)
    }

    /// Names currently cached, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        self.cache().sorted_names()
    }

    /// Buffers ready to be written, paired with their names.
    ///
    /// An empty `names` slice selects every collection the event can provide.
    /// Names the event cannot provide are skipped, and so are collections
    /// whose read failed or produced invalid buffers.
    pub fn collections_for_write(
        &mut self,
        names: &[String],
    ) -> CoreResult<Vec<(String, CollectionBuffers)>> {
        match self {
            Event::Eager(e) => e.collections_for_write(names),
            Event::Lazy(e) => e.collections_for_write(names),
        }
    }

    /// Reset for the next store cycle: the cache, raw data and parameters are
    /// dropped, the variant and put policy are kept.
    pub fn reuse(mut self) -> Self {
        match &mut self {
            Event::Eager(e) => e.reset(),
            Event::Lazy(e) => e.reset(),
        }
        self
    }

    pub fn parameters(&self) -> &Parameters {
        &self.cache().parameters
    }

    pub fn parameters_mut(&mut self) -> &mut Parameters {
        &mut self.cache_mut().parameters
    }

    /// Tracing span of the store cycle that produced this event.
    pub fn span(&self) -> &Span {
        &self.cache().span
    }
}

/// Build the event factory handed to
/// [`EventStore::next_event`](crate::EventStore::next_event).
///
/// With `reuse` set, an event of the right kind passed back in is reset and
/// returned; otherwise a fresh event is created.
pub fn event_factory(
    kind: EventKind,
    put_policy: PutPolicy,
    reuse: bool,
) -> impl Fn(Option<Event>) -> Event + Copy + Send + Sync {
    move |slot| match slot {
        Some(event) if reuse && event.kind() == kind => event.reuse(),
        _ => Event::new(kind).with_put_policy(put_policy),
    }
}
