use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use evmux_types::{CollectionBuffers, LocalIndex, SourceId};
use tracing::{debug, Span};

use crate::error::{CoreError, CoreResult};
use crate::id_table::IdTable;

/// Opaque per-event raw data of one source.
pub type RawHandle = Box<dyn Any + Send + Sync>;

/// Turns a local index of a raw handle into collection buffers.
///
/// One value is shared by every event drawn from the same source, possibly
/// on several threads at once, so implementations must be reentrant.
pub type DecodeFn =
    Arc<dyn Fn(&(dyn Any + Send + Sync), LocalIndex) -> CoreResult<CollectionBuffers> + Send + Sync>;

/// Wrap a decode function over a concrete raw handle type.
///
/// The returned [`DecodeFn`] fails with [`CoreError::RawHandleMismatch`] when
/// handed a handle of any other type.
pub fn typed_decoder<T, F>(decode: F) -> DecodeFn
where
    T: Any + Send + Sync,
    F: Fn(&T, LocalIndex) -> CoreResult<CollectionBuffers> + Send + Sync + 'static,
{
    Arc::new(move |raw: &(dyn Any + Send + Sync), index| {
        let typed = raw
            .downcast_ref::<T>()
            .ok_or(CoreError::RawHandleMismatch {
                expected: std::any::type_name::<T>(),
            })?;
        decode(typed, index)
    })
}

struct SourceData {
    source: SourceId,
    handle: RawHandle,
    decode: DecodeFn,
}

/// Raw data of one event, aggregated over every registered source.
///
/// Holds a shared snapshot of the store's identity table, plus one raw handle
/// and decode function per source. Nothing is decoded until asked for.
pub struct EventRawData {
    id_table: Arc<IdTable>,
    sources: Vec<SourceData>,
    span: Span,
}

impl EventRawData {
    pub fn new(id_table: Arc<IdTable>, span: Span) -> Self {
        Self {
            id_table,
            sources: Vec::new(),
            span,
        }
    }

    /// Attach the raw handle and decoder of `source` for this event.
    pub fn push_source(&mut self, source: SourceId, handle: RawHandle, decode: DecodeFn) {
        self.sources.push(SourceData {
            source,
            handle,
            decode,
        });
    }

    fn source_data(&self, source: SourceId) -> Option<&SourceData> {
        self.sources.iter().find(|s| s.source == source)
    }

    /// Decode the collection called `name`.
    ///
    /// Sub-tables are searched in registration order and the first one with
    /// raw data for this event serves the name. Returns `Ok(None)` when no
    /// source provides it.
    pub fn resolve(&self, name: &str) -> CoreResult<Option<CollectionBuffers>> {
        for (source, table) in self.id_table.sources() {
            let Some(index) = table.get(name) else {
                continue;
            };
            let Some(data) = self.source_data(source) else {
                continue;
            };
            debug!(parent: &self.span, collection = name, %source, %index, "decoding collection");
            return (data.decode)(data.handle.as_ref(), *index).map(Some);
        }
        debug!(parent: &self.span, collection = name, "no source provides collection");
        Ok(None)
    }

    /// Decode every collection this event's sources provide.
    ///
    /// Names shadowed by an earlier source are skipped. Each name carries its
    /// own result, so one failing decode does not affect the others.
    pub fn resolve_all(&self) -> Vec<(String, CoreResult<CollectionBuffers>)> {
        let mut seen = HashSet::new();
        let mut decoded = Vec::new();
        for (source, table) in self.id_table.sources() {
            let Some(data) = self.source_data(source) else {
                continue;
            };
            for (name, index) in table {
                if !seen.insert(name.as_str()) {
                    continue;
                }
                decoded.push((name.clone(), (data.decode)(data.handle.as_ref(), *index)));
            }
        }
        debug!(parent: &self.span, count = decoded.len(), "decoded all collections");
        decoded
    }

    /// Every name in the identity table, without decoding anything.
    pub fn known_names(&self) -> Vec<String> {
        self.id_table.names()
    }

    pub fn id_table(&self) -> &Arc<IdTable> {
        &self.id_table
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl fmt::Debug for EventRawData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRawData")
            .field("source_count", &self.sources.len())
            .field("known_names", &self.id_table.len())
            .finish()
    }
}
