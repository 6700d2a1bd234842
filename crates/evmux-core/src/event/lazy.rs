use std::collections::BTreeSet;

use evmux_types::{Collection, CollectionBuffers};
use tracing::{debug, warn};

use super::CollectionCache;
use crate::error::CoreResult;
use crate::raw::EventRawData;

/// An event that decodes each collection on its first access and keeps the
/// raw data for as long as it lives.
#[derive(Debug, Default)]
pub struct LazyEvent {
    pub(super) cache: CollectionCache,
    raw: Option<EventRawData>,
}

impl LazyEvent {
    pub(super) fn with_cache(cache: CollectionCache) -> Self {
        Self { cache, raw: None }
    }

    /// Collections decoded from earlier raw data are dropped; runtime ones
    /// stay.
    pub(super) fn set_raw_data(&mut self, raw: EventRawData) {
        self.cache.drop_sourced();
        self.cache.span = raw.span().clone();
        self.raw = Some(raw);
    }

    pub(super) fn has_raw_data(&self) -> bool {
        self.raw.is_some()
    }

    pub(super) fn get(&mut self, name: &str) -> CoreResult<Option<&Collection>> {
        if !self.cache.collections.contains_key(name) {
            let Some(raw) = &self.raw else {
                return Ok(None);
            };
            let result = match raw.resolve(name) {
                Ok(None) => return Ok(None),
                Ok(Some(buffers)) => Ok(buffers),
                Err(err) => Err(err),
            };
            let collection = self.cache.decoded(name, result);
            self.cache.insert_decoded(name.to_string(), collection);
        }
        Ok(self.cache.collections.get(name))
    }

    pub(super) fn collections_for_write(
        &mut self,
        names: &[String],
    ) -> CoreResult<Vec<(String, CollectionBuffers)>> {
        let names = if names.is_empty() {
            let mut all: BTreeSet<String> = self.cache.collections.keys().cloned().collect();
            if let Some(raw) = &self.raw {
                all.extend(raw.known_names());
            }
            all.into_iter().collect()
        } else {
            names.to_vec()
        };

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if self.cache.collections.contains_key(&name) {
                if let Some(buffers) = self.cache.buffers_for_write(&name) {
                    out.push((name, buffers));
                }
                continue;
            }
            // Untouched collections go straight from raw data to the sink.
            let Some(raw) = &self.raw else {
                continue;
            };
            match raw.resolve(&name) {
                Ok(Some(buffers)) if buffers.is_valid() => out.push((name, buffers)),
                Ok(Some(_)) => debug!(parent: &self.cache.span, collection = %name, "skipping invalid collection"),
                Ok(None) => debug!(parent: &self.cache.span, collection = %name, "skipping unknown collection"),
                Err(err) => warn!(parent: &self.cache.span, collection = %name, error = %err, "skipping undecodable collection"),
            }
        }
        Ok(out)
    }

    pub(super) fn reset(&mut self) {
        self.cache.clear();
        self.raw = None;
    }
}
