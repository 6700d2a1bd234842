use evmux_types::{Collection, CollectionBuffers};
use tracing::debug;

use super::CollectionCache;
use crate::error::{CoreError, CoreResult};
use crate::raw::EventRawData;

/// An event that decodes every collection the first time any of them is
/// needed, then drops its raw data.
#[derive(Debug, Default)]
pub struct EagerEvent {
    pub(super) cache: CollectionCache,
    raw: Option<EventRawData>,
    materialized: bool,
}

impl EagerEvent {
    pub(super) fn with_cache(cache: CollectionCache) -> Self {
        Self {
            cache,
            ..Self::default()
        }
    }

    /// Collections materialized from earlier raw data are dropped so the new
    /// data is decoded in full; runtime ones stay.
    pub(super) fn set_raw_data(&mut self, raw: EventRawData) {
        self.cache.drop_sourced();
        self.cache.span = raw.span().clone();
        self.raw = Some(raw);
        self.materialized = false;
    }

    pub(super) fn has_raw_data(&self) -> bool {
        self.raw.is_some() || self.materialized
    }

    pub fn is_materialized(&self) -> bool {
        self.materialized
    }

    fn materialize(&mut self) -> CoreResult<()> {
        if self.materialized {
            return Ok(());
        }
        let raw = self.raw.take().ok_or(CoreError::NoRawData)?;
        for (name, result) in raw.resolve_all() {
            let collection = self.cache.decoded(&name, result);
            // Collections put before materialization shadow the source ones.
            self.cache.insert_decoded(name, collection);
        }
        self.materialized = true;
        debug!(
            parent: &self.cache.span,
            collections = self.cache.collections.len(),
            "materialized event"
        );
        Ok(())
    }

    pub(super) fn get(&mut self, name: &str) -> CoreResult<Option<&Collection>> {
        self.materialize()?;
        Ok(self.cache.collections.get(name))
    }

    pub(super) fn collections_for_write(
        &mut self,
        names: &[String],
    ) -> CoreResult<Vec<(String, CollectionBuffers)>> {
        if self.raw.is_some() {
            self.materialize()?;
        }
        let names = if names.is_empty() {
            self.cache.sorted_names()
        } else {
            names.to_vec()
        };

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if !self.cache.collections.contains_key(&name) {
                debug!(parent: &self.cache.span, collection = %name, "skipping unknown collection");
                continue;
            }
            if let Some(buffers) = self.cache.buffers_for_write(&name) {
                out.push((name, buffers));
            }
        }
        Ok(out)
    }

    pub(super) fn reset(&mut self) {
        self.cache.clear();
        self.raw = None;
        self.materialized = false;
    }
}
