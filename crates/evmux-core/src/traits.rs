use std::collections::BTreeMap;
use std::path::Path;

use evmux_types::LocalIndex;

use crate::error::{CoreError, CoreResult};
use crate::event::Event;
use crate::id_table::IdTable;
use crate::raw::{DecodeFn, RawHandle};

/// An input format that yields events.
///
/// Implementations must satisfy:
/// - [`id_table`](Self::id_table) is stable for the lifetime of the reader.
///   The store calls it exactly once, at registration.
/// - The [`DecodeFn`] returned by [`decode_fn`](Self::decode_fn) is reentrant.
///   It is shared by every event drawn from this reader and may run on
///   several threads at once.
/// - All blocking I/O happens inside the reader; the store treats every call
///   as opaque.
pub trait Reader: Send {
    /// Open the input at `path`.
    fn open_file(&mut self, path: &Path) -> CoreResult<()>;

    /// Raw handle of the next event, or `Ok(None)` once the input is exhausted.
    fn next_event(&mut self) -> CoreResult<Option<RawHandle>>;

    /// Decoder for the handles produced by [`next_event`](Self::next_event).
    fn decode_fn(&self) -> DecodeFn;

    /// Name to local-index table of the collections this reader provides.
    fn id_table(&self) -> BTreeMap<String, LocalIndex>;

    /// Human-readable reader name for logging.
    fn name(&self) -> &str;
}

/// An output format that persists events.
///
/// Two shapes are supported. A registration-shaped writer accepts
/// [`register_for_write`](Self::register_for_write) once per collection and
/// writes only the registered names, treating the `names` passed to
/// [`write_event`](Self::write_event) as a further filter (empty means all
/// registered). A per-call writer keeps the default registration impl and
/// writes exactly the `names` it is given (empty means all).
pub trait Writer: Send {
    /// Declare a collection to be written with every event.
    fn register_for_write(&mut self, name: &str) -> CoreResult<()> {
        let _ = name;
        Err(CoreError::RegistrationUnsupported(self.name().to_string()))
    }

    fn write_event(&mut self, event: &mut Event, names: &[String]) -> CoreResult<()>;

    /// Persist the identity table. Called once per run.
    fn write_id_table(&mut self, table: &IdTable) -> CoreResult<()>;

    /// Persist per-collection metadata. Called once per run.
    fn write_collection_metadata(&mut self, metadata: &BTreeMap<String, String>) -> CoreResult<()>;

    /// Flush and close the output.
    fn finish(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}
