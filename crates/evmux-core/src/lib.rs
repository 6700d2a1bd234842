//! The evmux event engine.
//!
//! Combines collections produced by several independent sources into one
//! per-event view and decodes them on demand.
//!
//! # Flow
//!
//! An [`EventStore`] owns the registered [`Reader`]s and merges their
//! name tables into one [`IdTable`]. Each call to
//! [`EventStore::next_event`] pulls a raw handle from every reader, wraps
//! them in an [`EventRawData`] and hands it to an [`Event`]. Consumers look
//! collections up by name; the event decodes them through the owning
//! reader's [`DecodeFn`]. On output, [`Event::collections_for_write`] turns
//! the event back into buffers for a [`Writer`].
//!
//! # Event Variants
//!
//! - [`EagerEvent`] -- decodes every collection on first access, then drops
//!   the raw data
//! - [`LazyEvent`] -- decodes each collection on its own first access
//!
//! # Design Rules
//!
//! 1. Sources are registered before the first event; the identity table is
//!    read-only afterwards and shared by every event.
//! 2. An unknown collection name is `Ok(None)`, never an error.
//! 3. Decode functions are reentrant; the engine itself takes no locks.
//! 4. A decode failure for one name never affects other names.

pub mod config;
pub mod error;
pub mod event;
pub mod id_table;
pub mod memory;
pub mod policy;
pub mod raw;
pub mod store;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use config::StoreConfig;
pub use error::{CoreError, CoreResult};
pub use event::{event_factory, EagerEvent, Event, EventKind, LazyEvent};
pub use id_table::{Collision, IdTable, SourceEntries};
pub use memory::{TableCell, TableDocument, TableReader, TableRow, TableWriter};
pub use policy::{CollisionPolicy, PutPolicy};
pub use raw::{typed_decoder, DecodeFn, EventRawData, RawHandle};
pub use store::EventStore;
pub use traits::{Reader, Writer};
