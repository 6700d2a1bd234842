//! Foundation types for evmux.
//!
//! Every other evmux crate depends on `evmux-types`. The types here carry no
//! I/O and no logging; they describe what flows between a source's decoder,
//! the per-event collection cache, and a sink.
//!
//! # Key Types
//!
//! - [`CollectionBuffers`] -- format-agnostic raw payload of one collection
//! - [`Collection`] -- structured collection built from buffers, with validity
//!   and reference-resolution state
//! - [`SourceId`] / [`LocalIndex`] -- where a collection comes from
//! - [`Parameters`] -- per-event key/value metadata

pub mod buffers;
pub mod collection;
pub mod error;
pub mod identity;
pub mod parameters;

pub use buffers::{CollectionBuffers, VectorMember};
pub use collection::{Collection, DEFAULT_SCHEMA_VERSION};
pub use error::TypeError;
pub use identity::{LocalIndex, SourceId};
pub use parameters::{ParameterType, Parameters};
