use evmux_types::{LocalIndex, SourceId, TypeError};

/// Errors from the event engine.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A source was registered after the first event was requested.
    #[error("cannot register sources or collections after event processing has started")]
    RegistrationClosed,

    /// An event needed to materialize collections but never received raw data.
    #[error("event has no raw data to materialize")]
    NoRawData,

    /// The store was asked for an event without any registered source.
    #[error("event store has no registered sources")]
    NoSources,

    /// Two sources provide the same collection name under the `reject` policy.
    #[error("collection {name:?} is provided by source {existing} and source {incoming}")]
    DuplicateCollection {
        name: String,
        existing: SourceId,
        incoming: SourceId,
    },

    /// A collection was put under an existing name under the `reject` policy.
    #[error("collection {0:?} is already present in the event")]
    CollectionExists(String),

    /// A decode function could not turn a raw handle into buffers.
    #[error("failed to decode local index {index}: {reason}")]
    Decode { index: LocalIndex, reason: String },

    /// A decode function was handed a raw handle of a different source.
    #[error("raw handle is not a {expected}")]
    RawHandleMismatch { expected: &'static str },

    /// Failure inside a reader.
    #[error("source error: {0}")]
    Source(String),

    /// Failure inside a writer.
    #[error("sink error: {0}")]
    Sink(String),

    /// The writer only supports per-call collection selection.
    #[error("writer {0} does not support collection registration")]
    RegistrationUnsupported(String),

    /// Invalid or unreadable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Result alias for engine operations.
pub type CoreResult<T> = Result<T, CoreError>;
