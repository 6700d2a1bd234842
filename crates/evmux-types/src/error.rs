use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("local index {0} does not fit into 32 bits")]
    IndexOverflow(usize),

    #[error("source position {0} does not fit into a source id")]
    SourceOverflow(usize),
}
