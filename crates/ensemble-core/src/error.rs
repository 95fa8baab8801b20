//! Error types for ensemble-core.

use thiserror::Error;

/// Error type for ensemble-core operations.
///
/// Graph-edit failures travel as status codes inside responses; this type
/// only covers host-level problems.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn worker thread {index}: {source}")]
    ThreadSpawn {
        index: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Requested {requested} frames but block length is {block_length}")]
    BlockLength { requested: u32, block_length: u32 },

    #[error("Port index {0} out of range")]
    PortIndex(usize),

    #[error("Process handle is owned by an external driver")]
    DriverAttached,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
