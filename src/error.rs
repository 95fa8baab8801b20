//! Centralized error type for the ensemble umbrella crate.
//!
//! Wraps the subsystem errors so `?` propagates across crate boundaries.
//! Graph edits never fail through this type: their outcome is the status
//! carried in each response.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] ensemble_core::Error),

    #[error("Block: {0}")]
    Instantiate(#[from] ensemble_engine::InstantiateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
