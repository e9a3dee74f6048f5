//! Unified error types for the template management service.
//!
//! Each capability (metadata store, access controller, flow engine) defines
//! its own error enum next to its trait; this module folds them into a single
//! `AppError` for callers of the service API.

use thiserror::Error;

use crate::flow::FlowEngineError;
use crate::metadata::MetadataError;
use crate::security::AccessError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Permission denial raised by the access controller. Propagates
    /// uncaught and aborts the enclosing metadata transaction.
    #[error("Access denied: {0}")]
    Access(#[from] AccessError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    /// Remote flow-engine failure. No retries are attempted; the enclosing
    /// metadata transaction is dropped without commit.
    #[error("Flow engine error: {0}")]
    FlowEngine(#[from] FlowEngineError),
}

pub type Result<T> = std::result::Result<T, AppError>;
