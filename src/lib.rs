// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;

// Domain layer (business logic)
pub mod domain;
pub mod events;
pub mod flow;
pub mod metadata;
pub mod security;

// Application layer
pub mod service;

pub use error::{AppError, Result};
pub use service::TemplateService;
