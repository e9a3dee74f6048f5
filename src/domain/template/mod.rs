//! Registered-template domain model.

pub mod transform;
mod types;

pub use types::{
    FlowProcessor, Processor, RegisteredTemplate, ReusableTemplateConnectionInfo, TemplateState,
    NEW_TEMPLATE_PLACEHOLDER,
};
