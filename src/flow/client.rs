//! Client surface consumed from the flow engine.

use async_trait::async_trait;
use thiserror::Error;

use super::model::{FlowGraph, FlowTemplate, Port, ProcessGroup, ProcessorDto};

/// Flow-engine error type.
///
/// Failures are not retried; they propagate to the caller and abort any
/// enclosing metadata transaction.
#[derive(Debug, Error)]
pub enum FlowEngineError {
    #[error("flow template not found: {0}")]
    TemplateNotFound(String),

    /// Transport-level failure talking to the engine
    #[error("flow engine request failed: {0}")]
    Transport(String),
}

/// Remote flow-engine API, as consumed by this service.
///
/// All calls are blocking network calls from the engine's point of view;
/// cancellation and timeouts are whatever the implementation provides.
#[async_trait]
pub trait FlowEngineClient: Send + Sync {
    /// Look up a process group by name under the given parent group.
    /// The returned group carries no contents.
    async fn process_group_by_name(
        &self,
        parent_group_id: &str,
        name: &str,
    ) -> Result<Option<ProcessGroup>, FlowEngineError>;

    /// Fetch a process group by id, including its contents when
    /// `recursive` is set.
    async fn process_group(
        &self,
        group_id: &str,
        recursive: bool,
    ) -> Result<Option<ProcessGroup>, FlowEngineError>;

    /// Input ports declared on a process group.
    async fn input_ports(&self, group_id: &str) -> Result<Vec<Port>, FlowEngineError>;

    /// Processors belonging to the flow of a process group.
    async fn processors_for_flow(
        &self,
        group_id: &str,
    ) -> Result<Vec<ProcessorDto>, FlowEngineError>;

    /// Fetch a template by id.
    async fn template_by_id(
        &self,
        template_id: &str,
    ) -> Result<Option<FlowTemplate>, FlowEngineError>;

    /// Resolve a template id from its name.
    async fn template_id_for_name(&self, name: &str)
        -> Result<Option<String>, FlowEngineError>;

    /// Resolve the complete processor graph for a template, including
    /// leaf classification. The template passed in may carry synthesized
    /// connections beyond what the engine has stored.
    async fn resolve_flow_graph(
        &self,
        template: &FlowTemplate,
    ) -> Result<FlowGraph, FlowEngineError>;
}
