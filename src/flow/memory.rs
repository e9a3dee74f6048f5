//! In-memory flow engine.
//!
//! Hashmap-backed implementation of [`FlowEngineClient`] used by unit and
//! integration tests; fixtures are registered through the `add_*` methods.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::client::{FlowEngineClient, FlowEngineError};
use super::model::{
    FlowGraph, FlowSnippet, FlowTemplate, GraphProcessor, Port, PortKind, ProcessGroup,
    ProcessorDto,
};

#[derive(Debug, Default)]
struct EngineState {
    groups: HashMap<String, ProcessGroup>,
    templates: HashMap<String, FlowTemplate>,
}

/// In-memory flow engine.
pub struct InMemoryFlowEngine {
    state: RwLock<EngineState>,
}

impl InMemoryFlowEngine {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(EngineState::default()),
        }
    }

    /// Register a process group fixture, contents included.
    pub fn add_process_group(&self, group: ProcessGroup) {
        self.state
            .write()
            .unwrap()
            .groups
            .insert(group.id.clone(), group);
    }

    /// Register a template fixture.
    pub fn add_template(&self, template: FlowTemplate) {
        self.state
            .write()
            .unwrap()
            .templates
            .insert(template.id.clone(), template);
    }
}

impl Default for InMemoryFlowEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FlowEngineClient for InMemoryFlowEngine {
    async fn process_group_by_name(
        &self,
        parent_group_id: &str,
        name: &str,
    ) -> Result<Option<ProcessGroup>, FlowEngineError> {
        let state = self.state.read().unwrap();
        Ok(state
            .groups
            .values()
            .find(|g| g.parent_group_id == parent_group_id && g.name == name)
            .map(|g| ProcessGroup {
                contents: None,
                ..g.clone()
            }))
    }

    async fn process_group(
        &self,
        group_id: &str,
        recursive: bool,
    ) -> Result<Option<ProcessGroup>, FlowEngineError> {
        let state = self.state.read().unwrap();
        Ok(state.groups.get(group_id).map(|g| {
            if recursive {
                g.clone()
            } else {
                ProcessGroup {
                    contents: None,
                    ..g.clone()
                }
            }
        }))
    }

    async fn input_ports(&self, group_id: &str) -> Result<Vec<Port>, FlowEngineError> {
        let state = self.state.read().unwrap();
        Ok(state
            .groups
            .get(group_id)
            .and_then(|g| g.contents.as_ref())
            .map(|c| {
                c.input_ports
                    .iter()
                    .filter(|p| p.kind == PortKind::Input)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn processors_for_flow(
        &self,
        group_id: &str,
    ) -> Result<Vec<ProcessorDto>, FlowEngineError> {
        let state = self.state.read().unwrap();
        Ok(state
            .groups
            .get(group_id)
            .and_then(|g| g.contents.as_ref())
            .map(|c| c.processors.clone())
            .unwrap_or_default())
    }

    async fn template_by_id(
        &self,
        template_id: &str,
    ) -> Result<Option<FlowTemplate>, FlowEngineError> {
        let state = self.state.read().unwrap();
        Ok(state.templates.get(template_id).cloned())
    }

    async fn template_id_for_name(
        &self,
        name: &str,
    ) -> Result<Option<String>, FlowEngineError> {
        let state = self.state.read().unwrap();
        Ok(state
            .templates
            .values()
            .find(|t| t.name == name)
            .map(|t| t.id.clone()))
    }

    async fn resolve_flow_graph(
        &self,
        template: &FlowTemplate,
    ) -> Result<FlowGraph, FlowEngineError> {
        Ok(resolve_graph(&template.id, &template.snippet))
    }
}

/// Build the processor graph for a snippet. A processor is a leaf when no
/// connection leaves it.
fn resolve_graph(template_id: &str, snippet: &FlowSnippet) -> FlowGraph {
    let mut graph = FlowGraph::default();
    for processor in &snippet.processors {
        let is_leaf = !snippet
            .connections
            .iter()
            .any(|c| c.source.id == processor.id);
        graph.processors.insert(
            processor.id.clone(),
            GraphProcessor {
                id: processor.id.clone(),
                group_id: processor.group_id.clone(),
                name: processor.name.clone(),
                processor_type: processor.processor_type.clone(),
                flow_id: format!("{}::{}", template_id, processor.id),
                is_leaf,
            },
        );
    }
    graph
}
