//! Typed records for the flow-engine object graph.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortKind {
    Input,
    Output,
}

/// A port on a process group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub kind: PortKind,
}

/// What a connection endpoint points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectableKind {
    InputPort,
    OutputPort,
    Processor,
}

/// One endpoint of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connectable {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub kind: ConnectableKind,
}

impl Connectable {
    /// Endpoint referring to a port.
    pub fn from_port(port: &Port) -> Self {
        Self {
            id: port.id.clone(),
            group_id: port.group_id.clone(),
            name: port.name.clone(),
            kind: match port.kind {
                PortKind::Input => ConnectableKind::InputPort,
                PortKind::Output => ConnectableKind::OutputPort,
            },
        }
    }
}

/// A directed connection between two connectables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: String,
    pub source: Connectable,
    pub destination: Connectable,
}

/// A processor as read from the flow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorDto {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub processor_type: String,
}

/// The flow content of a process group or template snippet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSnippet {
    #[serde(default)]
    pub processors: Vec<ProcessorDto>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub input_ports: Vec<Port>,
    #[serde(default)]
    pub output_ports: Vec<Port>,
}

impl FlowSnippet {
    /// Processors with no incoming connection, i.e. the entry points.
    pub fn input_processors(&self) -> Vec<&ProcessorDto> {
        self.processors
            .iter()
            .filter(|p| !self.connections.iter().any(|c| c.destination.id == p.id))
            .collect()
    }

    /// Name-indexed view of the output ports, built once to avoid repeated
    /// linear scans.
    pub fn output_ports_by_name(&self) -> HashMap<&str, &Port> {
        self.output_ports
            .iter()
            .map(|p| (p.name.as_str(), p))
            .collect()
    }
}

/// A process group. `contents` is populated only by the recursive fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessGroup {
    pub id: String,
    pub parent_group_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contents: Option<FlowSnippet>,
}

/// A flow-engine template: a named, reusable flow blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowTemplate {
    pub id: String,
    pub name: String,
    pub snippet: FlowSnippet,
}

/// A processor node in a fully resolved flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphProcessor {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub processor_type: String,
    /// Id of this node within the resolved graph
    pub flow_id: String,
    /// True when the processor has no outgoing connections
    pub is_leaf: bool,
}

/// A resolved flow graph, keyed by processor id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowGraph {
    pub processors: HashMap<String, GraphProcessor>,
}

/// All connections whose source is the given id.
pub fn connections_matching_source_id<'a>(
    connections: &'a [Connection],
    source_id: &str,
) -> Vec<&'a Connection> {
    connections
        .iter()
        .filter(|c| c.source.id == source_id)
        .collect()
}
