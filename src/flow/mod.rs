//! Flow-engine object model and client abstraction.
//!
//! The flow engine is an external system; this module only models the
//! graph-shaped objects read from it (process groups, ports, processors,
//! connections, templates) and the client surface the service consumes.
//! Entities are cross-referenced by name and id, never mutated in place.

mod cache;
mod client;
mod memory;
mod model;

pub use cache::{CachedTemplateFlow, FlowCache, InMemoryFlowCache};
pub use client::{FlowEngineClient, FlowEngineError};
pub use memory::InMemoryFlowEngine;
pub use model::{
    connections_matching_source_id, Connectable, ConnectableKind, Connection, FlowGraph,
    FlowSnippet, FlowTemplate, GraphProcessor, Port, PortKind, ProcessGroup, ProcessorDto,
};
