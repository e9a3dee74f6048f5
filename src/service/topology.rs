//! Topology resolution against the flow engine.
//!
//! Everything in this module reads the live flow-engine graph: the shared
//! reusable-templates group, the processors reachable from its input ports,
//! and the fully resolved processor graph of a flow template with feed
//! connections synthesized in.

use std::collections::{HashMap, HashSet};

use futures::stream::{FuturesUnordered, StreamExt};
use uuid::Uuid;

use crate::domain::template::{
    transform, FlowProcessor, Processor, ReusableTemplateConnectionInfo,
};
use crate::error::Result;
use crate::flow::{
    connections_matching_source_id, Connectable, Connection, FlowEngineError, Port,
};
use crate::security::Principal;

use super::TemplateService;

impl TemplateService {
    /// All processors of a registered template, optionally extended with the
    /// reusable-flow processors its connections reach.
    ///
    /// An unknown template id yields an empty list.
    pub async fn get_registered_template_processors(
        &self,
        principal: &Principal,
        template_id: &str,
        include_reusable: bool,
    ) -> Result<Vec<Processor>> {
        let Some(template) = self.get_registered_template(principal, template_id).await? else {
            return Ok(Vec::new());
        };

        let mut processors = template.all_processors();

        if include_reusable && !template.reusable_template_connections.is_empty() {
            let ports = self.reusable_input_ports().await?;
            let ports_by_name: HashMap<&str, &Port> =
                ports.iter().map(|p| (p.name.as_str(), p)).collect();

            let matching_port_ids: Vec<String> = template
                .reusable_template_connections
                .iter()
                .filter_map(|info| {
                    ports_by_name
                        .get(info.reusable_template_input_port_name.as_str())
                        .map(|port| port.id.clone())
                })
                .collect();

            processors.extend(
                self.reusable_template_processors_for_input_ports(&matching_port_ids)
                    .await?,
            );
        }

        Ok(processors)
    }

    /// Input ports declared on the shared reusable-templates process group.
    /// Empty when the group does not exist yet.
    pub async fn reusable_input_ports(&self) -> Result<Vec<Port>> {
        let group = self
            .flow_engine
            .process_group_by_name(
                &self.flow_settings.root_process_group_id,
                &self.flow_settings.reusable_templates_group_name,
            )
            .await?;

        match group {
            Some(group) => Ok(self.flow_engine.input_ports(&group.id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Processors of the reusable flows fed by the given input ports.
    ///
    /// Follows each port's outgoing connections to the destination process
    /// groups and fetches their processors concurrently; a processor
    /// reachable through several ports appears once.
    pub async fn reusable_template_processors_for_input_ports(
        &self,
        input_port_ids: &[String],
    ) -> Result<Vec<Processor>> {
        if input_port_ids.is_empty() {
            return Ok(Vec::new());
        }

        let Some(group) = self
            .flow_engine
            .process_group_by_name(
                &self.flow_settings.root_process_group_id,
                &self.flow_settings.reusable_templates_group_name,
            )
            .await?
        else {
            return Ok(Vec::new());
        };

        let Some(contents) = self
            .flow_engine
            .process_group(&group.id, true)
            .await?
            .and_then(|g| g.contents)
        else {
            return Ok(Vec::new());
        };

        let ports = self.flow_engine.input_ports(&group.id).await?;

        let mut destination_groups: HashSet<String> = HashSet::new();
        for port in ports.iter().filter(|p| input_port_ids.contains(&p.id)) {
            for connection in connections_matching_source_id(&contents.connections, &port.id) {
                destination_groups.insert(connection.destination.group_id.clone());
            }
        }

        let mut fetches = FuturesUnordered::new();
        for group_id in destination_groups {
            let engine = self.flow_engine.clone();
            fetches.push(async move { engine.processors_for_flow(&group_id).await });
        }

        let mut by_id: HashMap<String, Processor> = HashMap::new();
        while let Some(result) = fetches.next().await {
            for dto in result? {
                by_id
                    .entry(dto.id.clone())
                    .or_insert_with(|| transform::processor_from_dto(&dto, false));
            }
        }

        Ok(by_id.into_values().collect())
    }

    /// Resolve the full processor graph of a flow template, synthesizing a
    /// connection from each declared feed output port to its reusable-flow
    /// input port.
    ///
    /// A connection whose named output or input port cannot be found is
    /// skipped with a warning; the remaining graph is still resolved.
    pub async fn flow_template_processors(
        &self,
        flow_template_id: &str,
        connections: &[ReusableTemplateConnectionInfo],
    ) -> Result<Vec<FlowProcessor>> {
        let mut template = self
            .flow_engine
            .template_by_id(flow_template_id)
            .await?
            .ok_or_else(|| FlowEngineError::TemplateNotFound(flow_template_id.to_string()))?;

        if !connections.is_empty() {
            let reusable_ports = self.reusable_input_ports().await?;
            let input_ports: HashMap<&str, &Port> = reusable_ports
                .iter()
                .map(|p| (p.name.as_str(), p))
                .collect();

            let mut synthesized = Vec::new();
            {
                let output_ports = template.snippet.output_ports_by_name();
                for info in connections {
                    match (
                        output_ports.get(info.feed_output_port_name.as_str()),
                        input_ports.get(info.reusable_template_input_port_name.as_str()),
                    ) {
                        (Some(output_port), Some(input_port)) => {
                            synthesized.push(Connection {
                                id: Uuid::new_v4().to_string(),
                                source: Connectable::from_port(output_port),
                                destination: Connectable::from_port(input_port),
                            });
                        }
                        _ => {
                            tracing::warn!(
                                flow_template_id = %flow_template_id,
                                output_port = %info.feed_output_port_name,
                                input_port = %info.reusable_template_input_port_name,
                                "Skipping reusable-template connection; a named port was not found"
                            );
                        }
                    }
                }
            }
            template.snippet.connections.extend(synthesized);
        }

        let graph = self.flow_engine.resolve_flow_graph(&template).await?;
        Ok(graph
            .processors
            .into_values()
            .map(|p| FlowProcessor {
                id: p.id,
                group_id: p.group_id,
                name: p.name,
                processor_type: p.processor_type,
                flow_id: p.flow_id,
                is_leaf: p.is_leaf,
            })
            .collect())
    }
}
