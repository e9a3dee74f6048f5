//! Registered-template types exposed to callers of the service API.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::security::{RoleMembershipChange, TemplateAction};

/// Placeholder id used in a client-supplied ordering list for a template
/// that has not been created yet. Replaced with the real id once the
/// registration commits.
pub const NEW_TEMPLATE_PLACEHOLDER: &str = "NEW";

/// Lifecycle state of a registered template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TemplateState {
    Enabled,
    Disabled,
}

impl Default for TemplateState {
    fn default() -> Self {
        Self::Enabled
    }
}

/// A processor within a template's flow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Processor {
    /// Processor id in the flow engine
    pub id: String,

    /// Id of the process group that owns this processor
    pub group_id: String,

    /// Display name
    pub name: String,

    /// Fully qualified processor type
    pub processor_type: String,

    /// True when the processor has no incoming connections, i.e. it is an
    /// entry point of the flow graph
    pub input: bool,
}

impl Processor {
    /// Whether this processor may serve as an input processor of the
    /// template: it must have no incoming connections and carry the
    /// identifying attributes the flow-engine domain requires.
    pub fn is_valid_input_processor(&self) -> bool {
        self.input && !self.processor_type.is_empty() && !self.name.is_empty()
    }
}

/// A processor decorated with flow-graph placement, produced by full
/// topology resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowProcessor {
    pub id: String,
    pub group_id: String,
    pub name: String,
    pub processor_type: String,

    /// Id of the resolved flow-graph node
    pub flow_id: String,

    /// True when the processor has no outgoing connections
    pub is_leaf: bool,
}

/// Pairs a feed's named output port with a named input port on the shared
/// reusable-templates process group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReusableTemplateConnectionInfo {
    pub feed_output_port_name: String,
    pub reusable_template_input_port_name: String,

    /// Display name for the input port, when it differs from the port name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_port_display_name: Option<String>,
}

/// The caller-facing view of a registered template.
///
/// Also used as the registration payload: an incoming template may lack an
/// id (first registration) and may carry a `template_order` list describing
/// the desired ordering of all templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredTemplate {
    /// Metadata-store id; absent until the first registration commits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Template name, unique among registered templates
    pub template_name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Id of the corresponding template in the flow engine
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flow_template_id: Option<String>,

    /// Position in the template ordering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,

    #[serde(default)]
    pub state: TemplateState,

    /// True when feeds created from this template run as streams
    #[serde(default)]
    pub is_stream: bool,

    /// Interval between starting batch jobs, for non-streaming templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_job_interval_seconds: Option<i64>,

    /// Entry-point processors of the template
    #[serde(default)]
    pub input_processors: Vec<Processor>,

    /// All remaining processors
    #[serde(default)]
    pub non_input_processors: Vec<Processor>,

    /// Connections into the shared reusable-templates process group
    #[serde(default)]
    pub reusable_template_connections: Vec<ReusableTemplateConnectionInfo>,

    /// Names of feeds built from this template
    #[serde(default)]
    pub feed_names: HashSet<String>,

    /// Role membership changes to apply when the registration commits
    #[serde(default)]
    pub role_membership_changes: Vec<RoleMembershipChange>,

    /// Entity-level actions the caller holds on this template
    #[serde(default)]
    pub allowed_actions: HashSet<TemplateAction>,

    /// Client-supplied ordering of all template ids; may contain the
    /// [`NEW_TEMPLATE_PLACEHOLDER`] sentinel
    #[serde(default)]
    pub template_order: Vec<String>,

    /// Set by the save path when the persisted record actually changed
    #[serde(default)]
    pub updated: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl RegisteredTemplate {
    /// A minimal registration payload with the given name.
    pub fn named(template_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            template_name: template_name.into(),
            description: None,
            flow_template_id: None,
            order: None,
            state: TemplateState::default(),
            is_stream: false,
            batch_job_interval_seconds: None,
            input_processors: Vec::new(),
            non_input_processors: Vec::new(),
            reusable_template_connections: Vec::new(),
            feed_names: HashSet::new(),
            role_membership_changes: Vec::new(),
            allowed_actions: HashSet::new(),
            template_order: Vec::new(),
            updated: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// True when the payload has no usable id.
    pub fn has_blank_id(&self) -> bool {
        self.id.as_deref().map_or(true, |id| id.trim().is_empty())
    }

    /// All processors of the template, input processors first.
    pub fn all_processors(&self) -> Vec<Processor> {
        let mut processors = self.input_processors.clone();
        processors.extend(self.non_input_processors.iter().cloned());
        processors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_id_detection() {
        let mut template = RegisteredTemplate::named("ingest");
        assert!(template.has_blank_id());

        template.id = Some("  ".to_string());
        assert!(template.has_blank_id());

        template.id = Some("abc".to_string());
        assert!(!template.has_blank_id());
    }

    #[test]
    fn test_valid_input_processor_predicate() {
        let processor = Processor {
            id: "p1".to_string(),
            group_id: "g1".to_string(),
            name: "Fetch Files".to_string(),
            processor_type: "processors.standard.GetFile".to_string(),
            input: true,
        };
        assert!(processor.is_valid_input_processor());

        let mut not_input = processor.clone();
        not_input.input = false;
        assert!(!not_input.is_valid_input_processor());

        let mut untyped = processor.clone();
        untyped.processor_type = String::new();
        assert!(!untyped.is_valid_input_processor());
    }

    #[test]
    fn test_all_processors_orders_inputs_first() {
        let mut template = RegisteredTemplate::named("ingest");
        template.input_processors.push(Processor {
            id: "in".to_string(),
            group_id: "g".to_string(),
            name: "in".to_string(),
            processor_type: "t".to_string(),
            input: true,
        });
        template.non_input_processors.push(Processor {
            id: "out".to_string(),
            group_id: "g".to_string(),
            name: "out".to_string(),
            processor_type: "t".to_string(),
            input: false,
        });

        let all = template.all_processors();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "in");
        assert_eq!(all[1].id, "out");
    }
}
