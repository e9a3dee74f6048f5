//! Cached flow view of registered templates.
//!
//! Consumers that resolve feed flows repeatedly keep a cheap projection of
//! each registered template; the service refreshes it whenever a
//! registration actually changes a record.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::domain::template::RegisteredTemplate;

/// The cached projection of one registered template.
#[derive(Debug, Clone, Serialize)]
pub struct CachedTemplateFlow {
    pub template_id: String,
    pub template_name: String,
    pub is_stream: bool,
    /// Ids of the template's input processors
    pub input_processor_ids: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

/// Receives refreshes of the cached flow representation.
pub trait FlowCache: Send + Sync {
    fn update_registered_template(&self, template: &RegisteredTemplate);
}

/// In-memory flow cache keyed by template id.
pub struct InMemoryFlowCache {
    entries: DashMap<String, CachedTemplateFlow>,
}

impl InMemoryFlowCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, template_id: &str) -> Option<CachedTemplateFlow> {
        self.entries.get(template_id).map(|e| e.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryFlowCache {
    fn default() -> Self {
        Self::new()
    }
}

impl FlowCache for InMemoryFlowCache {
    fn update_registered_template(&self, template: &RegisteredTemplate) {
        let Some(id) = template.id.clone() else {
            // nothing to key an unsaved template by
            return;
        };
        let entry = CachedTemplateFlow {
            template_id: id.clone(),
            template_name: template.template_name.clone(),
            is_stream: template.is_stream,
            input_processor_ids: template
                .input_processors
                .iter()
                .map(|p| p.id.clone())
                .collect(),
            updated_at: Utc::now(),
        };
        tracing::debug!(
            template_id = %id,
            template_name = %entry.template_name,
            "Refreshing cached template flow"
        );
        self.entries.insert(id, entry);
    }
}
