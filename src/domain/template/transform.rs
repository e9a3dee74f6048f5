//! Conversion between the persisted template record and the caller-facing
//! registered template.

use crate::flow::ProcessorDto;
use crate::metadata::TemplateRecord;

use super::types::{Processor, RegisteredTemplate};

/// Build the caller-facing view of a persisted record.
///
/// Transient request fields (`template_order`, `role_membership_changes`,
/// `updated`) start empty; the save path fills in `updated`.
pub fn to_registered_template(record: &TemplateRecord) -> RegisteredTemplate {
    RegisteredTemplate {
        id: Some(record.id.clone()),
        template_name: record.name.clone(),
        description: record.description.clone(),
        flow_template_id: record.flow_template_id.clone(),
        order: record.order,
        state: record.state,
        is_stream: record.is_stream,
        batch_job_interval_seconds: record.batch_job_interval_seconds,
        input_processors: record.input_processors.clone(),
        non_input_processors: record.non_input_processors.clone(),
        reusable_template_connections: record.reusable_template_connections.clone(),
        feed_names: record.feed_names.clone(),
        role_membership_changes: Vec::new(),
        allowed_actions: record.allowed_actions.clone(),
        template_order: Vec::new(),
        updated: false,
        created_at: record.created_at,
        updated_at: record.updated_at,
    }
}

/// Build the persistable record from a registration payload. The store
/// assigns an id when the payload carries none and owns both timestamps.
pub fn to_template_record(template: &RegisteredTemplate) -> TemplateRecord {
    TemplateRecord {
        id: template.id.clone().unwrap_or_default(),
        name: template.template_name.clone(),
        description: template.description.clone(),
        flow_template_id: template.flow_template_id.clone(),
        order: template.order,
        state: template.state,
        is_stream: template.is_stream,
        batch_job_interval_seconds: template.batch_job_interval_seconds,
        input_processors: template.input_processors.clone(),
        non_input_processors: template.non_input_processors.clone(),
        reusable_template_connections: template.reusable_template_connections.clone(),
        feed_names: template.feed_names.clone(),
        allowed_actions: template.allowed_actions.clone(),
        created_at: template.created_at,
        updated_at: template.updated_at,
    }
}

/// Map a processor read from the flow engine into the domain
/// representation.
pub fn processor_from_dto(dto: &ProcessorDto, input: bool) -> Processor {
    Processor {
        id: dto.id.clone(),
        group_id: dto.group_id.clone(),
        name: dto.name.clone(),
        processor_type: dto.processor_type.clone(),
        input,
    }
}
