//! Template orchestration service.
//!
//! Composes the metadata store, access controller, event bus and flow-engine
//! client to implement template registration, queries, ordering,
//! enable/disable and topology resolution. The collaborators are injected as
//! capability traits; the acting principal is an explicit argument on every
//! operation.

mod topology;

use std::collections::HashSet;
use std::sync::Arc;

use crate::config::FlowEngineSettings;
use crate::domain::template::{
    transform, RegisteredTemplate, TemplateState, NEW_TEMPLATE_PLACEHOLDER,
};
use crate::error::Result;
use crate::events::{ChangeType, TemplateChange, TemplateChangeEvent, TemplateEventBus};
use crate::flow::{FlowCache, FlowEngineClient, FlowTemplate};
use crate::metadata::{AccessMode, MetadataAccess, TemplateRecord};
use crate::metrics::{
    FLOW_TEMPLATE_ID_REPAIRS_TOTAL, TEMPLATES_REGISTERED_TOTAL, TEMPLATE_CONFLICTS_TOTAL,
    TEMPLATE_ORDER_WRITES_TOTAL, TEMPLATE_STATE_CHANGES_TOTAL,
};
use crate::security::{AccessController, Principal, TemplateAction};

/// Management-plane service for registered templates.
pub struct TemplateService {
    metadata: Arc<dyn MetadataAccess>,
    access: Arc<dyn AccessController>,
    events: Arc<dyn TemplateEventBus>,
    flow_engine: Arc<dyn FlowEngineClient>,
    flow_cache: Arc<dyn FlowCache>,
    flow_settings: FlowEngineSettings,
}

impl TemplateService {
    pub fn new(
        metadata: Arc<dyn MetadataAccess>,
        access: Arc<dyn AccessController>,
        events: Arc<dyn TemplateEventBus>,
        flow_engine: Arc<dyn FlowEngineClient>,
        flow_cache: Arc<dyn FlowCache>,
        flow_settings: FlowEngineSettings,
    ) -> Self {
        Self {
            metadata,
            access,
            events,
            flow_engine,
            flow_cache,
            flow_settings,
        }
    }

    /// Register a template: create it, or update the existing record that
    /// owns the same name.
    ///
    /// Returns `Ok(None)` when the name is already registered under a
    /// different id; nothing is written in that case and callers must treat
    /// the absent result as "not saved".
    #[tracing::instrument(
        name = "template_service.register",
        skip(self, template),
        fields(template_name = %template.template_name, principal = %principal)
    )]
    pub async fn register_template(
        &self,
        principal: &Principal,
        template: RegisteredTemplate,
    ) -> Result<Option<RegisteredTemplate>> {
        let is_new = template.has_blank_id();

        // snapshot the current record for change detection, as the service
        // account: the caller may lack read permission on it
        let previous = if is_new {
            None
        } else {
            self.find_registered_template_as_service(&template.template_name)
                .await?
        };
        let role_membership_changes = template.role_membership_changes.clone();

        let Some(saved) = self.save_registered_template(principal, template).await? else {
            return Ok(None);
        };

        if saved.updated {
            self.flow_cache.update_registered_template(&saved);

            self.propagate_feed_changes(&saved.template_name, previous.as_ref())
                .await?;

            if self.access.is_entity_access_controlled()
                && saved
                    .allowed_actions
                    .contains(&TemplateAction::ChangePermissions)
            {
                if let Some(id) = saved.id.as_deref() {
                    for change in &role_membership_changes {
                        self.access.update_role_memberships(id, change).await?;
                    }
                }
            }

            let change_type = if is_new {
                ChangeType::Created
            } else {
                ChangeType::Updated
            };
            let label = match change_type {
                ChangeType::Created => "created",
                ChangeType::Updated => "updated",
            };
            TEMPLATES_REGISTERED_TOTAL.with_label_values(&[label]).inc();
            self.notify_template_change(principal, &saved, change_type)
                .await;
        }

        Ok(Some(saved))
    }

    /// Persist the registration: de-duplicate by name, merge input
    /// processors from the live flow template, resolve a missing
    /// flow-template id, save, and reorder the template list.
    async fn save_registered_template(
        &self,
        principal: &Principal,
        mut template: RegisteredTemplate,
    ) -> Result<Option<RegisteredTemplate>> {
        let incoming_id_blank = template.has_blank_id();
        let template_order = std::mem::take(&mut template.template_order);

        let mut txn = self.metadata.begin(AccessMode::ReadWrite).await?;
        self.access
            .check_permission(principal, TemplateAction::EditTemplates)
            .await?;

        let existing = txn.find_template_by_name(&template.template_name).await?;
        if let Some(existing) = &existing {
            if template.has_blank_id() {
                // adopt the existing record's id: update in place, never
                // duplicate a name
                template.id = Some(existing.id.clone());
            }
            if !existing
                .id
                .eq_ignore_ascii_case(template.id.as_deref().unwrap_or_default())
            {
                tracing::error!(
                    template_name = %template.template_name,
                    existing_id = %existing.id,
                    incoming_id = ?template.id,
                    "Unable to save template; another template with this name is already registered"
                );
                TEMPLATE_CONFLICTS_TOTAL.inc();
                // transaction dropped without commit: nothing is written
                return Ok(None);
            }
        }

        tracing::info!(
            template_name = %template.template_name,
            template_id = ?template.id,
            flow_template_id = ?template.flow_template_id,
            "Saving registered template"
        );

        self.ensure_registered_template_input_processors(&mut template)
            .await?;

        let mut record = transform::to_template_record(&template);
        self.ensure_flow_template_id(&mut record).await?;

        let saved = txn.save_template(record).await?;
        // re-read for the canonical persisted view
        let persisted = txn.find_template_by_id(&saved.id).await?.unwrap_or(saved);
        txn.commit().await?;

        let mut view = transform::to_registered_template(&persisted);
        view.updated = existing
            .as_ref()
            .map_or(true, |before| !before.same_content(&persisted));

        // a freshly created template appears in the client ordering list as
        // the NEW placeholder; substitute the real id before reordering
        let order: Vec<String> = if incoming_id_blank {
            template_order
                .into_iter()
                .map(|id| {
                    if id == NEW_TEMPLATE_PLACEHOLDER {
                        persisted.id.clone()
                    } else {
                        id
                    }
                })
                .collect()
        } else {
            template_order
        };
        let exclude = HashSet::from([persisted.id.clone()]);
        self.order_templates(principal, &order, &exclude).await?;

        Ok(Some(view))
    }

    /// Assign each template the order matching its position in the list.
    ///
    /// The placeholder sentinel and excluded ids are skipped, and an order
    /// value is only written back when it differs from the stored one.
    pub async fn order_templates(
        &self,
        principal: &Principal,
        ordered_template_ids: &[String],
        exclude: &HashSet<String>,
    ) -> Result<()> {
        let mut txn = self.metadata.begin(AccessMode::ReadWrite).await?;
        self.access
            .check_permission(principal, TemplateAction::EditTemplates)
            .await?;

        for (position, id) in ordered_template_ids.iter().enumerate() {
            if id == NEW_TEMPLATE_PLACEHOLDER || exclude.contains(id) {
                continue;
            }
            if let Some(mut record) = txn.find_template_by_id(id).await? {
                let order = position as i64;
                if record.order != Some(order) {
                    record.order = Some(order);
                    txn.save_template(record).await?;
                    TEMPLATE_ORDER_WRITES_TOTAL.inc();
                }
            }
        }

        txn.commit().await?;
        Ok(())
    }

    /// Look up a registered template by id.
    pub async fn get_registered_template(
        &self,
        principal: &Principal,
        template_id: &str,
    ) -> Result<Option<RegisteredTemplate>> {
        let mut txn = self.metadata.begin(AccessMode::Read).await?;
        self.access
            .check_permission(principal, TemplateAction::AccessTemplates)
            .await?;
        let record = txn.find_template_by_id(template_id).await?;
        Ok(record.as_ref().map(transform::to_registered_template))
    }

    /// Look up a registered template by its unique name.
    pub async fn get_registered_template_by_name(
        &self,
        principal: &Principal,
        template_name: &str,
    ) -> Result<Option<RegisteredTemplate>> {
        let mut txn = self.metadata.begin(AccessMode::Read).await?;
        self.access
            .check_permission(principal, TemplateAction::AccessTemplates)
            .await?;
        let record = txn.find_template_by_name(template_name).await?;
        Ok(record.as_ref().map(transform::to_registered_template))
    }

    /// Look up a registered template by its flow-engine template id,
    /// falling back to the flow-engine template name.
    pub async fn get_registered_template_for_flow_properties(
        &self,
        principal: &Principal,
        flow_template_id: &str,
        flow_template_name: &str,
    ) -> Result<Option<RegisteredTemplate>> {
        let mut txn = self.metadata.begin(AccessMode::Read).await?;
        self.access
            .check_permission(principal, TemplateAction::AccessTemplates)
            .await?;
        let record = match txn
            .find_template_by_flow_template_id(flow_template_id)
            .await?
        {
            Some(record) => Some(record),
            None => txn.find_template_by_name(flow_template_name).await?,
        };
        Ok(record.as_ref().map(transform::to_registered_template))
    }

    /// List all registered templates.
    ///
    /// Listing doubles as an explicit repair pass: records missing their
    /// flow-template id get it resolved by name and written back in a
    /// separate commit transaction.
    pub async fn get_registered_templates(
        &self,
        principal: &Principal,
    ) -> Result<Vec<RegisteredTemplate>> {
        let records = {
            let mut txn = self.metadata.begin(AccessMode::Read).await?;
            self.access
                .check_permission(principal, TemplateAction::AccessTemplates)
                .await?;
            txn.list_templates().await?
        };

        let records = self.repair_missing_flow_template_ids(records).await?;
        Ok(records
            .iter()
            .map(transform::to_registered_template)
            .collect())
    }

    /// Enable a template. Returns `None` when the id does not resolve.
    pub async fn enable_template(
        &self,
        principal: &Principal,
        template_id: &str,
    ) -> Result<Option<RegisteredTemplate>> {
        self.set_template_state(principal, template_id, TemplateState::Enabled)
            .await
    }

    /// Disable a template. Returns `None` when the id does not resolve.
    pub async fn disable_template(
        &self,
        principal: &Principal,
        template_id: &str,
    ) -> Result<Option<RegisteredTemplate>> {
        self.set_template_state(principal, template_id, TemplateState::Disabled)
            .await
    }

    /// Delete a registered template. Returns whether a record existed.
    pub async fn delete_registered_template(
        &self,
        principal: &Principal,
        template_id: &str,
    ) -> Result<bool> {
        let mut txn = self.metadata.begin(AccessMode::ReadWrite).await?;
        self.access
            .check_permission(principal, TemplateAction::EditTemplates)
            .await?;
        let deleted = txn.delete_template(template_id).await?;
        txn.commit().await?;
        if deleted {
            tracing::info!(template_id = %template_id, "Deleted registered template");
        }
        Ok(deleted)
    }

    async fn set_template_state(
        &self,
        principal: &Principal,
        template_id: &str,
        state: TemplateState,
    ) -> Result<Option<RegisteredTemplate>> {
        let mut txn = self.metadata.begin(AccessMode::ReadWrite).await?;
        self.access
            .check_permission(principal, TemplateAction::AdminTemplates)
            .await?;
        let record = txn.set_template_state(template_id, state).await?;
        txn.commit().await?;

        if let Some(record) = &record {
            let label = match state {
                TemplateState::Enabled => "enabled",
                TemplateState::Disabled => "disabled",
            };
            TEMPLATE_STATE_CHANGES_TOTAL.with_label_values(&[label]).inc();
            tracing::info!(
                template_id = %record.id,
                template_name = %record.name,
                state = label,
                "Template state changed"
            );
        }
        Ok(record.as_ref().map(transform::to_registered_template))
    }

    /// Merge every entry-point processor of the live flow template into the
    /// stored input-processor list. Idempotent: processors already present
    /// (matched by id, or by type and name) are skipped.
    async fn ensure_registered_template_input_processors(
        &self,
        template: &mut RegisteredTemplate,
    ) -> Result<()> {
        let Some(flow_template) = self.find_flow_template(template).await? else {
            return Ok(());
        };

        for dto in flow_template.snippet.input_processors() {
            let processor = transform::processor_from_dto(dto, true);
            if !processor.is_valid_input_processor() {
                continue;
            }
            let already_registered = template.input_processors.iter().any(|registered| {
                registered.id == processor.id
                    || (registered.processor_type == processor.processor_type
                        && registered.name == processor.name)
            });
            if !already_registered {
                tracing::info!(
                    processor_name = %processor.name,
                    template_name = %template.template_name,
                    "Adding input processor to registered template"
                );
                template.input_processors.push(processor);
            }
        }
        Ok(())
    }

    /// Fetch the live flow template, preferring the stored flow-template id
    /// and falling back to a name lookup.
    async fn find_flow_template(
        &self,
        template: &RegisteredTemplate,
    ) -> Result<Option<FlowTemplate>> {
        if let Some(id) = template.flow_template_id.as_deref() {
            if let Some(flow_template) = self.flow_engine.template_by_id(id).await? {
                return Ok(Some(flow_template));
            }
        }
        match self
            .flow_engine
            .template_id_for_name(&template.template_name)
            .await?
        {
            Some(id) => Ok(self.flow_engine.template_by_id(&id).await?),
            None => Ok(None),
        }
    }

    /// Resolve a missing flow-template id by template name.
    async fn ensure_flow_template_id(&self, record: &mut TemplateRecord) -> Result<()> {
        if record.flow_template_id.is_some() {
            return Ok(());
        }
        match self.flow_engine.template_id_for_name(&record.name).await? {
            Some(id) => {
                tracing::debug!(
                    template_name = %record.name,
                    flow_template_id = %id,
                    "Resolved flow-template id by name"
                );
                record.flow_template_id = Some(id);
            }
            None => {
                tracing::warn!(
                    template_name = %record.name,
                    "No flow-engine template found for name"
                );
            }
        }
        Ok(())
    }

    async fn repair_missing_flow_template_ids(
        &self,
        records: Vec<TemplateRecord>,
    ) -> Result<Vec<TemplateRecord>> {
        let mut repaired: Vec<TemplateRecord> = Vec::new();
        let mut out = Vec::with_capacity(records.len());
        for mut record in records {
            if record.flow_template_id.is_none() {
                if let Some(id) = self.flow_engine.template_id_for_name(&record.name).await? {
                    record.flow_template_id = Some(id);
                    repaired.push(record.clone());
                }
            }
            out.push(record);
        }

        if !repaired.is_empty() {
            let mut txn = self.metadata.begin(AccessMode::ReadWrite).await?;
            for record in &repaired {
                txn.save_template(record.clone()).await?;
            }
            txn.commit().await?;
            FLOW_TEMPLATE_ID_REPAIRS_TOTAL.inc_by(repaired.len() as u64);
            tracing::info!(
                count = repaired.len(),
                "Backfilled missing flow-template ids while listing templates"
            );
        }
        Ok(out)
    }

    /// Propagate streaming-flag and batch-interval changes to the feeds
    /// built from this template. Runs when this is the first registration or
    /// when the respective value changed.
    async fn propagate_feed_changes(
        &self,
        template_name: &str,
        previous: Option<&RegisteredTemplate>,
    ) -> Result<()> {
        let Some(current) = self
            .find_registered_template_as_service(template_name)
            .await?
        else {
            return Ok(());
        };

        if current.feed_names.is_empty() {
            return Ok(());
        }

        let stream_changed = previous.map_or(true, |p| p.is_stream != current.is_stream);
        let interval_changed = previous.map_or(true, |p| {
            p.batch_job_interval_seconds != current.batch_job_interval_seconds
        });

        if stream_changed {
            let mut txn = self.metadata.begin(AccessMode::ReadWrite).await?;
            txn.update_streaming_flag(&current.feed_names, current.is_stream)
                .await?;
            txn.commit().await?;
            tracing::info!(
                template_name = %template_name,
                is_stream = current.is_stream,
                feed_count = current.feed_names.len(),
                "Propagated streaming flag to feeds"
            );
        }

        if interval_changed {
            if let Some(interval) = current.batch_job_interval_seconds {
                let mut txn = self.metadata.begin(AccessMode::ReadWrite).await?;
                txn.update_batch_job_interval(&current.feed_names, interval)
                    .await?;
                txn.commit().await?;
                tracing::info!(
                    template_name = %template_name,
                    interval_seconds = interval,
                    feed_count = current.feed_names.len(),
                    "Propagated batch-job interval to feeds"
                );
            }
        }
        Ok(())
    }

    /// Service-account read used for change detection and feed propagation;
    /// bypasses the caller-level permission check.
    async fn find_registered_template_as_service(
        &self,
        template_name: &str,
    ) -> Result<Option<RegisteredTemplate>> {
        let mut txn = self.metadata.begin(AccessMode::Read).await?;
        let record = txn.find_template_by_name(template_name).await?;
        Ok(record.as_ref().map(transform::to_registered_template))
    }

    async fn notify_template_change(
        &self,
        principal: &Principal,
        template: &RegisteredTemplate,
        change_type: ChangeType,
    ) {
        let change = TemplateChange {
            change_type,
            template_name: template.template_name.clone(),
            template_id: template.id.clone().unwrap_or_default(),
            state: template.state,
        };
        self.events
            .notify(TemplateChangeEvent::new(change, Some(principal.clone())))
            .await;
    }
}
