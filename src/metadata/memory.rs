//! In-memory metadata store.
//!
//! Transactions clone the current state on `begin` and swap it back on
//! `commit`. Isolation is last-writer-wins: two concurrent registrations of
//! the same name can both miss each other's in-flight record, matching the
//! coordination level the service assumes from its store.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{AccessMode, MetadataAccess, MetadataError, MetadataTransaction, TemplateRecord};
use crate::domain::template::TemplateState;

#[derive(Debug, Default, Clone)]
struct MetadataState {
    templates: HashMap<String, TemplateRecord>,
    feed_streaming_flags: HashMap<String, bool>,
    feed_batch_intervals: HashMap<String, i64>,
}

/// In-memory metadata store.
pub struct InMemoryMetadataStore {
    state: Arc<RwLock<MetadataState>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MetadataState::default())),
        }
    }

    /// Number of stored template records.
    pub fn template_count(&self) -> usize {
        self.state.read().unwrap().templates.len()
    }

    /// The last streaming flag written for a feed, if any.
    pub fn streaming_flag(&self, feed_name: &str) -> Option<bool> {
        self.state
            .read()
            .unwrap()
            .feed_streaming_flags
            .get(feed_name)
            .copied()
    }

    /// The last batch-job interval written for a feed, if any.
    pub fn batch_job_interval(&self, feed_name: &str) -> Option<i64> {
        self.state
            .read()
            .unwrap()
            .feed_batch_intervals
            .get(feed_name)
            .copied()
    }
}

impl Default for InMemoryMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetadataAccess for InMemoryMetadataStore {
    async fn begin(&self, mode: AccessMode) -> Result<Box<dyn MetadataTransaction>, MetadataError> {
        let snapshot = self.state.read().unwrap().clone();
        Ok(Box::new(InMemoryTransaction {
            shared: self.state.clone(),
            snapshot,
            mode,
            dirty: false,
        }))
    }
}

struct InMemoryTransaction {
    shared: Arc<RwLock<MetadataState>>,
    snapshot: MetadataState,
    mode: AccessMode,
    dirty: bool,
}

impl InMemoryTransaction {
    fn require_write(&self, op: &'static str) -> Result<(), MetadataError> {
        match self.mode {
            AccessMode::ReadWrite => Ok(()),
            AccessMode::Read => Err(MetadataError::ReadOnly(op)),
        }
    }
}

#[async_trait]
impl MetadataTransaction for InMemoryTransaction {
    async fn find_template_by_id(
        &mut self,
        id: &str,
    ) -> Result<Option<TemplateRecord>, MetadataError> {
        Ok(self.snapshot.templates.get(id).cloned())
    }

    async fn find_template_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<TemplateRecord>, MetadataError> {
        Ok(self
            .snapshot
            .templates
            .values()
            .find(|t| t.name == name)
            .cloned())
    }

    async fn find_template_by_flow_template_id(
        &mut self,
        flow_template_id: &str,
    ) -> Result<Option<TemplateRecord>, MetadataError> {
        Ok(self
            .snapshot
            .templates
            .values()
            .find(|t| t.flow_template_id.as_deref() == Some(flow_template_id))
            .cloned())
    }

    async fn list_templates(&mut self) -> Result<Vec<TemplateRecord>, MetadataError> {
        let mut templates: Vec<TemplateRecord> =
            self.snapshot.templates.values().cloned().collect();
        templates.sort_by(|a, b| match (a.order, b.order) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.name.cmp(&b.name)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.name.cmp(&b.name),
        });
        Ok(templates)
    }

    async fn save_template(
        &mut self,
        mut record: TemplateRecord,
    ) -> Result<TemplateRecord, MetadataError> {
        self.require_write("save_template")?;

        if record.id.trim().is_empty() {
            record.id = Uuid::new_v4().to_string();
        }
        let now = Utc::now();
        if let Some(existing) = self.snapshot.templates.get(&record.id) {
            record.created_at = existing.created_at;
        } else {
            record.created_at = now;
        }
        record.updated_at = now;

        self.snapshot
            .templates
            .insert(record.id.clone(), record.clone());
        self.dirty = true;
        Ok(record)
    }

    async fn delete_template(&mut self, id: &str) -> Result<bool, MetadataError> {
        self.require_write("delete_template")?;
        let removed = self.snapshot.templates.remove(id).is_some();
        if removed {
            self.dirty = true;
        }
        Ok(removed)
    }

    async fn set_template_state(
        &mut self,
        id: &str,
        state: TemplateState,
    ) -> Result<Option<TemplateRecord>, MetadataError> {
        self.require_write("set_template_state")?;
        match self.snapshot.templates.get_mut(id) {
            Some(record) => {
                record.state = state;
                record.updated_at = Utc::now();
                self.dirty = true;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn update_streaming_flag(
        &mut self,
        feed_names: &HashSet<String>,
        is_stream: bool,
    ) -> Result<(), MetadataError> {
        self.require_write("update_streaming_flag")?;
        for feed in feed_names {
            self.snapshot
                .feed_streaming_flags
                .insert(feed.clone(), is_stream);
        }
        self.dirty = !feed_names.is_empty() || self.dirty;
        Ok(())
    }

    async fn update_batch_job_interval(
        &mut self,
        feed_names: &HashSet<String>,
        interval_seconds: i64,
    ) -> Result<(), MetadataError> {
        self.require_write("update_batch_job_interval")?;
        for feed in feed_names {
            self.snapshot
                .feed_batch_intervals
                .insert(feed.clone(), interval_seconds);
        }
        self.dirty = !feed_names.is_empty() || self.dirty;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), MetadataError> {
        if self.mode == AccessMode::ReadWrite && self.dirty {
            *self.shared.write().unwrap() = self.snapshot;
        }
        Ok(())
    }
}
