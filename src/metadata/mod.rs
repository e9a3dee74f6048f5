//! Transactional metadata store abstraction.
//!
//! The metadata store owns the durable state of registered templates and of
//! the feed attributes this service propagates to. All access goes through a
//! transaction: [`MetadataAccess::begin`] hands out a [`MetadataTransaction`]
//! that buffers writes until `commit`. Dropping a transaction without
//! committing discards its writes, which is how permission denials and
//! remote flow-engine failures abort cleanly.

mod memory;

pub use memory::InMemoryMetadataStore;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::template::{Processor, ReusableTemplateConnectionInfo, TemplateState};
use crate::security::TemplateAction;

/// Metadata-store error type
#[derive(Debug, Error)]
pub enum MetadataError {
    /// A write was attempted on a read-only transaction
    #[error("write operation `{0}` attempted on a read-only transaction")]
    ReadOnly(&'static str),

    /// Backend failure
    #[error("metadata storage error: {0}")]
    Storage(String),
}

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    ReadWrite,
}

/// The persisted template record, owned by the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub flow_template_id: Option<String>,
    pub order: Option<i64>,
    pub state: TemplateState,
    pub is_stream: bool,
    pub batch_job_interval_seconds: Option<i64>,
    pub input_processors: Vec<Processor>,
    pub non_input_processors: Vec<Processor>,
    pub reusable_template_connections: Vec<ReusableTemplateConnectionInfo>,
    pub feed_names: HashSet<String>,
    pub allowed_actions: HashSet<TemplateAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TemplateRecord {
    /// Field-level equality ignoring timestamps. Used by the save path to
    /// decide whether a registration actually changed anything.
    pub fn same_content(&self, other: &TemplateRecord) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.description == other.description
            && self.flow_template_id == other.flow_template_id
            && self.order == other.order
            && self.state == other.state
            && self.is_stream == other.is_stream
            && self.batch_job_interval_seconds == other.batch_job_interval_seconds
            && self.input_processors == other.input_processors
            && self.non_input_processors == other.non_input_processors
            && self.reusable_template_connections == other.reusable_template_connections
            && self.feed_names == other.feed_names
            && self.allowed_actions == other.allowed_actions
    }
}

/// Entry point into the metadata store.
#[async_trait]
pub trait MetadataAccess: Send + Sync {
    /// Open a transaction in the given mode.
    async fn begin(&self, mode: AccessMode) -> Result<Box<dyn MetadataTransaction>, MetadataError>;
}

/// A single metadata transaction.
///
/// Lookups observe the state as of `begin` plus this transaction's own
/// writes. Writes become durable only on `commit`.
#[async_trait]
pub trait MetadataTransaction: Send {
    async fn find_template_by_id(
        &mut self,
        id: &str,
    ) -> Result<Option<TemplateRecord>, MetadataError>;

    async fn find_template_by_name(
        &mut self,
        name: &str,
    ) -> Result<Option<TemplateRecord>, MetadataError>;

    async fn find_template_by_flow_template_id(
        &mut self,
        flow_template_id: &str,
    ) -> Result<Option<TemplateRecord>, MetadataError>;

    /// All template records, ordered by their order value, then by name.
    async fn list_templates(&mut self) -> Result<Vec<TemplateRecord>, MetadataError>;

    /// Create or update a template record. A record with an empty id is
    /// assigned one; `created_at` of an existing record is preserved and
    /// `updated_at` is refreshed. Returns the record as persisted.
    async fn save_template(
        &mut self,
        record: TemplateRecord,
    ) -> Result<TemplateRecord, MetadataError>;

    /// Remove a template record. Returns whether a record existed.
    async fn delete_template(&mut self, id: &str) -> Result<bool, MetadataError>;

    /// Transition a template's state, returning the updated record, or
    /// `None` when the id does not resolve.
    async fn set_template_state(
        &mut self,
        id: &str,
        state: TemplateState,
    ) -> Result<Option<TemplateRecord>, MetadataError>;

    /// Propagate a streaming-flag change to the named feeds.
    async fn update_streaming_flag(
        &mut self,
        feed_names: &HashSet<String>,
        is_stream: bool,
    ) -> Result<(), MetadataError>;

    /// Propagate a batch-job interval change to the named feeds.
    async fn update_batch_job_interval(
        &mut self,
        feed_names: &HashSet<String>,
        interval_seconds: i64,
    ) -> Result<(), MetadataError>;

    /// Make this transaction's writes durable.
    async fn commit(self: Box<Self>) -> Result<(), MetadataError>;
}
