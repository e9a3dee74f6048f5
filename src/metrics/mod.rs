//! Prometheus metrics for the template management service.
//!
//! Counters cover the template lifecycle (registrations, conflicts,
//! state transitions, order writes) and published change events.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "template_service";

lazy_static! {
    /// Total successful template registrations, by change type
    pub static ref TEMPLATES_REGISTERED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_templates_registered_total", METRIC_PREFIX),
        "Total successful template registrations",
        &["change"]
    ).unwrap();

    /// Registrations skipped because of a duplicate-name conflict
    pub static ref TEMPLATE_CONFLICTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_conflicts_total", METRIC_PREFIX),
        "Registrations skipped because another template owns the name"
    ).unwrap();

    /// Enable/disable state transitions, by target state
    pub static ref TEMPLATE_STATE_CHANGES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_template_state_changes_total", METRIC_PREFIX),
        "Template enable/disable transitions",
        &["state"]
    ).unwrap();

    /// Order values written back to the metadata store
    pub static ref TEMPLATE_ORDER_WRITES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_order_writes_total", METRIC_PREFIX),
        "Order values written back during reordering"
    ).unwrap();

    /// Change events published on the event bus
    pub static ref TEMPLATE_CHANGE_EVENTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_change_events_total", METRIC_PREFIX),
        "Template change events published"
    ).unwrap();

    /// Flow-template ids backfilled by the list-all repair pass
    pub static ref FLOW_TEMPLATE_ID_REPAIRS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_flow_template_id_repairs_total", METRIC_PREFIX),
        "Flow-template ids backfilled during list-all repair passes"
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
