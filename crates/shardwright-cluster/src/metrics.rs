//! Orchestration metrics
//!
//! Counters are emitted through the `metrics` facade; the embedding binary
//! decides whether and where to export them.

use metrics::counter;

/// Metric names
pub mod names {
    // Spare allocation
    pub const SPARES_CLAIMED_TOTAL: &str = "shardwright_spares_claimed_total";

    // Protocols
    pub const PROMOTIONS_TOTAL: &str = "shardwright_promotions_total";
    pub const SPLIT_CHILDREN_TOTAL: &str = "shardwright_split_children_total";
    pub const CUTOVERS_TOTAL: &str = "shardwright_cutovers_total";

    // Interception
    pub const CALLBACK_ABORTS_TOTAL: &str = "shardwright_callback_aborts_total";
}

pub(crate) fn record_spares_claimed(count: usize) {
    counter!(names::SPARES_CLAIMED_TOTAL).increment(count as u64);
}

pub(crate) fn record_promotion(outcome: &'static str) {
    counter!(names::PROMOTIONS_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_split_child(outcome: &'static str) {
    counter!(names::SPLIT_CHILDREN_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_cutover() {
    counter!(names::CUTOVERS_TOTAL).increment(1);
}

pub(crate) fn record_callback_abort(operation: &'static str, phase: &'static str) {
    counter!(names::CALLBACK_ABORTS_TOTAL, "operation" => operation, "phase" => phase)
        .increment(1);
}
