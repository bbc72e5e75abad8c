//! Metrics definitions for the Booth Controller.
//!
//! All metrics follow Prometheus naming conventions:
//! - `booth_` prefix
//! - `_total` suffix for counters
//!
//! Labels are bounded by enums in the code (call types, terminating actors,
//! signaling events), so cardinality stays flat regardless of traffic.

use common::types::{CallType, TerminatedBy};
use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder and return the handle for
/// serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns an error if the recorder fails to install (e.g., already
/// installed by a previous call).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

fn call_type_label(call_type: CallType) -> &'static str {
    match call_type {
        CallType::Gsm => "gsm",
        CallType::MessagingApp => "messaging-app",
        CallType::PeerVideo => "peer-video",
    }
}

fn actor_label(actor: TerminatedBy) -> &'static str {
    match actor {
        TerminatedBy::User => "user",
        TerminatedBy::Staff => "staff",
        TerminatedBy::SystemExpiry => "system-expiry",
    }
}

/// Record a successful session start.
pub fn record_session_started(call_type: CallType) {
    counter!("booth_sessions_started_total", "call_type" => call_type_label(call_type))
        .increment(1);
}

/// Record a session termination with its attribution.
pub fn record_session_terminated(actor: TerminatedBy) {
    counter!("booth_sessions_terminated_total", "actor" => actor_label(actor)).increment(1);
    if actor == TerminatedBy::SystemExpiry {
        counter!("booth_sessions_expired_total").increment(1);
    }
}

/// Record a rejected start attempt (`reason` is the stable error code).
pub fn record_start_rejected(reason: &'static str) {
    counter!("booth_session_starts_rejected_total", "reason" => reason).increment(1);
}

/// Record an admin voucher creation.
pub fn record_voucher_created() {
    counter!("booth_vouchers_created_total").increment(1);
}

/// Record relay fan-out: `delivered` copies of one `event` frame.
pub fn record_frames_forwarded(event: &'static str, delivered: usize) {
    counter!("booth_signal_frames_forwarded_total", "event" => event)
        .increment(delivered as u64);
}
