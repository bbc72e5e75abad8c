//! Observability module for the Booth Controller.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit safe field
//! allow-listing; voucher codes and session ids are operational identifiers,
//! receiver phone numbers never appear in metrics or log fields at info
//! level and above. Metric labels are bounded to prevent cardinality
//! explosion:
//! - `call_type`: 3 values (gsm, messaging-app, peer-video)
//! - `actor`: 3 values (user, staff, system-expiry)
//! - `event`: 5 values (the signaling frame kinds)
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `booth_sessions_started_total` | Counter | `call_type` | Session starts |
//! | `booth_sessions_terminated_total` | Counter | `actor` | Terminations by attribution |
//! | `booth_session_starts_rejected_total` | Counter | `reason` | Failed start attempts |
//! | `booth_vouchers_created_total` | Counter | none | Admin voucher creation |
//! | `booth_signal_frames_forwarded_total` | Counter | `event` | Relay fan-out volume |
//! | `booth_sessions_expired_total` | Counter | none | Clock-driven expiries |

pub mod health;
pub mod metrics;

// Re-exports for convenience
pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, record_frames_forwarded, record_session_started,
    record_session_terminated, record_start_rejected, record_voucher_created,
};
