//! Domain documents and API request/response types.
//!
//! Three durable collections: `vouchers` keyed by code, `sessions` keyed by
//! generated id, `receivers` keyed by identifier, plus an append-only audit
//! log. Records are mutated only through orchestrator/ledger operations,
//! never directly by clients.

use chrono::{DateTime, Duration, Utc};
use common::types::{CallType, SessionId, TerminatedBy, VoucherCode};
use serde::{Deserialize, Serialize};

/// Purchasable call-time packages and their prices.
///
/// The package table is fixed; staff adjust individual vouchers afterwards
/// when a custom duration is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoucherPackage {
    #[serde(rename = "5min")]
    Min5,
    #[serde(rename = "15min")]
    Min15,
    #[serde(rename = "30min")]
    Min30,
    #[serde(rename = "60min")]
    Min60,
    #[serde(rename = "120min")]
    Min120,
}

impl VoucherPackage {
    /// Call time granted by this package, in seconds.
    #[must_use]
    pub fn duration_seconds(self) -> u32 {
        match self {
            VoucherPackage::Min5 => 300,
            VoucherPackage::Min15 => 900,
            VoucherPackage::Min30 => 1800,
            VoucherPackage::Min60 => 3600,
            VoucherPackage::Min120 => 7200,
        }
    }

    /// Sale price of this package.
    #[must_use]
    pub fn price(self) -> u32 {
        match self {
            VoucherPackage::Min5 => 2000,
            VoucherPackage::Min15 => 5000,
            VoucherPackage::Min30 => 10_000,
            VoucherPackage::Min60 => 18_000,
            VoucherPackage::Min120 => 35_000,
        }
    }
}

/// Durable record of purchasable call-time.
///
/// Invariant: `0 <= remaining_duration <= total_duration`. A voucher past
/// `expires_at`, or with `used == true` and no remaining time, is terminal
/// and cannot start new sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    /// Unique, human-entered code.
    pub code: VoucherCode,
    /// Total call time in seconds. Changed only by staff edit.
    pub total_duration: u32,
    /// Unspent call time in seconds. Non-increasing except by staff edit.
    pub remaining_duration: u32,
    /// Sale price.
    pub price: u32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Absolute redemption deadline.
    pub expires_at: DateTime<Utc>,
    /// Sticky flag: true once any session has been created from this voucher.
    pub used: bool,
}

impl Voucher {
    /// Create a fresh voucher from a package, redeemable for `ttl_days`.
    #[must_use]
    pub fn from_package(package: VoucherPackage, now: DateTime<Utc>, ttl_days: i64) -> Self {
        Self {
            code: VoucherCode::generate(),
            total_duration: package.duration_seconds(),
            remaining_duration: package.duration_seconds(),
            price: package.price(),
            created_at: now,
            expires_at: now + Duration::days(ttl_days),
            used: false,
        }
    }

    /// Whether the redemption window has closed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Whether the voucher is spent.
    ///
    /// A never-used voucher with a full balance is not depleted even if
    /// other balance bookkeeping is stale; both conditions must hold.
    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.used && self.remaining_duration == 0
    }
}

/// Durable record of one voucher redemption (a call).
///
/// Born `active = true`; transitions exactly once to `active = false` with
/// `terminated_by` set and `end_time` recorded. While active,
/// `remaining_duration` holds the seeded value; live remaining time is
/// always derived from `deadline`, never from a ticking counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Opaque id, generated at creation. Doubles as the signaling room name.
    pub id: SessionId,
    /// Voucher this session redeems.
    pub voucher_code: VoucherCode,
    /// Phone number or registry identifier of the receiving party.
    pub receiver_identifier: String,
    /// How the call reaches the receiver.
    pub call_type: CallType,
    /// Session start timestamp.
    pub start_time: DateTime<Utc>,
    /// Authoritative expiry instant: `start_time + seeded remaining`.
    pub deadline: DateTime<Utc>,
    /// Termination timestamp, absent while active.
    pub end_time: Option<DateTime<Utc>>,
    /// Whether the session is live.
    pub active: bool,
    /// Seconds remaining: seeded from the voucher at start, overwritten with
    /// the settled value at termination.
    pub remaining_duration: u32,
    /// Which actor ended the session, absent while active.
    pub terminated_by: Option<TerminatedBy>,
    /// Operator who created the session.
    pub owner_id: String,
}

impl Session {
    /// Seconds left on the authoritative deadline, clamped at zero.
    ///
    /// Any observer may compute this independently; no stored counter is
    /// ever decremented.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u32 {
        if !self.active {
            return self.remaining_duration;
        }
        let left = (self.deadline - now).num_seconds();
        u32::try_from(left.max(0)).unwrap_or(0)
    }
}

/// Receiver registration record.
///
/// Presence in the registry is what permits messaging-app and peer-video
/// call types; append/overwrite semantics, no deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receiver {
    /// Phone number or other identifier the booth dials.
    pub identifier: String,
    /// Registration timestamp (refreshed on overwrite).
    pub registered_at: DateTime<Utc>,
}

/// Append-only audit trail entry. Fire-and-forget: write failures are
/// logged but never block the operation that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub user_id: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// API request/response types
// ============================================================================

/// The call option chosen at the booth. `gsm` maps straight to a GSM call;
/// the app options require a registered receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallOption {
    Gsm,
    MessagingVoice,
    MessagingVideo,
    PeerVideo,
}

impl CallOption {
    /// The session call type this option produces when permitted.
    #[must_use]
    pub fn call_type(self) -> CallType {
        match self {
            CallOption::Gsm => CallType::Gsm,
            CallOption::MessagingVoice | CallOption::MessagingVideo => CallType::MessagingApp,
            CallOption::PeerVideo => CallType::PeerVideo,
        }
    }
}

/// Request body for `POST /api/v1/sessions`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartSessionRequest {
    pub voucher_code: String,
    pub receiver_identifier: String,
    pub call_option: CallOption,
    pub operator_id: String,
}

/// Response body for `POST /api/v1/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct StartSessionResponse {
    pub session_id: SessionId,
    pub call_type: CallType,
    pub remaining_duration: u32,
    pub deadline: DateTime<Utc>,
}

/// Request body for `POST /api/v1/sessions/{id}/terminate`.
#[derive(Debug, Clone, Deserialize)]
pub struct TerminateSessionRequest {
    pub actor: TerminatedBy,
    /// Seconds the terminating client believes are left. Clamped server-side
    /// to the seeded value; omitted means "trust the deadline".
    pub observed_remaining: Option<u32>,
}

/// Request body for `POST /api/v1/vouchers`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVoucherRequest {
    pub package_type: VoucherPackage,
    pub user_id: String,
}

/// Response body for `POST /api/v1/vouchers`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateVoucherResponse {
    pub code: VoucherCode,
}

/// Request body for `DELETE /api/v1/vouchers/{code}`. The body is optional;
/// an absent operator is attributed to "unknown" in the audit trail.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteVoucherRequest {
    pub user_id: Option<String>,
}

/// Request body for `PATCH /api/v1/vouchers/{code}` (staff edit).
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustVoucherRequest {
    pub duration_secs: u32,
    pub price: u32,
    pub user_id: String,
}

/// Request body for `POST /api/v1/logs`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppendLogRequest {
    pub user_id: Option<String>,
    pub action: String,
}
