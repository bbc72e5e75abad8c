//! Domain fixtures with sensible defaults.

use booth_controller::models::{Receiver, Voucher};
use chrono::{Duration, Utc};
use common::types::VoucherCode;

/// A fresh, unused voucher with the given balance (seconds), redeemable
/// for 14 days.
#[must_use]
pub fn voucher(seconds: u32) -> Voucher {
    Voucher {
        code: VoucherCode::generate(),
        total_duration: seconds,
        remaining_duration: seconds,
        price: 5000,
        created_at: Utc::now(),
        expires_at: Utc::now() + Duration::days(14),
        used: false,
    }
}

/// A voucher whose redemption window closed an hour ago.
#[must_use]
pub fn expired_voucher(seconds: u32) -> Voucher {
    let mut v = voucher(seconds);
    v.created_at = Utc::now() - Duration::days(15);
    v.expires_at = Utc::now() - Duration::hours(1);
    v
}

/// A used voucher with nothing left on it.
#[must_use]
pub fn depleted_voucher() -> Voucher {
    let mut v = voucher(900);
    v.used = true;
    v.remaining_duration = 0;
    v
}

/// A receiver registration for the given identifier.
#[must_use]
pub fn receiver(identifier: &str) -> Receiver {
    Receiver {
        identifier: identifier.to_string(),
        registered_at: Utc::now(),
    }
}
