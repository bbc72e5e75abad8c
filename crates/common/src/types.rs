//! Common data types for Wartel components.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Human-entered voucher code.
///
/// Codes are short uppercase tokens derived from a UUID, entered by hand
/// at the booth, so comparison is case-insensitive on input boundaries
/// (callers normalize before constructing).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherCode(String);

/// Length of generated voucher codes.
const VOUCHER_CODE_LENGTH: usize = 7;

impl VoucherCode {
    /// Generate a new random voucher code (7 uppercase hex-ish chars from a UUID).
    #[must_use]
    pub fn generate() -> Self {
        let raw = Uuid::new_v4().simple().to_string().to_uppercase();
        let code: String = raw.chars().take(VOUCHER_CODE_LENGTH).collect();
        Self(code)
    }

    /// Construct a code from operator input, normalizing case and whitespace.
    #[must_use]
    pub fn normalized(input: &str) -> Self {
        Self(input.trim().to_uppercase())
    }

    /// Borrow the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for VoucherCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a call session reaches the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallType {
    /// Plain carrier call dialed from the booth handset.
    Gsm,
    /// Deep link into a messaging app on the receiver's device.
    MessagingApp,
    /// Browser-to-browser video negotiated through the signaling relay.
    PeerVideo,
}

impl CallType {
    /// Whether this call type requires the receiver to be registered.
    #[must_use]
    pub fn requires_registration(self) -> bool {
        !matches!(self, CallType::Gsm)
    }
}

/// Which actor ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminatedBy {
    /// The caller hung up.
    User,
    /// Staff override from the dashboard.
    Staff,
    /// The session clock reached the deadline.
    SystemExpiry,
}
