//! Secret types for protecting sensitive values from accidental logging.
//!
//! This module re-exports types from the [`secrecy`] crate with Wartel-specific
//! guidance. Use these types for all sensitive values such as store connection
//! URLs that may embed credentials.
//!
//! # Compile-Time Safety
//!
//! `SecretBox<T>` and `SecretString` implement `Debug` with redaction, so any
//! code that derives `Debug` on a struct containing secrets automatically gets
//! safe logging behavior. This makes it **impossible** to accidentally log
//! secrets via `{:?}` or tracing.
//!
//! # Memory Safety
//!
//! Secrets are automatically zeroized when dropped, preventing sensitive
//! data from lingering in memory after use.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct StoreConfig {
//!     bind_address: String,
//!     redis_url: SecretString,  // Safe: Debug shows "[REDACTED]"
//! }
//!
//! let cfg = StoreConfig {
//!     bind_address: "0.0.0.0:8080".to_string(),
//!     redis_url: SecretString::from("redis://:hunter2@localhost:6379"),
//! };
//!
//! // This is safe - the URL (and any password inside it) is redacted
//! println!("{:?}", cfg);
//!
//! // To access the actual value, you must explicitly call expose_secret()
//! let url: &str = cfg.redis_url.expose_secret();
//! ```
//!
//! # Wartel Usage Guidelines
//!
//! Use `SecretString` for:
//! - Store connection URLs (`redis://:password@host:port`)
//! - Any operator-supplied credential material

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
