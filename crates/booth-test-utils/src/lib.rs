//! Test fixtures and harnesses for the Wartel Booth Controller.
//!
//! Integration tests build a full service core (in-memory store, ledger,
//! relay, orchestrator with a live expiry driver) through [`TestBooth`]
//! rather than wiring the pieces by hand in every test.

#![warn(clippy::pedantic)]
#![allow(clippy::unwrap_used, clippy::expect_used)] // test-support crate

pub mod fixtures;
pub mod harness;

pub use fixtures::{depleted_voucher, expired_voucher, receiver, voucher};
pub use harness::TestBooth;
