//! # Parley Testkit
//!
//! Shared fixtures for workspace tests: deterministic negotiation
//! parties and builders for signed channel artifacts.

pub mod fixtures;

pub use fixtures::{participant, sign_payload, TestFixture};
