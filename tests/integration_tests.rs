//! Integration tests for Bdash.
//!
//! Drive the public API end to end with the mock adapter and recording
//! sharing clients; no database or network is needed.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
