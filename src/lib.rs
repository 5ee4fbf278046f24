//! Bdash - query execution, cancellation and sharing core of a SQL workbench.
//!
//! This library exposes the core modules for front ends and integration tests.

pub mod adapter;
pub mod cli;
pub mod clipboard;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod model;
pub mod sharing;
pub mod store;
