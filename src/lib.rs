//! Core library for the `dreq` CLI.
//!
//! `dreq` generates HTTP load from one machine or many. The building blocks
//! here are used by the binary: configuration loading and validation, the
//! rate-limited dispatcher, outcome accounting, and the coordinator/agent
//! pair that spreads tasks over remote clients.
pub mod app;
pub mod args;
pub mod config;
pub mod distributed;
pub mod domain;
pub mod entry;
pub mod error;
pub mod http;
pub mod logger;
pub mod metrics;
pub mod shutdown;
pub mod shutdown_handlers;
