//! Core types and contracts for the Paygate sponsorship service.
//!
//! This crate provides the foundation shared by all Paygate crates:
//!
//! - [`types`] - Domain types: operations, policies, rules, jobs
//! - [`error`] - Per-domain error enums and the top-level [`error::PaygateError`]
//! - [`config`] - TOML configuration with validation
//! - [`store`] - Persistence traits and the in-memory [`store::MemoryStore`]
//! - [`units`] - Wei parsing and 128-bit pair packing

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod store;
pub mod types;
pub mod units;

pub use config::Config;
pub use error::{PaygateError, Result};
