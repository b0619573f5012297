//! Paygate sponsorship daemon.
//!
//! Wires the workspace crates into the running service:
//!
//! - [`sponsor`] - The submission pipeline: persist, validate, sign, record
//! - [`recon`] - The reconciliation engine and its scheduler
//! - [`audit`] - HMAC-chained transition log
//! - [`logging`] - Tracing subscriber setup
//! - [`cli`] - Command-line interface

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod cli;
pub mod logging;
pub mod recon;
pub mod sponsor;

pub use audit::{AuditLogger, VerifyResult};
pub use recon::{CycleOutcome, Reconciler};
pub use sponsor::{Sponsor, SponsorGrant};
