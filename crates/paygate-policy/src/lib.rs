//! Policy evaluation for the Paygate sponsorship service.
//!
//! - [`rules`] - Per-rule evaluation: comparator inversion, usage
//!   aggregation over rolling intervals, live token-balance checks
//! - [`candidates`] - Candidate resolution and budget accounting across a
//!   paymaster's policies

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod candidates;
pub mod rules;

pub use candidates::{Acceptance, CandidateResolver};
pub use rules::{evaluate_rule, find_passing_rule, ComparatorExt, RuleContext};
