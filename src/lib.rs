//! # faultline
//!
//! `faultline` is the execution core of a mutation-testing harness:
//! - `mutation`: reversible mutable units driven by pluggable strategies
//! - `host`: external test host orchestration (coverage pass, crash-retry test
//!   execution, process-tree lifecycle, binary artifact decoding)
//!
//! Choosing and applying mutations to a program representation, and turning
//! results into reports, belong to the caller.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

pub mod host;
pub mod mutation;

/// Re-export so callers can cancel runs without depending on `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
