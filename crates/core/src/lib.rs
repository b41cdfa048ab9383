//! Shared domain logic for the checkpoint sampler.
//!
//! Everything here is pure: workflow template modelling and parameter
//! substitution, deterministic sample naming, checkpoint-to-model path
//! matching, and remote error classification. No I/O happens in this crate.

pub mod checkpoint;
pub mod connection;
pub mod error;
pub mod naming;
pub mod types;
pub mod workflow;
