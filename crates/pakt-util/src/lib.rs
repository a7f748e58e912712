//! Shared utilities for the pakt package manager.
//!
//! This crate provides the cross-cutting concerns used by all other pakt
//! crates: the unified error type, the keyed concurrency queue that
//! serializes and bounds async work, and content hashing.

pub mod errors;
pub mod hash;
pub mod queue;
