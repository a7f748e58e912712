//! Install layout computation.
//!
//! Consumes a completed resolution and computes a physical directory
//! layout in which every package sits at the shallowest ancestry depth
//! that does not conflict with another package needing the same name
//! slot, preserving ancestor-walking module resolution semantics.

mod hoister;

pub use hoister::{HoistEvent, HoistManifest, HoistState, PackageHoister, MAX_MODULE_DEPTH};
