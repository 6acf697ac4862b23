//! Debug utilities for catching stale-mapping bugs.
//!
//! Only compiled when the `debug` feature is enabled.

pub mod poison;
