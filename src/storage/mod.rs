//! Core storage bookkeeping: slot tables and map-range cursors.
//!
//! Everything above this layer works with handles; the raw mapping pointer
//! never leaves this module except as a checked byte span.

pub(crate) mod map;
pub(crate) mod table;
