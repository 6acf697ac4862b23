//! Renderer-facing consumers of the storage allocator.
//!
//! These types package the map / write / unmap cycle for per-frame geometry:
//! a fixed table of streams mapped once per frame, and writers that push
//! typed data straight into the mapped windows.

pub mod frame;
pub mod lines;
