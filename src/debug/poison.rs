//! Memory poisoning for the dummy backend.
//!
//! Map windows opened with `MapFlags::INVALIDATE` are filled with a known
//! pattern so code that relies on previous contents surviving an invalidating
//! map shows up in tests instead of working by accident.

/// Pattern written over an invalidated map window.
pub const UNINIT_PATTERN: u8 = 0xAB;

/// Poison an invalidated map window.
pub fn poison_invalidated(bytes: &mut [u8]) {
    bytes.fill(UNINIT_PATTERN);
}

/// Check whether a region still carries the invalidate pattern.
///
/// Returns true only if every byte matches.
pub fn is_invalidate_poison(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| b == UNINIT_PATTERN)
}
