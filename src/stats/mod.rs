//! Per-window population statistics engines.
//!
//! Both engines consume the site-type bit-vectors accumulated by the window
//! driver. All undefined results are explicit `None` values, never NaN and
//! never a computed-looking zero.

pub mod ld;
pub mod sfs;

pub use ld::{compute_ld, LdKind, LdValue, PopLd};
pub use sfs::{compute_sfs, PopSfs, SfsTables};

/// Number of unordered pairs among `k` items.
pub(crate) fn pairs(k: usize) -> f64 {
    (k * k.saturating_sub(1)) as f64 / 2.0
}
