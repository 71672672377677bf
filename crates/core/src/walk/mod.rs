//! Deterministic tile enumeration over raster extents
//!
//! Both walkers enumerate row-major from the top-left tile, cover the extent
//! exactly once, and clip the last tile of each row and column to the
//! extent boundary. They hold no cursor state: every call to `iter()`
//! starts a fresh, identical enumeration.

mod extent_walker;
mod grid_walker;

pub use extent_walker::{ExtentTiles, ExtentWalker};
pub use grid_walker::{BlockDescriptor, GridBlocks, GridWalker};
pub(crate) use grid_walker::pixel_size;

/// Number of blocks of `block` size needed to cover `size`, at least one.
///
/// A relative tolerance keeps exact multiples (e.g. 10 / 2.5) from
/// producing a sliver tile through floating-point noise.
pub(crate) fn block_count(size: f64, block: f64) -> usize {
    if size <= 0.0 || block <= 0.0 {
        return 1;
    }
    let ratio = size / block;
    let rounded = ratio.round();
    let n = if (ratio - rounded).abs() < 1e-9 * ratio.max(1.0) {
        rounded
    } else {
        ratio.ceil()
    };
    (n as usize).max(1)
}
