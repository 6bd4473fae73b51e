//! Software-generated VGA timing and a scanline raster pipeline for the
//! STM32F407.
//!
//! The real-time parts are split in two. Everything that can be reasoned about
//! without touching hardware (timing tables, the band list, per-line dispatch,
//! rasterizers, flip control, the arena) is architecture-independent and builds
//! on the host for testing. The hardware driver itself -- timers, DMA, GPIO and
//! the interrupt entry points -- only exists when building for the target.

#![cfg_attr(not(test), no_std)]

pub mod arena;
pub mod band;
pub mod dispatch;
pub mod flip;
pub mod pipeline;
pub mod priority;
pub mod rast;
pub mod timing;
pub mod util;

/// Representation of a pixel in memory.
///
/// The driver consistently uses 8 bits per pixel. It is technically possible to
/// upgrade to 16, but performance is not great.
///
/// Moreover, many demos assume that only the bottom 6 bits are significant,
/// encoded as `0bBB_GG_RR`.
pub type Pixel = u8;

/// Maximum number of visible pixels in a scanline.
///
/// Timing limitations mean we can't really pull off modes above 800x600, so
/// we'll use this fact to size some data structures.
pub const MAX_PIXELS_PER_LINE: usize = 800;

cfg_if::cfg_if! {
    if #[cfg(target_os = "none")] {
        // re-export driver bits
        mod driver;
        pub use driver::*;
    }
}
