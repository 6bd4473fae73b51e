//! Rasterizer support.
//!
//! A rasterizer turns one line of some representation (a bitmap, a text
//! buffer, an equation) into pixels in a `TargetBuffer`, within the time the
//! hardware spends scanning out the *previous* line. Rasterizers are shared
//! between application code and the raster interrupt, so they take `&self` and
//! keep anything mutable behind atomics or non-blocking locks.

pub mod bitmap_1;
pub mod direct;
pub mod mirror;
pub mod palette_8;
pub mod solid_color;
pub mod text_10x16;
pub mod xor_pattern;

use smart_default::SmartDefault;

use crate::priority;
pub use crate::Pixel;

/// Number of pixels in the target buffers given to raster callbacks.
pub const TARGET_BUFFER_SIZE: usize = super::MAX_PIXELS_PER_LINE + 32;

/// The type given to raster callbacks by reference, to fill with pixels. This
/// is word-aligned but we usually pun it as `u8`.
pub struct TargetBuffer([u32; TARGET_BUFFER_SIZE / 4]);

impl TargetBuffer {
    pub const fn new() -> Self {
        TargetBuffer([0; TARGET_BUFFER_SIZE / 4])
    }

    pub fn as_words(&self) -> &[u32; TARGET_BUFFER_SIZE / 4] {
        &self.0
    }

    pub fn as_words_mut(&mut self) -> &mut [u32; TARGET_BUFFER_SIZE / 4] {
        &mut self.0
    }
}

impl core::ops::Deref for TargetBuffer {
    type Target = [Pixel; TARGET_BUFFER_SIZE];
    fn deref(&self) -> &Self::Target {
        // Safety: same size, and u8 has no alignment or validity requirements
        // beyond what u32 already guarantees.
        unsafe { core::mem::transmute(&self.0) }
    }
}

impl core::ops::DerefMut for TargetBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { core::mem::transmute(&mut self.0) }
    }
}

/// Context passed to raster callbacks. Filled out with default values by the
/// driver; callbacks can alter its contents.
#[derive(Clone, Debug, Eq, PartialEq, SmartDefault)]
pub struct RasterCtx {
    /// Number of AHB cycles per pixel of output. Provided by the driver based
    /// on the current mode; raster callbacks can adjust to derive new modes.
    /// Note: values below 4 are undefined.
    #[default(_code = "crate::timing::MIN_CYCLES_PER_PIXEL")]
    pub cycles_per_pixel: usize,
    /// Number of times to repeat this line after its first appearance -- zero
    /// gives full vertical resolution, while larger numbers divide vertical
    /// resolution by (1+n).
    ///
    /// Setting `repeat_lines` to a non-zero value skips calling any rasterizer
    /// for that many lines, which can be used to save compute. Requests that
    /// run past the end of the current band are cut short at the band
    /// boundary.
    pub repeat_lines: usize,
    /// Rasterization range within `target`. The range is *empty* when the
    /// callback starts! To show any actual video, the callback *must* replace
    /// it with the range of valid pixels in `target`.
    ///
    /// If you set this outside of the bounds of `target`, the driver's behavior
    /// is undefined. (Not unsafe -- it just reserves the right to replace video
    /// output with an embarrassing picture of you.)
    pub target_range: core::ops::Range<usize>,
}

impl RasterCtx {
    /// Creates the context the driver hands to each rasterizer: native
    /// horizontal resolution, no repeats, nothing drawn yet.
    pub fn for_cycles_per_pixel(cycles_per_pixel: usize) -> Self {
        RasterCtx {
            cycles_per_pixel,
            ..RasterCtx::default()
        }
    }
}

/// A line-at-a-time source of pixels, invoked from the raster interrupt.
///
/// `line` is relative to the top of the band the rasterizer was installed
/// into. Implementations must fill `target` within a fraction of a line time,
/// must not block, and must degrade to a blank line (an empty
/// `target_range`) rather than panic when shared state is unavailable.
pub trait Rasterize: Sync {
    fn rasterize(
        &self,
        line: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        p: priority::I0,
    );

    /// Called once per frame from the raster interrupt, at the start of the
    /// vertical blanking interval. This is the place to apply deferred
    /// buffer flips.
    fn end_of_frame(&self, _: priority::I0) {}
}

/// Utility routine for cheaply filling a line with a solid color.
pub fn solid_color_fill(
    target: &mut TargetBuffer,
    ctx: &mut RasterCtx,
    width: usize,
    fill: Pixel,
) {
    target[0] = fill; // Same color.
    ctx.target_range = 0..1; // One pixel.
    ctx.cycles_per_pixel *= width; // Stretched across the whole line.
}

/// Produces a line of nothing. The driver follows every line with black, so an
/// empty range is black from edge to edge.
pub fn blank_line(ctx: &mut RasterCtx) {
    ctx.target_range = 0..0;
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub fn i0() -> priority::I0 {
        // Safety: tests run single-threaded with respect to each rasterizer.
        unsafe { priority::I0::new() }
    }

    /// Runs `r` for `line` with a fresh context, returning the context and the
    /// valid pixels.
    pub fn raster_line(
        r: &dyn Rasterize,
        line: usize,
    ) -> (RasterCtx, Vec<Pixel>) {
        let mut target = TargetBuffer::new();
        let mut ctx = RasterCtx::default();
        r.rasterize(line, &mut target, &mut ctx, i0());
        let pixels = target[ctx.target_range.clone()].to_vec();
        (ctx, pixels)
    }

    /// Rasterizer that records every call as `(tag, line)`, draws one pixel
    /// of `tag`, asks for `repeat` repeats and counts frames.
    pub struct Recorder {
        pub tag: u8,
        pub repeat: usize,
        pub calls: Mutex<Vec<(u8, usize)>>,
        pub frames: AtomicUsize,
    }

    impl Recorder {
        pub fn new(tag: u8, repeat: usize) -> Self {
            Recorder {
                tag,
                repeat,
                calls: Mutex::new(Vec::new()),
                frames: AtomicUsize::new(0),
            }
        }

        /// Lines this recorder was asked for, in order.
        pub fn lines(&self) -> Vec<usize> {
            self.calls.lock().unwrap().iter().map(|c| c.1).collect()
        }

        pub fn frames(&self) -> usize {
            self.frames.load(Ordering::Relaxed)
        }
    }

    impl Rasterize for Recorder {
        fn rasterize(
            &self,
            line: usize,
            target: &mut TargetBuffer,
            ctx: &mut RasterCtx,
            _: priority::I0,
        ) {
            self.calls.lock().unwrap().push((self.tag, line));
            target[0] = self.tag;
            ctx.target_range = 0..1;
            ctx.repeat_lines = self.repeat;
        }

        fn end_of_frame(&self, _: priority::I0) {
            self.frames.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_buffer_byte_view() {
        let mut t = TargetBuffer::new();
        t.as_words_mut()[0] = 0x0403_0201;
        assert_eq!(&t[..4], &[1, 2, 3, 4]);
        t[5] = 0xAA;
        assert_eq!(t.as_words()[1], 0x0000_AA00);
    }

    #[test]
    fn default_ctx() {
        let ctx = RasterCtx::default();
        assert_eq!(ctx.cycles_per_pixel, crate::timing::MIN_CYCLES_PER_PIXEL);
        assert_eq!(ctx.repeat_lines, 0);
        assert!(ctx.target_range.is_empty());
        assert_eq!(RasterCtx::for_cycles_per_pixel(8).cycles_per_pixel, 8);
    }

    #[test]
    fn solid_fill_stretches() {
        let mut t = TargetBuffer::new();
        let mut ctx = RasterCtx::for_cycles_per_pixel(4);
        solid_color_fill(&mut t, &mut ctx, 800, 0b11_00_11);
        assert_eq!(ctx.target_range, 0..1);
        assert_eq!(ctx.cycles_per_pixel, 3200);
        assert_eq!(t[0], 0b11_00_11);
    }
}
