//! Reflected view of another rasterizer.

use crate::priority;
use crate::rast::{blank_line, RasterCtx, Rasterize, TargetBuffer};

/// Renders the rows of `inner` bottom-up, and optionally right-to-left.
///
/// Putting the same rasterizer in two bands, once directly and once behind a
/// `Mirror`, draws vertically symmetric content (floor and ceiling, say) from
/// half the storage.
pub struct Mirror<'a> {
    inner: &'a dyn Rasterize,
    height: usize,
    horizontal: bool,
}

impl<'a> Mirror<'a> {
    /// Flips the top `height` lines of `inner` upside down.
    pub fn new(inner: &'a dyn Rasterize, height: usize) -> Self {
        Mirror {
            inner,
            height,
            horizontal: false,
        }
    }

    /// Additionally reverses each line left-to-right.
    pub fn with_horizontal(self) -> Self {
        Mirror {
            horizontal: true,
            ..self
        }
    }
}

impl<'a> Rasterize for Mirror<'a> {
    #[cfg_attr(target_os = "none", link_section = ".ramcode")]
    fn rasterize(
        &self,
        line: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        p: priority::I0,
    ) {
        if line >= self.height {
            return blank_line(ctx);
        }
        self.inner.rasterize(self.height - 1 - line, target, ctx, p);
        // The inner rasterizer's repeats run downward in its own coordinates,
        // which is upward here.
        ctx.repeat_lines = 0;
        if self.horizontal {
            let range = ctx.target_range.clone();
            target[range].reverse();
        }
    }

    fn end_of_frame(&self, p: priority::I0) {
        self.inner.end_of_frame(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rast::test_util::{i0, raster_line};
    use core::sync::atomic::{AtomicUsize, Ordering};

    /// Draws the line number followed by a ramp, and counts frames.
    struct Ramp(AtomicUsize);

    impl Rasterize for Ramp {
        fn rasterize(
            &self,
            line: usize,
            target: &mut TargetBuffer,
            ctx: &mut RasterCtx,
            _: priority::I0,
        ) {
            target[0] = line as u8;
            for i in 1..4 {
                target[i] = 100 + i as u8;
            }
            ctx.target_range = 0..4;
            ctx.repeat_lines = 3;
        }

        fn end_of_frame(&self, _: priority::I0) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn maps_lines_bottom_up() {
        let ramp = Ramp(AtomicUsize::new(0));
        let m = Mirror::new(&ramp, 10);
        let (ctx, px) = raster_line(&m, 0);
        assert_eq!(px, vec![9, 101, 102, 103]);
        assert_eq!(ctx.repeat_lines, 0);
        let (_, px) = raster_line(&m, 9);
        assert_eq!(px[0], 0);
        let (ctx, _) = raster_line(&m, 10);
        assert!(ctx.target_range.is_empty());
    }

    #[test]
    fn horizontal_reverses_valid_range() {
        let ramp = Ramp(AtomicUsize::new(0));
        let m = Mirror::new(&ramp, 4).with_horizontal();
        let (_, px) = raster_line(&m, 1);
        assert_eq!(px, vec![103, 102, 101, 2]);
    }

    #[test]
    fn forwards_end_of_frame() {
        let ramp = Ramp(AtomicUsize::new(0));
        Mirror::new(&ramp, 4).end_of_frame(i0());
        assert_eq!(ramp.0.load(Ordering::Relaxed), 1);
    }
}
