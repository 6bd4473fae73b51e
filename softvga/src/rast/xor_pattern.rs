//! Procedural XOR pattern, with no backing store.

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::priority;
use crate::rast::{RasterCtx, Rasterize, TargetBuffer};

pub struct XorPattern {
    frame: AtomicUsize,
    width: usize,
}

impl XorPattern {
    /// # Panics
    ///
    /// If `width` is wider than a scanline can be.
    pub const fn new(width: usize) -> Self {
        assert!(width <= crate::MAX_PIXELS_PER_LINE);
        XorPattern {
            frame: AtomicUsize::new(0),
            width,
        }
    }

    /// Moves the pattern along by one step. Call from the application once
    /// per frame, ideally during vblank.
    pub fn advance_frame(&self) {
        self.frame.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame(&self) -> usize {
        self.frame.load(Ordering::Relaxed)
    }
}

impl Rasterize for XorPattern {
    #[cfg_attr(target_os = "none", link_section = ".ramcode")]
    fn rasterize(
        &self,
        line: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        _: priority::I0,
    ) {
        let f = self.frame();
        let row = (line >> 2).wrapping_add(f);
        for (x, px) in target[..self.width].iter_mut().enumerate() {
            *px = (x.wrapping_add(f) ^ row) as u8;
        }
        ctx.target_range = 0..self.width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rast::test_util::raster_line;

    #[test]
    fn pattern() {
        let x = XorPattern::new(8);
        let (_, px) = raster_line(&x, 4);
        assert_eq!(px, vec![1, 0, 3, 2, 5, 4, 7, 6]);

        x.advance_frame();
        let (ctx, px) = raster_line(&x, 0);
        assert_eq!(ctx.target_range, 0..8);
        // (x + 1) ^ 1
        assert_eq!(px, vec![0, 3, 2, 5, 4, 7, 6, 9]);
    }

    #[test]
    fn full_width_line() {
        let x = XorPattern::new(crate::MAX_PIXELS_PER_LINE);
        let (ctx, _) = raster_line(&x, 599);
        assert_eq!(ctx.target_range.len(), crate::MAX_PIXELS_PER_LINE);
    }

    #[test]
    #[should_panic]
    fn wider_than_a_scanline() {
        XorPattern::new(crate::MAX_PIXELS_PER_LINE + 1);
    }
}
