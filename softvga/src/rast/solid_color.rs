//! Solid color bands.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::priority;
use crate::rast::{solid_color_fill, Pixel, RasterCtx, Rasterize, TargetBuffer};

/// Fills its band with a single color, rasterizing once per band.
pub struct SolidColor {
    color: AtomicU8,
    width: usize,
}

impl SolidColor {
    pub const fn new(color: Pixel, width: usize) -> Self {
        SolidColor {
            color: AtomicU8::new(color),
            width,
        }
    }

    pub fn set_color(&self, color: Pixel) {
        self.color.store(color, Ordering::Relaxed)
    }

    pub fn color(&self) -> Pixel {
        self.color.load(Ordering::Relaxed)
    }
}

impl Rasterize for SolidColor {
    #[cfg_attr(target_os = "none", link_section = ".ramcode")]
    fn rasterize(
        &self,
        _line: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        _: priority::I0,
    ) {
        solid_color_fill(target, ctx, self.width, self.color());
        // The dispatcher trims this to the end of the band.
        ctx.repeat_lines = usize::max_value();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rast::test_util::raster_line;

    #[test]
    fn one_pixel_stretched() {
        let s = SolidColor::new(0b00_11_00, 640);
        let (ctx, px) = raster_line(&s, 17);
        assert_eq!(px, vec![0b00_11_00]);
        assert_eq!(ctx.cycles_per_pixel, 4 * 640);
        assert_eq!(ctx.repeat_lines, usize::max_value());

        s.set_color(3);
        let (_, px) = raster_line(&s, 0);
        assert_eq!(px, vec![3]);
    }
}
