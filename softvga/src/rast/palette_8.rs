//! 8-bit indexed color through a 256-entry palette.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::flip::DoubleBuffer;
use crate::priority;
use crate::rast::{blank_line, Pixel, RasterCtx, Rasterize, TargetBuffer};
use crate::util::rw_lock::GuardMut;

/// Number of entries in a palette.
pub const PALETTE_SIZE: usize = 256;

/// Translates `src` indices through `palette` into `target`.
///
/// # Panics
///
/// If `src` and `target` differ in length.
#[cfg_attr(target_os = "none", link_section = ".ramcode")]
pub fn unpack(src: &[u8], palette: &[AtomicU8; PALETTE_SIZE], target: &mut [Pixel]) {
    assert_eq!(src.len(), target.len());
    for (dst, &index) in target.iter_mut().zip(src) {
        *dst = palette[usize::from(index)].load(Ordering::Relaxed);
    }
}

/// Double-buffered framebuffer of palette indices.
///
/// The palette can be changed at any time, including mid-frame, for raster
/// effects. Scaling works like [`Direct`](../direct/struct.Direct.html).
pub struct Palette8<B> {
    buffers: DoubleBuffer<B>,
    palette: [AtomicU8; PALETTE_SIZE],
    width: usize,
    height: usize,
    scale_x: usize,
    scale_y: usize,
}

impl<B> Palette8<B>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Creates a `width` by `height` framebuffer. The palette starts out as
    /// the identity mapping, so indices are shown as direct colors until it
    /// is changed.
    ///
    /// # Panics
    ///
    /// If `width` is not a multiple of 4, a scale is zero, or either buffer is
    /// too small.
    pub fn new(
        fg: B,
        bg: B,
        width: usize,
        height: usize,
        scale_x: usize,
        scale_y: usize,
    ) -> Self {
        assert!(width % 4 == 0, "palette width must be a multiple of 4");
        assert!(width <= crate::MAX_PIXELS_PER_LINE);
        assert!(scale_x > 0 && scale_y > 0);
        assert!(
            fg.as_ref().len() >= width * height
                && bg.as_ref().len() >= width * height
        );

        const BLACK: AtomicU8 = AtomicU8::new(0);
        let palette = [BLACK; PALETTE_SIZE];
        for (i, entry) in palette.iter().enumerate() {
            entry.store(i as u8, Ordering::Relaxed);
        }

        Palette8 {
            buffers: DoubleBuffer::new(fg, bg),
            palette,
            width,
            height,
            scale_x,
            scale_y,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Changes the color shown for `index`.
    pub fn set_color(&self, index: u8, color: Pixel) {
        self.palette[usize::from(index)].store(color, Ordering::Relaxed)
    }

    pub fn color(&self, index: u8) -> Pixel {
        self.palette[usize::from(index)].load(Ordering::Relaxed)
    }

    /// Replaces the palette, starting at index 0.
    pub fn load_palette(&self, colors: &[Pixel]) {
        for (entry, &c) in self.palette.iter().zip(colors) {
            entry.store(c, Ordering::Relaxed)
        }
    }

    pub fn flip(&self) {
        self.buffers.flip()
    }

    pub fn flip_now(&self) {
        self.buffers.flip_now()
    }

    pub fn copy_bg_to_fg(&self) {
        self.buffers.copy_bg_to_fg::<u8>()
    }

    pub fn get_bg_buffer(&self) -> GuardMut<[u8]> {
        GuardMut::map(self.buffers.bg_mut(), |b| b.as_mut())
    }
}

impl<B> Rasterize for Palette8<B>
where
    B: AsRef<[u8]> + Send + Sync,
{
    #[cfg_attr(target_os = "none", link_section = ".ramcode")]
    fn rasterize(
        &self,
        line: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        _: priority::I0,
    ) {
        let src_line = line / self.scale_y;
        if src_line >= self.height {
            return blank_line(ctx);
        }
        let fg = match self.buffers.try_fg() {
            Ok(fg) => fg,
            Err(_) => return blank_line(ctx),
        };
        let offset = src_line * self.width;
        unpack(
            &fg.as_ref()[offset..offset + self.width],
            &self.palette,
            &mut target[..self.width],
        );
        ctx.target_range = 0..self.width;
        ctx.cycles_per_pixel *= self.scale_x;
        ctx.repeat_lines = self.scale_y - 1 - line % self.scale_y;
    }

    fn end_of_frame(&self, _: priority::I0) {
        self.buffers.apply_pending_flip();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rast::test_util::{i0, raster_line};

    #[test]
    fn identity_by_default() {
        let p = Palette8::new([0u8; 4], [0u8; 4], 4, 1, 1, 1);
        assert_eq!(p.color(0x2A), 0x2A);
    }

    #[test]
    fn lookup_goes_through_palette() {
        let p = Palette8::new([0, 1, 2, 1], [0u8; 4], 4, 1, 1, 1);
        p.load_palette(&[0x30, 0x0C, 0x03]);
        let (ctx, px) = raster_line(&p, 0);
        assert_eq!(px, vec![0x30, 0x0C, 0x03, 0x0C]);
        assert_eq!(ctx.repeat_lines, 0);

        // Palette changes take effect on the very next line.
        p.set_color(1, 0xFF);
        let (_, px) = raster_line(&p, 0);
        assert_eq!(px, vec![0x30, 0xFF, 0x03, 0xFF]);
    }

    #[test]
    fn bg_drawing_shows_after_flip() {
        let p = Palette8::new([0u8; 8], [0u8; 8], 4, 2, 2, 4);
        p.get_bg_buffer()[5] = 9;
        p.flip();
        let (_, px) = raster_line(&p, 4);
        assert_eq!(px, vec![0; 4]);
        p.end_of_frame(i0());
        let (ctx, px) = raster_line(&p, 4);
        assert_eq!(px, vec![0, 9, 0, 0]);
        assert_eq!(ctx.cycles_per_pixel, 8);
        assert_eq!(ctx.repeat_lines, 3);
    }
}
