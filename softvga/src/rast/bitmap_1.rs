//! 1bpp bitmap rasterizer with a two-color lookup table.

use core::sync::atomic::{AtomicUsize, Ordering};

use gfx::Graphics1;

use crate::flip::DoubleBuffer;
use crate::priority;
use crate::rast::{blank_line, Pixel, RasterCtx, Rasterize, TargetBuffer};
use crate::util::rw_lock::{Guard, GuardMut};

/// Rasterize packed 1bpp pixel data using a color lookup table (CLUT).
///
/// `src` is a scanline of pixel data packed into `u32`s, where the least
/// significant bit of each `u32` is on the left.
///
/// `clut` is a reference to the CLUT, stored in the low two bytes of an
/// `AtomicUsize`. The least significant byte is the color used for 0 bits, and
/// the next byte for 1 bits. The top two bytes are unused.
///
/// `target` is the destination for unpacked raster output.
///
/// # Panics
///
/// If `target.len()` is not exactly `src.len() * 32`.
#[cfg_attr(target_os = "none", link_section = ".ramcode")]
pub fn unpack(src: &[u32], clut: &AtomicUsize, target: &mut [Pixel]) {
    assert_eq!(src.len() * 32, target.len());
    let clut = clut.load(Ordering::Relaxed);
    let bg = clut as u8;
    let fg = (clut >> 8) as u8;

    for (dst32, bits) in target.chunks_exact_mut(32).zip(src) {
        for (bit, dst) in dst32.iter_mut().enumerate() {
            *dst = if (bits >> bit) & 1 != 0 { fg } else { bg };
        }
    }
}

/// Double-buffered 1bpp bitmap. Zero bits are drawn in the background color
/// and one bits in the foreground color.
pub struct Bitmap1<B> {
    buffers: DoubleBuffer<B>,
    clut: AtomicUsize,
    width: usize,
    height: usize,
}

impl<B> Bitmap1<B>
where
    B: AsRef<[u32]> + AsMut<[u32]>,
{
    /// Creates a `width` by `height` bitmap using `fg` and `bg` as storage.
    /// `fg` starts out on screen.
    ///
    /// # Panics
    ///
    /// If `width` is not a multiple of 32, is wider than a scanline, or either
    /// buffer is too small.
    pub fn new(fg: B, bg: B, width: usize, height: usize) -> Self {
        assert!(width % 32 == 0, "1bpp width must be a multiple of 32");
        assert!(width <= crate::MAX_PIXELS_PER_LINE);
        let words = width / 32 * height;
        assert!(fg.as_ref().len() >= words && bg.as_ref().len() >= words);
        Bitmap1 {
            buffers: DoubleBuffer::new(fg, bg),
            clut: AtomicUsize::new(0xFF << 8),
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sets the color used for one bits.
    pub fn set_fg_color(&self, color: Pixel) {
        let _ = self.clut.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
            Some((c & !0xFF00) | (color as usize) << 8)
        });
    }

    /// Sets the color used for zero bits.
    pub fn set_bg_color(&self, color: Pixel) {
        let _ = self.clut.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
            Some((c & !0xFF) | color as usize)
        });
    }

    /// Returns the current `(foreground, background)` colors.
    pub fn colors(&self) -> (Pixel, Pixel) {
        let c = self.clut.load(Ordering::Relaxed);
        ((c >> 8) as u8, c as u8)
    }

    /// Exchanges foreground and background at the next vblank.
    pub fn flip(&self) {
        self.buffers.flip()
    }

    /// Exchanges foreground and background right now.
    pub fn flip_now(&self) {
        self.buffers.flip_now()
    }

    pub fn copy_bg_to_fg(&self) {
        self.buffers.copy_bg_to_fg::<u32>()
    }

    pub fn can_bg_use_bitband(&self) -> bool {
        self.buffers.can_bg_use_bitband()
    }

    /// Locks the background buffer for direct manipulation.
    pub fn get_bg_buffer(&self) -> GuardMut<[u32]> {
        GuardMut::map(self.buffers.bg_mut(), |b| b.as_mut())
    }

    /// Read-locks the foreground buffer.
    pub fn get_fg_buffer(&self) -> Guard<[u32]> {
        Guard::map(self.buffers.fg(), |b| b.as_ref())
    }

    /// Wraps the background buffer in a drawing surface. Raster output is
    /// unaffected until the next flip.
    pub fn make_bg_graphics(&self) -> Graphics1<GuardMut<[u32]>> {
        Graphics1::new(self.get_bg_buffer(), self.width, self.height)
    }
}

impl<B> Rasterize for Bitmap1<B>
where
    B: AsRef<[u32]> + Send + Sync,
{
    #[cfg_attr(target_os = "none", link_section = ".ramcode")]
    fn rasterize(
        &self,
        line: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        _: priority::I0,
    ) {
        if line >= self.height {
            return blank_line(ctx);
        }
        let fg = match self.buffers.try_fg() {
            Ok(fg) => fg,
            Err(_) => return blank_line(ctx),
        };
        let words = self.width / 32;
        let offset = line * words;
        unpack(
            &fg.as_ref()[offset..offset + words],
            &self.clut,
            &mut target[..self.width],
        );
        ctx.target_range = 0..self.width;
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
    fn unpack_lsb_first() {
        let clut = AtomicUsize::new(0x0A_05);
        let mut out = [0; 64];
        unpack(&[0b1011, 0x8000_0000], &clut, &mut out);
        assert_eq!(&out[..5], &[0x0A, 0x0A, 0x05, 0x0A, 0x05]);
        assert!(out[5..63].iter().all(|&p| p == 0x05));
        assert_eq!(out[63], 0x0A);
    }

    #[test]
    fn colors_are_independent() {
        let bm = Bitmap1::new([0u32; 2], [0u32; 2], 64, 1);
        bm.set_fg_color(0b11_00_00);
        bm.set_bg_color(0b00_00_11);
        assert_eq!(bm.colors(), (0b11_00_00, 0b00_00_11));
        bm.set_fg_color(1);
        assert_eq!(bm.colors(), (1, 0b00_00_11));
    }

    #[test]
    fn draws_foreground_and_flips_at_end_of_frame() {
        let bm = Bitmap1::new([0u32; 4], [0u32; 4], 64, 2);
        bm.set_fg_color(7);
        bm.set_bg_color(1);
        {
            let mut g = bm.make_bg_graphics();
            g.set_pixel(3, 1);
        }
        let (_, px) = raster_line(&bm, 1);
        assert!(px.iter().all(|&p| p == 1), "bg drawing leaked to screen");

        bm.flip();
        bm.end_of_frame(i0());
        let (ctx, px) = raster_line(&bm, 1);
        assert_eq!(ctx.target_range, 0..64);
        assert_eq!(px[3], 7);
        assert_eq!(px.iter().filter(|&&p| p == 7).count(), 1);
        let (_, px) = raster_line(&bm, 0);
        assert!(px.iter().all(|&p| p == 1));
    }

    #[test]
    fn blank_when_locked_or_out_of_range() {
        let bm = Bitmap1::new([!0u32; 2], [0u32; 2], 32, 2);
        let (ctx, _) = raster_line(&bm, 2);
        assert!(ctx.target_range.is_empty());

        let hold = bm.buffers.fg_mut();
        let (ctx, _) = raster_line(&bm, 0);
        assert!(ctx.target_range.is_empty());
        drop(hold);
        let (ctx, _) = raster_line(&bm, 0);
        assert_eq!(ctx.target_range, 0..32);
    }

    #[test]
    #[should_panic]
    fn width_must_be_word_multiple() {
        Bitmap1::new([0u32; 2], [0u32; 2], 40, 1);
    }
}
