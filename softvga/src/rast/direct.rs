//! Direct-color rasterizer.

use crate::flip::DoubleBuffer;
use crate::priority;
use crate::rast::{blank_line, RasterCtx, Rasterize, TargetBuffer};
use crate::util::rw_lock::GuardMut;

/// Copies one line of 8-bit direct-color pixels, stored four to a word, into
/// the target. `stride` is in words.
#[cfg_attr(target_os = "none", link_section = ".ramcode")]
pub fn direct_color(
    line_number: usize,
    tgt: &mut TargetBuffer,
    ctx: &mut RasterCtx,
    buf: &[u32],
    stride: usize,
) {
    let offset = line_number * stride;
    crate::util::copy_words::copy_words(
        &buf[offset..offset + stride],
        &mut tgt.as_words_mut()[..stride],
    );
    ctx.target_range = 0..stride * 4;
}

/// Like `direct_color`, but counts lines from the bottom of a `height`-line
/// buffer and reverses each line, producing an image rotated 180 degrees.
#[cfg_attr(target_os = "none", link_section = ".ramcode")]
pub fn direct_color_mirror(
    line_number: usize,
    tgt: &mut TargetBuffer,
    ctx: &mut RasterCtx,
    buf: &[u32],
    stride: usize,
    height: usize,
) {
    let line_number = height - line_number - 1;
    let offset = line_number * stride;
    let tgt = tgt.as_words_mut()[..stride].iter_mut();
    let src_rev = buf[offset..offset + stride].iter().rev();
    for (dst, src) in tgt.zip(src_rev) {
        *dst = src.swap_bytes()
    }
    ctx.target_range = 0..stride * 4;
}

/// Double-buffered 8-bit direct color framebuffer, optionally magnified.
///
/// Horizontal magnification stretches each pixel by increasing the number of
/// CPU cycles per pixel during scanout, so it costs nothing. Vertical
/// magnification repeats each line, which also costs nothing.
pub struct Direct<B> {
    buffers: DoubleBuffer<B>,
    width: usize,
    height: usize,
    scale_x: usize,
    scale_y: usize,
}

impl<B> Direct<B>
where
    B: AsRef<[u32]> + AsMut<[u32]>,
{
    /// Creates a `width` by `height` framebuffer, displayed at `scale_x`
    /// times horizontal and `scale_y` times vertical magnification.
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
        assert!(width % 4 == 0, "direct color width must be a multiple of 4");
        assert!(width <= crate::MAX_PIXELS_PER_LINE);
        assert!(scale_x > 0 && scale_y > 0);
        let words = width / 4 * height;
        assert!(fg.as_ref().len() >= words && bg.as_ref().len() >= words);
        Direct {
            buffers: DoubleBuffer::new(fg, bg),
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

    pub fn flip(&self) {
        self.buffers.flip()
    }

    pub fn flip_now(&self) {
        self.buffers.flip_now()
    }

    pub fn copy_bg_to_fg(&self) {
        self.buffers.copy_bg_to_fg::<u32>()
    }

    /// Locks the background buffer for drawing, viewed as packed words.
    pub fn get_bg_buffer(&self) -> GuardMut<[u32]> {
        GuardMut::map(self.buffers.bg_mut(), |b| b.as_mut())
    }

    /// Locks the background buffer for drawing, one byte per pixel.
    pub fn get_bg_pixels(&self) -> GuardMut<[u8]> {
        GuardMut::map(self.get_bg_buffer(), |words| {
            let len = words.len() * 4;
            // Safety: u8 has weaker alignment than u32, and any bit pattern
            // is valid for both.
            unsafe {
                core::slice::from_raw_parts_mut(
                    words.as_mut_ptr() as *mut u8,
                    len,
                )
            }
        })
    }
}

impl<B> Rasterize for Direct<B>
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
        let src_line = line / self.scale_y;
        if src_line >= self.height {
            return blank_line(ctx);
        }
        let fg = match self.buffers.try_fg() {
            Ok(fg) => fg,
            Err(_) => return blank_line(ctx),
        };
        direct_color(src_line, target, ctx, fg.as_ref(), self.width / 4);
        ctx.cycles_per_pixel *= self.scale_x;
        ctx.repeat_lines = self.scale_y - 1 - line % self.scale_y;
    }

    fn end_of_frame(&self, _: priority::I0) {
        self.buffers.apply_pending_flip();
    }
}
