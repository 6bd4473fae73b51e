//! 1bpp bitmap graphics.
//!
//! This crate is deliberately architecture-independent to allow for testing
//! on the host. The one hardware-specific trick, bit-banding, is only used
//! when a buffer is known to live in the bit-band region.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod bit;
pub mod blit;

use core::mem::swap;
use core::ops::DerefMut;

use blit::{Bitmap, BitmapMut, BlitError, Rect};

/// Walks a line from `(x0, y0)` to `(x1, y1)` inclusive, calling `plot` for
/// each pixel. Lines are always walked top to bottom; both endpoints are
/// plotted, so a zero-length line plots one pixel.
pub fn walk_line(
    mut x0: usize,
    mut y0: usize,
    mut x1: usize,
    mut y1: usize,
    mut plot: impl FnMut(usize, usize),
) {
    if y0 > y1 {
        swap(&mut y0, &mut y1);
        swap(&mut x0, &mut x1);
    }

    let dx = x1 as isize - x0 as isize; // may be negative
    let dy = (y1 - y0) as isize;
    let x_adv = if dx < 0 { -1 } else { 1 };
    let dx = dx.abs();

    let (mut x, mut y) = (x0 as isize, y0 as isize);
    plot(x0, y0);

    if dx > dy {
        let mut error = 2 * dy - dx;
        for _ in 0..dx {
            if error >= 0 {
                y += 1;
                error -= 2 * dx;
            }
            error += 2 * dy;
            x += x_adv;
            plot(x as usize, y as usize);
        }
    } else {
        let mut error = 2 * dx - dy;
        for _ in 0..dy {
            if error >= 0 {
                x += x_adv;
                error -= 2 * dy;
            }
            error += 2 * dx;
            y += 1;
            plot(x as usize, y as usize);
        }
    }
}

/// A drawing surface over a 1bpp buffer of `height` rows of `width / 32`
/// words each, LSB leftmost.
pub struct Graphics1<S> {
    buf: S,
    width: usize,
    height: usize,
}

impl<S> Graphics1<S>
where
    S: DerefMut<Target = [u32]>,
{
    /// # Panics
    ///
    /// If `width` isn't a multiple of 32 or `buf` is too small.
    pub fn new(buf: S, width: usize, height: usize) -> Self {
        assert!(width % 32 == 0, "1bpp width must be a multiple of 32");
        assert!(buf.len() >= width / 32 * height, "buffer too small");
        Graphics1 { buf, width, height }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn stride(&self) -> usize {
        self.width / 32
    }

    fn locate(&self, x: usize, y: usize) -> (usize, u32) {
        assert!(
            x < self.width && y < self.height,
            "pixel ({}, {}) out of bounds",
            x,
            y
        );
        (y * self.stride() + x / 32, 1 << (x % 32))
    }

    pub fn set_pixel(&mut self, x: usize, y: usize) {
        let (i, bit) = self.locate(x, y);
        self.buf[i] |= bit;
    }

    pub fn clear_pixel(&mut self, x: usize, y: usize) {
        let (i, bit) = self.locate(x, y);
        self.buf[i] &= !bit;
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> bool {
        let (i, bit) = self.locate(x, y);
        self.buf[i] & bit != 0
    }

    fn fill(&mut self, value: u32) {
        let n = self.stride() * self.height;
        for w in &mut self.buf[..n] {
            *w = value;
        }
    }

    /// Clears every pixel to the background.
    pub fn clear_all(&mut self) {
        self.fill(0)
    }

    /// Sets every pixel to the foreground.
    pub fn set_all(&mut self) {
        self.fill(!0)
    }

    /// Sets the pixels of a line from `(x0, y0)` to `(x1, y1)`, inclusive.
    ///
    /// # Panics
    ///
    /// If either end is off the surface.
    pub fn draw_line(&mut self, x0: usize, y0: usize, x1: usize, y1: usize) {
        self.locate(x0, y0);
        self.locate(x1, y1);

        let width = self.width;
        let n = self.stride() * self.height;
        let words = &mut self.buf[..n];

        if cfg!(target_os = "none") && bit::is_bit_band_target(words) {
            let bits = bit::as_bits_mut(words);
            walk_line(x0, y0, x1, y1, |x, y| bits[y * width + x].set());
        } else {
            let stride = width / 32;
            walk_line(x0, y0, x1, y1, |x, y| {
                words[y * stride + x / 32] |= 1 << (x % 32)
            });
        }
    }

    /// Views the surface as a bitmap, for use with `blit::bitblt`.
    pub fn as_bitmap_mut(&mut self) -> BitmapMut {
        let (w, h, stride) = (self.width, self.height, self.stride());
        BitmapMut::new(&mut self.buf[..stride * h], w, h, stride)
    }

    /// Copies a rectangle of `src`, with its top left at `(src_x, src_y)`,
    /// onto this surface at `dst`.
    pub fn bitblt(
        &mut self,
        src: &Bitmap,
        src_x: usize,
        src_y: usize,
        dst: Rect,
    ) -> Result<(), BlitError> {
        blit::bitblt(src, src_x, src_y, &mut self.as_bitmap_mut(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(w: usize, h: usize) -> Graphics1<Vec<u32>> {
        Graphics1::new(vec![0; w / 32 * h], w, h)
    }

    fn check_line(g: &Graphics1<Vec<u32>>, pred: impl Fn(usize, usize) -> bool) {
        for y in 0..g.height() {
            for x in 0..g.width() {
                assert_eq!(
                    g.get_pixel(x, y),
                    pred(x, y),
                    "pixel ({}, {})",
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn zero_length() {
        let mut g = surface(32, 2);
        g.draw_line(5, 1, 5, 1);
        check_line(&g, |x, y| (x, y) == (5, 1));
    }

    #[test]
    fn horizontal_full() {
        let mut g = surface(96, 96);
        g.draw_line(0, 0, 95, 0);
        check_line(&g, |_, y| y == 0);
    }

    #[test]
    fn vertical_full() {
        let mut g = surface(96, 96);
        g.draw_line(0, 95, 0, 0);
        check_line(&g, |x, _| x == 0);
    }

    #[test]
    fn diagonals() {
        let mut g = surface(96, 96);
        g.draw_line(0, 0, 95, 95);
        check_line(&g, |x, y| x == y);

        let mut g = surface(96, 96);
        g.draw_line(95, 0, 0, 95);
        check_line(&g, |x, y| x + y == 95);
    }

    #[test]
    fn shallow_line_is_connected() {
        let mut g = surface(64, 8);
        g.draw_line(0, 0, 63, 7);
        for x in 0..64 {
            let set = (0..8).filter(|&y| g.get_pixel(x, y)).count();
            assert_eq!(set, 1, "column {}", x);
        }
        assert!(g.get_pixel(0, 0) && g.get_pixel(63, 7));
    }

    #[test]
    #[should_panic]
    fn line_off_surface() {
        surface(32, 32).draw_line(0, 0, 0, 32);
    }

    #[test]
    fn pixels_and_fills() {
        let mut g = surface(64, 2);
        g.set_pixel(33, 1);
        assert!(g.get_pixel(33, 1));
        assert_eq!(g.buf[3], 0b10);
        g.clear_pixel(33, 1);
        assert!(!g.get_pixel(33, 1));

        g.set_all();
        assert!(g.buf.iter().all(|&w| w == !0));
        g.clear_all();
        assert!(g.buf.iter().all(|&w| w == 0));
    }

    #[test]
    fn blit_onto_surface() {
        let src = [0xF0u32];
        let mut g = surface(64, 1);
        g.bitblt(&Bitmap::new(&src, 32, 1, 1), 4, 0, Rect::new(34, 0, 8, 1))
            .unwrap();
        assert_eq!(g.buf[1], 0b11_1100);
    }
}
