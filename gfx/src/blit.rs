//! Bit-block transfer between 1bpp bitmaps.
//!
//! Bitmaps are rows of `u32` words, least significant bit leftmost, the same
//! packing the 1bpp rasterizer scans out. Copies are done a word at a time
//! wherever possible; how that works depends on the bit offset of the source
//! and destination within their first words, so each row is copied by one of
//! five routines chosen up front by `Alignment::classify`.

use core::fmt;

/// A read-only 1bpp bitmap.
#[derive(Copy, Clone, Debug)]
pub struct Bitmap<'a> {
    words: &'a [u32],
    width: usize,
    height: usize,
    stride: usize,
}

/// A mutable 1bpp bitmap.
#[derive(Debug)]
pub struct BitmapMut<'a> {
    words: &'a mut [u32],
    width: usize,
    height: usize,
    stride: usize,
}

fn check_shape(len: usize, width: usize, height: usize, stride: usize) {
    assert!(width <= stride * 32, "bitmap wider than its stride");
    assert!(
        stride.checked_mul(height).map_or(false, |n| n <= len),
        "bitmap storage too small"
    );
}

impl<'a> Bitmap<'a> {
    /// Views `words` as `height` rows of `stride` words, of which the
    /// leftmost `width` pixels are used.
    ///
    /// # Panics
    ///
    /// If `width` doesn't fit in `stride` words, or `words` is too short.
    pub fn new(
        words: &'a [u32],
        width: usize,
        height: usize,
        stride: usize,
    ) -> Self {
        check_shape(words.len(), width, height, stride);
        Bitmap {
            words,
            width,
            height,
            stride,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> bool {
        assert!(x < self.width && y < self.height);
        (self.words[y * self.stride + x / 32] >> (x % 32)) & 1 != 0
    }

    fn row(&self, y: usize) -> &'a [u32] {
        &self.words[y * self.stride..(y + 1) * self.stride]
    }
}

impl<'a> BitmapMut<'a> {
    /// Mutable counterpart to `Bitmap::new`.
    ///
    /// # Panics
    ///
    /// If `width` doesn't fit in `stride` words, or `words` is too short.
    pub fn new(
        words: &'a mut [u32],
        width: usize,
        height: usize,
        stride: usize,
    ) -> Self {
        check_shape(words.len(), width, height, stride);
        BitmapMut {
            words,
            width,
            height,
            stride,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Reborrows as a read-only bitmap.
    pub fn as_bitmap(&self) -> Bitmap {
        Bitmap {
            words: &self.words[..],
            width: self.width,
            height: self.height,
            stride: self.stride,
        }
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> bool {
        self.as_bitmap().get_pixel(x, y)
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, value: bool) {
        assert!(x < self.width && y < self.height);
        let w = &mut self.words[y * self.stride + x / 32];
        let bit = 1 << (x % 32);
        if value {
            *w |= bit
        } else {
            *w &= !bit
        }
    }

    fn row_mut(&mut self, y: usize) -> &mut [u32] {
        &mut self.words[y * self.stride..(y + 1) * self.stride]
    }
}

/// A rectangle in pixel coordinates.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Rect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Rect {
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Checks whether this rectangle lies within a `width` by `height` area
    /// anchored at the origin.
    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        let right = self.x.checked_add(self.width);
        let bottom = self.y.checked_add(self.height);
        match (right, bottom) {
            (Some(r), Some(b)) => r <= width && b <= height,
            _ => false,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BlitError {
    SourceOutOfBounds,
    DestinationOutOfBounds,
}

impl fmt::Display for BlitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BlitError::SourceOutOfBounds => f.write_str("source out of bounds"),
            BlitError::DestinationOutOfBounds => {
                f.write_str("destination out of bounds")
            }
        }
    }
}

/// Relationship between the source and destination bit offsets within their
/// first words.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Alignment {
    /// Both start on a word boundary.
    Aligned,
    /// Both start at the same nonzero offset.
    EqualOffset,
    /// The source starts on a word boundary; the destination doesn't.
    SourceAligned,
    /// The destination starts on a word boundary; the source doesn't.
    DestAligned,
    /// Different nonzero offsets.
    Unaligned,
}

impl Alignment {
    pub fn classify(src_x: usize, dst_x: usize) -> Self {
        match (src_x % 32, dst_x % 32) {
            (0, 0) => Alignment::Aligned,
            (s, d) if s == d => Alignment::EqualOffset,
            (0, _) => Alignment::SourceAligned,
            (_, 0) => Alignment::DestAligned,
            _ => Alignment::Unaligned,
        }
    }
}

/// Copies `rect.width` by `rect.height` pixels from `src`, starting at
/// (`src_x`, `src_y`), into `dst` at the position given by `rect`.
///
/// Nothing is written unless the whole rectangle fits within both bitmaps.
/// Pixels in `dst` outside the rectangle, including those sharing a word
/// with its edges, are preserved.
pub fn bitblt(
    src: &Bitmap,
    src_x: usize,
    src_y: usize,
    dst: &mut BitmapMut,
    rect: Rect,
) -> Result<(), BlitError> {
    if rect.is_empty() {
        return Ok(());
    }
    let src_rect = Rect {
        x: src_x,
        y: src_y,
        ..rect
    };
    if !src_rect.fits_within(src.width, src.height) {
        return Err(BlitError::SourceOutOfBounds);
    }
    if !rect.fits_within(dst.width, dst.height) {
        return Err(BlitError::DestinationOutOfBounds);
    }

    let row_fn: fn(&[u32], usize, &mut [u32], usize, usize) =
        match Alignment::classify(src_x, rect.x) {
            Alignment::Aligned => copy_row_aligned,
            Alignment::EqualOffset => copy_row_equal_offset,
            Alignment::SourceAligned => copy_row_source_aligned,
            Alignment::DestAligned => copy_row_dest_aligned,
            Alignment::Unaligned => copy_row_unaligned,
        };

    let (s_word, s_bit) = (src_x / 32, src_x % 32);
    let (d_word, d_bit) = (rect.x / 32, rect.x % 32);
    for r in 0..rect.height {
        let s = &src.row(src_y + r)[s_word..];
        let d = &mut dst.row_mut(rect.y + r)[d_word..];
        row_fn(s, s_bit, d, d_bit, rect.width);
    }
    Ok(())
}

/// Mask covering bits `lo..hi` of a word, `hi <= 32`.
fn mask(lo: usize, hi: usize) -> u32 {
    debug_assert!(lo < hi && hi <= 32);
    let n = hi - lo;
    if n == 32 {
        !0
    } else {
        ((1 << n) - 1) << lo
    }
}

fn merge(dst: &mut u32, value: u32, mask: u32) {
    *dst = (*dst & !mask) | (value & mask)
}

/// Number of words touched by `n` bits starting at `bit` in the first word.
fn words_spanned(bit: usize, n: usize) -> usize {
    (bit + n + 31) / 32
}

/// Reads 32 source bits starting at bit `s` of word `i`, from at most
/// `avail` words.
fn funnel(src: &[u32], i: usize, s: usize, avail: usize) -> u32 {
    let lo = src[i] >> s;
    if i + 1 < avail {
        lo | (src[i + 1] << (32 - s))
    } else {
        lo
    }
}

/// Writes output word `k` of a row whose first pixel lands on bit `d`,
/// masking off whatever lies outside the `n`-pixel span.
fn store(dst: &mut [u32], k: usize, d: usize, n: usize, value: u32) {
    let lo = if k == 0 { d } else { 0 };
    let hi = (d + n - 32 * k).min(32);
    if lo == 0 && hi == 32 {
        dst[k] = value
    } else {
        merge(&mut dst[k], value, mask(lo, hi))
    }
}

/// Both ends word aligned: whole words, then a masked tail.
fn copy_row_aligned(src: &[u32], _: usize, dst: &mut [u32], _: usize, n: usize) {
    let full = n / 32;
    dst[..full].copy_from_slice(&src[..full]);
    let tail = n % 32;
    if tail != 0 {
        merge(&mut dst[full], src[full], mask(0, tail));
    }
}

/// Same bit phase at both ends: source and destination words line up one
/// to one, so only the edge words need masks.
fn copy_row_equal_offset(
    src: &[u32],
    bit: usize,
    dst: &mut [u32],
    _: usize,
    n: usize,
) {
    for k in 0..words_spanned(bit, n) {
        store(dst, k, bit, n, src[k]);
    }
}

/// Source aligned: each source word is shifted into place, its top bits
/// carried into the next destination word.
fn copy_row_source_aligned(
    src: &[u32],
    _: usize,
    dst: &mut [u32],
    d: usize,
    n: usize,
) {
    let avail = words_spanned(0, n);
    let mut carry = 0;
    for k in 0..words_spanned(d, n) {
        let w = if k < avail { src[k] } else { 0 };
        store(dst, k, d, n, (w << d) | carry);
        carry = w >> (32 - d);
    }
}

/// Destination aligned: each destination word is assembled from two
/// adjacent source words.
fn copy_row_dest_aligned(
    src: &[u32],
    s: usize,
    dst: &mut [u32],
    _: usize,
    n: usize,
) {
    let avail = words_spanned(s, n);
    for k in 0..words_spanned(0, n) {
        store(dst, k, 0, n, funnel(src, k, s, avail));
    }
}

/// Neither end aligned: funnel 32 bits out of the source, then shift them
/// into the destination with carry.
fn copy_row_unaligned(
    src: &[u32],
    s: usize,
    dst: &mut [u32],
    d: usize,
    n: usize,
) {
    let avail = words_spanned(s, n);
    let chunks = words_spanned(0, n);
    let mut carry = 0;
    for k in 0..words_spanned(d, n) {
        let w = if k < chunks {
            funnel(src, k, s, avail)
        } else {
            0
        };
        store(dst, k, d, n, (w << d) | carry);
        carry = w >> (32 - d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn rng() -> rand::rngs::SmallRng {
        rand::rngs::SmallRng::seed_from_u64(11181981)
    }

    fn random_words(rng: &mut impl Rng, n: usize) -> Vec<u32> {
        (0..n).map(|_| rng.gen()).collect()
    }

    /// Reference implementation, one pixel at a time.
    fn naive_blt(
        src: &Bitmap,
        sx: usize,
        sy: usize,
        dst: &mut BitmapMut,
        rect: Rect,
    ) {
        for y in 0..rect.height {
            for x in 0..rect.width {
                let v = src.get_pixel(sx + x, sy + y);
                dst.set_pixel(rect.x + x, rect.y + y, v);
            }
        }
    }

    fn check(
        src_words: &[u32],
        src_shape: (usize, usize, usize),
        dst_words: &[u32],
        dst_shape: (usize, usize, usize),
        sx: usize,
        sy: usize,
        rect: Rect,
    ) {
        let (sw, sh, ss) = src_shape;
        let (dw, dh, ds) = dst_shape;
        let src = Bitmap::new(src_words, sw, sh, ss);

        let mut expected = dst_words.to_vec();
        naive_blt(
            &src,
            sx,
            sy,
            &mut BitmapMut::new(&mut expected, dw, dh, ds),
            rect,
        );

        let mut actual = dst_words.to_vec();
        bitblt(
            &src,
            sx,
            sy,
            &mut BitmapMut::new(&mut actual, dw, dh, ds),
            rect,
        )
        .unwrap();

        assert_eq!(
            actual,
            expected,
            "{:?} blit from ({}, {}) to {:?}",
            Alignment::classify(sx, rect.x),
            sx,
            sy,
            rect
        );
    }

    #[test]
    fn classify() {
        assert_eq!(Alignment::classify(0, 64), Alignment::Aligned);
        assert_eq!(Alignment::classify(8, 40), Alignment::EqualOffset);
        assert_eq!(Alignment::classify(32, 8), Alignment::SourceAligned);
        assert_eq!(Alignment::classify(8, 0), Alignment::DestAligned);
        assert_eq!(Alignment::classify(8, 4), Alignment::Unaligned);
    }

    #[test]
    fn random_blits_match_naive_copy() {
        let mut rng = rng();
        let (w, h, stride) = (256, 8, 8);
        for _ in 0..2000 {
            let src = random_words(&mut rng, stride * h);
            let dst = random_words(&mut rng, stride * h);
            let rw = rng.gen_range(1, w);
            let rh = rng.gen_range(1, h);
            let sx = rng.gen_range(0, w - rw + 1);
            let sy = rng.gen_range(0, h - rh + 1);
            let rect = Rect::new(
                rng.gen_range(0, w - rw + 1),
                rng.gen_range(0, h - rh + 1),
                rw,
                rh,
            );
            check(&src, (w, h, stride), &dst, (w, h, stride), sx, sy, rect);
        }
    }

    #[test]
    fn every_offset_pair() {
        let mut rng = rng();
        let src = random_words(&mut rng, 4);
        let dst = random_words(&mut rng, 4);
        for sx in 0..32 {
            for dx in 0..32 {
                for &n in &[1, 7, 31, 32, 33, 64, 95] {
                    check(
                        &src,
                        (128, 1, 4),
                        &dst,
                        (128, 1, 4),
                        sx,
                        0,
                        Rect::new(dx, 0, n, 1),
                    );
                }
            }
        }
    }

    /// The font-to-screen copies the `blt` demo draws, one per alignment
    /// class: a 700x16 strip from a 2048x16 source into an 800x600 screen.
    #[test]
    fn demo_strips() {
        let mut rng = rng();
        let src = random_words(&mut rng, 64 * 16);
        let dst = vec![0; 25 * 600];
        let cases = [
            (0, Rect::new(0, 0, 700, 16), Alignment::Aligned),
            (8, Rect::new(8, 16, 700, 16), Alignment::EqualOffset),
            (0, Rect::new(8, 32, 700, 16), Alignment::SourceAligned),
            (8, Rect::new(0, 48, 700, 16), Alignment::DestAligned),
            (8, Rect::new(4, 64, 700, 16), Alignment::Unaligned),
        ];
        for &(sx, rect, class) in &cases {
            assert_eq!(Alignment::classify(sx, rect.x), class);
            check(&src, (2048, 16, 64), &dst, (800, 600, 25), sx, 0, rect);
        }
    }

    #[test]
    fn edges_of_destination_words_survive() {
        let src = [!0u32; 2];
        let mut dst = [0u32; 2];
        bitblt(
            &Bitmap::new(&src, 64, 1, 2),
            0,
            0,
            &mut BitmapMut::new(&mut dst, 64, 1, 2),
            Rect::new(4, 0, 8, 1),
        )
        .unwrap();
        assert_eq!(dst, [0xFF0, 0]);
    }

    #[test]
    fn out_of_bounds_touches_nothing() {
        let src = [!0u32; 4];
        let mut dst = [0u32; 4];
        let s = Bitmap::new(&src, 64, 2, 2);
        let mut d = BitmapMut::new(&mut dst, 64, 2, 2);

        assert_eq!(
            bitblt(&s, 1, 0, &mut d, Rect::new(0, 0, 64, 1)),
            Err(BlitError::SourceOutOfBounds)
        );
        assert_eq!(
            bitblt(&s, 0, 0, &mut d, Rect::new(0, 1, 8, 2)),
            Err(BlitError::DestinationOutOfBounds)
        );
        assert_eq!(
            bitblt(&s, 0, 0, &mut d, Rect::new(usize::max_value(), 0, 2, 1)),
            Err(BlitError::DestinationOutOfBounds)
        );
        assert_eq!(dst, [0; 4]);
    }

    #[test]
    fn empty_rect_is_a_no_op() {
        let src = [!0u32; 1];
        let mut dst = [0u32; 1];
        let s = Bitmap::new(&src, 32, 1, 1);
        let mut d = BitmapMut::new(&mut dst, 32, 1, 1);
        assert_eq!(bitblt(&s, 0, 0, &mut d, Rect::new(100, 100, 0, 5)), Ok(()));
        assert_eq!(dst, [0]);
    }
}
