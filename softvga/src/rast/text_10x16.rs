//! Attributed text in 10x16 pixel character cells.
//!
//! Each cell is eight pixels of glyph followed by two pixels of background,
//! so an 8-pixel-wide font gets a little breathing room. Glyphs come from a
//! font laid out as 16 rows of 256 bytes: byte `c` of row `r` holds row `r` of
//! character `c`, least significant bit on the left.

use core::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use crate::priority;
use crate::rast::{blank_line, Pixel, RasterCtx, Rasterize, TargetBuffer};
use crate::util::rw_lock::{GuardMut, ReadWriteLock};

pub const GLYPH_COLS: usize = 10;
pub const GLYPH_ROWS: usize = 16;
pub const FONT_CHARS: usize = 256;

/// Largest horizontal adjustment, in either direction. Past this, moving a
/// whole column is the better tool.
pub const MAX_X_ADJ: isize = GLYPH_COLS as isize - 1;

/// A font in the layout this rasterizer expects.
pub type FontRows = [[u8; FONT_CHARS]; GLYPH_ROWS];

/// An attributed character: the character in the low byte, then the
/// background color, then the foreground color.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[repr(transparent)]
pub struct AChar(u32);

impl AChar {
    /// Makes an attributed character with black foreground and background.
    pub const fn from_ascii_char(c: u8) -> Self {
        AChar(c as u32)
    }

    pub const fn with_foreground(self, color: Pixel) -> Self {
        AChar((self.0 & !0xFF_0000) | (color as u32) << 16)
    }

    pub const fn with_background(self, color: Pixel) -> Self {
        AChar((self.0 & !0xFF00) | (color as u32) << 8)
    }

    pub const fn ascii_char(self) -> u8 {
        self.0 as u8
    }

    pub const fn foreground(self) -> Pixel {
        (self.0 >> 16) as u8
    }

    pub const fn background(self) -> Pixel {
        (self.0 >> 8) as u8
    }
}

/// Draws one row of glyph pixels for each cell in `src`.
///
/// # Panics
///
/// If `target` is shorter than `src.len() * GLYPH_COLS`.
#[cfg_attr(target_os = "none", link_section = ".ramcode")]
pub fn unpack(src: &[AChar], font_row: &[u8; FONT_CHARS], target: &mut [Pixel]) {
    let target = &mut target[..src.len() * GLYPH_COLS];
    for (cell, dst) in src.iter().zip(target.chunks_exact_mut(GLYPH_COLS)) {
        let bits = font_row[usize::from(cell.ascii_char())];
        let (fg, bg) = (cell.foreground(), cell.background());
        for (i, px) in dst[..8].iter_mut().enumerate() {
            *px = if (bits >> i) & 1 != 0 { fg } else { bg };
        }
        dst[8] = bg;
        dst[9] = bg;
    }
}

/// A `cols` by `rows` grid of attributed characters.
pub struct Text10x16<'a, B> {
    chars: ReadWriteLock<B>,
    font: &'a FontRows,
    cols: usize,
    rows: usize,
    hide_right: bool,
    x_adj: AtomicIsize,
    scroll: AtomicUsize,
}

impl<'a, B> Text10x16<'a, B> {
    /// Leaves the rightmost column off the display. Combined with `x_adj`,
    /// this hides the column that's scrolling into view.
    pub fn with_hide_right(self) -> Self {
        Text10x16 {
            hide_right: true,
            ..self
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Shifts the text right (positive) or left (negative) by up to
    /// `MAX_X_ADJ` pixels. Larger values are clamped.
    pub fn set_x_adj(&self, x_adj: isize) {
        let x_adj = x_adj.max(-MAX_X_ADJ).min(MAX_X_ADJ);
        self.x_adj.store(x_adj, Ordering::Relaxed)
    }

    pub fn x_adj(&self) -> isize {
        self.x_adj.load(Ordering::Relaxed)
    }

    /// Sets the number of pixel lines the text is scrolled up by. Text
    /// scrolled off the top reappears at the bottom.
    pub fn set_scroll(&self, lines: usize) {
        self.scroll.store(lines, Ordering::Relaxed)
    }

    pub fn scroll(&self) -> usize {
        self.scroll.load(Ordering::Relaxed)
    }
}

impl<'a, B> Text10x16<'a, B>
where
    B: AsRef<[AChar]> + AsMut<[AChar]>,
{
    /// # Panics
    ///
    /// If `buf` holds fewer than `cols * rows` cells, or `cols` columns won't
    /// fit in a target buffer with room for adjustment.
    pub fn new(font: &'a FontRows, buf: B, cols: usize, rows: usize) -> Self {
        assert!(buf.as_ref().len() >= cols * rows);
        assert!(
            (cols + 1) * GLYPH_COLS <= crate::rast::TARGET_BUFFER_SIZE,
            "too many text columns"
        );
        Text10x16 {
            chars: ReadWriteLock::new(buf),
            font,
            cols,
            rows,
            hide_right: false,
            x_adj: AtomicIsize::new(0),
            scroll: AtomicUsize::new(0),
        }
    }

    /// Locks the character grid for editing. Rows being scanned out while
    /// this is held come out blank.
    pub fn lock_chars(&self) -> GuardMut<[AChar]> {
        GuardMut::map(self.chars.lock_mut(), |b| &mut b.as_mut()[..])
    }

    /// Stores `c` at (`row`, `col`).
    ///
    /// # Panics
    ///
    /// If the position is outside the grid.
    pub fn put_char(&self, row: usize, col: usize, c: AChar) {
        assert!(row < self.rows && col < self.cols);
        self.lock_chars()[row * self.cols + col] = c;
    }

    /// Fills every cell with `c`.
    pub fn clear_framebuffer(&self, c: AChar) {
        let n = self.cols * self.rows;
        for cell in &mut self.lock_chars()[..n] {
            *cell = c;
        }
    }
}

impl<'a, B> Rasterize for Text10x16<'a, B>
where
    B: AsRef<[AChar]> + Send + Sync,
{
    #[cfg_attr(target_os = "none", link_section = ".ramcode")]
    fn rasterize(
        &self,
        line: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        _: priority::I0,
    ) {
        let text_lines = self.rows * GLYPH_ROWS;
        if line >= text_lines {
            return blank_line(ctx);
        }
        let line = (line + self.scroll() % text_lines) % text_lines;
        let (text_row, row_in_glyph) = (line / GLYPH_ROWS, line % GLYPH_ROWS);

        let chars = match self.chars.try_lock() {
            Ok(c) => c,
            Err(_) => return blank_line(ctx),
        };
        let offset = text_row * self.cols;
        let src = &chars.as_ref()[offset..offset + self.cols];
        let font_row = &self.font[row_in_glyph];
        let text_pixels = self.cols * GLYPH_COLS;

        let width = if self.hide_right {
            text_pixels.saturating_sub(GLYPH_COLS)
        } else {
            text_pixels
        };

        // The output is always `width` pixels; x_adj only moves the text
        // within it, and margins take the background of the nearest cell.
        let x_adj = self.x_adj();
        let start = if x_adj >= 0 {
            let shift = x_adj as usize;
            if let Some(first) = src.first() {
                for px in &mut target[..shift] {
                    *px = first.background();
                }
            }
            unpack(src, font_row, &mut target[shift..shift + text_pixels]);
            0
        } else {
            let skip = (-x_adj) as usize;
            unpack(src, font_row, &mut target[..text_pixels]);
            let end = skip + width;
            if let Some(last) = src.last() {
                for px in &mut target[text_pixels..end.max(text_pixels)] {
                    *px = last.background();
                }
            }
            skip
        };
        ctx.target_range = start..start + width;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rast::test_util::raster_line;

    const FG: Pixel = 0b11_11_11;
    const BG: Pixel = 0b00_00_01;

    /// A font where `#` is a vertical bar in pixel 0 on every row, and `X`
    /// has pixels 1 and 3 on row 2 only.
    fn test_font() -> FontRows {
        let mut f = [[0; FONT_CHARS]; GLYPH_ROWS];
        for row in f.iter_mut() {
            row[usize::from(b'#')] = 0b1;
        }
        f[2][usize::from(b'X')] = 0b1010;
        f
    }

    fn ch(c: u8) -> AChar {
        AChar::from_ascii_char(c)
            .with_foreground(FG)
            .with_background(BG)
    }

    #[test]
    fn achar_packing() {
        let c = AChar::from_ascii_char(b'A')
            .with_background(0x12)
            .with_foreground(0x34)
            .with_background(0x56);
        assert_eq!(c.ascii_char(), b'A');
        assert_eq!(c.background(), 0x56);
        assert_eq!(c.foreground(), 0x34);
    }

    #[test]
    fn unpack_cells() {
        let font = test_font();
        let mut out = [0xAA; 20];
        unpack(&[ch(b'X'), ch(b'#')], &font[2], &mut out);
        assert_eq!(
            &out[..10],
            &[BG, FG, BG, FG, BG, BG, BG, BG, BG, BG]
        );
        assert_eq!(out[10], FG);
        assert!(out[11..].iter().all(|&p| p == BG));
    }

    #[test]
    fn rows_and_blank_below() {
        let font = test_font();
        let t = Text10x16::new(&font, [ch(b' '); 4], 2, 2);
        t.put_char(1, 1, ch(b'#'));
        let (ctx, px) = raster_line(&t, 16 + 5);
        assert_eq!(ctx.target_range, 0..20);
        assert_eq!(px[10], FG);
        assert_eq!(px.iter().filter(|&&p| p == FG).count(), 1);

        let (ctx, _) = raster_line(&t, 32);
        assert!(ctx.target_range.is_empty());
    }

    #[test]
    fn x_adj_shifts_and_clamps() {
        let font = test_font();
        let t = Text10x16::new(&font, [ch(b'#'); 2], 2, 1);

        t.set_x_adj(3);
        let (ctx, px) = raster_line(&t, 0);
        assert_eq!(ctx.target_range, 0..20);
        assert_eq!(&px[..4], &[BG, BG, BG, FG]);

        t.set_x_adj(-4);
        let (ctx, px) = raster_line(&t, 0);
        assert_eq!(ctx.target_range, 4..24);
        // The bar in column 1 is 6 pixels from the left edge.
        assert_eq!(px[6], FG);
        // The right margin opened up by the shift is background.
        assert_eq!(&px[16..], &[BG; 4]);

        t.set_x_adj(100);
        assert_eq!(t.x_adj(), MAX_X_ADJ);
        t.set_x_adj(-100);
        assert_eq!(t.x_adj(), -MAX_X_ADJ);
    }

    #[test]
    fn line_width_ignores_x_adj() {
        let font = test_font();
        let t = Text10x16::new(&font, [ch(b'X'); 3], 3, 1);
        let widths: Vec<usize> = [0, -3, 5, -MAX_X_ADJ]
            .iter()
            .map(|&adj| {
                t.set_x_adj(adj);
                raster_line(&t, 2).0.target_range.len()
            })
            .collect();
        assert_eq!(widths, vec![30, 30, 30, 30]);

        let t = t.with_hide_right();
        t.set_x_adj(-3);
        let (ctx, _) = raster_line(&t, 2);
        assert_eq!(ctx.target_range, 3..23);
    }

    #[test]
    fn hide_right_trims_a_column() {
        let font = test_font();
        let t = Text10x16::new(&font, [ch(b'#'); 3], 3, 1).with_hide_right();
        let (ctx, _) = raster_line(&t, 0);
        assert_eq!(ctx.target_range, 0..20);
    }

    #[test]
    fn scroll_wraps() {
        let font = test_font();
        let t = Text10x16::new(&font, [ch(b' '); 2], 1, 2);
        t.put_char(0, 0, ch(b'X'));
        t.set_scroll(16);
        // Row 0 now appears second.
        let (_, px) = raster_line(&t, 16 + 2);
        assert_eq!(px[1], FG);
        let (_, px) = raster_line(&t, 2);
        assert!(px.iter().all(|&p| p == BG));
    }

    #[test]
    fn clear_fills_every_cell() {
        let font = test_font();
        let t = Text10x16::new(&font, [AChar::default(); 6], 3, 2);
        t.clear_framebuffer(ch(b'#'));
        assert!(t.lock_chars().iter().all(|&c| c == ch(b'#')));
    }

    #[test]
    fn blank_while_app_holds_chars() {
        let font = test_font();
        let t = Text10x16::new(&font, [ch(b'#'); 1], 1, 1);
        let hold = t.lock_chars();
        let (ctx, _) = raster_line(&t, 0);
        assert!(ctx.target_range.is_empty());
        drop(hold);
    }
}
