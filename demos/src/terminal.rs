//! Terminal-style typing onto a text rasterizer.

use softvga::rast::text_10x16::{AChar, Text10x16};
use softvga::Pixel;

/// A cursor over a `Text10x16` grid.
///
/// Typing past the end of a row wraps to the next; typing past the last row
/// wraps to the top.
pub struct Terminal<'t, 'f, B> {
    text: &'t Text10x16<'f, B>,
    row: usize,
    col: usize,
}

impl<'t, 'f, B> Terminal<'t, 'f, B>
where
    B: AsRef<[AChar]> + AsMut<[AChar]>,
{
    pub fn new(text: &'t Text10x16<'f, B>) -> Self {
        Terminal {
            text,
            row: 0,
            col: 0,
        }
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// Moves the cursor, clamping to the grid.
    pub fn cursor_to(&mut self, row: usize, col: usize) {
        self.row = row.min(self.text.rows() - 1);
        self.col = col.min(self.text.cols() - 1);
    }

    /// Puts `c` at the cursor and advances, with no control characters.
    pub fn type_raw(&mut self, fore: Pixel, back: Pixel, c: u8) {
        self.text.put_char(
            self.row,
            self.col,
            AChar::from_ascii_char(c)
                .with_foreground(fore)
                .with_background(back),
        );
        self.col += 1;
        if self.col == self.text.cols() {
            self.col = 0;
            self.row += 1;
            if self.row == self.text.rows() {
                self.row = 0;
            }
        }
    }

    /// Types `c`, interpreting `\r` and `\n` (both clear to the end of the
    /// row and move to the next), `\x08` (backspace) and `\x0C` (clear
    /// screen).
    pub fn type_char(&mut self, fore: Pixel, back: Pixel, c: u8) {
        match c {
            b'\r' | b'\n' => loop {
                self.type_raw(fore, back, b' ');
                if self.col == 0 {
                    break;
                }
            },
            0x0C => {
                self.text.clear_framebuffer(
                    AChar::from_ascii_char(b' ')
                        .with_foreground(fore)
                        .with_background(back),
                );
                self.cursor_to(0, 0);
            }
            0x08 => {
                if self.col > 0 {
                    self.col -= 1;
                    self.type_raw(fore, back, b' ');
                    self.col -= 1;
                }
            }
            _ => self.type_raw(fore, back, c),
        }
    }

    pub fn type_str(&mut self, fore: Pixel, back: Pixel, s: &[u8]) {
        for &c in s {
            self.type_char(fore, back, c)
        }
    }

    /// Types `s` starting at (`row`, `col`).
    pub fn text_at(
        &mut self,
        row: usize,
        col: usize,
        fore: Pixel,
        back: Pixel,
        s: &[u8],
    ) {
        self.cursor_to(row, col);
        self.type_str(fore, back, s)
    }

    /// Replaces `row` with `s` centered on a background of `back`.
    pub fn text_centered(
        &mut self,
        row: usize,
        fore: Pixel,
        back: Pixel,
        s: &[u8],
    ) {
        let cols = self.text.cols();
        let s = &s[..s.len().min(cols)];
        let left = cols / 2 - s.len() / 2;
        let right = cols - s.len() - left;

        self.cursor_to(row, 0);
        for _ in 0..left {
            self.type_raw(fore, back, b' ');
        }
        self.type_str(fore, back, s);
        for _ in 0..right {
            self.type_raw(fore, back, b' ');
        }
    }

    /// Types `s` with each character in a different color, on its
    /// complement.
    pub fn rainbow_type(&mut self, s: &[u8]) {
        for (x, &c) in s.iter().enumerate() {
            let x = x as Pixel;
            self.type_char(x & 0b11_11_11, !x & 0b11_11_11, c);
        }
    }
}

impl<'t, 'f, B> core::fmt::Write for Terminal<'t, 'f, B>
where
    B: AsRef<[AChar]> + AsMut<[AChar]>,
{
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.bytes() {
            self.type_char(0b11_11_11, 0, c);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use font_10x16::FONT;

    fn grid(cols: usize, rows: usize) -> Text10x16<'static, Vec<AChar>> {
        Text10x16::new(
            FONT.as_glyph_slices(),
            vec![AChar::default(); cols * rows],
            cols,
            rows,
        )
    }

    fn row_text(t: &Text10x16<Vec<AChar>>, row: usize) -> String {
        let cols = t.cols();
        t.lock_chars()[row * cols..(row + 1) * cols]
            .iter()
            .map(|c| c.ascii_char() as char)
            .collect()
    }

    #[test]
    fn typing_wraps_rows_and_screen() {
        let t = grid(4, 2);
        let mut term = Terminal::new(&t);
        term.type_str(1, 2, b"abcdefg");
        assert_eq!(row_text(&t, 0), "abcd");
        assert_eq!(row_text(&t, 1), "efg\0");
        assert_eq!(term.cursor(), (1, 3));
        term.type_str(1, 2, b"hi");
        assert_eq!(row_text(&t, 0), "ibcd");
        assert_eq!(term.cursor(), (0, 1));

        let c = t.lock_chars()[0];
        assert_eq!((c.foreground(), c.background()), (1, 2));
    }

    #[test]
    fn control_characters() {
        let t = grid(5, 3);
        let mut term = Terminal::new(&t);
        term.type_str(7, 0, b"ab\ncd\x08\x08e");
        assert_eq!(row_text(&t, 0), "ab   ");
        assert_eq!(row_text(&t, 1), "e \0\0\0");
        assert_eq!(term.cursor(), (1, 1));

        term.type_char(7, 3, 0x0C);
        assert_eq!(term.cursor(), (0, 0));
        assert!(t.lock_chars().iter().all(|c| c.ascii_char() == b' '
            && c.background() == 3));
    }

    #[test]
    fn backspace_at_start_of_row_does_nothing() {
        let t = grid(3, 1);
        let mut term = Terminal::new(&t);
        term.type_char(1, 0, 0x08);
        assert_eq!(term.cursor(), (0, 0));
        assert_eq!(row_text(&t, 0), "\0\0\0");
    }

    #[test]
    fn centered_text() {
        let t = grid(10, 2);
        let mut term = Terminal::new(&t);
        term.text_centered(1, 1, 0, b"abc");
        assert_eq!(row_text(&t, 1), "    abc   ");
        // Too long for the row: truncated rather than wrapped.
        term.text_centered(0, 1, 0, b"0123456789AB");
        assert_eq!(row_text(&t, 0), "0123456789");
    }

    #[test]
    fn cursor_is_clamped() {
        let t = grid(10, 4);
        let mut term = Terminal::new(&t);
        term.cursor_to(99, 99);
        assert_eq!(term.cursor(), (3, 9));
        term.text_at(2, 8, 1, 0, b"xy");
        assert_eq!(&row_text(&t, 2)[8..], "xy");
    }

    #[test]
    fn rainbow() {
        let t = grid(4, 1);
        let mut term = Terminal::new(&t);
        term.rainbow_type(b"wxyz");
        let chars = t.lock_chars();
        for (i, c) in chars.iter().enumerate() {
            assert_eq!(c.foreground(), i as u8);
            assert_eq!(c.background(), !(i as u8) & 0x3F);
        }
    }

    #[test]
    fn formatting() {
        use core::fmt::Write;
        let t = grid(8, 1);
        let mut term = Terminal::new(&t);
        write!(term, "n={}", 42).unwrap();
        assert_eq!(row_text(&t, 0), "n=42\0\0\0\0");
    }
}
