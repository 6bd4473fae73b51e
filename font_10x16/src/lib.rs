//! The 8x16 glyph table used by 10x16 text mode.
//!
//! Glyphs are the public domain 8x8 font from `font8x8` with every row
//! doubled, stored rows-first: byte `c` of row `r` is row `r` of character
//! `c`, leftmost pixel in the least significant bit. Text rasterizers fetch a
//! whole row of the table per scanline and index it by character.

#![cfg_attr(not(test), no_std)]

use font8x8::legacy::{BASIC_LEGACY, LATIN_LEGACY};

pub const GLYPH_ROWS: usize = 16;
pub const CHARS: usize = 256;

/// First character covered by the Latin-1 supplement block.
const LATIN_FIRST: usize = 0xA0;

/// Glyph table, word aligned so it can also serve as a 1bpp bitmap.
#[repr(align(4))]
pub struct Font([[u8; CHARS]; GLYPH_ROWS]);

impl Font {
    const fn build() -> Self {
        let mut rows = [[0; CHARS]; GLYPH_ROWS];
        let mut r = 0;
        while r < GLYPH_ROWS {
            let mut c = 0;
            while c < BASIC_LEGACY.len() {
                rows[r][c] = BASIC_LEGACY[c][r / 2];
                c += 1;
            }
            let mut c = 0;
            while c < LATIN_LEGACY.len() {
                rows[r][LATIN_FIRST + c] = LATIN_LEGACY[c][r / 2];
                c += 1;
            }
            r += 1;
        }
        Font(rows)
    }

    pub fn as_glyph_slices(&self) -> &[[u8; CHARS]; GLYPH_ROWS] {
        &self.0
    }

    /// Views the table as a `CHARS * 8` by `GLYPH_ROWS` 1bpp bitmap, one row
    /// of `CHARS / 4` words per glyph row.
    pub fn as_words(&self) -> &[u32] {
        // Safety: the table is 4-byte aligned, a multiple of 4 bytes long, and
        // any bit pattern is a valid u32.
        unsafe {
            core::slice::from_raw_parts(
                self.0.as_ptr() as *const u32,
                CHARS * GLYPH_ROWS / 4,
            )
        }
    }
}

/// Static image of the 10x16 font.
#[cfg_attr(all(feature = "ram-font", target_os = "none"), link_section = ".data")]
pub static FONT: Font = Font::build();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_doubled() {
        let rows = FONT.as_glyph_slices();
        for r in 0..GLYPH_ROWS {
            assert_eq!(rows[r][usize::from(b'A')], BASIC_LEGACY[0x41][r / 2]);
        }
        assert_eq!(rows[4][0xE9], LATIN_LEGACY[0xE9 - LATIN_FIRST][2]);
    }

    #[test]
    fn uncovered_characters_are_blank() {
        let rows = FONT.as_glyph_slices();
        for c in 0x80..LATIN_FIRST {
            assert!(rows.iter().all(|row| row[c] == 0));
        }
        assert!(rows.iter().all(|row| row[usize::from(b' ')] == 0));
    }

    #[test]
    fn word_view() {
        let words = FONT.as_words();
        assert_eq!(words.as_ptr() as usize % 4, 0);
        assert_eq!(words.len(), 1024);
        // Character 'A' is byte 1 of word 0x10 in each row.
        let row = 3;
        let w = words[row * 64 + 0x41 / 4];
        assert_eq!((w >> 8) as u8, FONT.as_glyph_slices()[row][0x41]);
    }
}
