//! Per-line dispatch over a band list.
//!
//! The raster interrupt owns a `Dispatch` for the duration of a frame. Each
//! call to `rasterize_line` produces the next visible line by finding the
//! band it falls in and asking that band's rasterizer for pixels, or by
//! skipping the rasterizer entirely when the previous line asked to be
//! repeated.

use crate::band::{Band, MAX_BANDS};
use crate::priority;
use crate::rast::{blank_line, RasterCtx, TargetBuffer};

/// Most zero-length bands passed over in one step. A list with a cycle of
/// empty bands would otherwise hang the raster interrupt.
pub const MAX_BAND_SKIP: usize = MAX_BANDS;

/// Position within a band list.
#[derive(Clone, Debug)]
pub struct BandCursor<'a> {
    band: Option<&'a Band<'a>>,
    /// Lines left in `band`, including the current one. Captured on entry
    /// to the band, so resizing a band takes effect the next time through.
    remaining: usize,
    /// Line number within `band`.
    line: usize,
}

impl<'a> BandCursor<'a> {
    /// Positions a cursor at the first line of the first non-empty band.
    pub fn start(head: Option<&'a Band<'a>>) -> Self {
        let mut c = BandCursor {
            band: head,
            remaining: 0,
            line: 0,
        };
        c.enter_band();
        c
    }

    /// Skips zero-length bands starting at `self.band` and loads the line
    /// count of the first non-empty one.
    fn enter_band(&mut self) {
        self.line = 0;
        for _ in 0..MAX_BAND_SKIP {
            match self.band {
                None => break,
                Some(b) => {
                    let n = b.line_count();
                    if n > 0 {
                        self.remaining = n;
                        return;
                    }
                    self.band = b.next();
                }
            }
        }
        self.band = None;
        self.remaining = 0;
    }

    /// The band under the cursor and the line within it, or `None` if the
    /// list has run out.
    pub fn current(&self) -> Option<(&'a Band<'a>, usize)> {
        self.band.map(|b| (b, self.line))
    }

    /// Lines left in the current band, counting the current one.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Moves to the next line, crossing into the next non-empty band if this
    /// one is used up. Does nothing once the list has run out.
    pub fn advance(&mut self) {
        let band = match self.band {
            Some(b) => b,
            None => return,
        };
        self.remaining -= 1;
        if self.remaining == 0 {
            self.band = band.next();
            self.enter_band();
        } else {
            self.line += 1;
        }
    }
}

/// What `Dispatch::rasterize_line` did.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineOutcome {
    /// A rasterizer drew the line.
    Rasterized,
    /// The previous line is to be shown again; nothing was called and the
    /// target and context are untouched.
    Repeated,
    /// The line is black, because its band is blank or the list ran out.
    Blank,
    /// Not a line that needs rasterizing; reported by the pipeline outside
    /// active video.
    Idle,
}

/// Band list dispatcher, walking a list one line at a time.
#[derive(Clone, Debug)]
pub struct Dispatch<'a> {
    cursor: BandCursor<'a>,
    /// Repeats still owed by the last rasterized line.
    repeats: usize,
}

impl<'a> Dispatch<'a> {
    pub fn new(head: Option<&'a Band<'a>>) -> Self {
        Dispatch {
            cursor: BandCursor::start(head),
            repeats: 0,
        }
    }

    pub fn cursor(&self) -> &BandCursor<'a> {
        &self.cursor
    }

    /// Produces the next line.
    ///
    /// Unless the line is a repeat, `ctx` is reset first, with
    /// `cycles_per_pixel` as the native horizontal resolution. A rasterizer's
    /// `repeat_lines` request is cut short at the end of its band, and the
    /// clamped value is left in `ctx`.
    #[cfg_attr(target_os = "none", link_section = ".ramcode")]
    pub fn rasterize_line(
        &mut self,
        cycles_per_pixel: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        p: priority::I0,
    ) -> LineOutcome {
        if self.repeats > 0 {
            self.repeats -= 1;
            self.cursor.advance();
            return LineOutcome::Repeated;
        }

        *ctx = RasterCtx::for_cycles_per_pixel(cycles_per_pixel);

        let (band, line) = match self.cursor.current() {
            Some(c) => c,
            None => {
                blank_line(ctx);
                return LineOutcome::Blank;
            }
        };
        let rest_of_band = self.cursor.remaining() - 1;

        let outcome = match band.rasterizer() {
            Some(r) => {
                r.rasterize(line, target, ctx, p);
                LineOutcome::Rasterized
            }
            None => {
                blank_line(ctx);
                ctx.repeat_lines = rest_of_band;
                LineOutcome::Blank
            }
        };

        self.repeats = ctx.repeat_lines.min(rest_of_band);
        ctx.repeat_lines = self.repeats;
        self.cursor.advance();
        outcome
    }
}
