//! Band lists: dividing the screen vertically among rasterizers.
//!
//! A band is a run of consecutive scanlines drawn by one rasterizer (or left
//! blank). Bands link into a singly linked list, top to bottom. The links are
//! atomic pointers that own nothing, so a list can be built from bands that
//! live anywhere: statics, the stack, an arena. The driver only ever borrows
//! a list for the duration of `with_band_list`.
//!
//! Line counts are atomic too, which lets the application resize bands while
//! the list is on screen (for wipe effects, say). Changes made outside of
//! vertical blanking may tear.

use core::fmt;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::rast::Rasterize;

/// Longest band list the driver will walk. Anything longer is assumed to be a
/// cycle and is cut off here.
pub const MAX_BANDS: usize = 64;

pub struct Band<'a> {
    rasterizer: Option<&'a dyn Rasterize>,
    line_count: AtomicUsize,
    next: AtomicPtr<Band<'a>>,
}

impl<'a> Band<'a> {
    /// Creates an unlinked band of `line_count` lines drawn by `rasterizer`.
    pub fn new(rasterizer: &'a dyn Rasterize, line_count: usize) -> Self {
        Band {
            rasterizer: Some(rasterizer),
            line_count: AtomicUsize::new(line_count),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Creates an unlinked band of `line_count` black lines.
    pub const fn blank(line_count: usize) -> Self {
        Band {
            rasterizer: None,
            line_count: AtomicUsize::new(line_count),
            next: AtomicPtr::new(ptr::null_mut()),
        }
    }

    pub fn rasterizer(&self) -> Option<&'a dyn Rasterize> {
        self.rasterizer
    }

    pub fn line_count(&self) -> usize {
        self.line_count.load(Ordering::Relaxed)
    }

    pub fn set_line_count(&self, n: usize) {
        self.line_count.store(n, Ordering::Relaxed)
    }

    /// Makes `next` follow this band.
    pub fn link(&self, next: &'a Band<'a>) {
        self.next
            .store(next as *const Band<'a> as *mut _, Ordering::Release)
    }

    /// Makes this band the end of its list.
    pub fn unlink(&self) {
        self.next.store(ptr::null_mut(), Ordering::Release)
    }

    pub fn next(&self) -> Option<&'a Band<'a>> {
        let p = self.next.load(Ordering::Acquire);
        // Safety: the only non-null values ever stored come from `link`, which
        // requires a reference valid for 'a.
        unsafe { p.as_ref() }
    }
}

impl<'a> fmt::Debug for Band<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Band")
            .field("blank", &self.rasterizer.is_none())
            .field("line_count", &self.line_count())
            .field("linked", &!self.next.load(Ordering::Relaxed).is_null())
            .finish()
    }
}

/// Links `bands` into a list in slice order and returns its head, or `None`
/// if the slice is empty.
pub fn link_slice<'a>(bands: &'a [Band<'a>]) -> Option<&'a Band<'a>> {
    for pair in bands.windows(2) {
        pair[0].link(&pair[1]);
    }
    let last = bands.last()?;
    last.unlink();
    bands.first()
}

/// Iterates over the bands of a list, stopping after `MAX_BANDS`.
pub fn iter<'a>(head: Option<&'a Band<'a>>) -> Iter<'a> {
    Iter {
        next: head,
        remaining: MAX_BANDS,
    }
}

pub struct Iter<'a> {
    next: Option<&'a Band<'a>>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Band<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let band = self.next?;
        self.remaining -= 1;
        self.next = band.next();
        Some(band)
    }
}

/// Sums the line counts of a list.
pub fn total_lines<'a>(head: Option<&'a Band<'a>>) -> usize {
    iter(head).map(Band::line_count).sum()
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BandError {
    /// The list's line counts don't add up to the display height.
    Coverage { expected: usize, actual: usize },
    /// The list is longer than `MAX_BANDS`, or loops back on itself.
    TooManyBands,
}

impl fmt::Display for BandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BandError::Coverage { expected, actual } => write!(
                f,
                "band list covers {} lines, display has {}",
                actual, expected
            ),
            BandError::TooManyBands => {
                write!(f, "band list longer than {} bands", MAX_BANDS)
            }
        }
    }
}

/// Checks that a list covers exactly `expected` lines.
///
/// An empty list (`None`) is fine: it means "blank the display."
pub fn check_coverage<'a>(
    head: Option<&'a Band<'a>>,
    expected: usize,
) -> Result<(), BandError> {
    if head.is_none() {
        return Ok(());
    }
    let mut it = iter(head);
    let actual: usize = it.by_ref().map(Band::line_count).sum();
    if it.next.is_some() {
        log::warn!("band list truncated at {} bands", MAX_BANDS);
        return Err(BandError::TooManyBands);
    }
    if actual != expected {
        log::warn!("band list covers {} of {} lines", actual, expected);
        return Err(BandError::Coverage { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rast::solid_color::SolidColor;

    static RED: SolidColor = SolidColor::new(0b00_00_11, 800);

    #[test]
    fn link_slice_in_order() {
        let bands = [Band::new(&RED, 10), Band::blank(0), Band::new(&RED, 20)];
        let head = link_slice(&bands);
        let counts: Vec<usize> = iter(head).map(Band::line_count).collect();
        assert_eq!(counts, vec![10, 0, 20]);
        assert!(iter(head).nth(1).and_then(Band::rasterizer).is_none());
        assert_eq!(total_lines(head), 30);
        assert!(link_slice(&[]).is_none());
    }

    #[test]
    fn coverage() {
        let bands = [Band::new(&RED, 100), Band::blank(500)];
        let head = link_slice(&bands);
        assert_eq!(check_coverage(head, 600), Ok(()));
        assert_eq!(
            check_coverage(head, 480),
            Err(BandError::Coverage {
                expected: 480,
                actual: 600
            })
        );
        bands[1].set_line_count(380);
        assert_eq!(check_coverage(head, 480), Ok(()));
        assert_eq!(check_coverage(None, 480), Ok(()));
    }

    #[test]
    fn cycles_are_bounded() {
        let a = Band::blank(1);
        let b = Band::blank(1);
        a.link(&b);
        b.link(&a);
        assert_eq!(total_lines(Some(&a)), MAX_BANDS);
        assert_eq!(
            check_coverage(Some(&a), MAX_BANDS),
            Err(BandError::TooManyBands)
        );
    }
}
