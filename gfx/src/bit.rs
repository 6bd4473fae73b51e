//! SRAM bit-banding.
//!
//! On the Cortex-M3/M4 the first 32 MiB of SRAM (the bit-band "target") is
//! mirrored, one bit per word, into the bit-band alias region. Writing a
//! word in the alias sets or clears one bit of the target with a single
//! store, which is how `Graphics1` plots pixels without read-modify-write.
//!
//! Nothing here touches memory on its own; the address arithmetic is testable
//! on the host.

use core::mem::size_of;

/// A word in the bit-band alias region. Only its LSB is implemented, so it
/// behaves as a `bool` with the size and alignment of a `u32`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[repr(transparent)]
pub struct BandBit(u32);

impl BandBit {
    pub fn set(&mut self) {
        self.0 = 1
    }

    pub fn clear(&mut self) {
        self.0 = 0
    }

    pub fn get(&self) -> bool {
        self.0 & 1 != 0
    }
}

/// Types whose every bit pattern is a valid value, so that flipping
/// individual bits through the alias region can't produce garbage.
///
/// # Safety
///
/// Only implement this for plain integers and transparent wrappers around
/// them.
pub unsafe trait BitSafe: Copy {}

unsafe impl BitSafe for u8 {}
unsafe impl BitSafe for u16 {}
unsafe impl BitSafe for u32 {}
unsafe impl BitSafe for usize {}

const TARGET_BASE: usize = 0x2000_0000;
const TARGET_SIZE: usize = 0x0200_0000;
const ALIAS_BASE: usize = TARGET_BASE + TARGET_SIZE;

/// Byte range of `slice`, or `None` if it wraps the address space.
fn byte_range<T>(slice: &[T]) -> Option<(usize, usize)> {
    let start = slice.as_ptr() as usize;
    let end = start.checked_add(slice.len() * size_of::<T>())?;
    Some((start, end))
}

fn in_target(start: usize, end: usize) -> bool {
    start >= TARGET_BASE && end < ALIAS_BASE
}

/// Checks whether `slice` lies entirely within the bit-band target region.
pub fn is_bit_band_target<T: BitSafe>(slice: &[T]) -> bool {
    byte_range(slice).map_or(false, |(s, e)| in_target(s, e))
}

/// Projects `slice` into the alias region: one `BandBit` per bit, in
/// ascending address order. Writes through the result change the original,
/// which stays borrowed for as long as the projection exists.
///
/// # Panics
///
/// If `slice` is not within the bit-band target region.
pub fn as_bits_mut<T: BitSafe>(slice: &mut [T]) -> &mut [BandBit] {
    let range = byte_range(slice);
    let (start, end) = match range {
        Some((s, e)) if in_target(s, e) => (s, e),
        _ => panic!("slice {:x?} not in bit-band target region", range),
    };
    let alias = ALIAS_BASE + (start - TARGET_BASE) * 32;
    let bits = (end - start) * 8;
    // Safety: the alias words for `slice` exist iff `slice` is in the target
    // region, which we just checked, and the exclusive borrow of `slice`
    // keeps anyone else from touching the same bits.
    unsafe { core::slice::from_raw_parts_mut(alias as *mut BandBit, bits) }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Projects a fake slice at `addr` and returns the alias address and
    /// length without ever dereferencing either.
    fn project<T: BitSafe>(addr: usize, count: usize) -> (usize, usize) {
        let fake: &mut [T] =
            unsafe { core::slice::from_raw_parts_mut(addr as *mut T, count) };
        let bits = as_bits_mut(fake);
        (bits.as_ptr() as usize, bits.len())
    }

    #[test]
    fn words_project_to_32_bits_each() {
        assert_eq!(project::<u32>(TARGET_BASE, 12), (ALIAS_BASE, 12 * 32));
        assert_eq!(
            project::<u32>(TARGET_BASE + 96, 2),
            (ALIAS_BASE + 96 * 32, 64)
        );
    }

    #[test]
    fn bytes_project_to_8_bits_each() {
        assert_eq!(
            project::<u8>(TARGET_BASE + 3, 12),
            (ALIAS_BASE + 3 * 32, 12 * 8)
        );
    }

    #[test]
    fn region_edges() {
        let fake = |addr: usize, n: usize| unsafe {
            core::slice::from_raw_parts(addr as *const u8, n)
        };
        assert!(is_bit_band_target(fake(TARGET_BASE, 16)));
        assert!(!is_bit_band_target(fake(TARGET_BASE - 1, 16)));
        assert!(!is_bit_band_target(fake(ALIAS_BASE - 8, 16)));
        assert!(!is_bit_band_target(fake(ALIAS_BASE, 1)));
    }

    #[test]
    #[should_panic]
    fn outside_target_panics() {
        project::<u8>(TARGET_BASE, TARGET_SIZE + 1);
    }

    #[test]
    fn band_bit() {
        let mut b = BandBit::default();
        assert!(!b.get());
        b.set();
        assert!(b.get());
        b.clear();
        assert!(!b.get());
    }
}
