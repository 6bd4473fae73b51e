//! Bump allocation with whole-arena reset.
//!
//! Scenes allocate framebuffers, text grids and band lists out of an `Arena`
//! and throw it all away at once when the scene changes. Allocation is a
//! pointer bump. There is no per-object free.
//!
//! An `arena::Box` does *not* run its contents' destructor when dropped.
//! Values with drop glue instead get an entry on the arena's cleanup list, and
//! `reset` runs those in reverse allocation order before rewinding. `reset`
//! takes `&mut self`, so it can't happen while any `Box` is still around.

use core::cell::{Cell, RefCell};
use core::fmt;
use core::marker::PhantomData;
use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr::{self, NonNull};
use core::slice;

use arrayvec::ArrayVec;

/// Most values with destructors that can be live in one arena at once.
pub const MAX_CLEANUPS: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ArenaError {
    /// Not enough room left. Both counts are in bytes; `available` is what
    /// remained before alignment padding.
    Exhausted { requested: usize, available: usize },
    /// The cleanup list is full.
    TooManyDestructors,
}

impl fmt::Display for ArenaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArenaError::Exhausted {
                requested,
                available,
            } => write!(
                f,
                "arena exhausted: {} bytes requested, {} available",
                requested, available
            ),
            ArenaError::TooManyDestructors => write!(
                f,
                "more than {} arena values need dropping",
                MAX_CLEANUPS
            ),
        }
    }
}

/// Deferred drop of `len` values of some type starting at `ptr`.
struct Cleanup {
    ptr: *mut u8,
    len: usize,
    drop: unsafe fn(*mut u8, usize),
}

unsafe fn drop_slice<T>(ptr: *mut u8, len: usize) {
    ptr::drop_in_place(slice::from_raw_parts_mut(ptr as *mut T, len))
}

pub struct Arena<'mem> {
    base: *mut u8,
    limit: *mut u8,
    next: Cell<*mut u8>,
    cleanups: RefCell<ArrayVec<[Cleanup; MAX_CLEANUPS]>>,
    _mem: PhantomData<&'mem mut [u8]>,
}

impl<'mem> Arena<'mem> {
    /// Creates an arena that allocates out of `mem`.
    pub fn new(mem: &'mem mut [u8]) -> Self {
        let range = mem.as_mut_ptr_range();
        // Safety: the range comes from a slice we hold exclusively for 'mem.
        unsafe { Self::from_pointers(range.start, range.end) }
    }

    /// Creates an arena over the memory from `base` up to (not including)
    /// `limit`.
    ///
    /// # Safety
    ///
    /// The memory must be valid for reads and writes, and not otherwise
    /// accessed, for `'mem`.
    pub unsafe fn from_pointers(base: *mut u8, limit: *mut u8) -> Self {
        assert!(limit >= base);
        Arena {
            base,
            limit,
            next: Cell::new(base),
            cleanups: RefCell::new(ArrayVec::new()),
            _mem: PhantomData,
        }
    }

    /// Bytes handed out so far, including alignment padding.
    pub fn used(&self) -> usize {
        self.next.get() as usize - self.base as usize
    }

    pub fn capacity(&self) -> usize {
        self.limit as usize - self.base as usize
    }

    pub fn remaining(&self) -> usize {
        self.limit as usize - self.next.get() as usize
    }

    /// Runs pending destructors, newest first, and rewinds to empty.
    pub fn reset(&mut self) {
        log::debug!(
            "arena reset: {} of {} bytes used, {} cleanups",
            self.used(),
            self.capacity(),
            self.cleanups.get_mut().len()
        );
        self.run_cleanups();
        self.next.set(self.base)
    }

    fn run_cleanups(&mut self) {
        let cleanups = self.cleanups.get_mut();
        while let Some(c) = cleanups.pop() {
            // Safety: each entry describes initialized values that nothing
            // can reference any more, since we have `&mut self`.
            unsafe { (c.drop)(c.ptr, c.len) }
        }
    }

    /// Reserves room for `len` values of `T` and, if `T` needs dropping, a
    /// cleanup entry. Returns uninitialized storage.
    fn reserve<T>(&self, len: usize) -> Result<*mut T, ArenaError> {
        if mem::needs_drop::<T>() && self.cleanups.borrow().is_full() {
            return Err(ArenaError::TooManyDestructors);
        }
        let available = self.remaining();
        let exhausted = |requested| ArenaError::Exhausted {
            requested,
            available,
        };
        let bytes = mem::size_of::<T>()
            .checked_mul(len)
            .ok_or(exhausted(usize::max_value()))?;

        let next = self.next.get() as usize;
        let align = mem::align_of::<T>();
        let start = next
            .checked_add(align - 1)
            .ok_or(exhausted(bytes))?
            & !(align - 1);
        let end = start.checked_add(bytes).ok_or(exhausted(bytes))?;
        if end > self.limit as usize {
            return Err(exhausted(bytes));
        }
        self.next.set(self.base.wrapping_add(end - self.base as usize));
        Ok(self.base.wrapping_add(start - self.base as usize) as *mut T)
    }

    /// Records that `len` values at `p` need dropping at reset. `reserve`
    /// already made sure there's room.
    fn register<T>(&self, p: *mut T, len: usize) {
        if mem::needs_drop::<T>() {
            let _ = self.cleanups.borrow_mut().try_push(Cleanup {
                ptr: p as *mut u8,
                len,
                drop: drop_slice::<T>,
            });
        }
    }

    pub fn try_alloc<T: 'mem>(&self, value: T) -> Result<Box<T>, ArenaError> {
        let p = self.reserve::<T>(1)?;
        // Safety: `reserve` returned aligned, unused storage for one T.
        unsafe {
            p.write(value);
            self.register(p, 1);
            Ok(Box::from_raw(p))
        }
    }

    pub fn try_alloc_default<T: Default + 'mem>(
        &self,
    ) -> Result<Box<T>, ArenaError> {
        self.try_alloc(T::default())
    }

    pub fn try_alloc_slice_default<T: Default + 'mem>(
        &self,
        len: usize,
    ) -> Result<Box<[T]>, ArenaError> {
        self.try_alloc_slice_with(len, |_| T::default())
    }

    pub fn try_alloc_slice_copy<T: Copy + 'mem>(
        &self,
        src: &[T],
    ) -> Result<Box<[T]>, ArenaError> {
        let p = self.reserve::<T>(src.len())?;
        // Safety: storage is fresh and sized for `src`; T is Copy, so no
        // drop glue to register.
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), p, src.len());
            Ok(Box::from_raw_slice(p, src.len()))
        }
    }

    pub fn try_alloc_slice_fill<T: Clone + 'mem>(
        &self,
        len: usize,
        value: T,
    ) -> Result<Box<[T]>, ArenaError> {
        self.try_alloc_slice_with(len, |_| value.clone())
    }

    fn try_alloc_slice_with<T: 'mem>(
        &self,
        len: usize,
        mut f: impl FnMut(usize) -> T,
    ) -> Result<Box<[T]>, ArenaError> {
        let p = self.reserve::<T>(len)?;
        // Safety: storage is fresh and sized for `len` values; all are
        // written before the cleanup is registered.
        unsafe {
            for i in 0..len {
                p.add(i).write(f(i));
            }
            self.register(p, len);
            Ok(Box::from_raw_slice(p, len))
        }
    }

    /// Like `try_alloc`, but running out of room is fatal.
    ///
    /// # Panics
    ///
    /// If the arena is exhausted or has too many destructors registered.
    pub fn alloc<T: 'mem>(&self, value: T) -> Box<T> {
        unwrap_alloc(self.try_alloc(value))
    }

    pub fn alloc_default<T: Default + 'mem>(&self) -> Box<T> {
        unwrap_alloc(self.try_alloc_default())
    }

    pub fn alloc_slice_default<T: Default + 'mem>(&self, len: usize) -> Box<[T]> {
        unwrap_alloc(self.try_alloc_slice_default(len))
    }

    pub fn alloc_slice_copy<T: Copy + 'mem>(&self, src: &[T]) -> Box<[T]> {
        unwrap_alloc(self.try_alloc_slice_copy(src))
    }

    pub fn alloc_slice_fill<T: Clone + 'mem>(&self, len: usize, value: T) -> Box<[T]> {
        unwrap_alloc(self.try_alloc_slice_fill(len, value))
    }
}

impl<'mem> Drop for Arena<'mem> {
    fn drop(&mut self) {
        self.run_cleanups()
    }
}

fn unwrap_alloc<T>(r: Result<T, ArenaError>) -> T {
    match r {
        Ok(b) => b,
        Err(e) => panic!("{}", e),
    }
}

/// Owning pointer into an arena.
///
/// Dropping a `Box` does nothing. Its contents are dropped when the arena is
/// reset.
pub struct Box<'arena, T: ?Sized>(NonNull<T>, PhantomData<&'arena mut T>);

unsafe impl<'arena, T: ?Sized + Send> Send for Box<'arena, T> {}
unsafe impl<'arena, T: ?Sized + Sync> Sync for Box<'arena, T> {}

impl<'arena, T> Box<'arena, T> {
    unsafe fn from_raw(p: *mut T) -> Self {
        Box(NonNull::new_unchecked(p), PhantomData)
    }
}

impl<'arena, T> Box<'arena, [T]> {
    unsafe fn from_raw_slice(p: *mut T, len: usize) -> Self {
        let s: *mut [T] = slice::from_raw_parts_mut(p, len);
        Box(NonNull::new_unchecked(s), PhantomData)
    }
}

impl<'arena, T: ?Sized> Box<'arena, T> {
    /// Gives up ownership, returning a reference that lasts as long as the
    /// arena borrow.
    pub fn leak(b: Self) -> &'arena mut T {
        // Safety: the Box was the only reference, and it's consumed.
        unsafe { &mut *b.0.as_ptr() }
    }
}

impl<'arena, T: ?Sized> Deref for Box<'arena, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.0.as_ref() }
    }
}

impl<'arena, T: ?Sized> DerefMut for Box<'arena, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { self.0.as_mut() }
    }
}

impl<'arena, T: ?Sized> AsRef<T> for Box<'arena, T> {
    fn as_ref(&self) -> &T {
        self
    }
}

impl<'arena, T: ?Sized> AsMut<T> for Box<'arena, T> {
    fn as_mut(&mut self) -> &mut T {
        self
    }
}

impl<'arena, T: ?Sized + fmt::Debug> fmt::Debug for Box<'arena, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        (**self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[derive(Clone)]
    struct Noisy<'a>(u32, &'a StdRefCell<Vec<u32>>);

    impl<'a> Drop for Noisy<'a> {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.0)
        }
    }

    #[test]
    fn reset_rewinds_to_base() {
        let mut mem = [0u8; 64];
        let mut arena = Arena::new(&mut mem);
        let first = {
            let b = arena.alloc(7u32);
            &*b as *const u32
        };
        arena.alloc_slice_fill(5, 1u16);
        assert!(arena.used() >= 14);
        arena.reset();
        assert_eq!(arena.used(), 0);
        assert_eq!(arena.remaining(), 64);
        let again = arena.alloc(9u32);
        assert_eq!(&*again as *const u32, first);
    }

    #[test]
    fn exhaustion_is_deterministic() {
        let mut mem = [0u8; 16];
        let mut arena = Arena::new(&mut mem);
        for _ in 0..2 {
            let a = arena.alloc_slice_default::<u8>(10);
            assert_eq!(a.len(), 10);
            assert_eq!(
                arena.try_alloc_slice_default::<u8>(7).map(|_| ()),
                Err(ArenaError::Exhausted {
                    requested: 7,
                    available: 6
                })
            );
            assert!(arena.try_alloc_slice_default::<u8>(6).is_ok());
            assert_eq!(arena.remaining(), 0);
            arena.reset();
        }
    }

    #[test]
    fn alignment() {
        let mut mem = [0u8; 64];
        let arena = Arena::new(&mut mem);
        arena.alloc(1u8);
        let w = arena.alloc(0xDEAD_BEEFu32);
        assert_eq!(&*w as *const u32 as usize % 4, 0);
        assert_eq!(*w, 0xDEAD_BEEF);
    }

    #[test]
    fn copy_and_fill() {
        let mut mem = [0u8; 64];
        let arena = Arena::new(&mut mem);
        let c = arena.alloc_slice_copy(&[1u32, 2, 3]);
        let f = arena.alloc_slice_fill(2, 'x');
        assert_eq!(&*c, &[1, 2, 3]);
        assert_eq!(&*f, &['x', 'x']);
    }

    #[test]
    fn drops_run_at_reset_newest_first() {
        let log = StdRefCell::new(vec![]);
        let mut mem = [0u8; 256];
        let mut arena = Arena::new(&mut mem);
        {
            let a = arena.alloc(Noisy(1, &log));
            let _b = arena.alloc_slice_fill(2, Noisy(2, &log));
            let c = arena.alloc(Noisy(3, &log));
            drop(a);
            drop(c);
        }
        // Only the temporary passed to `alloc_slice_fill` has dropped.
        assert_eq!(*log.borrow(), vec![2]);
        arena.reset();
        assert_eq!(*log.borrow(), vec![2, 3, 2, 2, 1]);
        arena.reset();
        assert_eq!(log.borrow().len(), 5);
    }

    #[test]
    fn drops_run_when_arena_goes_away() {
        let log = StdRefCell::new(vec![]);
        let mut mem = [0u8; 64];
        {
            let arena = Arena::new(&mut mem);
            arena.alloc(Noisy(4, &log));
        }
        assert_eq!(*log.borrow(), vec![4]);
    }

    #[test]
    fn too_many_destructors() {
        let log = StdRefCell::new(vec![]);
        let mut mem = [0u8; 4096];
        let arena = Arena::new(&mut mem);
        for i in 0..MAX_CLEANUPS {
            arena.alloc(Noisy(i as u32, &log));
        }
        assert_eq!(
            arena.try_alloc(Noisy(99, &log)).map(|_| ()),
            Err(ArenaError::TooManyDestructors)
        );
        // Plain data doesn't need a cleanup.
        assert!(arena.try_alloc(5u64).is_ok());
    }

    #[test]
    fn leak_outlives_box() {
        let mut mem = [0u8; 16];
        let arena = Arena::new(&mut mem);
        let r: &mut u32 = Box::leak(arena.alloc(1));
        *r += 1;
        assert_eq!(*r, 2);
    }

    #[test]
    fn zero_sized() {
        let mut mem = [0u8; 0];
        let arena = Arena::new(&mut mem);
        let b = arena.alloc_slice_default::<()>(1000);
        assert_eq!(b.len(), 1000);
        assert_eq!(arena.used(), 0);
    }

    #[test]
    #[should_panic(expected = "arena exhausted")]
    fn alloc_panics_when_full() {
        let mut mem = [0u8; 4];
        let arena = Arena::new(&mut mem);
        arena.alloc([0u8; 5]);
    }
}
