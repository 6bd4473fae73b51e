//! Reader/writer locks that never wait.
//!
//! A `ReadWriteLock` admits any number of readers *or* one writer. The raster
//! interrupt only ever reads framebuffers, and the application only writes to
//! the one that isn't on screen, so in the common case the two never contend.
//! When they do, the interrupt gets `Unavailable` and draws nothing for that
//! line.
//!
//! The lock state is a single signed count, as in `RefCell`: positive for that
//! many readers, `-1` for a writer, zero for free.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicIsize, Ordering};

const FREE: isize = 0;
const WRITER: isize = -1;

pub struct ReadWriteLock<T: ?Sized> {
    status: AtomicIsize,
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send + Sync> Sync for ReadWriteLock<T> {}

impl<T> ReadWriteLock<T> {
    pub const fn new(value: T) -> Self {
        ReadWriteLock {
            status: AtomicIsize::new(FREE),
            value: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

/// A read lock could not be taken because the lock is held for writing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TryLockError {
    Unavailable,
}

impl fmt::Display for TryLockError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("lock held for writing")
    }
}

/// A write lock could not be taken because the lock is held at all.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TryLockMutError {
    Unavailable,
}

impl fmt::Display for TryLockMutError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("lock held")
    }
}

impl<T: ?Sized> ReadWriteLock<T> {
    /// Moves the status from any value accepted by `admit` to that value plus
    /// `delta`. Retries only when preempted by another lock operation between
    /// the load and the exchange.
    fn acquire(&self, admit: fn(isize) -> bool, delta: isize) -> bool {
        let mut status = self.status.load(Ordering::Relaxed);
        loop {
            if !admit(status) {
                return false;
            }
            match self.status.compare_exchange_weak(
                status,
                status + delta,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(now) => status = now,
            }
        }
    }

    /// Takes a read lock unless a writer holds the lock.
    pub fn try_lock(&self) -> Result<Guard<T>, TryLockError> {
        if self.acquire(can_add_reader, 1) {
            Ok(Guard {
                _release: ReadRelease(&self.status),
                // Safety: with a reader counted, no `&mut` can be made until
                // the count drops back.
                value: unsafe { &*self.value.get() },
            })
        } else {
            Err(TryLockError::Unavailable)
        }
    }

    /// Takes a read lock, spinning as needed. Thread mode only.
    pub fn lock(&self) -> Guard<T> {
        loop {
            if let Ok(g) = self.try_lock() {
                return g;
            }
            core::hint::spin_loop()
        }
    }

    /// Takes the write lock if nobody holds the lock at all.
    pub fn try_lock_mut(&self) -> Result<GuardMut<T>, TryLockMutError> {
        if self.acquire(|s| s == FREE, WRITER) {
            Ok(GuardMut {
                _release: WriteRelease(&self.status),
                // Safety: the status is now WRITER, which shuts out every
                // other guard.
                value: unsafe { &mut *self.value.get() },
            })
        } else {
            Err(TryLockMutError::Unavailable)
        }
    }

    /// Takes the write lock, spinning as needed. Thread mode only.
    pub fn lock_mut(&self) -> GuardMut<T> {
        loop {
            if let Ok(g) = self.try_lock_mut() {
                return g;
            }
            core::hint::spin_loop()
        }
    }

    /// Gets at the contents through an exclusive reference, which needs no
    /// locking at all.
    pub fn get_mut(&mut self) -> &mut T {
        // Safety: &mut self proves there are no guards.
        unsafe { &mut *self.value.get() }
    }
}

/// A reader can join unless there's a writer (negative) or the count is
/// saturated. As unsigned, those cases are one contiguous range.
fn can_add_reader(status: isize) -> bool {
    (status as usize) < isize::max_value() as usize
}

/// Shared access to the contents of a `ReadWriteLock`.
pub struct Guard<'a, T: ?Sized> {
    _release: ReadRelease<'a>,
    value: &'a T,
}

struct ReadRelease<'a>(&'a AtomicIsize);

impl<'a> Drop for ReadRelease<'a> {
    fn drop(&mut self) {
        let was = self.0.fetch_sub(1, Ordering::Release);
        debug_assert!(was > 0, "read release without readers");
    }
}

/// Exclusive access to the contents of a `ReadWriteLock`.
pub struct GuardMut<'a, T: ?Sized> {
    _release: WriteRelease<'a>,
    value: &'a mut T,
}

struct WriteRelease<'a>(&'a AtomicIsize);

impl<'a> Drop for WriteRelease<'a> {
    fn drop(&mut self) {
        let was = self.0.swap(FREE, Ordering::Release);
        debug_assert_eq!(was, WRITER);
    }
}

impl<'a, T: ?Sized> Guard<'a, T> {
    /// Narrows a read guard to part of what it protects.
    pub fn map<U: ?Sized>(
        guard: Guard<'a, T>,
        f: impl FnOnce(&T) -> &U,
    ) -> Guard<'a, U> {
        Guard {
            value: f(guard.value),
            _release: guard._release,
        }
    }
}

impl<'a, T: ?Sized> GuardMut<'a, T> {
    /// Narrows a write guard to part of what it protects.
    pub fn map<U: ?Sized>(
        guard: GuardMut<'a, T>,
        f: impl FnOnce(&mut T) -> &mut U,
    ) -> GuardMut<'a, U> {
        let GuardMut { _release, value } = guard;
        GuardMut {
            _release,
            value: f(value),
        }
    }
}

impl<'a, T: ?Sized> Deref for Guard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<'a, T: ?Sized> Deref for GuardMut<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<'a, T: ?Sized> DerefMut for GuardMut<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_share() {
        let lock = ReadWriteLock::new([1u32, 2, 3]);
        let a = lock.try_lock().unwrap();
        let b = lock.try_lock().unwrap();
        assert_eq!(a[1], b[1]);
        assert!(lock.try_lock_mut().is_err());
        drop(a);
        assert!(lock.try_lock_mut().is_err());
        drop(b);
        assert!(lock.try_lock_mut().is_ok());
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = ReadWriteLock::new(0usize);
        let mut w = lock.try_lock_mut().unwrap();
        *w = 12;
        assert_eq!(lock.try_lock().err(), Some(TryLockError::Unavailable));
        assert_eq!(
            lock.try_lock_mut().err(),
            Some(TryLockMutError::Unavailable)
        );
        drop(w);
        assert_eq!(*lock.try_lock().unwrap(), 12);
    }

    #[test]
    fn map_to_unsized() {
        let lock = ReadWriteLock::new([0u32; 4]);
        {
            let mut s: GuardMut<[u32]> =
                GuardMut::map(lock.lock_mut(), |a| &mut a[..]);
            s[3] = 7;
            assert!(lock.try_lock().is_err());
        }
        let g = Guard::map(lock.lock(), |a| &a[2..]);
        assert_eq!(&*g, &[0, 7]);
        drop(g);
        assert_eq!(lock.into_inner(), [0, 0, 0, 7]);
    }

    #[test]
    fn saturated_readers_are_refused() {
        assert!(can_add_reader(0));
        assert!(can_add_reader(5));
        assert!(!can_add_reader(WRITER));
        assert!(!can_add_reader(isize::max_value()));
    }
}
