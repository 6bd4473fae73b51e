//! Non-blocking mutual exclusion for sharing between interrupt handlers and
//! the application.
//!
//! On a single core, a lock held by preempted code can never be released
//! while the preempting handler waits for it, so handlers must not wait.
//! `SpinLock::try_lock` therefore fails instead of blocking. The driver uses a
//! failure as a sign of a bug (two handlers fighting over hardware) or as a
//! cue to skip some work, never as something to retry from an interrupt.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

/// A `T` that can be locked by one context at a time.
#[derive(Debug)]
pub struct SpinLock<T: ?Sized> {
    held: AtomicBool,
    value: UnsafeCell<T>,
}

unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(value: T) -> Self {
        SpinLock {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpinLockError {
    /// Somebody else holds the lock.
    Contended,
}

impl fmt::Display for SpinLockError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("spinlock contended")
    }
}

impl<T: ?Sized + Send> SpinLock<T> {
    /// Takes the lock if it is free.
    pub fn try_lock(&self) -> Result<SpinLockGuard<T>, SpinLockError> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| SpinLockError::Contended)?;
        Ok(SpinLockGuard {
            release: Release(&self.held),
            // Safety: the flag transition above is ours alone, so this is the
            // only reference until `release` drops.
            value: unsafe { &mut *self.value.get() },
        })
    }

    /// Takes the lock, spinning until it is free. Only for use from thread
    /// mode, against holders that will eventually run.
    pub fn lock(&self) -> SpinLockGuard<T> {
        loop {
            if let Ok(guard) = self.try_lock() {
                return guard;
            }
            core::hint::spin_loop()
        }
    }

    /// Checks whether the lock is currently held, without taking it.
    pub fn is_locked(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

/// Access to the contents of a locked `SpinLock`. The lock is released when
/// this is dropped.
#[must_use = "if dropped, the spinlock will immediately unlock"]
#[derive(Debug)]
pub struct SpinLockGuard<'a, T: ?Sized> {
    release: Release<'a>,
    value: &'a mut T,
}

/// Clears the held flag on drop. Kept apart from the guard, which has no
/// `Drop` impl of its own and so can be taken apart by `map`.
#[derive(Debug)]
struct Release<'a>(&'a AtomicBool);

impl<'a> Drop for Release<'a> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release)
    }
}

impl<'a, T: ?Sized> SpinLockGuard<'a, T> {
    /// Narrows a guard to part of what it protects. The lock stays held until
    /// the new guard is dropped.
    pub fn map<U: ?Sized>(
        guard: SpinLockGuard<'a, T>,
        f: impl FnOnce(&mut T) -> &mut U,
    ) -> SpinLockGuard<'a, U> {
        let SpinLockGuard { release, value } = guard;
        SpinLockGuard {
            release,
            value: f(value),
        }
    }
}

impl<'a, T: ?Sized> Deref for SpinLockGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<'a, T: ?Sized> DerefMut for SpinLockGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive() {
        let lock = SpinLock::new(3);
        let mut g = lock.try_lock().unwrap();
        assert_eq!(lock.try_lock().unwrap_err(), SpinLockError::Contended);
        *g += 1;
        drop(g);
        assert_eq!(*lock.try_lock().unwrap(), 4);
    }

    #[test]
    fn map_keeps_lock() {
        let lock = SpinLock::new((1, Some(2)));
        let g = SpinLockGuard::map(lock.try_lock().unwrap(), |t| &mut t.1);
        assert!(lock.is_locked());
        assert_eq!(*g, Some(2));
        drop(g);
        assert!(!lock.is_locked());
    }

    #[test]
    fn lock_when_free() {
        let lock = SpinLock::new(Some(1u8));
        *lock.lock() = None;
        assert_eq!(*lock.lock(), None);
    }
}
