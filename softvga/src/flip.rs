//! Double-buffering and flip control.
//!
//! A `DoubleBuffer` holds two framebuffers of any type `B`. One is the
//! *foreground*, read by the raster interrupt during scanout; the other is the
//! *background*, which the application draws into. Roles are swapped by
//! flipping an index, never by copying.
//!
//! Both slots live behind `ReadWriteLock`s. The interrupt only ever *tries* to
//! read-lock the foreground; if the application is (incorrectly) holding it,
//! the interrupt draws a blank line and moves on.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::util::rw_lock::{
    Guard, GuardMut, ReadWriteLock, TryLockError, TryLockMutError,
};

pub struct DoubleBuffer<B> {
    bufs: [ReadWriteLock<B>; 2],
    /// Index of the foreground buffer in `bufs`; only the low bit matters.
    fg: AtomicUsize,
    /// Set by `flip`, consumed by `apply_pending_flip`.
    pending: AtomicBool,
}

impl<B> DoubleBuffer<B> {
    /// Creates a double buffer with `fg` initially in the foreground.
    pub const fn new(fg: B, bg: B) -> Self {
        DoubleBuffer {
            bufs: [ReadWriteLock::new(fg), ReadWriteLock::new(bg)],
            fg: AtomicUsize::new(0),
            pending: AtomicBool::new(false),
        }
    }

    fn fg_index(&self) -> usize {
        self.fg.load(Ordering::Acquire) & 1
    }

    /// Requests that the buffers be exchanged at the start of the next
    /// vertical blanking interval. Calling this more than once before then has
    /// the same effect as calling it once.
    pub fn flip(&self) {
        self.pending.store(true, Ordering::Release)
    }

    /// Exchanges the buffers immediately, cancelling any pending flip. If this
    /// happens during active video, the top and bottom of the display will
    /// briefly come from different buffers.
    pub fn flip_now(&self) {
        self.pending.store(false, Ordering::Relaxed);
        self.fg.fetch_xor(1, Ordering::AcqRel);
    }

    /// Applies a flip requested by `flip`, if any. Returns `true` if the
    /// buffers were exchanged.
    ///
    /// This is intended to be called from a rasterizer's `end_of_frame` hook.
    pub fn apply_pending_flip(&self) -> bool {
        if self.pending.swap(false, Ordering::AcqRel) {
            self.fg.fetch_xor(1, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    /// Checks whether a flip has been requested but not yet applied.
    pub fn is_flip_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Attempts to read-lock the foreground buffer. This is what the raster
    /// interrupt uses.
    pub fn try_fg(&self) -> Result<Guard<B>, TryLockError> {
        self.bufs[self.fg_index()].try_lock()
    }

    /// Read-locks the foreground buffer, spinning if necessary. Only useful
    /// from the application, e.g. to inspect what's on screen.
    pub fn fg(&self) -> Guard<B> {
        self.bufs[self.fg_index()].lock()
    }

    /// Attempts to lock the background buffer for drawing.
    pub fn try_bg_mut(&self) -> Result<GuardMut<B>, TryLockMutError> {
        self.bufs[self.fg_index() ^ 1].try_lock_mut()
    }

    /// Locks the background buffer for drawing, spinning if necessary.
    pub fn bg_mut(&self) -> GuardMut<B> {
        self.bufs[self.fg_index() ^ 1].lock_mut()
    }

    /// Locks the *foreground* buffer for writing. While the guard exists the
    /// raster interrupt can't read it, so affected lines will be blank.
    pub fn fg_mut(&self) -> GuardMut<B> {
        self.bufs[self.fg_index()].lock_mut()
    }
}

impl<B> DoubleBuffer<B> {
    /// Copies the contents of the background buffer over the foreground
    /// buffer. Useful after a flip, to continue drawing incrementally on
    /// what's now the background.
    ///
    /// This locks the foreground for writing while it copies; lines scanned
    /// out meanwhile are blank, so call this during vertical blanking.
    pub fn copy_bg_to_fg<T: Copy>(&self)
    where
        B: AsRef<[T]> + AsMut<[T]>,
    {
        let fg = self.fg_index();
        let src = self.bufs[fg ^ 1].lock();
        let mut dst = self.bufs[fg].lock_mut();
        let src = src.as_ref();
        let dst = dst.as_mut();
        let n = src.len().min(dst.len());
        dst[..n].copy_from_slice(&src[..n]);
    }
}

impl<B: AsRef<[u32]>> DoubleBuffer<B> {
    /// Checks whether the background buffer lies in the bit-band target
    /// region, which enables faster drawing through `gfx::bit`.
    pub fn can_bg_use_bitband(&self) -> bool {
        let bg = self.bufs[self.fg_index() ^ 1].lock();
        gfx::bit::is_bit_band_target(bg.as_ref())
    }
}
