//! Type-level representation of execution priorities.
//!
//! All the priority types are zero-sized tokens. When the driver invokes a
//! rasterizer, it pulls an appropriate priority token out of thin air and hands
//! it over. This gives the rasterizer the ability to take certain actions that
//! would otherwise be off-limits, and keeps base-context code from calling
//! interrupt-only paths by accident.

use core::marker::PhantomData;

// Marker type used to cause things to stop being Sync/Send.
type NotSyncOrSend = PhantomData<*mut ()>;

/// Lowest priority driver interrupt, used for rasterization.
#[derive(Copy, Clone)]
pub struct I0(NotSyncOrSend);
/// Highest priority driver interrupt, used for hblank.
#[derive(Copy, Clone)]
pub struct I1(NotSyncOrSend);
/// Thread mode execution occurs outside any interrupt handler.
#[derive(Copy, Clone)]
pub struct Thread(NotSyncOrSend);

impl I0 {
    /// Conjures an `I0` token.
    ///
    /// # Safety
    ///
    /// The caller must actually be running at raster priority (or, on the
    /// host, simulating it from a single thread).
    pub unsafe fn new() -> Self {
        I0(PhantomData)
    }
}

impl I1 {
    /// Conjures an `I1` token.
    ///
    /// # Safety
    ///
    /// The caller must be the horizontal timing interrupt (or a host test
    /// standing in for it).
    pub unsafe fn new() -> Self {
        I1(PhantomData)
    }
}

impl Thread {
    /// Conjures a `Thread` token.
    ///
    /// # Safety
    ///
    /// The caller must be running outside of any interrupt handler.
    pub unsafe fn new() -> Self {
        Thread(PhantomData)
    }
}

#[cfg(target_os = "none")]
impl Thread {
    /// Returns a `Thread` token only if called from thread priority.
    pub fn new_checked() -> Option<Self> {
        // Safety: reads of the ICSR are safe.
        let icsr = unsafe { &(*cortex_m::peripheral::SCB::ptr()).icsr }.read();
        if icsr & 0xFF == 0 {
            Some(unsafe { Self::new() })
        } else {
            None
        }
    }
}

/// Indicates that a type represents an interrupt priority level.
pub trait InterruptPriority {}

impl InterruptPriority for I0 {}
impl InterruptPriority for I1 {}
