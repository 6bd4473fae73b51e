//! Augmented ARMv7-M interrupt management.
//!
//! The equivalent operations in the `cortex_m` crate don't guarantee that the
//! change has taken effect when they return: a disabled interrupt can still
//! fire for a few instructions afterwards. These add the barriers that close
//! that window, as described in ARM's *Cortex-M Programming Guide to Memory
//! Barrier Instructions*.

use cortex_m::interrupt::Nr;
use cortex_m::peripheral::NVIC;

/// Enables `i`. By the time this returns, a pending `i` has had the chance to
/// run, priority permitting.
pub fn enable_irq(nvic: &mut NVIC, i: impl Nr) {
    nvic.enable(i);
    barrier();
}

/// Disables `i`. Starting at the first instruction after this returns,
/// execution can't be preempted by `i`.
pub fn disable_irq(nvic: &mut NVIC, i: impl Nr) {
    nvic.disable(i);
    barrier();
}

/// Ensures `i` is not pending. If the hardware keeps generating requests, it
/// may start pending again right away.
pub fn clear_pending_irq(i: impl Nr) {
    NVIC::unpend(i);
    barrier();
}

#[inline(always)]
fn barrier() {
    cortex_m::asm::dmb();
    cortex_m::asm::isb();
}
