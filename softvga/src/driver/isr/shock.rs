//! The "shock absorber" ISR.
//!
//! The latency between the start-of-active-video timer firing and the hstate
//! ISR executing varies with whatever the CPU was doing: wait-stated Flash
//! fetches, multi-word bus transactions, tail chaining from another ISR. Any
//! variation shows up on screen as a ragged left edge.
//!
//! TIM3 runs in lockstep with TIM4 but fires a few cycles early. This ISR
//! acknowledges it and sleeps, so the CPU and bus are quiet when TIM4 fires.

use stm32f4::stm32f407 as device;

use super::super::acquire_hw;
use crate::util::spin_lock::SpinLock;

pub static SHOCK_TIMER: SpinLock<Option<device::TIM3>> = SpinLock::new(None);

/// How far ahead of TIM4's start of active video TIM3 fires, in timer ticks.
pub const SHOCK_ABSORBER_SHIFT_CYCLES: u32 = 20;

/// Shock absorber ISR: call this from `TIM3`.
///
/// ```ignore
/// use stm32f4::stm32f407::interrupt;
///
/// #[interrupt]
/// fn TIM3() {
///     softvga::tim3_shock_isr()
/// }
/// ```
pub fn shock_absorber_isr() {
    acquire_hw(&SHOCK_TIMER)
        .sr
        .modify(|_, w| w.cc2if().clear_bit());
    cortex_m::asm::wfi()
}
