//! Performance measurement support using GPIOs, compiled out unless the
//! `measurement` feature is set.
//!
//! Because this is intended as a debug facility, this totally circumvents all
//! hardware ownership. If your application is using the measurement output pins
//! (C8-C11) for anything... weird stuff ensues.
//!
//! Each `Signal` names a pin and the activity it brackets:
//!
//! - `Signal::Line` (C8): the horizontal timing interrupt.
//! - `Signal::Scanout` (C9): scanout preparation during hblank.
//! - `Signal::Raster` (C10): rasterizing the next line.
//! - `Signal::User` (C11): free for application use.
//!
//! On the host, everything here is a no-op.

/// A measurement output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Signal {
    Line = 8,
    Scanout = 9,
    Raster = 10,
    User = 11,
}

/// Sets up the measurement subsystem.
///
/// Note: if the `measurement` feature is enabled, this will power on GPIOC and
/// configure pins 8-11 as outputs.
///
/// # Safety
///
/// This is safe *as long as* it's not preempted. If interrupts are enabled, and
/// interrupts attempt to configure either RCC or GPIOC, their updates may be
/// reverted. Call this from early in `main` and you're good.
pub unsafe fn init() {
    #[cfg(all(feature = "measurement", target_os = "none"))]
    {
        use stm32f4::stm32f407 as device;
        let rcc = &*device::RCC::ptr();
        let gpioc = &*device::GPIOC::ptr();

        rcc.ahb1enr.modify(|_, w| w.gpiocen().set_bit());

        gpioc.pupdr.modify(|_, w| {
            w.pupdr8()
                .floating()
                .pupdr9()
                .floating()
                .pupdr10()
                .floating()
                .pupdr11()
                .floating()
        });
        gpioc.ospeedr.modify(|_, w| {
            w.ospeedr8()
                .very_high_speed()
                .ospeedr9()
                .very_high_speed()
                .ospeedr10()
                .very_high_speed()
                .ospeedr11()
                .very_high_speed()
        });
        gpioc.moder.modify(|_, w| {
            w.moder8()
                .output()
                .moder9()
                .output()
                .moder10()
                .output()
                .moder11()
                .output()
        })
    }
}

/// Drives `sig` high.
///
/// If the `measurement` feature is not set, this is a no-op.
#[inline(always)]
pub fn set(sig: Signal) {
    write_bsrr(1 << sig as u32)
}

/// Drives `sig` low.
///
/// If the `measurement` feature is not set, this is a no-op.
#[inline(always)]
pub fn clear(sig: Signal) {
    write_bsrr(1 << (sig as u32 + 16))
}

/// Drives `sig` high until the returned guard is dropped.
#[inline(always)]
pub fn span(sig: Signal) -> Span {
    set(sig);
    Span(sig)
}

/// Guard returned by [`span`](fn.span.html).
#[must_use = "the signal is cleared as soon as this is dropped"]
pub struct Span(Signal);

impl Drop for Span {
    #[inline(always)]
    fn drop(&mut self) {
        clear(self.0)
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "none", feature = "measurement"))] {
        #[inline(always)]
        fn write_bsrr(bits: u32) {
            use stm32f4::stm32f407 as device;
            // Safety: writes to this register are atomic and idempotent.
            unsafe { &*device::GPIOC::ptr() }
                .bsrr
                .write(|w| unsafe { w.bits(bits) });
        }
    } else {
        #[inline(always)]
        fn write_bsrr(_bits: u32) {}
    }
}
