//! Interrupt handler for horizontal retrace.

use stm32f4::stm32f407 as device;

use crate::pipeline::LineEvent;
use crate::priority;
use crate::timing::Polarity;
use crate::util::measurement::{self, Signal};

use super::super::{acquire_hw, HPSHARE, PIPELINE, TIMING};

/// Horizontal state machine ISR: call this from `TIM4`.
///
/// This is one of three ISRs you must wire up for the driver to work:
///
/// ```ignore
/// use stm32f4::stm32f407::interrupt;
///
/// #[interrupt]
/// fn TIM4() {
///     softvga::tim4_horiz_isr()
/// }
/// ```
pub fn hstate_isr() {
    let _span = measurement::span(Signal::Line);

    // We outrank PendSV, so this lock can't actually wait; it only detects
    // races.
    let shared = acquire_hw(&HPSHARE);
    let hw = &shared.hw;

    let sr = hw.tim4.sr.read();
    hw.tim4.sr.write(|w| {
        unsafe { w.bits(sr.bits()) }
            .cc2if()
            .clear_bit()
            .cc3if()
            .clear_bit()
    });

    // CC2: start of active video. THIS PATH IS LATENCY SENSITIVE.
    if sr.cc2if().bit_is_set() && PIPELINE.vert_state().is_displayed_state()
    {
        start_of_active_video(
            &hw.dma2,
            &hw.tim1,
            shared.xfer.dma_cr_bits,
            shared.xfer.use_timer,
        );
    }

    // CC3: end of active video. Not latency sensitive, but should be quick to
    // leave PendSV its time.
    if sr.cc3if().bit_is_set() {
        end_of_active_video(&hw.tim1, &hw.gpiob);
    }
}

/// Starts the scanout DMA prepared by PendSV. Kept as short as possible:
/// everything here is a store of a precomputed value.
fn start_of_active_video(
    dma: &device::DMA2,
    drq_timer: &device::TIM1,
    dma_cr_bits: u32,
    use_timer_drq: bool,
) {
    // HIFCR is write-1-to-clear.
    dma.hifcr.write(|w| {
        w.cdmeif5()
            .set_bit()
            .cteif5()
            .set_bit()
            .chtif5()
            .set_bit()
            .ctcif5()
            .set_bit()
    });

    // Start the countdown for first DRQ, if relevant.
    drq_timer
        .cr1
        .write(|w| w.urs().counter_only().cen().bit(use_timer_drq));

    #[allow(unused_unsafe)]
    dma.s5cr.write(|w| unsafe { w.bits(dma_cr_bits) });
}

/// Advances the line and vertical state machine, drives vsync, and pends the
/// raster interrupt.
fn end_of_active_video(drq_timer: &device::TIM1, gpiob: &device::GPIOB) {
    // Shut off TIM1; only matters in reduced-horizontal modes.
    drq_timer
        .cr1
        .write(|w| w.urs().counter_only().cen().clear_bit());

    // Takes effect when we return.
    cortex_m::peripheral::SCB::set_pendsv();

    let timing = acquire_hw(&TIMING);
    // Safety: we are the TIM4 ISR, which runs at I1.
    let event = PIPELINE.end_of_line(&timing, unsafe { priority::I1::new() });

    let assert = match event {
        LineEvent::VsyncStart => true,
        LineEvent::VsyncEnd => false,
        LineEvent::Continue | LineEvent::Rollover => return,
    };
    // Drive the pin high for an asserted positive pulse or a released
    // negative one.
    if assert == (timing.vsync_polarity == Polarity::Positive) {
        gpiob.bsrr.write(|w| w.bs7().set_bit());
    } else {
        gpiob.bsrr.write(|w| w.br7().set_bit());
    }
}
