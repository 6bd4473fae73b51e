//! Classic XOR color pattern with smooth scrolling.

#![no_std]
#![no_main]

#[cfg(feature = "panic-halt")]
extern crate panic_halt;
#[cfg(feature = "panic-itm")]
extern crate panic_itm;

use stm32f4::stm32f407::interrupt;

use softvga::band::Band;
use softvga::rast::xor_pattern::XorPattern;

static PATTERN: XorPattern = XorPattern::new(800);

/// Demo entry point. Responsible for starting up the display driver and
/// providing the band list.
#[cortex_m_rt::entry]
fn main() -> ! {
    softvga_demos::logger::init(log::LevelFilter::Info);

    // One band covering the whole display.
    let band = Band::new(&PATTERN, 600);

    // Give the driver its hardware resources...
    softvga::take_hardware()
        // ...select a display timing...
        .configure_timing(&softvga::timing::SVGA_800_600)
        // ...and hand over the band list.
        .with_band_list(Some(&band), |vga| loop {
            vga.sync_to_vblank();
            PATTERN.advance_frame();

            // Enable outputs. This is technically wasted effort after the first
            // frame, but it costs us little, so.
            vga.video_on();
        })
}

/// Wires up the PendSV handler expected by the driver.
#[cortex_m_rt::exception]
#[link_section = ".ramcode"]
fn PendSV() {
    softvga::pendsv_raster_isr()
}

/// Wires up the TIM3 handler expected by the driver.
#[interrupt]
#[link_section = ".ramcode"]
fn TIM3() {
    softvga::tim3_shock_isr()
}

/// Wires up the TIM4 handler expected by the driver.
#[interrupt]
#[link_section = ".ramcode"]
fn TIM4() {
    softvga::tim4_horiz_isr()
}
