//! Horizontal timing test pattern.
//!
//! Draws a single line of alternating black and white pixels at the top of
//! the screen, and nothing else. With a scope on the video outputs this shows
//! the pixel clock, the position of active video and any jitter at its left
//! edge.

#![no_std]
#![no_main]

#[cfg(feature = "panic-halt")]
extern crate panic_halt;
#[cfg(feature = "panic-itm")]
extern crate panic_itm;

use stm32f4::stm32f407::interrupt;

use softvga::band::{self, Band};
use softvga::priority;
use softvga::rast::{RasterCtx, Rasterize, TargetBuffer};

struct Alternating;

impl Rasterize for Alternating {
    #[link_section = ".ramcode"]
    fn rasterize(
        &self,
        _line: usize,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        _: priority::I0,
    ) {
        for pair in target[..800].chunks_mut(2) {
            pair[0] = 0xFF;
            pair[1] = 0x00;
        }
        ctx.target_range = 0..800;
    }
}

static PATTERN: Alternating = Alternating;

#[cortex_m_rt::entry]
fn main() -> ! {
    softvga_demos::logger::init(log::LevelFilter::Info);

    let bands = [Band::new(&PATTERN, 1), Band::blank(599)];
    let head = band::link_slice(&bands);

    softvga::take_hardware()
        .configure_timing(&softvga::timing::SVGA_800_600)
        .with_band_list(head, |vga| {
            vga.video_on();
            loop {
                cortex_m::asm::wfi();
            }
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
