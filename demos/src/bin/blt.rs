//! Bit-block transfer test.
//!
//! Copies a strip of the font onto a 1bpp framebuffer five times, once for
//! each way the source and destination can be aligned against word
//! boundaries. The five strips should look identical apart from their
//! positions.

#![no_std]
#![no_main]

#[cfg(feature = "panic-halt")]
extern crate panic_halt;
#[cfg(feature = "panic-itm")]
extern crate panic_itm;

use stm32f4::stm32f407::interrupt;

use font_10x16::FONT;
use gfx::blit::{Bitmap, Rect};
use softvga::band::Band;
use softvga::rast::bitmap_1::Bitmap1;
use softvga_demos::color;

const WIDTH: usize = 800;
const HEIGHT: usize = 600;
const BUF_SIZE: usize = WIDTH * HEIGHT / 32;

/// The font table viewed as a bitmap: 256 glyphs of 8 pixels, 16 rows.
const FONT_WIDTH: usize = 256 * 8;
const FONT_STRIDE: usize = FONT_WIDTH / 32;

/// Left edge of the space character, where the printable glyphs begin.
const SPACE_X: usize = b' ' as usize * 8;

/// `(source x, destination rectangle)` for each case.
const CASES: [(usize, Rect); 5] = [
    // Word-aligned.
    (SPACE_X, Rect::new(0, 0, 700, 16)),
    // Equal offsets within the word.
    (SPACE_X + 8, Rect::new(8, 16, 700, 16)),
    // Source aligned only.
    (SPACE_X, Rect::new(8, 32, 700, 16)),
    // Destination aligned only.
    (SPACE_X + 8, Rect::new(0, 48, 700, 16)),
    // Neither.
    (SPACE_X + 8, Rect::new(4, 64, 700, 16)),
];

#[cortex_m_rt::entry]
fn main() -> ! {
    softvga_demos::logger::init(log::LevelFilter::Info);

    let bitmap = Bitmap1::new(
        {
            static mut BUF0: [u32; BUF_SIZE] = [0; BUF_SIZE];
            // Safety: because of scoping this is clearly the only mutable
            // reference we generate to this static.
            unsafe { &mut BUF0 as &mut [_] }
        },
        {
            #[link_section = ".local_ram"]
            static mut BUF1: [u32; BUF_SIZE] = [0; BUF_SIZE];
            // Safety: as above.
            unsafe { &mut BUF1 as &mut [_] }
        },
        WIDTH,
        HEIGHT,
    );
    bitmap.set_fg_color(color::WHITE);
    bitmap.set_bg_color(0b01_00_00);

    {
        let font = Bitmap::new(FONT.as_words(), FONT_WIDTH, 16, FONT_STRIDE);
        let mut g = bitmap.make_bg_graphics();
        g.clear_all();
        for &(src_x, dst) in &CASES {
            if let Err(e) = g.bitblt(&font, src_x, 0, dst) {
                log::error!("blit to {:?} failed: {}", dst, e);
            }
        }
    }
    bitmap.flip_now();

    let band = Band::new(&bitmap, HEIGHT);

    softvga::take_hardware()
        .configure_timing(&softvga::timing::SVGA_800_600)
        .with_band_list(Some(&band), |vga| {
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
