//! Mixed-mode graphics.
//!
//! Three scenes, shown in an endless loop:
//!
//! 1. Text, a 1bpp bitmap, a procedural pattern and a solid color, each in
//!    its own band.
//! 2. A "wipe": a band of scrolling text that grows, shrinks and wanders up
//!    and down the screen between two bands of pattern.
//! 3. Low resolution color: an animated direct-color image, the same image
//!    reflected below it, and a palette-cycled gradient.
//!
//! Each scene's buffers come out of an arena that is reset between scenes.

#![no_std]
#![no_main]

#[cfg(feature = "panic-halt")]
extern crate panic_halt;
#[cfg(feature = "panic-itm")]
extern crate panic_itm;

use core::fmt::Write;

use stm32f4::stm32f407::interrupt;

use font_10x16::FONT;
use softvga::arena::Arena;
use softvga::band::{self, Band};
use softvga::priority::{self, Thread};
use softvga::rast::bitmap_1::Bitmap1;
use softvga::rast::direct::Direct;
use softvga::rast::mirror::Mirror;
use softvga::rast::palette_8::Palette8;
use softvga::rast::solid_color::SolidColor;
use softvga::rast::text_10x16::{AChar, Text10x16, GLYPH_ROWS};
use softvga::rast::xor_pattern::XorPattern;
use softvga_demos::color;
use softvga_demos::scene::{run_scenes, Builder, Scene};
use softvga_demos::terminal::Terminal;

const WIDTH: usize = 800;
const LINES: usize = 600;

const ARENA_SIZE: usize = 60 * 1024;

const SCENES: [Builder; 3] = [mixed, wipe, lores];

#[cortex_m_rt::entry]
fn main() -> ! {
    softvga_demos::logger::init(log::LevelFilter::Info);

    #[link_section = ".local_ram"]
    static mut ARENA_MEM: [u8; ARENA_SIZE] = [0; ARENA_SIZE];
    // Safety: because of scoping this is clearly the only mutable reference
    // we generate to this static.
    let mut arena = Arena::new(unsafe { &mut ARENA_MEM });

    let thread = priority::Thread::new_checked()
        .expect("main must run in thread mode");

    let mut vga = softvga::take_hardware()
        .configure_timing(&softvga::timing::SVGA_800_600);

    loop {
        run_scenes(&mut vga, &mut arena, &SCENES, thread);
    }
}

/// Returns a triangle wave of period `period` frames, ranging from 0 to
/// `amplitude`.
fn triangle(t: usize, period: usize, amplitude: usize) -> usize {
    let half = period / 2;
    let phase = t % period;
    if phase < half {
        phase * amplitude / half
    } else {
        (period - phase) * amplitude / half
    }
}

/// Finds the point `d` pixels clockwise from the top left, around the edge
/// of a `w` by `h` rectangle.
fn perimeter_point(d: usize, w: usize, h: usize) -> (usize, usize) {
    let (w, h) = (w - 1, h - 1);
    let d = d % (2 * (w + h));
    if d < w {
        (d, 0)
    } else if d < w + h {
        (w, d - w)
    } else if d < 2 * w + h {
        (w - (d - w - h), h)
    } else {
        (0, h - (d - 2 * w - h))
    }
}

////////////////////////////////////////////////////////////////////////////////
// Scene 1: one of everything.

const TEXT_COLS: usize = 80;
const TEXT_ROWS: usize = 4;
const PLOT_LINES: usize = 256;
const PLOT_WORDS: usize = WIDTH / 32 * PLOT_LINES;
const FOOTER_LINES: usize = 16;

struct Mixed<'a, C, W> {
    head: Option<&'a Band<'a>>,
    text: &'a Text10x16<'static, C>,
    plot: &'a Bitmap1<W>,
    pattern: &'a XorPattern,
}

impl<'a, C, W> Scene<'a> for Mixed<'a, C, W>
where
    C: AsRef<[AChar]> + AsMut<[AChar]>,
    W: AsRef<[u32]> + AsMut<[u32]>,
{
    fn bands(&self) -> Option<&'a Band<'a>> {
        self.head
    }

    fn render_frame(&self, frame: usize, _: Thread) -> bool {
        self.pattern.advance_frame();

        let mut term = Terminal::new(self.text);
        term.cursor_to(3, 0);
        let _ = write!(term, "frame {:>5}", frame);

        {
            let mut g = self.plot.make_bg_graphics();
            g.clear_all();
            let (x, y) = perimeter_point(frame * 8, WIDTH, PLOT_LINES);
            g.draw_line(WIDTH / 2, PLOT_LINES / 2, x, y);
            let (x, y) = perimeter_point(frame * 8 + 1000, WIDTH, PLOT_LINES);
            g.draw_line(WIDTH / 2, PLOT_LINES / 2, x, y);
            g.draw_line(0, 0, WIDTH - 1, 0);
            g.draw_line(0, PLOT_LINES - 1, WIDTH - 1, PLOT_LINES - 1);
        }
        self.plot.flip();

        frame < 600
    }
}

fn mixed(arena: &Arena<'_>, run: &mut dyn FnMut(&dyn Scene<'_>)) {
    let text = Text10x16::new(
        FONT.as_glyph_slices(),
        arena.alloc_slice_default::<AChar>(TEXT_COLS * TEXT_ROWS),
        TEXT_COLS,
        TEXT_ROWS,
    );
    let plot = Bitmap1::new(
        arena.alloc_slice_default::<u32>(PLOT_WORDS),
        arena.alloc_slice_default::<u32>(PLOT_WORDS),
        WIDTH,
        PLOT_LINES,
    );
    plot.set_fg_color(color::GREEN);
    plot.set_bg_color(color::BLACK);
    let pattern = XorPattern::new(WIDTH);
    let footer = SolidColor::new(color::BLUE, WIDTH);

    {
        let mut term = Terminal::new(&text);
        term.type_char(color::WHITE, color::BLACK, 0x0C);
        term.text_centered(0, color::WHITE, color::DK_GRAY, b"Mixed Mode");
        term.cursor_to(1, 0);
        term.rainbow_type(b"Four bands: text, 1bpp bitmap, 8bpp pattern, solid.");
    }

    let text_lines = TEXT_ROWS * GLYPH_ROWS;
    let bands = [
        Band::new(&text, text_lines),
        Band::new(&plot, PLOT_LINES),
        Band::new(&pattern, LINES - text_lines - PLOT_LINES - FOOTER_LINES),
        Band::new(&footer, FOOTER_LINES),
    ];

    run(&Mixed {
        head: band::link_slice(&bands),
        text: &text,
        plot: &plot,
        pattern: &pattern,
    })
}

////////////////////////////////////////////////////////////////////////////////
// Scene 2: wipe.

const MAX_BAND_HEIGHT: usize = 3 * GLYPH_ROWS;
const WIPE_COLS: usize = TEXT_COLS + 1;

static MESSAGE: &[u8] =
    b"Mixed-mode graphics  -  any number of bands  -  each with its own \
      depth and resolution  -  ";

struct Wipe<'a, C> {
    bands: &'a [Band<'a>],
    border: &'a XorPattern,
    text: &'a Text10x16<'static, C>,
}

impl<'a, C> Scene<'a> for Wipe<'a, C>
where
    C: AsRef<[AChar]> + AsMut<[AChar]>,
{
    fn bands(&self) -> Option<&'a Band<'a>> {
        self.bands.first()
    }

    fn render_frame(&self, frame: usize, _: Thread) -> bool {
        let height = 2 * triangle(frame, 100, MAX_BAND_HEIGHT / 2);
        let split = LINES / 4 + triangle(frame, 254, LINES / 2);

        self.bands[0].set_line_count(split - height / 2);
        self.bands[1].set_line_count(height);
        self.bands[2].set_line_count(LINES - split - height / 2);

        // Keep the middle of the text in the middle of the band.
        self.text.set_scroll(MAX_BAND_HEIGHT / 2 - height / 2);

        // Smooth scroll within a character cell with x_adj, and whole
        // characters by retyping the row.
        let scroll = frame * 2;
        self.text.set_x_adj(-((scroll % 10) as isize));
        let x = scroll / 10;
        let mut term = Terminal::new(self.text);
        term.cursor_to(1, 0);
        for i in 0..WIPE_COLS {
            let c = MESSAGE[(x + i) % MESSAGE.len()];
            term.type_raw(color::WHITE, color::BLACK, c);
        }

        self.border.advance_frame();
        frame < 1200
    }
}

fn wipe(arena: &Arena<'_>, run: &mut dyn FnMut(&dyn Scene<'_>)) {
    let border = XorPattern::new(WIDTH);
    let text = Text10x16::new(
        FONT.as_glyph_slices(),
        arena.alloc_slice_default::<AChar>(WIPE_COLS * 3),
        WIPE_COLS,
        3,
    )
    .with_hide_right();
    Terminal::new(&text).type_char(color::WHITE, color::BLACK, 0x0C);

    let bands = [
        Band::new(&border, LINES / 2),
        Band::new(&text, 0),
        Band::new(&border, LINES / 2),
    ];
    band::link_slice(&bands);

    run(&Wipe {
        bands: &bands,
        border: &border,
        text: &text,
    })
}

////////////////////////////////////////////////////////////////////////////////
// Scene 3: low resolution color.

const TITLE_ROWS: usize = 2;
const LORES_WIDTH: usize = 160;
const LORES_SCALE_X: usize = WIDTH / LORES_WIDTH;
const DIRECT_ROWS: usize = 48;
const DIRECT_SCALE_Y: usize = 3;
const DIRECT_LINES: usize = DIRECT_ROWS * DIRECT_SCALE_Y;
const PALETTE_SCALE_Y: usize = 5;
const PALETTE_LINES: usize =
    LINES - TITLE_ROWS * GLYPH_ROWS - 2 * DIRECT_LINES;
const PALETTE_ROWS: usize = PALETTE_LINES / PALETTE_SCALE_Y;

struct Lores<'a, D, P> {
    head: Option<&'a Band<'a>>,
    direct: &'a Direct<D>,
    palette: &'a Palette8<P>,
}

impl<'a, D, P> Scene<'a> for Lores<'a, D, P>
where
    D: AsRef<[u32]> + AsMut<[u32]>,
    P: AsRef<[u8]> + AsMut<[u8]>,
{
    fn bands(&self) -> Option<&'a Band<'a>> {
        self.head
    }

    fn render_frame(&self, frame: usize, _: Thread) -> bool {
        // Rotate the gradient's colors.
        for i in 0..=255u8 {
            let c = (usize::from(i) + frame) % 64;
            self.palette.set_color(i, c as u8);
        }

        {
            let mut px = self.direct.get_bg_pixels();
            for (y, row) in px.chunks_exact_mut(LORES_WIDTH).enumerate() {
                for (x, p) in row.iter_mut().enumerate() {
                    *p = ((x + frame) ^ (y * 2)) as u8 & 0x3F;
                }
            }
        }
        self.direct.flip();

        frame < 900
    }
}

fn lores(arena: &Arena<'_>, run: &mut dyn FnMut(&dyn Scene<'_>)) {
    let text = Text10x16::new(
        FONT.as_glyph_slices(),
        arena.alloc_slice_default::<AChar>(TEXT_COLS * TITLE_ROWS),
        TEXT_COLS,
        TITLE_ROWS,
    );
    {
        let mut term = Terminal::new(&text);
        term.type_char(color::WHITE, color::BLACK, 0x0C);
        term.text_centered(0, color::WHITE, color::DK_GRAY, b"Color");
        term.text_at(
            1,
            0,
            color::LT_GRAY,
            color::BLACK,
            b"Direct color, mirrored, and an 8-bit palette.",
        );
    }

    let words = LORES_WIDTH / 4 * DIRECT_ROWS;
    let direct = Direct::new(
        arena.alloc_slice_default::<u32>(words),
        arena.alloc_slice_default::<u32>(words),
        LORES_WIDTH,
        DIRECT_ROWS,
        LORES_SCALE_X,
        DIRECT_SCALE_Y,
    );
    let reflection = Mirror::new(&direct, DIRECT_LINES).with_horizontal();

    let palette = Palette8::new(
        arena.alloc_slice_default::<u8>(LORES_WIDTH * PALETTE_ROWS),
        arena.alloc_slice_default::<u8>(LORES_WIDTH * PALETTE_ROWS),
        LORES_WIDTH,
        PALETTE_ROWS,
        LORES_SCALE_X,
        PALETTE_SCALE_Y,
    );
    {
        let mut px = palette.get_bg_buffer();
        for (y, row) in px.chunks_exact_mut(LORES_WIDTH).enumerate() {
            for (x, p) in row.iter_mut().enumerate() {
                *p = (x + y) as u8;
            }
        }
    }
    // The gradient never changes, so both buffers get the same picture.
    palette.copy_bg_to_fg();

    let bands = [
        Band::new(&text, TITLE_ROWS * GLYPH_ROWS),
        Band::new(&direct, DIRECT_LINES),
        Band::new(&reflection, DIRECT_LINES),
        Band::new(&palette, PALETTE_LINES),
    ];

    run(&Lores {
        head: band::link_slice(&bands),
        direct: &direct,
        palette: &palette,
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
