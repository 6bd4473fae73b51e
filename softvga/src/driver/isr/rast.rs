//! Interrupt handler for "background" (i.e. lower priority than the timing
//! interrupts) rasterization.

use stm32f4::stm32f407 as device;

use crate::dispatch::LineOutcome;
use crate::priority;
use crate::rast::{RasterCtx, TargetBuffer, TARGET_BUFFER_SIZE};
use crate::timing::MIN_CYCLES_PER_PIXEL;
use crate::util::copy_words::copy_words;
use crate::util::measurement::{self, Signal};
use crate::util::spin_lock::SpinLock;

use super::super::{acquire_hw, NextTransfer, HPSHARE, PIPELINE, TIMING};

/// State used by the raster maintenance (PendSV) ISR.
struct RasterState {
    /// A line has been written to the working buffer since the last scan
    /// buffer update, so it needs copying.
    update_scan_buffer: bool,
    /// Shape of the working buffer contents.
    raster_ctx: RasterCtx,
}

static RASTER_STATE: SpinLock<RasterState> = SpinLock::new(RasterState {
    update_scan_buffer: false,
    raster_ctx: RasterCtx {
        cycles_per_pixel: MIN_CYCLES_PER_PIXEL,
        repeat_lines: 0,
        target_range: 0..0,
    },
});

/// Rasterization working buffer in closely-coupled RAM. During rasterization
/// the CPU can scribble into this freely without interfering with any ongoing
/// DMA transfer.
///
/// `.local_ram` is zeroed at startup rather than loaded, which matches this
/// initializer.
#[link_section = ".local_ram"]
static WORKING_BUFFER: SpinLock<TargetBuffer> =
    SpinLock::new(TargetBuffer::new());

const SCANOUT_WORDS: usize = TARGET_BUFFER_SIZE / 4 + 1;

/// Scanout buffer in the smaller AHB-attached SRAM, the source for scanout
/// DMA. Written only by PendSV during hblank, read asynchronously by DMA
/// during active video. Has room for a trailing word of black after the
/// largest line.
#[link_section = ".scanout_ram"]
static mut SCANOUT_BUFFER: [u32; SCANOUT_WORDS] = [0; SCANOUT_WORDS];

/// High byte of GPIOE's output data register, where pixels go.
const GPIOE_ODR_HIGH: u32 = 0x4002_1015;

/// Cycles by which TIM1 is preloaded short of its first DMA request.
const DRQ_SHIFT_CYCLES: u16 = 2;

/// DMA stream configuration register bits.
mod cr {
    pub const EN: u32 = 1 << 0;
    pub const DIR_M2P: u32 = 0b01 << 6;
    pub const DIR_M2M: u32 = 0b10 << 6;
    pub const PINC: u32 = 1 << 9;
    pub const MINC: u32 = 1 << 10;
    pub const PSIZE_SHIFT: u32 = 11;
    pub const MSIZE_SHIFT: u32 = 13;
    pub const PL_VERY_HIGH: u32 = 0b11 << 16;
    pub const CHSEL_6: u32 = 6 << 25;

    // Burst modes stay zero, i.e. single transfers.
    pub const COMMON: u32 = EN | PL_VERY_HIGH | CHSEL_6;
}

/// DMA transfer unit, as encoded in PSIZE/MSIZE.
#[derive(Copy, Clone, Debug)]
enum Unit {
    Byte = 0b00,
    HalfWord = 0b01,
    Word = 0b10,
}

impl Unit {
    /// Largest unit that evenly divides both `offset` and `length`.
    fn for_span(offset: usize, length: usize) -> Self {
        match (offset | length) & 3 {
            0 => Unit::Word,
            2 => Unit::HalfWord,
            _ => Unit::Byte,
        }
    }

    fn bytes(self) -> usize {
        1 << self as usize
    }
}

/// Raster maintenance ISR: call this from `PendSV`.
///
/// ```ignore
/// #[cortex_m_rt::exception]
/// fn PendSV() {
///     softvga::pendsv_raster_isr()
/// }
/// ```
pub fn maintain_raster_isr() {
    let mut state = RASTER_STATE.try_lock().expect("pendsv state");
    let mut working = WORKING_BUFFER.try_lock().expect("pendsv buffer");

    // Hold the TIMING lock for as short as possible.
    let timing = *acquire_hw(&TIMING);

    // First, prepare for scanout from SAV on this line. This frees the working
    // buffer for reuse and applies the shape chosen by the *last* rasterizer
    // run to the scanout machinery. It touches the scanout buffer and the DMA
    // controller, so it cannot overlap scanout: it happens first, in hblank.
    if PIPELINE.vert_state().is_displayed_state() {
        {
            let _span = measurement::span(Signal::Scanout);
            let mut share = acquire_hw(&HPSHARE);
            let (dma_cr_bits, use_timer) = prepare_for_scanout(
                &share.hw.dma2,
                &share.hw.tim1,
                &state.raster_ctx,
            );
            // We are now racing hstate SAV for this lock.
            share.xfer = NextTransfer {
                dma_cr_bits,
                use_timer,
            };
        }
        if state.update_scan_buffer {
            update_scan_buffer(state.raster_ctx.target_range.end, &working);
            state.update_scan_buffer = false;
        }
    }

    // Second, rasterize the *next* line, if there is one. This can take a
    // while and may overlap scanout, so results go where the next PendSV will
    // find them.
    let state = &mut *state;
    // Safety: we are PendSV, which runs at I0.
    let p = unsafe { priority::I0::new() };
    let outcome = PIPELINE.rasterize_next_line(
        &timing,
        &mut working,
        &mut state.raster_ctx,
        p,
    );
    match outcome {
        LineOutcome::Rasterized | LineOutcome::Blank => {
            state.update_scan_buffer = true
        }
        // A repeated line is already in the scan buffer.
        LineOutcome::Repeated | LineOutcome::Idle => (),
    }
}

/// Copies the first `len_bytes` of `working` into the scanout buffer,
/// followed by a word of black so the outputs return to black for hblank.
fn update_scan_buffer(len_bytes: usize, working: &TargetBuffer) {
    let count = (len_bytes + 3) / 4;

    // Safety: only PendSV writes the scanout buffer, and only outside of
    // scanout.
    let scan = unsafe { &mut SCANOUT_BUFFER };

    copy_words(&working.as_words()[..count], &mut scan[..count]);
    // Bytes past the end of the line in its last word may be stale, and DMA
    // may read them.
    let tail = len_bytes % 4;
    if tail != 0 {
        scan[count - 1] &= (1 << (tail * 8)) - 1;
    }
    scan[count] = 0;
}

/// Sets up the scanout configuration, well in advance of the start of
/// scanout.
///
/// Returns what is needed to trigger scanout the rest of the way: a value for
/// the stream CR, and whether the scanout uses a timer-generated DRQ (`true`)
/// or runs at full speed (`false`).
#[must_use = "scanout parameters are returned, not set globally"]
fn prepare_for_scanout(
    dma: &device::DMA2,
    drq_timer: &device::TIM1,
    ctx: &RasterCtx,
) -> (u32, bool) {
    use crate::util::stm32::AllWriteExt;

    // Shut off the stream for reconfiguration.
    dma.s5cr.modify(|_, w| w.en().clear_bit());

    let start = ctx.target_range.start;
    let length = ctx.target_range.end - start;
    // Safety: the buffer is static; DMA only ever reads it.
    let source = unsafe { SCANOUT_BUFFER.as_ptr() as u32 } + start as u32;

    // Every transfer is followed by black: one extra unit from the buffer's
    // terminating word. Both sides must move the same number of bytes.
    let unit = Unit::for_span(start, length);

    if ctx.cycles_per_pixel > MIN_CYCLES_PER_PIXEL {
        // Reduced horizontal resolution: TIM1 requests one byte per pixel.
        let reload = (ctx.cycles_per_pixel - 1) as u16;
        drq_timer.arr.write(|w| w.arr().bits_ext(reload));
        // Force an update to reset the timer state. This clears CNT, so the
        // preload comes after.
        drq_timer.egr.write(|w| w.ug().set_bit());
        drq_timer
            .cnt
            .write(|w| w.cnt().bits_ext(reload - DRQ_SHIFT_CYCLES));
        drq_timer.sr.reset();

        #[allow(unused_unsafe)]
        {
            dma.s5par.write(|w| unsafe { w.bits(GPIOE_ODR_HIGH) });
            dma.s5m0ar.write(|w| unsafe { w.bits(source) });
        }
        // NDTR counts peripheral-side units, which are bytes here.
        dma.s5ndtr
            .write(|w| w.ndt().bits((length + unit.bytes()) as u16));

        let bits = cr::COMMON
            | cr::DIR_M2P
            | cr::MINC
            | (unit as u32) << cr::MSIZE_SHIFT
            | (Unit::Byte as u32) << cr::PSIZE_SHIFT;
        (bits, true)
    } else {
        // Full speed. The controller only does memory-to-memory with the
        // "peripheral" as source, so the buffer plays peripheral here.
        #[allow(unused_unsafe)]
        {
            dma.s5par.write(|w| unsafe { w.bits(source) });
            dma.s5m0ar.write(|w| unsafe { w.bits(GPIOE_ODR_HIGH) });
        }
        dma.s5ndtr.write(|w| {
            w.ndt().bits((length / unit.bytes() + 1) as u16)
        });

        let bits = cr::COMMON
            | cr::DIR_M2M
            | cr::PINC
            | (unit as u32) << cr::PSIZE_SHIFT
            | (Unit::Byte as u32) << cr::MSIZE_SHIFT;
        (bits, false)
    }
}
