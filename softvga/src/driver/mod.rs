//! The hardware half of the driver: clocks, timers, DMA, GPIO and the
//! interrupt entry points. Only built for the target.
//!
//! Pin assignments are fixed:
//!
//! - PB6: horizontal sync (TIM4 channel 1).
//! - PB7: vertical sync (software controlled).
//! - PE8-PE15: video, one byte per pixel via GPIOE's high ODR byte.

mod isr;

use core::sync::atomic::{AtomicBool, Ordering};

use cortex_m::peripheral as cm;
use cortex_m::peripheral::scb::SystemHandler;
use stm32f4::stm32f407 as device;

use crate::band::{self, Band};
use crate::pipeline::VideoPipeline;
use crate::timing::{HTimerConfig, Polarity, Timing};
use crate::util::armv7m::{clear_pending_irq, disable_irq, enable_irq};
use crate::util::measurement;
use crate::util::spin_lock::{SpinLock, SpinLockGuard};
use crate::util::stm32::{configure_clocks, CopyHack};

pub use self::isr::hstate::hstate_isr as tim4_horiz_isr;
pub use self::isr::rast::maintain_raster_isr as pendsv_raster_isr;
pub use self::isr::shock::shock_absorber_isr as tim3_shock_isr;

/// Driver handle.
///
/// You can obtain a handle using either [`init`] or [`take_hardware`] depending
/// on your needs. Only one handle exists; if you try to get a second one, the
/// system will panic.
///
/// Driver handles use the typestate pattern to avoid usage errors. The handle
/// type has a parameter, `S`, that controls which methods are available:
///
/// - [`init`] and [`take_hardware`] return a `Vga<Idle>`, which can only
///   [`configure_timing`].
/// - That consumes it and returns a `Vga<Sync>`: sync signals are running,
///   but nothing is being drawn. [`with_band_list`] lends the driver a band
///   list and provides a `Vga<Live>` for the duration.
/// - `Vga<Live>` can turn video output on.
/// - `Sync` and `Live` both implement `SyncOn`, and `Vga<T: SyncOn>` has the
///   operations that only make sense while sync is generated, like waiting
///   for vblank.
///
/// [`init`]: fn.init.html
/// [`take_hardware`]: fn.take_hardware.html
/// [`configure_timing`]: #method.configure_timing
/// [`with_band_list`]: #method.with_band_list
pub struct Vga<S> {
    rcc: device::RCC,
    flash: device::FLASH,
    gpioe: device::GPIOE,
    nvic: cm::NVIC,

    mode_state: S,
}

/// Driver mode right after initialization, before timing is configured.
pub struct Idle {
    hstate: HStateHw,
    tim3: device::TIM3,
}

/// Driver mode once timing has been configured. Sync is being generated,
/// but no band list is installed.
pub struct Sync(());

/// Driver mode while a band list is lent to the driver.
pub struct Live(());

/// Trait for driver states where sync signals are being generated.
pub trait SyncOn {}

impl SyncOn for Sync {}
impl SyncOn for Live {}

/// Operations valid in any driver state.
impl<T> Vga<T> {
    /// Disables video output. This is not synchronized and can happen in the
    /// middle of the frame; if that bothers you, synchronize with vblank.
    pub fn video_off(&self) {
        self.gpioe.pupdr.modify(|_, w| {
            w.pupdr8()
                .pull_down()
                .pupdr9()
                .pull_down()
                .pupdr10()
                .pull_down()
                .pupdr11()
                .pull_down()
                .pupdr12()
                .pull_down()
                .pupdr13()
                .pull_down()
                .pupdr14()
                .pull_down()
                .pupdr15()
                .pull_down()
        });
        self.gpioe.moder.modify(|_, w| {
            w.moder8()
                .input()
                .moder9()
                .input()
                .moder10()
                .input()
                .moder11()
                .input()
                .moder12()
                .input()
                .moder13()
                .input()
                .moder14()
                .input()
                .moder15()
                .input()
        });
    }
}

/// Operations valid in any driver state where sync is being generated.
impl<T: SyncOn> Vga<T> {
    /// Sleeps until the transition from active video to vertical blank.
    /// Because this waits for the *transition*, if you call this *during*
    /// vblank it will wait for an entire frame.
    pub fn sync_to_vblank(&self) {
        PIPELINE.sync_to_vblank(cortex_m::asm::wfi)
    }

    /// Sleeps until scanout is not in progress. Returns right away during
    /// vblank.
    pub fn wait_for_vblank(&self) {
        PIPELINE.wait_for_vblank(cortex_m::asm::wfi)
    }

    /// Current line, counting from the top of the vertical blanking interval.
    pub fn current_line(&self) -> usize {
        PIPELINE.line()
    }
}

impl Vga<Idle> {
    /// Configures video timing and starts generating sync.
    ///
    /// # Panics
    ///
    /// If `timing` fails validation. The built-in timing tables never do.
    pub fn configure_timing(mut self, timing: &Timing) -> Vga<Sync> {
        let h = timing
            .h_timer_config()
            .unwrap_or_else(|e| panic!("invalid timing: {}", e));
        log::info!(
            "video {}x{}, {} Hz pixel clock, {} Hz CPU",
            timing.video_pixels,
            timing.active_lines(),
            timing.pixel_clock_hz(),
            timing.clock_config.cpu_hz(),
        );

        // Place the horizontal timers in reset, disabling interrupts.
        disable_h_timer(
            &mut self.nvic,
            &device::Interrupt::TIM4,
            &self.rcc,
            |w| w.tim4rst().set_bit(),
        );
        disable_h_timer(
            &mut self.nvic,
            &device::Interrupt::TIM3,
            &self.rcc,
            |w| w.tim3rst().set_bit(),
        );

        // Busy-wait for pending DMA to complete.
        while self.mode_state.hstate.dma2.s5cr.read().en().bit_is_set() {}

        configure_clocks(&self.rcc, &self.flash, &timing.clock_config);

        configure_h_timer(
            &h,
            timing.hsync_polarity,
            &self.mode_state.tim3,
            &self.rcc,
            |w| w.tim3en().set_bit(),
            |w| w.tim3rst().clear_bit(),
        );
        configure_h_timer(
            &h,
            timing.hsync_polarity,
            &self.mode_state.hstate.tim4,
            &self.rcc,
            |w| w.tim4en().set_bit(),
            |w| w.tim4rst().clear_bit(),
        );

        // TIM3 fires a little early, to quiet the CPU before TIM4's start of
        // active video interrupt.
        self.mode_state.tim3.ccr2.modify(|r, w| {
            w.ccr2()
                .bits(r.ccr2().bits() - isr::shock::SHOCK_ABSORBER_SHIFT_CYCLES)
        });

        // TIM3 distributes its enable signal as its trigger output...
        self.mode_state
            .tim3
            .cr2
            .write(|w| w.mms().enable().ccds().clear_bit());

        let tim4 = &self.mode_state.hstate.tim4;

        // ...and TIM4 starts when it sees it, then runs forever.
        tim4.smcr.write(|w| {
            use crate::util::stm32 as ext;
            use crate::util::stm32::VariantExt;

            w.ts()
                .variant(ext::tim3::smcr::TSW::ITR2)
                .sms()
                .variant(ext::tim3::smcr::SMSW::Trigger)
        });

        // TIM4 interrupts at start (CC2) and end (CC3) of active video.
        tim4.dier.write(|w| w.cc2ie().set_bit().cc3ie().set_bit());
        // TIM3 only at its early start of active video.
        self.mode_state.tim3.dier.write(|w| w.cc2ie().set_bit());

        // Timers are still stopped. Put vsync in its idle state.
        let gpiob = &self.mode_state.hstate.gpiob;
        match timing.vsync_polarity {
            Polarity::Positive => gpiob.bsrr.write(|w| w.br7().set_bit()),
            Polarity::Negative => gpiob.bsrr.write(|w| w.bs7().set_bit()),
        }

        PIPELINE.reset();
        *TIMING.try_lock().expect("timing lock held at configure") =
            Some(*timing);

        // Converts the sync pins to outputs; pulses start with the timers.
        sync_on(gpiob);

        // Donate the hardware to the ISRs.
        let hw = self.mode_state.hstate;
        *HPSHARE.try_lock().expect("hw lock held at configure") =
            Some(HPShared {
                hw,
                xfer: NextTransfer {
                    dma_cr_bits: 0,
                    use_timer: false,
                },
            });
        let tim3 = self.mode_state.tim3;
        let mut new_self = Vga {
            rcc: self.rcc,
            flash: self.flash,
            gpioe: self.gpioe,
            nvic: self.nvic,
            mode_state: Sync(()),
        };

        // Start TIM3, which starts TIM4.
        tim3.cr1.modify(|_, w| w.cen().set_bit());
        *isr::shock::SHOCK_TIMER
            .try_lock()
            .expect("shock lock held at configure") = Some(tim3);

        // TIM4 must be on before TIM3, or TIM3 may just wake up and idle
        // forever.
        enable_irq(&mut new_self.nvic, device::Interrupt::TIM4);
        enable_irq(&mut new_self.nvic, device::Interrupt::TIM3);

        new_self
    }
}

impl Vga<Sync> {
    /// Lends the band list starting at `head` to the driver and runs
    /// `scope`. The list goes on screen at the start of the next frame;
    /// `None` means a blank display with sync still running.
    ///
    /// When `scope` returns, the list is revoked. This may require sleeping
    /// until the raster interrupt finishes with it.
    ///
    /// During `scope` the application has access to the driver in a
    /// different state, `Vga<Live>`, which exposes additional operations.
    pub fn with_band_list<'a, R>(
        &mut self,
        head: Option<&'a Band<'a>>,
        scope: impl FnOnce(&mut Vga<Live>) -> R,
    ) -> R {
        // We're punning our self reference for the other typestate below, so
        // make sure that's likely to work: (this assert should disappear)
        assert_eq!(
            core::mem::size_of::<Sync>(),
            core::mem::size_of::<Live>()
        );

        if let Ok(Some(t)) = TIMING.try_lock().map(|t| *t) {
            // Mismatches are logged; the interrupt copes by blanking.
            let _ = band::check_coverage(head, t.active_lines());
        }

        PIPELINE.with_band_list(head, cortex_m::asm::wfi, || {
            // Safety: `Vga<Sync>` and `Vga<Live>` differ only in a ZST.
            scope(unsafe { &mut *(self as *mut Vga<Sync> as *mut Vga<Live>) })
        })
    }
}

impl Vga<Live> {
    /// Enables video output. This is not synchronized and can happen in the
    /// middle of the frame; if that bothers you, synchronize with vblank.
    pub fn video_on(&mut self) {
        // Disable pullups/pulldowns.
        self.gpioe.pupdr.modify(|_, w| {
            w.pupdr8()
                .floating()
                .pupdr9()
                .floating()
                .pupdr10()
                .floating()
                .pupdr11()
                .floating()
                .pupdr12()
                .floating()
                .pupdr13()
                .floating()
                .pupdr14()
                .floating()
                .pupdr15()
                .floating()
        });
        // Very sharp edges: at a 40MHz pixel clock the 100MHz output filter
        // is an improvement.
        self.gpioe.ospeedr.modify(|_, w| {
            w.ospeedr8()
                .very_high_speed()
                .ospeedr9()
                .very_high_speed()
                .ospeedr10()
                .very_high_speed()
                .ospeedr11()
                .very_high_speed()
                .ospeedr12()
                .very_high_speed()
                .ospeedr13()
                .very_high_speed()
                .ospeedr14()
                .very_high_speed()
                .ospeedr15()
                .very_high_speed()
        });
        self.gpioe.moder.modify(|_, w| {
            w.moder8()
                .output()
                .moder9()
                .output()
                .moder10()
                .output()
                .moder11()
                .output()
                .moder12()
                .output()
                .moder13()
                .output()
                .moder14()
                .output()
                .moder15()
                .output()
        });
    }
}

/// Initializes the driver using the given hardware capabilities.
///
/// You can get the capabilities from the `cortex_m` and `stm32f4` crates like
/// so:
///
/// ```ignore
/// let mut cp = cortex_m::peripheral::Peripherals::take().unwrap();
/// let p = stm32f4::stm32f407::Peripherals::take().unwrap();
///
/// let vga = softvga::init(
///     cp.NVIC,
///     &mut cp.SCB,
///     p.FLASH,
///     &p.DBG,
///     p.RCC,
///     p.GPIOB,
///     p.GPIOE,
///     p.TIM1,
///     p.TIM3,
///     p.TIM4,
///     p.DMA2,
/// );
/// ```
///
/// The driver is returned in [`Idle`] state, meaning output has not yet
/// started.
///
/// This variant is useful if you want to *retain* access to peripherals not
/// used by the driver. Otherwise, [`take_hardware`] is simpler.
///
/// # Panics
///
/// If called more than once.
///
/// [`take_hardware`]: fn.take_hardware.html
/// [`Idle`]: struct.Idle.html
#[allow(clippy::too_many_arguments)]
pub fn init(
    mut nvic: cm::NVIC,
    scb: &mut cm::SCB,
    flash: device::FLASH,
    dbg: &device::DBG,
    rcc: device::RCC,
    gpiob: device::GPIOB,
    gpioe: device::GPIOE,
    tim1: device::TIM1,
    tim3: device::TIM3,
    tim4: device::TIM4,
    dma2: device::DMA2,
) -> Vga<Idle> {
    unsafe {
        measurement::init();
    }

    let previous_instance = DRIVER_INIT_FLAG.swap(true, Ordering::SeqCst);
    assert_eq!(previous_instance, false, "driver initialized twice");

    // Ensure that our interrupts are disabled.
    disable_irq(&mut nvic, device::Interrupt::TIM3);
    disable_irq(&mut nvic, device::Interrupt::TIM4);

    // Turn on I/O compensation cell to reduce noise on power supply.
    rcc.apb2enr.modify(|_, w| w.syscfgen().enabled());

    rcc.ahb1enr.modify(|_, w| {
        w.gpioben().enabled().gpioeen().enabled().dma2en().enabled()
    });
    cortex_m::asm::dmb(); // ensure DMA is powered on before we write to it

    dma2.s5fcr
        .write(|w| w.fth().quarter().dmdis().enabled().feie().disabled());

    // TIM1 paces DMA for reduced horizontal resolutions. It's an APB2 timer,
    // clocked at the full CPU rate; the raster interrupt loads its ARR.
    rcc.apb2enr.modify(|_, w| w.tim1en().enabled());
    tim1.psc.reset(); // Divide by 1 => PSC=0
    tim1.cr1.write(|w| w.urs().counter_only());
    tim1.dier.write(|w| w.ude().set_bit());

    // Safety: messing with interrupt priorities is inherently unsafe, but we
    // disabled our device interrupts above and haven't pended a PendSV.
    unsafe {
        nvic.set_priority(device::Interrupt::TIM4, 0x00);
        nvic.set_priority(device::Interrupt::TIM3, 0x10);
        scb.set_priority(SystemHandler::PendSV, 0xFF);
    }

    // Flash cache and prefetching reduce jitter.
    flash
        .acr
        .modify(|_, w| w.dcen().enabled().icen().enabled().prften().enabled());

    // Stop all video-related timers on debug halt.
    dbg.dbgmcu_apb1_fz
        .modify(|_, w| w.dbg_tim4_stop().set_bit().dbg_tim3_stop().set_bit());
    dbg.dbgmcu_apb2_fz.modify(|_, w| w.dbg_tim1_stop().set_bit());

    let vga = Vga {
        rcc,
        flash,
        gpioe,
        nvic,
        mode_state: Idle {
            hstate: HStateHw {
                gpiob,
                tim1,
                tim4,
                dma2,
            },
            tim3,
        },
    };
    sync_off(&vga.mode_state.hstate.gpiob);
    vga.video_off();
    log::debug!("video driver initialized");
    vga
}

/// Starts up the video driver, taking possession of all hardware peripherals.
///
/// # Panics
///
/// If the peripherals have already been taken.
pub fn take_hardware() -> Vga<Idle> {
    let mut cp = cm::Peripherals::take().expect("core peripherals taken");
    let p = device::Peripherals::take().expect("device peripherals taken");

    init(
        cp.NVIC,
        &mut cp.SCB,
        p.FLASH,
        &p.DBG,
        p.RCC,
        p.GPIOB,
        p.GPIOE,
        p.TIM1,
        p.TIM3,
        p.TIM4,
        p.DMA2,
    )
}

/// Records when a driver instance has been initialized. This is only allowed to
/// happen once because we don't have teardown code.
static DRIVER_INIT_FLAG: AtomicBool = AtomicBool::new(false);

/// Line counter, vertical state and band list, shared by both ISRs and the
/// application.
static PIPELINE: VideoPipeline = VideoPipeline::new();

/// Data shared by the hstate and PendSV ISRs.
struct HPShared {
    hw: HStateHw,
    xfer: NextTransfer,
}

/// SpinLock avoiding races between hstate and PendSV.
static HPSHARE: SpinLock<Option<HPShared>> = SpinLock::new(None);

/// Hardware required by the horizontal state machine (and bits of it are shared
/// by PendSV, largely as an optimization).
struct HStateHw {
    dma2: device::DMA2,   // PendSV HState
    tim1: device::TIM1,   // PendSV HState
    tim4: device::TIM4,   //        HState
    gpiob: device::GPIOB, //        HState
}

/// Produced by PendSV for hstate to consume, describing the next DMA
/// transfer.
struct NextTransfer {
    /// DMA2 stream 5 CR value that starts the transfer.
    dma_cr_bits: u32,
    /// Whether TIM1 paces the transfer, for reduced horizontal resolution.
    use_timer: bool,
}

/// Copy of the current timing, locked briefly by each ISR.
static TIMING: SpinLock<Option<Timing>> = SpinLock::new(None);

fn sync_off(gpiob: &device::GPIOB) {
    gpiob
        .moder
        .modify(|_, w| w.moder6().input().moder7().input());
    gpiob
        .pupdr
        .modify(|_, w| w.pupdr6().pull_down().pupdr7().pull_down());
}

fn sync_on(gpiob: &device::GPIOB) {
    gpiob
        .ospeedr
        .modify(|_, w| w.ospeedr6().high_speed().ospeedr7().high_speed());
    gpiob
        .pupdr
        .modify(|_, w| w.pupdr6().floating().pupdr7().floating());
    // PB6 is TIM4_CH1 on AF2; PB7 is a plain output.
    gpiob.afrl.modify(|_, w| w.afrl6().af2());
    gpiob
        .moder
        .modify(|_, w| w.moder6().alternate().moder7().output());
}

/// Pattern for acquiring hardware resources loaned to an ISR in a static.
///
/// # Panics
///
/// If the `SpinLock` is locked when this is called, which means an IRQ was
/// enabled too early, two ISRs are using the hardware without coordination,
/// or a previous ISR leaked the guard. Also if the hardware hasn't been
/// provisioned yet.
fn acquire_hw<T: Send>(lock: &SpinLock<Option<T>>) -> SpinLockGuard<T> {
    SpinLockGuard::map(
        lock.try_lock().expect("HW lock held at ISR"),
        |o| o.as_mut().expect("ISR fired without HW available"),
    )
}

/// Puts a horizontal timer in reset with its interrupt off and not pending.
fn disable_h_timer(
    nvic: &mut cm::NVIC,
    i: &device::Interrupt,
    rcc: &device::RCC,
    reset: impl FnOnce(
        &mut device::rcc::apb1rstr::W,
    ) -> &mut device::rcc::apb1rstr::W,
) {
    disable_irq(nvic, i.copy_hack());
    rcc.apb1rstr.modify(|_, w| reset(w));
    cortex_m::asm::dsb();
    clear_pending_irq(i.copy_hack());
}

/// Clocks a horizontal timer, takes it out of reset and loads `h`. Its
/// interrupts are left off.
fn configure_h_timer(
    h: &HTimerConfig,
    hsync_polarity: Polarity,
    tim: &device::tim3::RegisterBlock,
    rcc: &device::RCC,
    enable_clock: impl FnOnce(
        &mut device::rcc::apb1enr::W,
    ) -> &mut device::rcc::apb1enr::W,
    leave_reset: impl FnOnce(
        &mut device::rcc::apb1rstr::W,
    ) -> &mut device::rcc::apb1rstr::W,
) {
    rcc.apb1enr.modify(|_, w| enable_clock(w));
    cortex_m::asm::dsb();
    rcc.apb1rstr.modify(|_, w| leave_reset(w));
    cortex_m::asm::dsb();

    tim.psc.write(|w| {
        use crate::util::stm32::AllWriteExt;
        w.psc().bits_ext(h.psc)
    });
    tim.arr.write(|w| w.arr().bits(h.arr));
    tim.ccr1.write(|w| w.ccr1().bits(h.ccr1));
    tim.ccr2.write(|w| w.ccr2().bits(h.ccr2));
    tim.ccr3.write(|w| w.ccr3().bits(h.ccr3));

    tim.ccmr1_output.write(|w| {
        use crate::util::stm32 as ext;
        use crate::util::stm32::VariantExt;

        w.oc1m()
            .variant(ext::tim3::ccmr1_output::OC1MW::Pwm1)
            .cc1s()
            .variant(ext::tim3::ccmr1_output::CC1SW::Output)
    });

    tim.ccer.write(|w| {
        w.cc1e()
            .set_bit()
            .cc1p()
            .bit(hsync_polarity == Polarity::Negative)
    });
}
