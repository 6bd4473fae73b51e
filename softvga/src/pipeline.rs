//! The line-level state shared between the application and the driver's
//! interrupts.
//!
//! `VideoPipeline` holds everything the horizontal timing interrupt and the
//! raster interrupt need to agree on: the current line, the vertical state
//! machine, and the band list lent by the application. It does no I/O. The
//! driver calls `end_of_line` from the timing interrupt and
//! `rasterize_next_line` from the raster interrupt, and does the register
//! pushing itself. That split is what lets whole frames be simulated in host
//! tests.

use core::cell::Cell;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use scopeguard::defer;

use crate::band::{self, Band};
use crate::dispatch::{Dispatch, LineOutcome};
use crate::priority;
use crate::rast::{blank_line, RasterCtx, TargetBuffer};
use crate::timing::Timing;
use crate::util::measurement::{self, Signal};
use crate::util::spin_lock::SpinLock;

/// Possible states of the vertical retrace state machine.
///
/// This is encoded as a Gray code for efficient testing by the functions below.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VState {
    /// Deep in the vertical blanking interval.
    Blank = 0b00,
    /// On the line just before active video, so the rasterizer needs to be
    /// warming up.
    Starting = 0b01,
    /// Active video.
    Active = 0b11,
    /// On the final line in active video -- rasterizer must shut down but
    /// scanout will continue.
    Finishing = 0b10,
}

impl VState {
    /// Does scanout occur in this state?
    pub fn is_displayed_state(self) -> bool {
        (self as usize & 0b10) != 0
    }

    /// Does rasterization need to run in this state?
    pub fn is_rendered_state(self) -> bool {
        (self as usize & 1) != 0
    }
}

/// Things the timing interrupt has to act on after `end_of_line`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineEvent {
    /// Nothing beyond the usual.
    Continue,
    /// Assert vertical sync.
    VsyncStart,
    /// Release vertical sync.
    VsyncEnd,
    /// The frame is over; the line counter is back to zero.
    Rollover,
}

pub struct VideoPipeline {
    /// Current scan line, counting from the top of the vertical blanking
    /// interval rather than the top of active video.
    line: AtomicUsize,
    /// A `VState`, as `usize`.
    vstate: AtomicUsize,
    bands: BandListSlot,
    /// Only ever touched by the raster interrupt.
    raster: SpinLock<RasterState>,
}

struct RasterState {
    /// Dispatcher for the frame in progress, tagged with the generation of
    /// the band list it walks. The lifetime is a lie: the dispatcher may only
    /// be used while observing that same generation in `bands`.
    dispatch: Option<(Dispatch<'static>, usize)>,
    /// Whether a frame has started since `end_of_frame` last ran.
    frame_open: bool,
}

impl VideoPipeline {
    pub const fn new() -> Self {
        VideoPipeline {
            line: AtomicUsize::new(0),
            vstate: AtomicUsize::new(VState::Blank as usize),
            bands: BandListSlot::new(),
            raster: SpinLock::new(RasterState {
                dispatch: None,
                frame_open: false,
            }),
        }
    }

    /// Returns to line 0 in vertical blanking, forgetting any frame in
    /// progress. For use while the timing interrupts are stopped.
    pub fn reset(&self) {
        self.line.store(0, Ordering::Relaxed);
        self.set_vert_state(VState::Blank);
        if let Ok(mut st) = self.raster.try_lock() {
            st.dispatch = None;
            st.frame_open = false;
        }
    }

    pub fn line(&self) -> usize {
        self.line.load(Ordering::Relaxed)
    }

    pub fn vert_state(&self) -> VState {
        match self.vstate.load(Ordering::Relaxed) {
            0b00 => VState::Blank,
            0b01 => VState::Starting,
            0b11 => VState::Active,
            _ => VState::Finishing,
        }
    }

    fn set_vert_state(&self, s: VState) {
        self.vstate.store(s as usize, Ordering::Relaxed)
    }

    /// Finishes the current line: advances the line counter and the vertical
    /// state machine. Called from the timing interrupt at the end of each
    /// line's active video, in every vertical state.
    pub fn end_of_line(&self, timing: &Timing, _: priority::I1) -> LineEvent {
        let next_line = self.line() + 1;
        let mut event = LineEvent::Continue;

        if next_line == timing.vsync_start_line {
            event = LineEvent::VsyncStart;
        } else if next_line == timing.vsync_end_line {
            event = LineEvent::VsyncEnd;
        } else if next_line + 1 == timing.video_start_line {
            // One line before scanout begins; start rasterizing.
            self.set_vert_state(VState::Starting);
        } else if next_line == timing.video_start_line {
            self.set_vert_state(VState::Active);
        } else if next_line + 1 == timing.video_end_line {
            // Final line: scanout continues, rasterization stops.
            self.set_vert_state(VState::Finishing);
        } else if next_line == timing.video_end_line {
            self.set_vert_state(VState::Blank);
            event = LineEvent::Rollover;
        }

        let next_line = if event == LineEvent::Rollover {
            0
        } else {
            next_line
        };
        self.line.store(next_line, Ordering::Relaxed);
        event
    }

    /// Produces the line after the current one into `target`, if that line
    /// is visible. Called from the raster interrupt after each `end_of_line`.
    ///
    /// At the first visible line the band list is latched for the frame; if
    /// it is replaced mid-frame, the rest of the frame is blank. At the first
    /// line of vertical blanking, every band's rasterizer gets its
    /// `end_of_frame` call.
    pub fn rasterize_next_line(
        &self,
        timing: &Timing,
        target: &mut TargetBuffer,
        ctx: &mut RasterCtx,
        p: priority::I0,
    ) -> LineOutcome {
        let _span = measurement::span(Signal::Raster);

        let mut st = match self.raster.try_lock() {
            Ok(st) => st,
            Err(_) => return LineOutcome::Idle,
        };

        let vs = self.vert_state();
        if !vs.is_rendered_state() {
            if vs == VState::Blank {
                self.close_frame(&mut st, p);
            }
            return LineOutcome::Idle;
        }

        let cycles_per_pixel = timing.cycles_per_pixel();
        let visible_line = self.line() + 1 - timing.video_start_line;

        let st = &mut *st;
        let outcome = self.bands.observe(|head, generation| {
            if visible_line == 0 {
                debug_assert!(
                    head.is_none()
                        || band::total_lines(head) == timing.active_lines(),
                    "band list does not cover the display"
                );
                // Safety: see `RasterState::dispatch`; it is only used below,
                // and only when the generation still matches.
                let d: Dispatch<'static> =
                    unsafe { core::mem::transmute(Dispatch::new(head)) };
                st.dispatch = Some((d, generation));
                st.frame_open = true;
            }
            match &mut st.dispatch {
                Some((d, g)) if *g == generation => {
                    d.rasterize_line(cycles_per_pixel, target, ctx, p)
                }
                _ => LineOutcome::Blank,
            }
        });

        match outcome {
            Some(LineOutcome::Blank) | None => {
                *ctx = RasterCtx::for_cycles_per_pixel(cycles_per_pixel);
                blank_line(ctx);
                LineOutcome::Blank
            }
            Some(o) => o,
        }
    }

    fn close_frame(&self, st: &mut RasterState, p: priority::I0) {
        if !st.frame_open {
            return;
        }
        st.frame_open = false;
        let latched = st.dispatch.take().map(|(_, g)| g);
        self.bands.observe(|head, generation| {
            if latched == Some(generation) {
                for b in band::iter(head) {
                    if let Some(r) = b.rasterizer() {
                        r.end_of_frame(p)
                    }
                }
            }
        });
    }

    /// Lends the band list starting at `head` to the raster interrupt while
    /// `scope` runs. `None` displays nothing; sync carries on regardless.
    ///
    /// The list is picked up at the start of the next frame. When `scope`
    /// returns, this waits out any use of the list by the interrupt in
    /// progress, calling `idle` meanwhile.
    ///
    /// # Panics
    ///
    /// If a band list is already being lent, i.e. on nested calls.
    pub fn with_band_list<'a, R>(
        &self,
        head: Option<&'a Band<'a>>,
        idle: impl FnMut(),
        scope: impl FnOnce() -> R,
    ) -> R {
        log::debug!(
            "band list: {} bands, {} lines",
            band::iter(head).count(),
            band::total_lines(head)
        );
        self.bands.donate(head, idle, scope)
    }

    /// Waits for the *transition* from active video to vertical blank,
    /// calling `idle` while waiting. Because this waits for the transition,
    /// calling it during vblank waits for an entire frame.
    pub fn sync_to_vblank(&self, mut idle: impl FnMut()) {
        // Waiting for a line other than zero first is what makes the common
        // `loop { sync_to_vblank(); draw(); }` pattern wait a full frame when
        // drawing is quick.
        while self.line() == 0 {
            idle()
        }
        while self.line() != 0 {
            idle()
        }
    }

    /// Waits until scanout is not in progress, calling `idle` while waiting.
    /// Returns immediately during vertical blanking.
    pub fn wait_for_vblank(&self, mut idle: impl FnMut()) {
        while self.vert_state().is_displayed_state() {
            idle()
        }
    }
}

const EMPTY: usize = 0;
const LOADING: usize = 1;
const LOADED: usize = 2;
const LOCKED: usize = 3;

/// A place to lend a band list to an interrupt handler.
///
/// The slot is initially *empty*. `donate` stores a list and puts the slot in
/// the *loaded* state, runs a closure, and then returns the slot to *empty*.
/// `observe` switches a *loaded* slot to *locked* while it looks at the list,
/// which keeps `donate` from returning until it's done.
///
/// Every donation gets a new generation number, so an observer can tell
/// whether the list it saw last time is still the one on offer.
struct BandListSlot {
    state: AtomicUsize,
    poisoned: AtomicBool,
    generation: AtomicUsize,
    head: Cell<*const Band<'static>>,
}

unsafe impl Sync for BandListSlot {}

impl BandListSlot {
    const fn new() -> Self {
        BandListSlot {
            state: AtomicUsize::new(EMPTY),
            poisoned: AtomicBool::new(false),
            generation: AtomicUsize::new(0),
            head: Cell::new(ptr::null()),
        }
    }

    fn donate<'a, R>(
        &self,
        head: Option<&'a Band<'a>>,
        mut idle: impl FnMut(),
        scope: impl FnOnce() -> R,
    ) -> R {
        let r = self.state.compare_exchange(
            EMPTY,
            LOADING,
            Ordering::Acquire,
            Ordering::Relaxed,
        );
        assert_eq!(r, Ok(EMPTY), "concurrent/reentrant band list donation");

        // By placing the slot in LOADING state we now have exclusive control.
        let erased = head.map_or(ptr::null(), |h| {
            h as *const Band<'a> as *const Band<'static>
        });
        self.head.set(erased);
        self.generation.fetch_add(1, Ordering::Relaxed);
        self.state.store(LOADED, Ordering::Release);

        defer! {{
            // Busy-wait on the interrupt.
            while self
                .state
                .compare_exchange_weak(
                    LOADED,
                    EMPTY,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_err()
            {
                idle();
            }
            self.head.set(ptr::null());

            if self.poisoned.load(Ordering::Acquire) {
                panic!("band list poisoned by panic in rasterizer")
            }
        }}

        scope()
    }

    /// Locks the slot and runs `body` on the donated list and its
    /// generation. Returns `None` without running `body` if nothing is
    /// donated, or the slot is already locked. Never waits.
    fn observe<R>(
        &self,
        body: impl for<'x> FnOnce(Option<&'x Band<'x>>, usize) -> R,
    ) -> Option<R> {
        self.state
            .compare_exchange(LOADED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| {
                if self.poisoned.load(Ordering::Acquire) {
                    panic!("band list poisoned by panic in rasterizer")
                }

                let poisoner = scopeguard::guard((), |_| {
                    self.poisoned.store(true, Ordering::Release)
                });

                // Safety: `donate` stored this from a reference that it
                // keeps valid until the slot leaves the LOADED/LOCKED states,
                // which can't happen while we hold LOCKED.
                let head = unsafe { (self.head.get() as *const Band).as_ref() };
                let result = body(head, self.generation.load(Ordering::Relaxed));

                self.state.store(LOADED, Ordering::Release);
                scopeguard::ScopeGuard::into_inner(poisoner);
                result
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::band::link_slice;
    use crate::rast::test_util::{i0, Recorder};
    use crate::timing::SVGA_800_600;

    fn i1() -> priority::I1 {
        unsafe { priority::I1::new() }
    }

    /// Four lines of blanking around six visible lines.
    fn tiny_timing() -> Timing {
        Timing {
            vsync_start_line: 1,
            vsync_end_line: 2,
            video_start_line: 4,
            video_end_line: 10,
            ..SVGA_800_600
        }
    }

    /// A frame's worth of interrupts, as the driver would run them.
    struct Sim<'p> {
        pipe: &'p VideoPipeline,
        timing: Timing,
        target: TargetBuffer,
        ctx: RasterCtx,
    }

    impl<'p> Sim<'p> {
        fn new(pipe: &'p VideoPipeline) -> Self {
            Sim {
                pipe,
                timing: tiny_timing(),
                target: TargetBuffer::new(),
                ctx: RasterCtx::default(),
            }
        }

        fn step(&mut self) -> (LineEvent, LineOutcome) {
            let e = self.pipe.end_of_line(&self.timing, i1());
            let o = self.pipe.rasterize_next_line(
                &self.timing,
                &mut self.target,
                &mut self.ctx,
                i0(),
            );
            (e, o)
        }

        fn frame(&mut self) -> Vec<LineOutcome> {
            (0..self.timing.video_end_line).map(|_| self.step().1).collect()
        }
    }

    #[test]
    fn vertical_state_machine() {
        let t = tiny_timing();
        let p = VideoPipeline::new();
        let mut seen = vec![];
        for _ in 0..t.video_end_line {
            let e = p.end_of_line(&t, i1());
            seen.push((p.line(), p.vert_state(), e));
        }
        use LineEvent::*;
        use VState::*;
        assert_eq!(
            seen,
            vec![
                (1, Blank, VsyncStart),
                (2, Blank, VsyncEnd),
                (3, Starting, Continue),
                (4, Active, Continue),
                (5, Active, Continue),
                (6, Active, Continue),
                (7, Active, Continue),
                (8, Active, Continue),
                (9, Finishing, Continue),
                (0, Blank, Rollover),
            ]
        );
    }

    #[test]
    fn gray_code_predicates() {
        assert!(!VState::Blank.is_displayed_state());
        assert!(!VState::Blank.is_rendered_state());
        assert!(VState::Starting.is_rendered_state());
        assert!(!VState::Starting.is_displayed_state());
        assert!(VState::Active.is_rendered_state());
        assert!(VState::Active.is_displayed_state());
        assert!(VState::Finishing.is_displayed_state());
        assert!(!VState::Finishing.is_rendered_state());
    }

    #[test]
    fn no_list_is_blank() {
        let pipe = VideoPipeline::new();
        let mut sim = Sim::new(&pipe);
        use LineOutcome::*;
        assert_eq!(
            sim.frame(),
            vec![Idle, Idle, Blank, Blank, Blank, Blank, Blank, Blank, Idle, Idle]
        );
        assert!(sim.ctx.target_range.is_empty());
    }

    #[test]
    fn frame_walks_bands_and_ends_once() {
        let pipe = VideoPipeline::new();
        let mut sim = Sim::new(&pipe);
        let a = Recorder::new(1, 0);
        let b = Recorder::new(2, 0);
        let bands = [Band::new(&a, 2), Band::blank(1), Band::new(&b, 3)];
        pipe.with_band_list(link_slice(&bands), || (), || {
            sim.frame();
            assert_eq!(a.lines(), vec![0, 1]);
            assert_eq!(b.lines(), vec![0, 1, 2]);
            assert_eq!(a.frames(), 1);
            assert_eq!(b.frames(), 1);

            sim.frame();
            assert_eq!(a.lines(), vec![0, 1, 0, 1]);
            assert_eq!(a.frames(), 2);
        });
    }

    #[test]
    fn whole_frame_repeats_once_per_band() {
        let pipe = VideoPipeline::new();
        let mut sim = Sim::new(&pipe);
        let a = Recorder::new(1, usize::max_value());
        let bands = [Band::new(&a, 6)];
        pipe.with_band_list(link_slice(&bands), || (), || {
            use LineOutcome::*;
            assert_eq!(
                sim.frame(),
                vec![
                    Idle, Idle, Rasterized, Repeated, Repeated, Repeated,
                    Repeated, Repeated, Idle, Idle
                ]
            );
        });
    }

    #[test]
    fn replaced_list_takes_effect_next_frame() {
        let pipe = VideoPipeline::new();
        let mut sim = Sim::new(&pipe);
        let a = Recorder::new(1, 0);
        let b = Recorder::new(2, 0);
        let list_a = [Band::new(&a, 6)];
        let list_b = [Band::new(&b, 6)];

        pipe.with_band_list(link_slice(&list_a), || (), || {
            // Through the third visible line.
            for _ in 0..5 {
                sim.step();
            }
        });
        assert_eq!(a.lines(), vec![0, 1, 2]);

        pipe.with_band_list(link_slice(&list_b), || (), || {
            let rest: Vec<_> = (0..5).map(|_| sim.step().1).collect();
            use LineOutcome::*;
            assert_eq!(rest, vec![Blank, Blank, Blank, Idle, Idle]);
            // Neither list saw a complete frame.
            assert_eq!(a.frames() + b.frames(), 0);

            sim.frame();
            assert_eq!(b.lines(), (0..6).collect::<Vec<_>>());
            assert_eq!(b.frames(), 1);
        });
        assert_eq!(a.lines(), vec![0, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "reentrant")]
    fn nested_donation_panics() {
        let p = VideoPipeline::new();
        p.with_band_list(None, || (), || {
            p.with_band_list(None, || (), || ());
        });
    }

    #[test]
    fn sync_to_vblank_waits_for_transition() {
        let pipe = VideoPipeline::new();
        let mut sim = Sim::new(&pipe);
        for _ in 0..3 {
            sim.step();
        }
        let mut steps = 0;
        pipe.sync_to_vblank(|| {
            sim.step();
            steps += 1;
        });
        assert_eq!(pipe.line(), 0);
        assert_eq!(steps, 7);

        // Already at line zero: waits a whole frame.
        let mut steps = 0;
        pipe.sync_to_vblank(|| {
            sim.step();
            steps += 1;
        });
        assert_eq!(steps, 10);
    }

    #[test]
    fn wait_for_vblank_returns_early_in_blanking() {
        let pipe = VideoPipeline::new();
        let mut sim = Sim::new(&pipe);
        let mut steps = 0;
        pipe.wait_for_vblank(|| steps += 1);
        assert_eq!(steps, 0);

        for _ in 0..5 {
            sim.step();
        }
        assert!(pipe.vert_state().is_displayed_state());
        pipe.wait_for_vblank(|| {
            sim.step();
            steps += 1;
        });
        assert_eq!(pipe.vert_state(), VState::Blank);
        assert_eq!(steps, 5);
    }

    #[test]
    fn reset_forgets_frame() {
        let pipe = VideoPipeline::new();
        let mut sim = Sim::new(&pipe);
        for _ in 0..5 {
            sim.step();
        }
        pipe.reset();
        assert_eq!(pipe.line(), 0);
        assert_eq!(pipe.vert_state(), VState::Blank);
    }
}
