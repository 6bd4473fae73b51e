//! Scenes, and running them one after another.
//!
//! A scene is a band list plus some per-frame work. Scenes are built fresh
//! each time they run, out of an arena that is reset in between, so a demo
//! made of several scenes only needs as much memory as its largest scene.

use softvga::arena::Arena;
use softvga::band::Band;
use softvga::priority::Thread;

/// A chunk of a demo, which renders frames until it stops doing so.
pub trait Scene<'a> {
    /// The band list to show while this scene runs.
    fn bands(&self) -> Option<&'a Band<'a>>;

    /// Renders frame `frame`, counted from the start of the scene. Called
    /// shortly after vblank begins, so work that must finish before video
    /// (like flipping buffers) should come first.
    ///
    /// Returns `false` to end the scene.
    fn render_frame(&self, frame: usize, p: Thread) -> bool;
}

/// Builds a scene out of the arena and passes it to the continuation.
///
/// Scenes borrow their rasterizers, which usually live on the builder's
/// stack, so the builder calls back into the runner rather than returning.
pub type Builder = fn(&Arena<'_>, &mut dyn FnMut(&dyn Scene<'_>));

/// Somewhere to show band lists.
pub trait Display {
    /// Displays `head` while calling `frame` once per frame with the frame
    /// number, until it returns `false`.
    fn show<'a>(
        &mut self,
        head: Option<&'a Band<'a>>,
        frame: &mut dyn FnMut(usize) -> bool,
    );
}

#[cfg(target_os = "none")]
impl Display for softvga::Vga<softvga::Sync> {
    fn show<'a>(
        &mut self,
        head: Option<&'a Band<'a>>,
        frame: &mut dyn FnMut(usize) -> bool,
    ) {
        self.with_band_list(head, |vga| {
            let mut n = 0;
            loop {
                let more = frame(n);
                n += 1;
                vga.sync_to_vblank();
                vga.video_on();
                if !more {
                    break;
                }
            }
        })
    }
}

/// Runs one scene to completion. Returns the number of frames rendered.
pub fn run_scene<'a>(
    display: &mut impl Display,
    scene: &dyn Scene<'a>,
    p: Thread,
) -> usize {
    let mut frames = 0;
    display.show(scene.bands(), &mut |frame| {
        frames = frame + 1;
        scene.render_frame(frame, p)
    });
    frames
}

/// Builds and runs each scene in turn, resetting `arena` before each one.
pub fn run_scenes(
    display: &mut impl Display,
    arena: &mut Arena<'_>,
    scenes: &[Builder],
    p: Thread,
) {
    for (i, build) in scenes.iter().enumerate() {
        arena.reset();
        log::info!("scene {} of {}", i + 1, scenes.len());
        build(arena, &mut |scene: &dyn Scene<'_>| {
            let frames = run_scene(display, scene, p);
            log::debug!("scene {} done after {} frames", i + 1, frames);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records what it was shown, and gives up after `limit` frames.
    struct FakeDisplay {
        shown: Vec<(usize, usize)>,
        limit: usize,
    }

    impl Display for FakeDisplay {
        fn show<'a>(
            &mut self,
            head: Option<&'a Band<'a>>,
            frame: &mut dyn FnMut(usize) -> bool,
        ) {
            let mut n = 0;
            while n < self.limit && frame(n) {
                n += 1;
            }
            self.shown.push((softvga::band::total_lines(head), n));
        }
    }

    struct Counting<'a> {
        bands: &'a [Band<'a>],
        last_frame: usize,
        seen: Cell<usize>,
    }

    impl<'a> Scene<'a> for Counting<'a> {
        fn bands(&self) -> Option<&'a Band<'a>> {
            softvga::band::link_slice(self.bands)
        }

        fn render_frame(&self, frame: usize, _: Thread) -> bool {
            assert_eq!(frame, self.seen.get(), "frames out of order");
            self.seen.set(frame + 1);
            frame < self.last_frame
        }
    }

    fn thread() -> Thread {
        unsafe { Thread::new() }
    }

    #[test]
    fn scene_runs_until_it_says_stop() {
        let bands = [Band::blank(200), Band::blank(400)];
        let scene = Counting {
            bands: &bands,
            last_frame: 9,
            seen: Cell::new(0),
        };
        let mut d = FakeDisplay {
            shown: vec![],
            limit: 100,
        };
        assert_eq!(run_scene(&mut d, &scene, thread()), 10);
        assert_eq!(d.shown, vec![(600, 9)]);
    }

    static USED_AT_BUILD: AtomicUsize = AtomicUsize::new(usize::max_value());

    fn small(arena: &Arena<'_>, run: &mut dyn FnMut(&dyn Scene<'_>)) {
        USED_AT_BUILD.store(arena.used(), Ordering::SeqCst);
        let buf = arena.alloc_slice_fill(100, 0u32);
        let bands = [Band::blank(buf.len())];
        run(&Counting {
            bands: &bands,
            last_frame: 2,
            seen: Cell::new(0),
        })
    }

    fn large(arena: &Arena<'_>, run: &mut dyn FnMut(&dyn Scene<'_>)) {
        // Would not fit if `small`'s buffer were still allocated.
        assert_eq!(arena.used(), 0);
        let buf = arena.alloc_slice_fill(200, 0u32);
        let bands = [Band::blank(buf.len() * 2)];
        run(&Counting {
            bands: &bands,
            last_frame: 0,
            seen: Cell::new(0),
        })
    }

    #[test]
    fn scenes_run_in_order_with_a_fresh_arena() {
        let mut mem = [0u8; 900];
        let mut arena = Arena::new(&mut mem);
        // Leave the arena dirty going in.
        let _ = arena.alloc(1u8);

        let mut d = FakeDisplay {
            shown: vec![],
            limit: 100,
        };
        run_scenes(&mut d, &mut arena, &[small, large, small], thread());

        assert_eq!(d.shown, vec![(100, 2), (400, 0), (100, 2)]);
        assert_eq!(USED_AT_BUILD.load(Ordering::SeqCst), 0);
    }
}
