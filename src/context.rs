//! The per-window context handle.

use crate::version::VersionProfile;

/// Native operations a backend context provides.
///
/// Implementations own the native context; the window surface is borrowed
/// from the caller's window and must outlive the context.
pub trait RawContext {
    /// Whether this context is the calling thread's current context.
    fn is_current(&self) -> bool;

    /// Binds the context to the calling thread.
    unsafe fn make_current(&self);

    /// Unbinds whatever context is current on the calling thread.
    unsafe fn clear_current(&self);

    /// Presents the back buffer. May re-bind the context on platforms where
    /// the native swap needs it.
    unsafe fn swap_buffers(&self);

    /// Drawable width in pixels.
    fn width(&self) -> i32;

    /// Drawable height in pixels.
    fn height(&self) -> i32;

    /// Releases the native context and any owned surface handle. Called
    /// exactly once, never while the context is current.
    unsafe fn destroy(&mut self);
}

/// A fully created OpenGL context bound to a window.
///
/// Handles are only ever returned fully valid, with a negotiated version of
/// at least 3.2. Dropping the handle detaches it from the calling thread
/// first if it is still current there.
#[derive(Debug)]
pub struct ContextHandle<R: RawContext> {
    raw: R,
    version: VersionProfile,
}

impl<R: RawContext> ContextHandle<R> {
    pub(crate) fn new(raw: R, version: VersionProfile) -> Self {
        ContextHandle { raw, version }
    }

    pub(crate) fn raw(&self) -> &R {
        &self.raw
    }

    /// The (profile, version) pair the driver accepted.
    pub fn version(&self) -> VersionProfile {
        self.version
    }

    /// Makes the context current on this thread. Does nothing if it already is.
    pub fn make_current(&self) {
        if !self.raw.is_current() {
            unsafe { self.raw.make_current() }
        }
    }

    /// Detaches any context from this thread.
    pub fn clear_current(&self) {
        unsafe { self.raw.clear_current() }
    }

    pub fn swap_buffers(&self) {
        unsafe { self.raw.swap_buffers() }
    }

    pub fn is_current(&self) -> bool {
        self.raw.is_current()
    }

    pub fn width(&self) -> i32 {
        self.raw.width()
    }

    pub fn height(&self) -> i32 {
        self.raw.height()
    }
}

impl<R: RawContext> Drop for ContextHandle<R> {
    fn drop(&mut self) {
        unsafe {
            if self.raw.is_current() {
                self.raw.clear_current();
            }
            self.raw.destroy();
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::RawContext;
    use std::cell::Cell;
    use std::rc::Rc;

    thread_local! {
        static CURRENT: Cell<usize> = Cell::new(0);
    }

    /// Call counters shared between a mock context and the test.
    #[derive(Debug, Default)]
    pub(crate) struct Counters {
        pub binds: Cell<usize>,
        pub clears: Cell<usize>,
        pub swaps: Cell<usize>,
        pub destroys: Cell<usize>,
    }

    #[derive(Debug)]
    pub(crate) struct MockContext {
        pub id: usize,
        pub counters: Rc<Counters>,
    }

    impl MockContext {
        pub(crate) fn new(id: usize) -> (Self, Rc<Counters>) {
            let counters = Rc::new(Counters::default());
            (
                MockContext {
                    id,
                    counters: counters.clone(),
                },
                counters,
            )
        }
    }

    pub(crate) fn current_id() -> usize {
        CURRENT.with(|c| c.get())
    }

    impl RawContext for MockContext {
        fn is_current(&self) -> bool {
            current_id() == self.id
        }

        unsafe fn make_current(&self) {
            self.counters.binds.set(self.counters.binds.get() + 1);
            CURRENT.with(|c| c.set(self.id));
        }

        unsafe fn clear_current(&self) {
            self.counters.clears.set(self.counters.clears.get() + 1);
            CURRENT.with(|c| c.set(0));
        }

        unsafe fn swap_buffers(&self) {
            self.counters.swaps.set(self.counters.swaps.get() + 1);
        }

        fn width(&self) -> i32 {
            640
        }

        fn height(&self) -> i32 {
            480
        }

        unsafe fn destroy(&mut self) {
            assert!(!self.is_current(), "destroyed while current");
            self.counters.destroys.set(self.counters.destroys.get() + 1);
        }
    }
}
