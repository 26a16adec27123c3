//! Scoped interception of process-wide, asynchronous error reporting.
//!
//! Some windowing systems report context creation failures only through a
//! global error callback. `ErrorTrap` swaps in a handler that raises a flag,
//! and puts the previous handler back when dropped, on every exit path.
//! The swap is process-wide, so traps must only be set while holding the
//! creation lock.

use std::sync::atomic::{AtomicBool, Ordering};

static ERROR_OCCURRED: AtomicBool = AtomicBool::new(false);

/// Records that an error was reported. Called from the installed handler.
pub(crate) fn note_error() {
    ERROR_OCCURRED.store(true, Ordering::SeqCst);
}

/// A process-wide error handler slot.
pub(crate) trait HandlerSlot {
    type Handler: Copy;

    /// Installs `handler`, returning whatever was installed before.
    unsafe fn replace(&self, handler: Option<Self::Handler>) -> Option<Self::Handler>;
}

pub(crate) struct ErrorTrap<'a, S: HandlerSlot> {
    slot: &'a S,
    previous: Option<S::Handler>,
}

impl<'a, S: HandlerSlot> ErrorTrap<'a, S> {
    pub(crate) unsafe fn install(slot: &'a S, handler: S::Handler) -> Self {
        let previous = slot.replace(Some(handler));
        ERROR_OCCURRED.store(false, Ordering::SeqCst);
        ErrorTrap { slot, previous }
    }

    /// Clears the flag ahead of the next native call.
    pub(crate) fn reset(&self) {
        ERROR_OCCURRED.store(false, Ordering::SeqCst);
    }

    /// Whether an error was reported since the last `reset`.
    pub(crate) fn triggered(&self) -> bool {
        ERROR_OCCURRED.load(Ordering::SeqCst)
    }

    /// Runs `create` with the flag cleared, then `flush`es pending errors.
    /// A handle produced while an error was reported is passed to `destroy`
    /// and `None` is returned in its place.
    pub(crate) fn create_checked<T, C, F, D>(&self, create: C, flush: F, destroy: D) -> Option<*mut T>
    where
        C: FnOnce() -> *mut T,
        F: FnOnce(),
        D: FnOnce(*mut T),
    {
        self.reset();
        let handle = create();
        flush();

        if handle.is_null() {
            return None;
        }
        if self.triggered() {
            log::debug!("Discarding a handle created while an error was reported");
            destroy(handle);
            return None;
        }
        Some(handle)
    }
}

impl<'a, S: HandlerSlot> Drop for ErrorTrap<'a, S> {
    fn drop(&mut self) {
        unsafe {
            self.slot.replace(self.previous);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::{negotiate, ContextAttempt, GlVersion, Profile, VersionProfile};
    use parking_lot::Mutex;
    use std::cell::Cell;

    // The flag is process-wide; keep these tests from interleaving.
    static FLAG_LOCK: Mutex<()> = parking_lot::const_mutex(());

    struct MockSlot {
        current: Cell<Option<u32>>,
        swaps: Cell<usize>,
    }

    impl HandlerSlot for MockSlot {
        type Handler = u32;

        unsafe fn replace(&self, handler: Option<u32>) -> Option<u32> {
            self.swaps.set(self.swaps.get() + 1);
            self.current.replace(handler)
        }
    }

    fn slot(previous: Option<u32>) -> MockSlot {
        MockSlot {
            current: Cell::new(previous),
            swaps: Cell::new(0),
        }
    }

    #[test]
    fn restores_previous_handler() {
        let _guard = FLAG_LOCK.lock();
        let slot = slot(Some(1));
        {
            let trap = unsafe { ErrorTrap::install(&slot, 2) };
            assert_eq!(slot.current.get(), Some(2));
            assert!(!trap.triggered());
            note_error();
            assert!(trap.triggered());
            trap.reset();
            assert!(!trap.triggered());
        }
        assert_eq!(slot.current.get(), Some(1));
        assert_eq!(slot.swaps.get(), 2);
    }

    #[test]
    fn restores_on_early_return() {
        fn fails(slot: &MockSlot) -> Result<(), ()> {
            let trap = unsafe { ErrorTrap::install(slot, 5) };
            note_error();
            if trap.triggered() {
                return Err(());
            }
            Ok(())
        }

        let _guard = FLAG_LOCK.lock();
        let slot = slot(None);
        assert_eq!(fails(&slot), Err(()));
        assert_eq!(slot.current.get(), None);
        assert_eq!(slot.swaps.get(), 2);
    }

    struct TrappedAttempt<'t> {
        trap: &'t ErrorTrap<'t, MockSlot>,
        tried: Vec<VersionProfile>,
        destroyed: Vec<usize>,
    }

    impl<'t> ContextAttempt for TrappedAttempt<'t> {
        type Raw = *mut u8;

        fn supports_attributes(&self) -> bool {
            true
        }

        unsafe fn attempt(&mut self, request: VersionProfile) -> Option<*mut u8> {
            self.tried.push(request);
            let tag = request.version.major as usize * 10 + request.version.minor as usize;
            let destroyed = &mut self.destroyed;
            self.trap.create_checked(
                || {
                    // 4.6 comes back non-null but reports an error.
                    if tag == 46 {
                        note_error();
                    }
                    tag as *mut u8
                },
                || {},
                |handle| destroyed.push(handle as usize),
            )
        }

        unsafe fn driver_error(&self) -> Option<u32> {
            None
        }
    }

    #[test]
    fn spurious_context_is_destroyed_and_negotiation_continues() {
        let _guard = FLAG_LOCK.lock();
        let slot = slot(Some(9));
        let result = {
            let trap = unsafe { ErrorTrap::install(&slot, 4) };
            let mut attempt = TrappedAttempt {
                trap: &trap,
                tried: Vec::new(),
                destroyed: Vec::new(),
            };
            let result = unsafe { negotiate(&mut attempt) };
            assert_eq!(attempt.destroyed, vec![46]);
            assert_eq!(attempt.tried.len(), 2);
            result
        };

        let (raw, negotiated) = result.unwrap();
        assert_eq!(raw as usize, 45);
        assert_eq!(
            negotiated,
            VersionProfile {
                version: GlVersion::new(4, 5),
                profile: Profile::Core,
            }
        );
        assert_eq!(slot.current.get(), Some(9));
    }

    #[test]
    fn null_handle_is_not_destroyed() {
        let _guard = FLAG_LOCK.lock();
        let slot = slot(None);
        let trap = unsafe { ErrorTrap::install(&slot, 1) };
        let mut destroyed = 0;
        let handle = trap.create_checked(
            || {
                note_error();
                std::ptr::null_mut::<u8>()
            },
            || {},
            |_| destroyed += 1,
        );
        assert!(handle.is_none());
        assert_eq!(destroyed, 0);
    }

    #[test]
    fn install_clears_stale_flag() {
        let _guard = FLAG_LOCK.lock();
        note_error();
        let slot = slot(None);
        let trap = unsafe { ErrorTrap::install(&slot, 3) };
        assert!(!trap.triggered());
    }
}
