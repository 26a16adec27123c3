//! Context creation entry point.

use crate::context::{ContextHandle, RawContext};
use crate::error::{set_error, CreationError};
use crate::format::FormatRequirements;
use crate::version::VersionProfile;

use lazy_static::lazy_static;
use parking_lot::{Mutex, Once};
use std::{fmt, os::raw::c_void, ptr};

lazy_static! {
    /// Serializes every context creation in the process. Negotiation swaps
    /// process-wide state (error handlers, current contexts) while it runs.
    static ref CREATION_LOCK: Mutex<()> = Mutex::new(());
}

/// A native windowing system able to create OpenGL contexts.
pub trait Platform {
    type Raw: RawContext;

    /// Probes extensions, selects a format and negotiates a context for the
    /// given native display and window.
    unsafe fn create_raw(
        display: *mut c_void,
        window: *mut c_void,
        requirements: &FormatRequirements,
        shared: Option<&Self::Raw>,
    ) -> Result<(Self::Raw, VersionProfile), CreationError>;

    /// Resolves a rendering API entry point, null if it is not available.
    fn get_proc_address(name: &str) -> *const c_void;

    /// Guard for the process-wide capability-table loader.
    fn loader_once() -> &'static Once;
}

/// Signature of the one-time capability-table loader. It receives a symbol
/// resolver valid while the new context is current.
pub type Loader<'a> = Box<dyn FnOnce(&dyn Fn(&str) -> *const c_void) + 'a>;

/// Configures and creates a context.
pub struct ContextBuilder<'a, P: Platform> {
    requirements: FormatRequirements,
    shared: Option<&'a ContextHandle<P::Raw>>,
    loader: Option<Loader<'a>>,
}

impl<'a, P: Platform> fmt::Debug for ContextBuilder<'a, P> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ContextBuilder")
            .field("requirements", &self.requirements)
            .field("shared", &self.shared.is_some())
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

impl<'a, P: Platform> Default for ContextBuilder<'a, P> {
    fn default() -> Self {
        ContextBuilder {
            requirements: FormatRequirements::default(),
            shared: None,
            loader: None,
        }
    }
}

impl<'a, P: Platform> ContextBuilder<'a, P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the minimum surface requirements.
    pub fn with_requirements(mut self, requirements: FormatRequirements) -> Self {
        self.requirements = requirements;
        self
    }

    /// Shares object namespaces with an existing context.
    pub fn with_shared_context(mut self, shared: &'a ContextHandle<P::Raw>) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Registers the capability-table loader. It runs at most once per
    /// process, right after the first successful creation that carries one.
    pub fn with_loader<F>(mut self, loader: F) -> Self
    where
        F: FnOnce(&dyn Fn(&str) -> *const c_void) + 'a,
    {
        self.loader = Some(Box::new(loader));
        self
    }

    /// Creates a context, or returns `None` and records the reason for
    /// `last_error`.
    pub fn build(self, display: *mut c_void, window: *mut c_void) -> Option<ContextHandle<P::Raw>> {
        match self.try_build(display, window) {
            Ok(context) => Some(context),
            Err(e) => {
                log::error!("OpenGL context creation failed: {}", e);
                set_error(e.to_string());
                None
            }
        }
    }

    /// Like `build`, taking the handles from a windowing library.
    pub fn build_from_window(
        self,
        window: &impl raw_window_handle::HasRawWindowHandle,
    ) -> Option<ContextHandle<P::Raw>> {
        match crate::window::native_handles(window.raw_window_handle()) {
            Ok((display, window)) => self.build(display, window),
            Err(e) => {
                log::error!("OpenGL context creation failed: {}", e);
                set_error(e.to_string());
                None
            }
        }
    }

    fn try_build(
        self,
        display: *mut c_void,
        window: *mut c_void,
    ) -> Result<ContextHandle<P::Raw>, CreationError> {
        if window.is_null() {
            return Err(CreationError::InvalidHandle);
        }

        let _lock = CREATION_LOCK.lock();
        let shared = self.shared.map(|handle| handle.raw());
        let (raw, version) =
            unsafe { P::create_raw(display, window, &self.requirements, shared)? };
        let context = ContextHandle::new(raw, version);

        if let Some(loader) = self.loader {
            P::loader_once().call_once(|| {
                context.make_current();
                loader(&P::get_proc_address);
                context.clear_current();
            });
        }
        Ok(context)
    }
}

/// Resolves `name` through a platform; convenience for callers holding
/// neither a builder nor a context.
pub fn get_proc_address<P: Platform>(name: &str) -> *const c_void {
    if name.is_empty() {
        return ptr::null();
    }
    P::get_proc_address(name)
}
