//! Native OpenGL 3.2+ context creation.
//!
//! Given a native window (and, on X11, its display connection), the crate
//! probes the driver, picks a pixel format and negotiates the most capable
//! (profile, version) pair the driver accepts, walking Core 4.6 down to
//! Core 3.2 and then the same versions in the Compatibility profile.
//!
//! ```no_run
//! # let (display, window) = (std::ptr::null_mut(), std::ptr::null_mut());
//! match gfx_gl_context::create(display, window) {
//!     Some(context) => {
//!         context.make_current();
//!         log::info!("running {:?}", context.version());
//!         context.swap_buffers();
//!     }
//!     None => log::error!("{:?}", gfx_gl_context::last_error()),
//! }
//! ```
//!
//! Backends: WGL on Windows, GLX on X11 unix, NSOpenGL on macOS. Every other
//! target builds, but creation always fails.

#[cfg(cgl)]
#[macro_use]
extern crate objc;

mod context;
mod error;
mod extensions;
mod factory;
mod format;
#[cfg_attr(not(glx), allow(dead_code))]
mod trap;
mod version;
pub mod window;

pub use crate::context::{ContextHandle, RawContext};
pub use crate::error::{last_error, CreationError};
pub use crate::extensions::is_extension_supported;
pub use crate::factory::{ContextBuilder, Loader, Platform};
pub use crate::format::{best_multisample, FormatCandidate, FormatRequirements};
pub use crate::version::{negotiation_order, GlVersion, Profile, VersionProfile, MIN_VERSION};

use std::os::raw::c_void;

/// A context on this target's native platform.
pub type Context = ContextHandle<window::NativeContext>;

/// Builder for `Context`.
pub type Builder<'a> = ContextBuilder<'a, window::Native>;

/// Creates a context for `window` with the default format requirements.
///
/// `display` is the X11 `Display*` under GLX and ignored elsewhere. On
/// failure, returns `None` and the reason is available from `last_error`.
pub fn create(display: *mut c_void, window: *mut c_void) -> Option<Context> {
    Builder::new().build(display, window)
}

/// Resolves an OpenGL entry point by name. Null if unknown or `name` is
/// empty. Extension entry points generally need a current context.
pub fn get_proc_address(name: &str) -> *const c_void {
    factory::get_proc_address::<window::Native>(name)
}
