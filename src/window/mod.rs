use crate::error::CreationError;
use raw_window_handle::RawWindowHandle;
use std::os::raw::c_void;

#[cfg(wgl)]
pub mod wgl;
#[cfg(wgl)]
pub use self::wgl::{Wgl as Native, WglContext as NativeContext};

#[cfg(glx)]
pub mod glx;
#[cfg(glx)]
pub use self::glx::{Glx as Native, GlxContext as NativeContext};

#[cfg(cgl)]
pub mod cgl;
#[cfg(cgl)]
pub use self::cgl::{Cgl as Native, CglContext as NativeContext};

#[cfg(unsupported)]
pub mod dummy;
#[cfg(unsupported)]
pub use self::dummy::{Dummy as Native, DummyContext as NativeContext};

/// Splits a window library handle into the (display, window) pair the
/// factory takes.
pub(crate) fn native_handles(
    handle: RawWindowHandle,
) -> Result<(*mut c_void, *mut c_void), CreationError> {
    match handle {
        #[cfg(wgl)]
        RawWindowHandle::Windows(handle) => Ok((std::ptr::null_mut(), handle.hwnd)),
        #[cfg(glx)]
        RawWindowHandle::Xlib(handle) => Ok((handle.display, handle.window as *mut c_void)),
        #[cfg(cgl)]
        RawWindowHandle::MacOS(handle) if !handle.ns_view.is_null() => {
            Ok((std::ptr::null_mut(), handle.ns_view))
        }
        #[cfg(cgl)]
        RawWindowHandle::MacOS(handle) => Ok((std::ptr::null_mut(), handle.ns_window)),
        other => {
            log::warn!("Unsupported window handle {:?}", other);
            Err(CreationError::InvalidHandle)
        }
    }
}
