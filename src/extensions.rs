//! Helpers shared by the per-platform extension probes.

use std::{mem, os::raw::c_void};

/// Returns `true` if `name` appears as a whole, space separated token in
/// `extensions`. Substrings of longer extension names do not count.
pub fn is_extension_supported(extensions: &str, name: &str) -> bool {
    if name.is_empty() || name.contains(' ') {
        return false;
    }
    extensions.split(' ').any(|ext| ext == name)
}

/// Reinterprets a resolved address as a function pointer, treating null as
/// "not supported".
///
/// # Safety
///
/// `F` must be a function pointer type matching the symbol's real signature.
pub(crate) unsafe fn load_fn<F: Copy>(address: *const c_void) -> Option<F> {
    debug_assert_eq!(mem::size_of::<F>(), mem::size_of::<*const c_void>());
    if address.is_null() {
        None
    } else {
        Some(mem::transmute_copy(&address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_token_matching() {
        let exts = "GL_ARB_sync2 GL_ARB_sync";
        assert!(is_extension_supported(exts, "GL_ARB_sync"));
        assert!(is_extension_supported(exts, "GL_ARB_sync2"));
        assert!(!is_extension_supported("GL_ARB_sync2 GL_ARB_syncx", "GL_ARB_sync"));
        assert!(!is_extension_supported("XGL_ARB_sync", "GL_ARB_sync"));
        assert!(is_extension_supported(
            "GLX_ARB_multisample GLX_ARB_create_context ",
            "GLX_ARB_create_context"
        ));
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(!is_extension_supported("GL_A GL_B", ""));
        assert!(!is_extension_supported("GL_A GL_B", "GL_A GL_B"));
        assert!(!is_extension_supported("", "GL_A"));
    }

    #[test]
    fn null_address_is_unsupported() {
        type Fun = unsafe extern "C" fn() -> u32;
        unsafe extern "C" fn answer() -> u32 {
            42
        }
        let missing: Option<Fun> = unsafe { load_fn(std::ptr::null()) };
        assert!(missing.is_none());
        let found: Option<Fun> = unsafe { load_fn(answer as *const c_void) };
        assert_eq!(found.map(|f| unsafe { f() }), Some(42));
    }
}
