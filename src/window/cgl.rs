//! NSOpenGL context creation on macOS.
//!
//! There is no way to enumerate pixel formats here: a format is either
//! obtainable for an attribute list or not, and the profile is part of the
//! format.

use crate::{
    context::RawContext,
    error::CreationError,
    factory::Platform,
    format::{self, FormatRequirements},
    version::{self, ContextAttempt, GlVersion, Profile, VersionProfile},
};

use arrayvec::ArrayVec;
use cocoa::base::{id, nil};
use cocoa::foundation::NSRect;
use lazy_static::lazy_static;
use libloading::Library;
use objc::runtime::{BOOL, YES};
use parking_lot::Once;
use std::{os::raw::c_void, ptr};

const OPENGL_FRAMEWORK: &str = "/System/Library/Frameworks/OpenGL.framework/OpenGL";

const NS_OPENGL_PFA_DOUBLE_BUFFER: u32 = 5;
const NS_OPENGL_PFA_COLOR_SIZE: u32 = 8;
const NS_OPENGL_PFA_ALPHA_SIZE: u32 = 11;
const NS_OPENGL_PFA_DEPTH_SIZE: u32 = 12;
const NS_OPENGL_PFA_STENCIL_SIZE: u32 = 13;
const NS_OPENGL_PFA_ACCELERATED: u32 = 73;
const NS_OPENGL_PFA_OPENGL_PROFILE: u32 = 99;

const NS_OPENGL_PROFILE_VERSION_LEGACY: u32 = 0x1000;
const NS_OPENGL_PROFILE_VERSION_3_2_CORE: u32 = 0x3200;
const NS_OPENGL_PROFILE_VERSION_4_1_CORE: u32 = 0x4100;

lazy_static! {
    static ref FRAMEWORK: Option<Library> = match unsafe { Library::new(OPENGL_FRAMEWORK) } {
        Ok(lib) => Some(lib),
        Err(e) => {
            log::warn!("Cannot open {}: {}", OPENGL_FRAMEWORK, e);
            None
        }
    };
}

static LOADED: Once = Once::new();

/// NSOpenGL profile constant for a (profile, version) pair, if the system
/// has one. Only two pairs exist.
fn profile_constant(request: VersionProfile) -> Option<u32> {
    match (request.profile, request.version) {
        (Profile::Core, v) if v == GlVersion::new(4, 1) => Some(NS_OPENGL_PROFILE_VERSION_4_1_CORE),
        (Profile::Core, v) if v == GlVersion::new(3, 2) => Some(NS_OPENGL_PROFILE_VERSION_3_2_CORE),
        _ => None,
    }
}

fn pixel_format_attributes(requirements: &FormatRequirements, profile: u32) -> ArrayVec<[u32; 16]> {
    let mut attributes = ArrayVec::new();
    attributes.push(NS_OPENGL_PFA_ACCELERATED);
    if requirements.double_buffer {
        attributes.push(NS_OPENGL_PFA_DOUBLE_BUFFER);
    }
    attributes.extend(
        [
            NS_OPENGL_PFA_COLOR_SIZE,
            requirements.color_bits() as u32,
            NS_OPENGL_PFA_ALPHA_SIZE,
            requirements.alpha_bits as u32,
            NS_OPENGL_PFA_DEPTH_SIZE,
            requirements.min_depth_bits as u32,
            NS_OPENGL_PFA_STENCIL_SIZE,
            requirements.min_stencil_bits as u32,
            NS_OPENGL_PFA_OPENGL_PROFILE,
            profile,
            0,
        ]
        .iter()
        .cloned(),
    );
    attributes
}

/// Returns a retained `NSOpenGLPixelFormat`, or `nil`.
unsafe fn pixel_format(attributes: &[u32]) -> id {
    let format: id = msg_send![class!(NSOpenGLPixelFormat), alloc];
    msg_send![format, initWithAttributes: attributes.as_ptr()]
}

struct CglAttempt<'a> {
    requirements: &'a FormatRequirements,
    shared: id,
}

impl<'a> ContextAttempt for CglAttempt<'a> {
    type Raw = id;

    fn supports_attributes(&self) -> bool {
        true
    }

    unsafe fn attempt(&mut self, request: VersionProfile) -> Option<id> {
        let profile = profile_constant(request)?;
        let format = pixel_format(&pixel_format_attributes(self.requirements, profile));
        if format == nil {
            return None;
        }
        let context: id = msg_send![class!(NSOpenGLContext), alloc];
        let context: id = msg_send![context, initWithFormat: format shareContext: self.shared];
        let _: () = msg_send![format, release];
        if context == nil {
            None
        } else {
            Some(context)
        }
    }

    unsafe fn driver_error(&self) -> Option<u32> {
        None
    }
}

/// An `NSOpenGLContext` attached to a view.
#[derive(Debug)]
pub struct CglContext {
    context: id,
    view: id,
}

unsafe impl Send for CglContext {}

impl CglContext {
    fn frame(&self) -> NSRect {
        unsafe { msg_send![self.view, frame] }
    }
}

impl RawContext for CglContext {
    fn is_current(&self) -> bool {
        let current: id = unsafe { msg_send![class!(NSOpenGLContext), currentContext] };
        current == self.context
    }

    unsafe fn make_current(&self) {
        let _: () = msg_send![self.context, makeCurrentContext];
    }

    unsafe fn clear_current(&self) {
        let _: () = msg_send![class!(NSOpenGLContext), clearCurrentContext];
    }

    unsafe fn swap_buffers(&self) {
        let _: () = msg_send![self.context, flushBuffer];
    }

    fn width(&self) -> i32 {
        self.frame().size.width as i32
    }

    fn height(&self) -> i32 {
        self.frame().size.height as i32
    }

    unsafe fn destroy(&mut self) {
        let _: () = msg_send![self.context, clearDrawable];
        let _: () = msg_send![self.context, release];
        self.context = nil;
    }
}

/// The macOS platform. Takes an `NSWindow` or an `NSView` as the window
/// handle; the display handle is unused.
#[derive(Debug)]
pub enum Cgl {}

impl Platform for Cgl {
    type Raw = CglContext;

    unsafe fn create_raw(
        _display: *mut c_void,
        window: *mut c_void,
        requirements: &FormatRequirements,
        shared: Option<&CglContext>,
    ) -> Result<(CglContext, VersionProfile), CreationError> {
        let object = window as id;
        let is_window: BOOL = msg_send![object, respondsToSelector: sel!(contentView)];
        let view: id = if is_window == YES {
            msg_send![object, contentView]
        } else {
            object
        };
        if view == nil {
            return Err(CreationError::InvalidHandle);
        }

        format::choose(None, requirements, || {
            let legacy = pixel_format(&pixel_format_attributes(
                requirements,
                NS_OPENGL_PROFILE_VERSION_LEGACY,
            ));
            if legacy == nil {
                None
            } else {
                let _: () = msg_send![legacy, release];
                Some(())
            }
        })?;

        let (context, version) = version::negotiate(&mut CglAttempt {
            requirements,
            shared: shared.map_or(nil, |shared| shared.context),
        })?;
        let _: () = msg_send![context, setView: view];

        Ok((CglContext { context, view }, version))
    }

    fn get_proc_address(name: &str) -> *const c_void {
        match *FRAMEWORK {
            Some(ref lib) => unsafe {
                lib.get::<*const c_void>(name.as_bytes())
                    .map(|sym| *sym)
                    .unwrap_or(ptr::null())
            },
            None => ptr::null(),
        }
    }

    fn loader_once() -> &'static Once {
        &LOADED
    }
}
