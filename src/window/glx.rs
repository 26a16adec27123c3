//! GLX context creation on X11.
//!
//! `libGL` and `libX11` are opened at runtime, once per process. GLX reports
//! context creation failures through the X error handler instead of return
//! values, so negotiation runs under an `ErrorTrap`.

use crate::{
    context::RawContext,
    error::CreationError,
    extensions::{is_extension_supported, load_fn},
    factory::Platform,
    format::{self, FormatCandidate, FormatRequirements},
    trap::{self, ErrorTrap, HandlerSlot},
    version::{self, ContextAttempt, VersionProfile},
};

use arrayvec::ArrayVec;
use lazy_static::lazy_static;
use libloading::Library;
use parking_lot::Once;
use std::{
    borrow::Cow,
    ffi::{CStr, CString},
    fmt,
    os::raw::{c_char, c_int, c_uint, c_ulong, c_void},
    ptr, slice,
};

const GL_LIBRARY: &str = "libGL.so.1";
const X11_LIBRARY: &str = "libX11.so.6";

type XDisplay = c_void;
type XWindow = c_ulong;
type Bool = c_int;
type GlxFbConfig = *mut c_void;
type GlxContextRaw = *mut c_void;

const TRUE: c_int = 1;
const FALSE: c_int = 0;
const NONE: c_int = 0;

const GLX_BUFFER_SIZE: c_int = 2;
const GLX_DOUBLEBUFFER: c_int = 5;
const GLX_STEREO: c_int = 6;
const GLX_RED_SIZE: c_int = 8;
const GLX_GREEN_SIZE: c_int = 9;
const GLX_BLUE_SIZE: c_int = 10;
const GLX_ALPHA_SIZE: c_int = 11;
const GLX_DEPTH_SIZE: c_int = 12;
const GLX_STENCIL_SIZE: c_int = 13;
const GLX_X_VISUAL_TYPE: c_int = 0x22;
const GLX_TRUE_COLOR: c_int = 0x8002;
const GLX_DRAWABLE_TYPE: c_int = 0x8010;
const GLX_RENDER_TYPE: c_int = 0x8011;
const GLX_X_RENDERABLE: c_int = 0x8012;
const GLX_WINDOW_BIT: c_int = 0x1;
const GLX_RGBA_BIT: c_int = 0x1;
const GLX_SAMPLE_BUFFERS: c_int = 100_000;
const GLX_SAMPLES: c_int = 100_001;
const GLX_RGBA_TYPE: c_int = 0x8014;

type GlxQueryVersionFun = unsafe extern "C" fn(*mut XDisplay, *mut c_int, *mut c_int) -> Bool;
type GlxQueryExtensionsStringFun = unsafe extern "C" fn(*mut XDisplay, c_int) -> *const c_char;
type GlxChooseFbConfigFun =
    unsafe extern "C" fn(*mut XDisplay, c_int, *const c_int, *mut c_int) -> *mut GlxFbConfig;
type GlxGetFbConfigAttribFun =
    unsafe extern "C" fn(*mut XDisplay, GlxFbConfig, c_int, *mut c_int) -> c_int;
type GlxCreateNewContextFun =
    unsafe extern "C" fn(*mut XDisplay, GlxFbConfig, c_int, GlxContextRaw, Bool) -> GlxContextRaw;
type GlxDestroyContextFun = unsafe extern "C" fn(*mut XDisplay, GlxContextRaw);
type GlxMakeCurrentFun = unsafe extern "C" fn(*mut XDisplay, XWindow, GlxContextRaw) -> Bool;
type GlxGetCurrentContextFun = unsafe extern "C" fn() -> GlxContextRaw;
type GlxSwapBuffersFun = unsafe extern "C" fn(*mut XDisplay, XWindow);
type GlxGetProcAddressFun = unsafe extern "C" fn(*const u8) -> *const c_void;
type GlxCreateContextAttribsArbFun = unsafe extern "C" fn(
    *mut XDisplay,
    GlxFbConfig,
    GlxContextRaw,
    Bool,
    *const c_int,
) -> GlxContextRaw;

type XErrorHandler = unsafe extern "C" fn(*mut XDisplay, *mut c_void) -> c_int;
type XSetErrorHandlerFun = unsafe extern "C" fn(Option<XErrorHandler>) -> Option<XErrorHandler>;
type XDefaultScreenFun = unsafe extern "C" fn(*mut XDisplay) -> c_int;
type XGetGeometryFun = unsafe extern "C" fn(
    *mut XDisplay,
    XWindow,
    *mut XWindow,
    *mut c_int,
    *mut c_int,
    *mut c_uint,
    *mut c_uint,
    *mut c_uint,
    *mut c_uint,
) -> c_int;
type XFreeFun = unsafe extern "C" fn(*mut c_void) -> c_int;
type XSyncFun = unsafe extern "C" fn(*mut XDisplay, Bool) -> c_int;

/// GLX and Xlib entry points needed to create and drive a context.
pub(crate) struct Entry {
    _gl: Library,
    _x11: Library,
    query_version: GlxQueryVersionFun,
    query_extensions_string: GlxQueryExtensionsStringFun,
    choose_fb_config: GlxChooseFbConfigFun,
    get_fb_config_attrib: GlxGetFbConfigAttribFun,
    create_new_context: GlxCreateNewContextFun,
    destroy_context: GlxDestroyContextFun,
    make_current: GlxMakeCurrentFun,
    get_current_context: GlxGetCurrentContextFun,
    swap_buffers: GlxSwapBuffersFun,
    get_proc_address: GlxGetProcAddressFun,
    set_error_handler: XSetErrorHandlerFun,
    default_screen: XDefaultScreenFun,
    get_geometry: XGetGeometryFun,
    free: XFreeFun,
    sync: XSyncFun,
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Entry").field("gl", &GL_LIBRARY).finish()
    }
}

unsafe fn symbol<T: Copy>(library: &Library, name: &str) -> Option<T> {
    library.get::<T>(name.as_bytes()).ok().map(|sym| *sym)
}

unsafe fn required<T: Copy>(library: &Library, name: &str) -> Result<T, String> {
    symbol(library, name).ok_or_else(|| format!("Cannot obtain required function {}", name))
}

impl Entry {
    unsafe fn load() -> Result<Self, String> {
        use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

        log::info!("Loading {} to create GLX contexts", GL_LIBRARY);
        let gl: Library = UnixLibrary::open(Some(GL_LIBRARY), RTLD_NOW | RTLD_GLOBAL)
            .map_err(|e| format!("Cannot open OpenGL library {}: {}", GL_LIBRARY, e))?
            .into();
        let x11 = Library::new(X11_LIBRARY)
            .map_err(|e| format!("Cannot open X11 library {}: {}", X11_LIBRARY, e))?;

        let get_proc_address = symbol(&gl, "glXGetProcAddressARB")
            .or_else(|| symbol(&gl, "glXGetProcAddress"))
            .ok_or_else(|| "Cannot obtain glXGetProcAddress".to_string())?;

        Ok(Entry {
            query_version: required(&gl, "glXQueryVersion")?,
            query_extensions_string: required(&gl, "glXQueryExtensionsString")?,
            choose_fb_config: required(&gl, "glXChooseFBConfig")?,
            get_fb_config_attrib: required(&gl, "glXGetFBConfigAttrib")?,
            create_new_context: required(&gl, "glXCreateNewContext")?,
            destroy_context: required(&gl, "glXDestroyContext")?,
            make_current: required(&gl, "glXMakeCurrent")?,
            get_current_context: required(&gl, "glXGetCurrentContext")?,
            swap_buffers: required(&gl, "glXSwapBuffers")?,
            get_proc_address,
            set_error_handler: required(&x11, "XSetErrorHandler")?,
            default_screen: required(&x11, "XDefaultScreen")?,
            get_geometry: required(&x11, "XGetGeometry")?,
            free: required(&x11, "XFree")?,
            sync: required(&x11, "XSync")?,
            _gl: gl,
            _x11: x11,
        })
    }

    fn resolve(&self, name: &str) -> *const c_void {
        match CString::new(name) {
            Ok(name) => unsafe { (self.get_proc_address)(name.as_ptr() as *const u8) },
            Err(_) => ptr::null(),
        }
    }
}

lazy_static! {
    static ref GLX_ENTRY: Result<Entry, String> = unsafe { Entry::load() };
}

static LOADED: Once = Once::new();

/// Creation-time entry points that may be missing.
#[derive(Default)]
struct GlxExtensions {
    create_context_attribs: Option<GlxCreateContextAttribsArbFun>,
}

unsafe fn probe(
    entry: &Entry,
    display: *mut XDisplay,
    screen: c_int,
) -> Result<GlxExtensions, CreationError> {
    let (mut major, mut minor) = (0, 0);
    if (entry.query_version)(display, &mut major, &mut minor) == FALSE || (major, minor) < (1, 3) {
        return Err(CreationError::NoDriver(format!(
            "GLX 1.3 or better is required, found {}.{}",
            major, minor
        )));
    }

    let raw = (entry.query_extensions_string)(display, screen);
    let extensions = if raw.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(raw).to_string_lossy()
    };
    log::info!("GLX {}.{}, extensions: {:?}", major, minor, extensions);

    let create_context_attribs = if is_extension_supported(&extensions, "GLX_ARB_create_context") {
        load_fn(entry.resolve("glXCreateContextAttribsARB"))
    } else {
        None
    };
    Ok(GlxExtensions {
        create_context_attribs,
    })
}

/// Makes sure the driver hands out a legacy context on `config` at all,
/// releasing it right away.
fn check_legacy_context<C, D>(create: C, destroy: D) -> Result<(), CreationError>
where
    C: FnOnce() -> Option<GlxContextRaw>,
    D: FnOnce(GlxContextRaw),
{
    match create() {
        Some(context) => {
            destroy(context);
            Ok(())
        }
        None => Err(CreationError::NoDriver("glXCreateNewContext failed".into())),
    }
}

fn config_attributes(requirements: &FormatRequirements) -> ArrayVec<[c_int; 32]> {
    let mut attributes = ArrayVec::new();
    attributes.extend(
        [
            GLX_X_RENDERABLE,
            TRUE,
            GLX_DRAWABLE_TYPE,
            GLX_WINDOW_BIT,
            GLX_RENDER_TYPE,
            GLX_RGBA_BIT,
            GLX_X_VISUAL_TYPE,
            GLX_TRUE_COLOR,
            GLX_RED_SIZE,
            requirements.red_bits as c_int,
            GLX_GREEN_SIZE,
            requirements.green_bits as c_int,
            GLX_BLUE_SIZE,
            requirements.blue_bits as c_int,
            GLX_ALPHA_SIZE,
            requirements.alpha_bits as c_int,
            GLX_DEPTH_SIZE,
            requirements.min_depth_bits as c_int,
            GLX_STENCIL_SIZE,
            requirements.min_stencil_bits as c_int,
            GLX_STEREO,
            FALSE,
        ]
        .iter()
        .cloned(),
    );
    if requirements.double_buffer {
        attributes.push(GLX_DOUBLEBUFFER);
        attributes.push(TRUE);
    }
    attributes.push(NONE);
    attributes
}

unsafe fn describe(entry: &Entry, display: *mut XDisplay, config: GlxFbConfig) -> FormatCandidate {
    let attrib = |name| {
        let mut value = 0;
        (entry.get_fb_config_attrib)(display, config, name, &mut value);
        value.max(0).min(0xFF) as u8
    };
    FormatCandidate {
        red_bits: attrib(GLX_RED_SIZE),
        green_bits: attrib(GLX_GREEN_SIZE),
        blue_bits: attrib(GLX_BLUE_SIZE),
        alpha_bits: attrib(GLX_ALPHA_SIZE),
        depth_bits: attrib(GLX_DEPTH_SIZE),
        stencil_bits: attrib(GLX_STENCIL_SIZE),
        double_buffer: attrib(GLX_DOUBLEBUFFER) != 0,
        sample_buffers: attrib(GLX_SAMPLE_BUFFERS),
        samples: attrib(GLX_SAMPLES),
    }
}

/// Runs `glXChooseFBConfig`, copying the configs out before freeing the list.
unsafe fn fb_configs(
    entry: &Entry,
    display: *mut XDisplay,
    screen: c_int,
    attributes: &[c_int],
) -> Vec<GlxFbConfig> {
    let mut count = 0;
    let list = (entry.choose_fb_config)(display, screen, attributes.as_ptr(), &mut count);
    if list.is_null() {
        return Vec::new();
    }
    let configs = slice::from_raw_parts(list, count.max(0) as usize).to_vec();
    (entry.free)(list as *mut c_void);
    configs
}

unsafe fn choose_config(
    entry: &Entry,
    display: *mut XDisplay,
    screen: c_int,
    requirements: &FormatRequirements,
) -> Result<GlxFbConfig, CreationError> {
    let enumerated = fb_configs(entry, display, screen, &config_attributes(requirements))
        .into_iter()
        .map(|config| (config, describe(entry, display, config)))
        .collect::<Vec<_>>();
    log::debug!("glXChooseFBConfig offered {} configs", enumerated.len());

    format::choose(Some(enumerated), requirements, || {
        log::warn!("Requested visual not supported, falling back on a single-buffered one");
        let single = [
            GLX_X_RENDERABLE,
            TRUE,
            GLX_DEPTH_SIZE,
            16,
            GLX_STENCIL_SIZE,
            8,
            GLX_BUFFER_SIZE,
            24,
            NONE,
        ];
        fb_configs(entry, display, screen, &single).first().cloned()
    })
}

struct XErrorSlot(&'static Entry);

impl HandlerSlot for XErrorSlot {
    type Handler = XErrorHandler;

    unsafe fn replace(&self, handler: Option<XErrorHandler>) -> Option<XErrorHandler> {
        (self.0.set_error_handler)(handler)
    }
}

unsafe extern "C" fn x_error_handler(_: *mut XDisplay, _: *mut c_void) -> c_int {
    trap::note_error();
    0
}

struct GlxAttempt<'t> {
    entry: &'static Entry,
    display: *mut XDisplay,
    config: GlxFbConfig,
    shared: GlxContextRaw,
    extensions: GlxExtensions,
    trap: &'t ErrorTrap<'t, XErrorSlot>,
}

impl<'t> ContextAttempt for GlxAttempt<'t> {
    type Raw = GlxContextRaw;

    fn supports_attributes(&self) -> bool {
        self.extensions.create_context_attribs.is_some()
    }

    unsafe fn attempt(&mut self, request: VersionProfile) -> Option<GlxContextRaw> {
        let create = self.extensions.create_context_attribs?;
        let attributes = request.attributes();
        let (entry, display) = (self.entry, self.display);

        self.trap.create_checked(
            || create(display, self.config, self.shared, TRUE, attributes.as_ptr()),
            // Errors arrive asynchronously; flush them before looking at the flag.
            || {
                (entry.sync)(display, FALSE);
            },
            |context| (entry.destroy_context)(display, context),
        )
    }

    /// Nothing is current after a failed negotiation, so `glGetError` has
    /// nothing to report.
    unsafe fn driver_error(&self) -> Option<u32> {
        None
    }
}

/// A GLX context rendering to an X11 window.
#[derive(Debug)]
pub struct GlxContext {
    entry: &'static Entry,
    display: *mut XDisplay,
    window: XWindow,
    context: GlxContextRaw,
}

unsafe impl Send for GlxContext {}

impl GlxContext {
    fn geometry(&self) -> (c_uint, c_uint) {
        let mut root = 0;
        let (mut x, mut y) = (0, 0);
        let (mut width, mut height, mut border, mut depth) = (0, 0, 0, 0);
        let status = unsafe {
            (self.entry.get_geometry)(
                self.display,
                self.window,
                &mut root,
                &mut x,
                &mut y,
                &mut width,
                &mut height,
                &mut border,
                &mut depth,
            )
        };
        if status != 0 {
            (width, height)
        } else {
            (0, 0)
        }
    }
}

impl RawContext for GlxContext {
    fn is_current(&self) -> bool {
        unsafe { (self.entry.get_current_context)() == self.context }
    }

    unsafe fn make_current(&self) {
        if (self.entry.make_current)(self.display, self.window, self.context) == FALSE {
            log::error!("glXMakeCurrent failed");
        }
    }

    unsafe fn clear_current(&self) {
        (self.entry.make_current)(self.display, 0, ptr::null_mut());
    }

    unsafe fn swap_buffers(&self) {
        (self.entry.swap_buffers)(self.display, self.window);
    }

    fn width(&self) -> i32 {
        self.geometry().0 as i32
    }

    fn height(&self) -> i32 {
        self.geometry().1 as i32
    }

    unsafe fn destroy(&mut self) {
        (self.entry.destroy_context)(self.display, self.context);
        self.context = ptr::null_mut();
    }
}

/// The GLX platform.
#[derive(Debug)]
pub enum Glx {}

impl Platform for Glx {
    type Raw = GlxContext;

    unsafe fn create_raw(
        display: *mut c_void,
        window: *mut c_void,
        requirements: &FormatRequirements,
        shared: Option<&GlxContext>,
    ) -> Result<(GlxContext, VersionProfile), CreationError> {
        if display.is_null() {
            return Err(CreationError::InvalidHandle);
        }
        let entry: &'static Entry = match &*GLX_ENTRY {
            Ok(entry) => entry,
            Err(reason) => return Err(CreationError::NoDriver(reason.clone())),
        };

        let screen = (entry.default_screen)(display);
        let extensions = probe(entry, display, screen)?;
        let config = choose_config(entry, display, screen, requirements)?;

        let slot = XErrorSlot(entry);
        let trap = ErrorTrap::install(&slot, x_error_handler as XErrorHandler);
        check_legacy_context(
            || {
                trap.create_checked(
                    || {
                        (entry.create_new_context)(
                            display,
                            config,
                            GLX_RGBA_TYPE,
                            ptr::null_mut(),
                            TRUE,
                        )
                    },
                    || {
                        (entry.sync)(display, FALSE);
                    },
                    |context| (entry.destroy_context)(display, context),
                )
            },
            |context| (entry.destroy_context)(display, context),
        )?;
        let mut attempt = GlxAttempt {
            entry,
            display,
            config,
            shared: shared.map_or(ptr::null_mut(), |shared| shared.context),
            extensions,
            trap: &trap,
        };
        let (context, version) = version::negotiate(&mut attempt)?;

        Ok((
            GlxContext {
                entry,
                display,
                window: window as usize as XWindow,
                context,
            },
            version,
        ))
    }

    fn get_proc_address(name: &str) -> *const c_void {
        match &*GLX_ENTRY {
            Ok(entry) => entry.resolve(name),
            Err(_) => ptr::null(),
        }
    }

    fn loader_once() -> &'static Once {
        &LOADED
    }
}
