use crate::{
    context::RawContext,
    error::CreationError,
    extensions::load_fn,
    factory::Platform,
    format::{self, FormatCandidate, FormatRequirements},
    version::{self, ContextAttempt, VersionProfile},
};

use std::{
    ffi::{CString, OsStr},
    iter, mem,
    os::{
        raw::{c_int, c_void},
        windows::ffi::OsStrExt,
    },
    ptr,
};

use arrayvec::ArrayVec;
use lazy_static::lazy_static;
use parking_lot::Once;
use winapi::shared::minwindef::*;
use winapi::shared::windef::*;
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::libloaderapi::*;
use winapi::um::wingdi::*;
use winapi::um::winuser::*;

#[link(name = "opengl32")]
extern "C" {}

const WGL_DRAW_TO_WINDOW_ARB: c_int = 0x2001;
const WGL_ACCELERATION_ARB: c_int = 0x2003;
const WGL_SUPPORT_OPENGL_ARB: c_int = 0x2010;
const WGL_DOUBLE_BUFFER_ARB: c_int = 0x2011;
const WGL_PIXEL_TYPE_ARB: c_int = 0x2013;
const WGL_RED_BITS_ARB: c_int = 0x2015;
const WGL_GREEN_BITS_ARB: c_int = 0x2017;
const WGL_BLUE_BITS_ARB: c_int = 0x2019;
const WGL_ALPHA_BITS_ARB: c_int = 0x201B;
const WGL_DEPTH_BITS_ARB: c_int = 0x2022;
const WGL_STENCIL_BITS_ARB: c_int = 0x2023;
const WGL_FULL_ACCELERATION_ARB: c_int = 0x2027;
const WGL_TYPE_RGBA_ARB: c_int = 0x202B;
const WGL_SAMPLE_BUFFERS_ARB: c_int = 0x2041;
const WGL_SAMPLES_ARB: c_int = 0x2042;

const MAX_FORMATS: usize = 64;

type WglCreateContextAttribsArbFun = unsafe extern "system" fn(HDC, HGLRC, *const c_int) -> HGLRC;
type WglChoosePixelFormatArbFun =
    unsafe extern "system" fn(HDC, *const c_int, *const FLOAT, UINT, *mut c_int, *mut UINT) -> BOOL;
type WglGetPixelFormatAttribivArbFun =
    unsafe extern "system" fn(HDC, c_int, c_int, UINT, *const c_int, *mut c_int) -> BOOL;
type GlGetErrorFun = unsafe extern "system" fn() -> u32;

fn wide(text: &str) -> Vec<u16> {
    OsStr::new(text)
        .encode_wide()
        .chain(iter::once(0))
        .collect()
}

pub(crate) struct Entry {
    lib: HMODULE,
}

unsafe impl Send for Entry {}
unsafe impl Sync for Entry {}

impl Entry {
    fn new() -> Self {
        let name = wide("opengl32.dll");
        let lib = unsafe { LoadLibraryW(name.as_ptr()) };
        if lib.is_null() {
            log::warn!("Cannot load opengl32.dll, only ICD entry points will resolve");
        }
        Entry { lib }
    }

    /// Looks `name` up in the current ICD first, then in `opengl32.dll`
    /// itself, where the OpenGL 1.1 entry points live.
    fn resolve(&self, name: &str) -> *const c_void {
        let sym = match CString::new(name) {
            Ok(sym) => sym,
            Err(_) => return ptr::null(),
        };
        unsafe {
            let addr = wglGetProcAddress(sym.as_ptr()) as isize;
            // Some ICDs report failure with small sentinel values instead of null.
            match addr {
                -1 | 0 | 1 | 2 | 3 if !self.lib.is_null() => {
                    GetProcAddress(self.lib, sym.as_ptr()) as *const c_void
                }
                -1 | 0 | 1 | 2 | 3 => ptr::null(),
                _ => addr as *const c_void,
            }
        }
    }
}

lazy_static! {
    static ref WGL_ENTRY: Entry = Entry::new();
}

static LOADED: Once = Once::new();

/// Entry points that only resolve while some context is current.
#[derive(Default)]
struct WglExtensions {
    create_context_attribs: Option<WglCreateContextAttribsArbFun>,
    choose_pixel_format: Option<WglChoosePixelFormatArbFun>,
    get_pixel_format_attribiv: Option<WglGetPixelFormatAttribivArbFun>,
    get_error: Option<GlGetErrorFun>,
}

/// Child window used only while probing. The pixel format of a window can be
/// set once, so probing on the caller's window would lock it to the legacy
/// format.
struct ScratchWindow {
    hwnd: HWND,
    hdc: HDC,
}

impl ScratchWindow {
    unsafe fn new(parent: HWND) -> Result<Self, CreationError> {
        let class = wide("STATIC");
        let hwnd = CreateWindowExW(
            0,
            class.as_ptr(),
            ptr::null(),
            WS_CHILD,
            0,
            0,
            1,
            1,
            parent,
            ptr::null_mut(),
            GetModuleHandleW(ptr::null()),
            ptr::null_mut(),
        );
        if hwnd.is_null() {
            return Err(CreationError::NoDriver(format!(
                "cannot create the probe window (error {})",
                GetLastError()
            )));
        }
        let hdc = GetDC(hwnd);
        if hdc.is_null() {
            DestroyWindow(hwnd);
            return Err(CreationError::NoDriver(
                "cannot get a device context for the probe window".into(),
            ));
        }
        Ok(ScratchWindow { hwnd, hdc })
    }
}

impl Drop for ScratchWindow {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(self.hwnd, self.hdc);
            DestroyWindow(self.hwnd);
        }
    }
}

struct LegacyContext(HGLRC);

impl Drop for LegacyContext {
    fn drop(&mut self) {
        unsafe {
            wglMakeCurrent(ptr::null_mut(), ptr::null_mut());
            wglDeleteContext(self.0);
        }
    }
}

fn legacy_descriptor(requirements: &FormatRequirements) -> PIXELFORMATDESCRIPTOR {
    let mut desc: PIXELFORMATDESCRIPTOR = unsafe { mem::zeroed() };
    desc.nSize = mem::size_of::<PIXELFORMATDESCRIPTOR>() as u16;
    desc.nVersion = 1;
    desc.dwFlags = PFD_DRAW_TO_WINDOW | PFD_SUPPORT_OPENGL;
    if requirements.double_buffer {
        desc.dwFlags |= PFD_DOUBLEBUFFER;
    }
    desc.iPixelType = PFD_TYPE_RGBA;
    desc.cColorBits = requirements.color_bits();
    desc.cAlphaBits = requirements.alpha_bits;
    desc.cDepthBits = requirements.min_depth_bits;
    desc.cStencilBits = requirements.min_stencil_bits;
    desc.iLayerType = PFD_MAIN_PLANE;
    desc
}

unsafe fn probe(parent: HWND) -> Result<WglExtensions, CreationError> {
    let scratch = ScratchWindow::new(parent)?;

    let desc = legacy_descriptor(&FormatRequirements::default());
    let format_id = ChoosePixelFormat(scratch.hdc, &desc);
    if format_id == 0 || SetPixelFormat(scratch.hdc, format_id, &desc) == FALSE {
        return Err(CreationError::NoDriver(
            "cannot set a legacy pixel format on the probe window".into(),
        ));
    }

    let glrc = wglCreateContext(scratch.hdc);
    if glrc.is_null() {
        return Err(CreationError::NoDriver(format!(
            "cannot create a legacy OpenGL context (error {})",
            GetLastError()
        )));
    }
    let _legacy = LegacyContext(glrc);
    wglMakeCurrent(scratch.hdc, glrc);

    let entry = &*WGL_ENTRY;
    let extensions = WglExtensions {
        create_context_attribs: load_fn(entry.resolve("wglCreateContextAttribsARB")),
        choose_pixel_format: load_fn(entry.resolve("wglChoosePixelFormatARB"))
            .or_else(|| load_fn(entry.resolve("wglChoosePixelFormatEXT"))),
        get_pixel_format_attribiv: load_fn(entry.resolve("wglGetPixelFormatAttribivARB"))
            .or_else(|| load_fn(entry.resolve("wglGetPixelFormatAttribivEXT"))),
        get_error: load_fn(entry.resolve("glGetError")),
    };
    log::info!(
        "WGL probe: create_context_attribs={} choose_pixel_format={} get_pixel_format_attribiv={}",
        extensions.create_context_attribs.is_some(),
        extensions.choose_pixel_format.is_some(),
        extensions.get_pixel_format_attribiv.is_some(),
    );
    Ok(extensions)
}

fn format_attributes(requirements: &FormatRequirements) -> ArrayVec<[c_int; 32]> {
    let mut attributes = ArrayVec::new();
    attributes.extend(
        [
            WGL_DRAW_TO_WINDOW_ARB,
            TRUE,
            WGL_SUPPORT_OPENGL_ARB,
            TRUE,
            WGL_ACCELERATION_ARB,
            WGL_FULL_ACCELERATION_ARB,
            WGL_PIXEL_TYPE_ARB,
            WGL_TYPE_RGBA_ARB,
            WGL_RED_BITS_ARB,
            requirements.red_bits as c_int,
            WGL_GREEN_BITS_ARB,
            requirements.green_bits as c_int,
            WGL_BLUE_BITS_ARB,
            requirements.blue_bits as c_int,
            WGL_ALPHA_BITS_ARB,
            requirements.alpha_bits as c_int,
            WGL_DEPTH_BITS_ARB,
            requirements.min_depth_bits as c_int,
            WGL_STENCIL_BITS_ARB,
            requirements.min_stencil_bits as c_int,
        ]
        .iter()
        .cloned(),
    );
    if requirements.double_buffer {
        attributes.push(WGL_DOUBLE_BUFFER_ARB);
        attributes.push(TRUE);
    }
    attributes.push(0);
    attributes
}

unsafe fn describe_legacy(hdc: HDC, format_id: c_int) -> FormatCandidate {
    let mut desc: PIXELFORMATDESCRIPTOR = mem::zeroed();
    let size = mem::size_of::<PIXELFORMATDESCRIPTOR>() as UINT;
    if DescribePixelFormat(hdc, format_id, size, &mut desc) == 0 {
        return FormatCandidate::default();
    }
    FormatCandidate {
        red_bits: desc.cRedBits,
        green_bits: desc.cGreenBits,
        blue_bits: desc.cBlueBits,
        alpha_bits: desc.cAlphaBits,
        depth_bits: desc.cDepthBits,
        stencil_bits: desc.cStencilBits,
        double_buffer: desc.dwFlags & PFD_DOUBLEBUFFER != 0,
        sample_buffers: 0,
        samples: 0,
    }
}

unsafe fn describe(
    hdc: HDC,
    format_id: c_int,
    get_attribs: Option<WglGetPixelFormatAttribivArbFun>,
) -> FormatCandidate {
    const QUERY: [c_int; 9] = [
        WGL_RED_BITS_ARB,
        WGL_GREEN_BITS_ARB,
        WGL_BLUE_BITS_ARB,
        WGL_ALPHA_BITS_ARB,
        WGL_DEPTH_BITS_ARB,
        WGL_STENCIL_BITS_ARB,
        WGL_DOUBLE_BUFFER_ARB,
        WGL_SAMPLE_BUFFERS_ARB,
        WGL_SAMPLES_ARB,
    ];
    let get_attribs = match get_attribs {
        Some(fun) => fun,
        None => return describe_legacy(hdc, format_id),
    };
    let mut values = [0 as c_int; 9];
    let ok = get_attribs(
        hdc,
        format_id,
        0,
        QUERY.len() as UINT,
        QUERY.as_ptr(),
        values.as_mut_ptr(),
    );
    if ok == FALSE {
        // Multisample attributes are rejected by drivers without ARB_multisample.
        return describe_legacy(hdc, format_id);
    }
    let bits = |i: usize| values[i].max(0).min(0xFF) as u8;
    FormatCandidate {
        red_bits: bits(0),
        green_bits: bits(1),
        blue_bits: bits(2),
        alpha_bits: bits(3),
        depth_bits: bits(4),
        stencil_bits: bits(5),
        double_buffer: values[6] != 0,
        sample_buffers: bits(7),
        samples: bits(8),
    }
}

unsafe fn enumerate_formats(
    hdc: HDC,
    choose: WglChoosePixelFormatArbFun,
    get_attribs: Option<WglGetPixelFormatAttribivArbFun>,
    requirements: &FormatRequirements,
) -> Vec<(c_int, FormatCandidate)> {
    let attributes = format_attributes(requirements);
    let mut formats = [0 as c_int; MAX_FORMATS];
    let mut count: UINT = 0;
    let ok = choose(
        hdc,
        attributes.as_ptr(),
        ptr::null(),
        MAX_FORMATS as UINT,
        formats.as_mut_ptr(),
        &mut count,
    );
    if ok == FALSE {
        log::warn!("wglChoosePixelFormatARB failed");
        return Vec::new();
    }
    let count = (count as usize).min(MAX_FORMATS);
    log::debug!("wglChoosePixelFormatARB offered {} formats", count);
    formats[..count]
        .iter()
        .map(|&id| (id, describe(hdc, id, get_attribs)))
        .collect()
}

unsafe fn set_format(
    hdc: HDC,
    extensions: &WglExtensions,
    requirements: &FormatRequirements,
) -> Result<(), CreationError> {
    let enumerated = extensions.choose_pixel_format.map(|choose| {
        enumerate_formats(hdc, choose, extensions.get_pixel_format_attribiv, requirements)
    });
    let format_id = format::choose(enumerated, requirements, || {
        let desc = legacy_descriptor(requirements);
        match ChoosePixelFormat(hdc, &desc) {
            0 => None,
            id => Some(id),
        }
    })?;

    let mut desc: PIXELFORMATDESCRIPTOR = mem::zeroed();
    DescribePixelFormat(
        hdc,
        format_id,
        mem::size_of::<PIXELFORMATDESCRIPTOR>() as UINT,
        &mut desc,
    );
    if SetPixelFormat(hdc, format_id, &desc) == FALSE {
        return Err(CreationError::PixelFormatSet(format!(
            "SetPixelFormat({}) failed with error {}",
            format_id,
            GetLastError()
        )));
    }
    Ok(())
}

struct WglAttempt<'a> {
    hdc: HDC,
    shared: HGLRC,
    extensions: &'a WglExtensions,
}

impl<'a> ContextAttempt for WglAttempt<'a> {
    type Raw = HGLRC;

    fn supports_attributes(&self) -> bool {
        self.extensions.create_context_attribs.is_some()
    }

    unsafe fn attempt(&mut self, request: VersionProfile) -> Option<HGLRC> {
        let create = self.extensions.create_context_attribs?;
        let attributes = request.attributes();
        let glrc = create(self.hdc, self.shared, attributes.as_ptr());
        if glrc.is_null() {
            None
        } else {
            Some(glrc)
        }
    }

    unsafe fn driver_error(&self) -> Option<u32> {
        self.extensions.get_error.map(|get_error| get_error())
    }
}

unsafe fn create_on_dc(
    hwnd: HWND,
    hdc: HDC,
    requirements: &FormatRequirements,
    shared: HGLRC,
) -> Result<(HGLRC, VersionProfile), CreationError> {
    let extensions = probe(hwnd)?;
    set_format(hdc, &extensions, requirements)?;
    version::negotiate(&mut WglAttempt {
        hdc,
        shared,
        extensions: &extensions,
    })
}

/// A WGL context rendering to a window's device context.
#[derive(Debug)]
pub struct WglContext {
    hwnd: HWND,
    hdc: HDC,
    glrc: HGLRC,
}

unsafe impl Send for WglContext {}

impl WglContext {
    fn client_size(&self) -> (i32, i32) {
        let mut rect: RECT = unsafe { mem::zeroed() };
        if unsafe { GetClientRect(self.hwnd, &mut rect) } == FALSE {
            return (0, 0);
        }
        (rect.right - rect.left, rect.bottom - rect.top)
    }
}

impl RawContext for WglContext {
    fn is_current(&self) -> bool {
        unsafe { wglGetCurrentContext() == self.glrc }
    }

    unsafe fn make_current(&self) {
        if wglMakeCurrent(self.hdc, self.glrc) == FALSE {
            log::error!("wglMakeCurrent failed with error {}", GetLastError());
        }
    }

    unsafe fn clear_current(&self) {
        wglMakeCurrent(ptr::null_mut(), ptr::null_mut());
    }

    unsafe fn swap_buffers(&self) {
        wglMakeCurrent(self.hdc, self.glrc);
        SwapBuffers(self.hdc);
    }

    fn width(&self) -> i32 {
        self.client_size().0
    }

    fn height(&self) -> i32 {
        self.client_size().1
    }

    unsafe fn destroy(&mut self) {
        wglDeleteContext(self.glrc);
        ReleaseDC(self.hwnd, self.hdc);
        self.glrc = ptr::null_mut();
    }
}

/// The WGL platform. The display handle is unused.
#[derive(Debug)]
pub enum Wgl {}

impl Platform for Wgl {
    type Raw = WglContext;

    unsafe fn create_raw(
        _display: *mut c_void,
        window: *mut c_void,
        requirements: &FormatRequirements,
        shared: Option<&WglContext>,
    ) -> Result<(WglContext, VersionProfile), CreationError> {
        let hwnd = window as HWND;
        let hdc = GetDC(hwnd);
        if hdc.is_null() {
            return Err(CreationError::InvalidHandle);
        }

        let shared = shared.map_or(ptr::null_mut(), |shared| shared.glrc);
        match create_on_dc(hwnd, hdc, requirements, shared) {
            Ok((glrc, version)) => Ok((WglContext { hwnd, hdc, glrc }, version)),
            Err(e) => {
                ReleaseDC(hwnd, hdc);
                Err(e)
            }
        }
    }

    fn get_proc_address(name: &str) -> *const c_void {
        WGL_ENTRY.resolve(name)
    }

    fn loader_once() -> &'static Once {
        &LOADED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_request_encodes_requirements() {
        let attributes = format_attributes(&FormatRequirements::default());
        let pairs = attributes[..attributes.len() - 1].chunks(2).collect::<Vec<_>>();
        assert!(pairs.contains(&&[WGL_ACCELERATION_ARB, WGL_FULL_ACCELERATION_ARB][..]));
        assert!(pairs.contains(&&[WGL_DEPTH_BITS_ARB, 16][..]));
        assert!(pairs.contains(&&[WGL_DOUBLE_BUFFER_ARB, TRUE][..]));
        assert_eq!(attributes[attributes.len() - 1], 0);
    }

    #[test]
    fn legacy_descriptor_is_32_bit_rgba() {
        let desc = legacy_descriptor(&FormatRequirements::default());
        assert_eq!(desc.cColorBits, 32);
        assert_eq!(desc.cDepthBits, 16);
        assert_eq!(desc.cStencilBits, 8);
        assert_ne!(desc.dwFlags & PFD_DOUBLEBUFFER, 0);
    }
}
