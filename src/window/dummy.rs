use crate::{
    context::RawContext, error::CreationError, factory::Platform, format::FormatRequirements,
    version::VersionProfile,
};
use parking_lot::Once;
use std::{os::raw::c_void, ptr};

static LOADED: Once = Once::new();

#[derive(Debug)]
pub enum DummyContext {}

impl RawContext for DummyContext {
    fn is_current(&self) -> bool {
        match *self {}
    }
    unsafe fn make_current(&self) {
        match *self {}
    }
    unsafe fn clear_current(&self) {
        match *self {}
    }
    unsafe fn swap_buffers(&self) {
        match *self {}
    }
    fn width(&self) -> i32 {
        match *self {}
    }
    fn height(&self) -> i32 {
        match *self {}
    }
    unsafe fn destroy(&mut self) {
        match *self {}
    }
}

#[derive(Debug)]
pub enum Dummy {}

impl Platform for Dummy {
    type Raw = DummyContext;

    unsafe fn create_raw(
        _: *mut c_void,
        _: *mut c_void,
        _: &FormatRequirements,
        _: Option<&DummyContext>,
    ) -> Result<(DummyContext, VersionProfile), CreationError> {
        Err(CreationError::NoDriver(
            "OpenGL contexts are not supported on this platform".into(),
        ))
    }

    fn get_proc_address(_: &str) -> *const c_void {
        ptr::null()
    }

    fn loader_once() -> &'static Once {
        &LOADED
    }
}
