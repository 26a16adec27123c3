//! Creation errors and the process-wide last-error sink.

use lazy_static::lazy_static;
use parking_lot::Mutex;

/// Reasons a context could not be created.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CreationError {
    /// The window (or display) handle passed in was null.
    #[error("Invalid native window or display handle")]
    InvalidHandle,
    /// No legacy context could be obtained at all.
    #[error("No usable OpenGL driver found: {0}")]
    NoDriver(String),
    /// No pixel format satisfies the minimum requirements, even after fallback.
    #[error("No compatible OpenGL pixel format found!")]
    NoCompatibleFormat,
    /// A format was chosen but the windowing system refused to bind it.
    #[error("OpenGL pixel format could not be set: {0}")]
    PixelFormatSet(String),
    /// Attribute-based context creation is not available.
    #[error("No OpenGL driver supporting OpenGL 3 found")]
    NoGl3Support,
    /// Every (profile, version) pair was refused.
    #[error("No OpenGL 3.2 support found{}", code_suffix(.code))]
    NoGl32Support {
        /// Error code reported by the driver, when it could be queried.
        code: Option<u32>,
    },
}

fn code_suffix(code: &Option<u32>) -> String {
    match *code {
        Some(code) => format!(" (error code {})", code),
        None => String::new(),
    }
}

lazy_static! {
    static ref LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);
}

/// Returns the message of the most recent creation failure in this process.
pub fn last_error() -> Option<String> {
    LAST_ERROR.lock().clone()
}

pub(crate) fn set_error(message: String) {
    *LAST_ERROR.lock() = Some(message);
}

/// Serializes unit tests that inspect the sink's exact contents.
#[cfg(test)]
pub(crate) static SINK_TEST_LOCK: Mutex<()> = parking_lot::const_mutex(());
