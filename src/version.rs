//! Version and profile negotiation.
//!
//! Neither WGL nor GLX can answer "what is the best context you can give me",
//! so the negotiator walks a fixed list of (profile, version) pairs from the
//! most capable down and keeps the first context the driver hands back.

use crate::error::CreationError;
use std::fmt;
use std::os::raw::c_int;

/// `{WGL,GLX}_CONTEXT_MAJOR_VERSION_ARB`
pub(crate) const CONTEXT_MAJOR_VERSION_ARB: c_int = 0x2091;
/// `{WGL,GLX}_CONTEXT_MINOR_VERSION_ARB`
pub(crate) const CONTEXT_MINOR_VERSION_ARB: c_int = 0x2092;
/// `{WGL,GLX}_CONTEXT_PROFILE_MASK_ARB`
pub(crate) const CONTEXT_PROFILE_MASK_ARB: c_int = 0x9126;

/// OpenGL context profile.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum Profile {
    /// Modern profile without the fixed-function pipeline.
    Core,
    /// Modern profile plus the legacy fixed-function pipeline.
    Compatibility,
}

impl Profile {
    /// Bit used in the `CONTEXT_PROFILE_MASK_ARB` attribute.
    pub fn mask_bit(self) -> c_int {
        match self {
            Profile::Core => 0x1,
            Profile::Compatibility => 0x2,
        }
    }
}

/// An OpenGL `major.minor` version.
#[derive(Copy, Clone, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct GlVersion {
    pub major: u8,
    pub minor: u8,
}

impl GlVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        GlVersion { major, minor }
    }
}

impl fmt::Debug for GlVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A single entry of the negotiation order.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct VersionProfile {
    pub version: GlVersion,
    pub profile: Profile,
}

impl VersionProfile {
    /// Attribute list for `{wgl,glX}CreateContextAttribsARB`, zero terminated.
    pub(crate) fn attributes(&self) -> [c_int; 7] {
        [
            CONTEXT_MAJOR_VERSION_ARB,
            self.version.major as c_int,
            CONTEXT_MINOR_VERSION_ARB,
            self.version.minor as c_int,
            CONTEXT_PROFILE_MASK_ARB,
            self.profile.mask_bit(),
            0,
        ]
    }
}

/// Lowest version this crate hands out.
pub const MIN_VERSION: GlVersion = GlVersion::new(3, 2);

const PROFILES: [Profile; 2] = [Profile::Core, Profile::Compatibility];

const VERSIONS: [GlVersion; 9] = [
    GlVersion::new(4, 6),
    GlVersion::new(4, 5),
    GlVersion::new(4, 4),
    GlVersion::new(4, 3),
    GlVersion::new(4, 2),
    GlVersion::new(4, 1),
    GlVersion::new(4, 0),
    GlVersion::new(3, 3),
    MIN_VERSION,
];

/// The (profile, version) pairs in the order they are tried. Every Core
/// version comes before any Compatibility one.
pub fn negotiation_order() -> impl Iterator<Item = VersionProfile> {
    PROFILES.iter().flat_map(|&profile| {
        VERSIONS
            .iter()
            .map(move |&version| VersionProfile { version, profile })
    })
}

/// One platform's way of creating a context for an exact (profile, version).
pub(crate) trait ContextAttempt {
    type Raw;

    /// Whether attribute-based creation exists at all.
    fn supports_attributes(&self) -> bool;

    /// Try to create a context for exactly `request`.
    unsafe fn attempt(&mut self, request: VersionProfile) -> Option<Self::Raw>;

    /// Best error code the driver can report after the last attempt.
    unsafe fn driver_error(&self) -> Option<u32>;
}

/// Returns the first context the platform accepts along `negotiation_order`.
pub(crate) unsafe fn negotiate<A: ContextAttempt>(
    creator: &mut A,
) -> Result<(A::Raw, VersionProfile), CreationError> {
    if !creator.supports_attributes() {
        log::warn!("Attribute-based context creation is unavailable");
        return Err(CreationError::NoGl3Support);
    }

    for request in negotiation_order() {
        log::debug!("Trying {:?} {:?}", request.profile, request.version);
        if let Some(raw) = creator.attempt(request) {
            log::info!(
                "Created OpenGL {:?} {:?} context",
                request.version,
                request.profile
            );
            return Ok((raw, request));
        }
    }

    // GL_NO_ERROR says nothing about why the attempts failed.
    let code = creator.driver_error().filter(|&code| code != 0);
    log::error!("Every OpenGL version was refused, driver error {:?}", code);
    Err(CreationError::NoGl32Support { code })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockAttempt {
        supported: bool,
        accepts: Option<VersionProfile>,
        tried: Vec<VersionProfile>,
        error: Option<u32>,
    }

    impl MockAttempt {
        fn new(accepts: Option<VersionProfile>) -> Self {
            MockAttempt {
                supported: true,
                accepts,
                tried: Vec::new(),
                error: None,
            }
        }
    }

    impl ContextAttempt for MockAttempt {
        type Raw = VersionProfile;

        fn supports_attributes(&self) -> bool {
            self.supported
        }

        unsafe fn attempt(&mut self, request: VersionProfile) -> Option<VersionProfile> {
            self.tried.push(request);
            if self.accepts == Some(request) {
                Some(request)
            } else {
                None
            }
        }

        unsafe fn driver_error(&self) -> Option<u32> {
            self.error
        }
    }

    #[test]
    fn order_is_descending_and_core_first() {
        let order = negotiation_order().collect::<Vec<_>>();
        assert_eq!(order.len(), 18);
        assert_eq!(
            order[0],
            VersionProfile {
                version: GlVersion::new(4, 6),
                profile: Profile::Core,
            }
        );
        let (core, compat) = order.split_at(9);
        assert!(core.iter().all(|vp| vp.profile == Profile::Core));
        assert!(compat.iter().all(|vp| vp.profile == Profile::Compatibility));
        for half in &[core, compat] {
            assert!(half.windows(2).all(|w| w[0].version > w[1].version));
            assert_eq!(half.last().unwrap().version, MIN_VERSION);
        }
    }

    #[test]
    fn stops_at_first_accepted_pair() {
        let wanted = VersionProfile {
            version: GlVersion::new(3, 3),
            profile: Profile::Core,
        };
        let mut mock = MockAttempt::new(Some(wanted));
        let (raw, negotiated) = unsafe { negotiate(&mut mock) }.unwrap();
        assert_eq!(raw, wanted);
        assert_eq!(negotiated, wanted);
        assert_eq!(mock.tried.len(), 8);
        assert_eq!(*mock.tried.last().unwrap(), wanted);
        assert!(mock.tried.iter().all(|vp| vp.profile == Profile::Core));
    }

    #[test]
    fn compatibility_only_after_all_core() {
        let wanted = VersionProfile {
            version: GlVersion::new(4, 5),
            profile: Profile::Compatibility,
        };
        let mut mock = MockAttempt::new(Some(wanted));
        unsafe { negotiate(&mut mock) }.unwrap();
        assert_eq!(mock.tried.len(), 11);
        assert_eq!(mock.tried[8].version, MIN_VERSION);
        assert_eq!(mock.tried[8].profile, Profile::Core);
    }

    #[test]
    fn missing_attribute_creation_tries_nothing() {
        let mut mock = MockAttempt::new(None);
        mock.supported = false;
        let result = unsafe { negotiate(&mut mock) };
        assert_eq!(result.unwrap_err(), CreationError::NoGl3Support);
        assert!(mock.tried.is_empty());
    }

    #[test]
    fn exhaustion_reports_driver_code() {
        let mut mock = MockAttempt::new(None);
        mock.error = Some(0x502);
        let result = unsafe { negotiate(&mut mock) };
        assert_eq!(
            result.unwrap_err(),
            CreationError::NoGl32Support { code: Some(0x502) }
        );
        assert_eq!(mock.tried.len(), 18);

        let mut mock = MockAttempt::new(None);
        let result = unsafe { negotiate(&mut mock) };
        assert_eq!(result.unwrap_err(), CreationError::NoGl32Support { code: None });
    }

    #[test]
    fn no_error_code_is_not_reported() {
        let mut mock = MockAttempt::new(None);
        mock.error = Some(0);
        let err = unsafe { negotiate(&mut mock) }.unwrap_err();
        assert_eq!(err, CreationError::NoGl32Support { code: None });
        assert_eq!(err.to_string(), "No OpenGL 3.2 support found");
    }

    #[test]
    fn attribute_list_layout() {
        let vp = VersionProfile {
            version: GlVersion::new(4, 1),
            profile: Profile::Compatibility,
        };
        assert_eq!(vp.attributes(), [0x2091, 4, 0x2092, 1, 0x9126, 2, 0]);
    }
}
