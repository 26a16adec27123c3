//! Pixel/framebuffer format selection.

use crate::error::CreationError;

/// One pixel format offered by the platform.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct FormatCandidate {
    pub red_bits: u8,
    pub green_bits: u8,
    pub blue_bits: u8,
    pub alpha_bits: u8,
    pub depth_bits: u8,
    pub stencil_bits: u8,
    pub double_buffer: bool,
    pub sample_buffers: u8,
    pub samples: u8,
}

/// Minimum surface requirements a format has to meet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FormatRequirements {
    pub red_bits: u8,
    pub green_bits: u8,
    pub blue_bits: u8,
    pub alpha_bits: u8,
    pub min_depth_bits: u8,
    pub min_stencil_bits: u8,
    pub double_buffer: bool,
}

impl Default for FormatRequirements {
    fn default() -> Self {
        FormatRequirements {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            min_depth_bits: 16,
            min_stencil_bits: 8,
            double_buffer: true,
        }
    }
}

impl FormatRequirements {
    /// Total color bits, as the legacy pixel format descriptors want them.
    /// Saturates at 255.
    pub fn color_bits(&self) -> u8 {
        self.red_bits
            .saturating_add(self.green_bits)
            .saturating_add(self.blue_bits)
            .saturating_add(self.alpha_bits)
    }

    /// Returns `true` if `candidate` meets every hard requirement.
    pub fn is_satisfied_by(&self, candidate: &FormatCandidate) -> bool {
        candidate.red_bits >= self.red_bits
            && candidate.green_bits >= self.green_bits
            && candidate.blue_bits >= self.blue_bits
            && candidate.alpha_bits >= self.alpha_bits
            && candidate.depth_bits >= self.min_depth_bits
            && candidate.stencil_bits >= self.min_stencil_bits
            && (candidate.double_buffer || !self.double_buffer)
    }
}

/// Picks the candidate with the most samples. Only among candidates tied at
/// the running maximum does the sample-buffer count break the tie; a
/// candidate with more samples always wins, whatever its sample buffers.
pub fn best_multisample(candidates: &[FormatCandidate]) -> Option<usize> {
    let mut iter = candidates.iter().enumerate();
    let (_, first) = iter.next()?;
    let mut best = 0;
    let mut max_samples = first.samples;
    let mut max_sample_buffers = first.sample_buffers;

    for (i, candidate) in iter {
        if candidate.samples > max_samples {
            max_samples = candidate.samples;
            max_sample_buffers = candidate.sample_buffers;
            best = i;
        } else if candidate.samples == max_samples
            && candidate.sample_buffers > max_sample_buffers
        {
            max_sample_buffers = candidate.sample_buffers;
            best = i;
        }
    }
    Some(best)
}

/// Chooses a platform config.
///
/// `enumerated` is `None` when the platform has no enumeration entry point.
/// An empty or unusable enumeration falls back to `legacy`, the platform's
/// best-effort classic format selection.
pub(crate) fn choose<C, F>(
    enumerated: Option<Vec<(C, FormatCandidate)>>,
    requirements: &FormatRequirements,
    legacy: F,
) -> Result<C, CreationError>
where
    F: FnOnce() -> Option<C>,
{
    if let Some(enumerated) = enumerated {
        let total = enumerated.len();
        let (mut configs, candidates): (Vec<_>, Vec<_>) = enumerated
            .into_iter()
            .filter(|(_, candidate)| requirements.is_satisfied_by(candidate))
            .unzip();
        log::debug!(
            "{} of {} enumerated formats satisfy {:?}",
            candidates.len(),
            total,
            requirements
        );
        if let Some(best) = best_multisample(&candidates) {
            log::info!("Selected pixel format {:?}", candidates[best]);
            return Ok(configs.swap_remove(best));
        }
        log::warn!("No enumerated format matched, falling back to legacy selection");
    }

    legacy().ok_or(CreationError::NoCompatibleFormat)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(samples: u8, sample_buffers: u8) -> FormatCandidate {
        FormatCandidate {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            depth_bits: 24,
            stencil_bits: 8,
            double_buffer: true,
            sample_buffers,
            samples,
        }
    }

    #[test]
    fn color_bits_saturate() {
        assert_eq!(FormatRequirements::default().color_bits(), 32);
        let deep = FormatRequirements {
            red_bits: 64,
            green_bits: 64,
            blue_bits: 64,
            alpha_bits: 64,
            ..FormatRequirements::default()
        };
        assert_eq!(deep.color_bits(), 255);
    }

    #[test]
    fn unique_max_samples_wins() {
        let candidates = [candidate(0, 0), candidate(2, 1), candidate(2, 2), candidate(4, 1)];
        assert_eq!(best_multisample(&candidates), Some(3));
    }

    #[test]
    fn sample_buffers_break_ties() {
        let candidates = [candidate(2, 1), candidate(2, 3)];
        assert_eq!(best_multisample(&candidates), Some(1));
        let candidates = [candidate(2, 3), candidate(2, 1)];
        assert_eq!(best_multisample(&candidates), Some(0));
    }

    #[test]
    fn more_buffers_below_max_samples_lose() {
        let candidates = [candidate(4, 1), candidate(2, 8)];
        assert_eq!(best_multisample(&candidates), Some(0));
        assert_eq!(best_multisample(&[]), None);
    }

    #[test]
    fn requirements() {
        let req = FormatRequirements::default();
        assert_eq!(req.color_bits(), 32);
        assert!(req.is_satisfied_by(&candidate(0, 0)));

        let single = FormatCandidate {
            double_buffer: false,
            ..candidate(0, 0)
        };
        assert!(!req.is_satisfied_by(&single));
        let shallow = FormatCandidate {
            depth_bits: 15,
            ..candidate(0, 0)
        };
        assert!(!req.is_satisfied_by(&shallow));
        let no_alpha = FormatCandidate {
            alpha_bits: 0,
            ..candidate(0, 0)
        };
        assert!(!req.is_satisfied_by(&no_alpha));
    }

    #[test]
    fn chosen_config_meets_requirements() {
        let req = FormatRequirements::default();
        let no_stencil = FormatCandidate {
            stencil_bits: 0,
            ..candidate(8, 1)
        };
        let enumerated = vec![("a", candidate(2, 1)), ("b", no_stencil), ("c", candidate(4, 1))];
        let chosen = choose(Some(enumerated), &req, || panic!("legacy path taken"));
        assert_eq!(chosen, Ok("c"));
    }

    #[test]
    fn empty_enumeration_falls_back() {
        let req = FormatRequirements::default();
        assert_eq!(choose(Some(Vec::new()), &req, || Some(7)), Ok(7));
        assert_eq!(choose::<u32, _>(None, &req, || Some(3)), Ok(3));
        assert_eq!(
            choose::<u32, _>(Some(Vec::new()), &req, || None),
            Err(CreationError::NoCompatibleFormat)
        );
    }
}
