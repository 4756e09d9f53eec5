use checkercal_core::{CalibratorConfig, Real};
use serde::{Deserialize, Serialize};

/// Counters and the last solve result of one calibrator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Images that passed the size and depth checks.
    pub submitted: usize,
    pub accepted: usize,
    /// `+inf` until the first solve.
    pub last_rms: Real,
    /// The last solve produced finite parameters.
    pub params_valid: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            submitted: 0,
            accepted: 0,
            last_rms: Real::INFINITY,
            params_valid: false,
        }
    }
}

impl SessionState {
    /// The hard image cap has been passed; no further solve is attempted.
    pub fn over_capacity(&self, config: &CalibratorConfig) -> bool {
        self.accepted > config.max_num_images
    }

    /// Batch trigger: enough images, every camera above the coverage
    /// threshold, and the accepted count on a batch boundary.
    pub fn batch_ready(&self, config: &CalibratorConfig, coverages: &[Real]) -> bool {
        self.accepted >= config.min_num_images
            && coverages.iter().all(|c| *c > config.min_coverage)
            && self.accepted % config.image_batch_size == 0
    }

    /// `true` when the last solve is usable under `max_rms`.
    pub fn solved_within(&self, max_rms: Real) -> bool {
        self.params_valid && self.last_rms < max_rms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CalibratorConfig {
        CalibratorConfig {
            min_num_images: 4,
            max_num_images: 10,
            image_batch_size: 2,
            min_coverage: 0.2,
            ..CalibratorConfig::default()
        }
    }

    #[test]
    fn trigger_needs_count_coverage_and_batch_boundary() {
        let config = config();
        let at = |accepted| SessionState {
            accepted,
            ..SessionState::default()
        };
        assert!(!at(3).batch_ready(&config, &[0.5]));
        assert!(at(4).batch_ready(&config, &[0.5]));
        assert!(!at(5).batch_ready(&config, &[0.5]));
        assert!(!at(6).batch_ready(&config, &[0.2]));
        assert!(!at(6).batch_ready(&config, &[0.5, 0.1]));
        assert!(at(6).batch_ready(&config, &[0.5, 0.3]));
    }

    #[test]
    fn cap_is_exceeded_only_past_the_maximum() {
        let config = config();
        let at = |accepted| SessionState {
            accepted,
            ..SessionState::default()
        };
        assert!(!at(10).over_capacity(&config));
        assert!(at(11).over_capacity(&config));
    }

    #[test]
    fn fresh_session_has_not_solved() {
        let state = SessionState::default();
        assert!(state.last_rms.is_infinite());
        assert!(!state.solved_within(1e9));
    }
}
