//! Speech-probability oracle consulted once per captured chunk.

use std::collections::VecDeque;

use crate::error::{ParloError, Result};

/// Scores a chunk with the probability that it contains speech. Stateful:
/// implementations may smooth across chunks, so `reset` must be called
/// between sessions.
pub trait SpeechActivityOracle: Send {
    /// Returns a probability in [0, 1].
    fn score(&mut self, chunk: &[f32]) -> Result<f32>;

    /// Clears any cross-chunk state.
    fn reset(&mut self);
}

/// Energy-based oracle: maps smoothed RMS energy onto [0, 1] against a
/// calibrated noise floor. Crude next to a neural VAD, but dependable for
/// close-mic setups and cheap enough to run inline.
pub struct EnergyOracle {
    noise_floor: f32,
    /// RMS at which the score saturates to 1.0.
    full_scale: f32,
    window: VecDeque<f32>,
    window_size: usize,
}

impl EnergyOracle {
    pub fn new(noise_floor: f32, full_scale: f32) -> Self {
        Self {
            noise_floor,
            full_scale,
            window: VecDeque::new(),
            window_size: 3,
        }
    }

    fn rms(chunk: &[f32]) -> f32 {
        if chunk.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = chunk.iter().map(|s| s * s).sum();
        (sum_sq / chunk.len() as f32).sqrt()
    }
}

impl Default for EnergyOracle {
    fn default() -> Self {
        Self::new(0.01, 0.12)
    }
}

impl SpeechActivityOracle for EnergyOracle {
    fn score(&mut self, chunk: &[f32]) -> Result<f32> {
        let rms = Self::rms(chunk);
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(rms);
        let smoothed = self.window.iter().sum::<f32>() / self.window.len() as f32;

        if self.full_scale <= self.noise_floor {
            return Err(ParloError::Inference {
                message: "Oracle full_scale must exceed noise_floor".to_string(),
            });
        }
        let score = (smoothed - self.noise_floor) / (self.full_scale - self.noise_floor);
        Ok(score.clamp(0.0, 1.0))
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Scripted oracle for tests: replays a fixed score sequence and records
/// how often it was reset.
pub struct MockOracle {
    scores: VecDeque<f32>,
    fallback: f32,
    resets: usize,
    fail_on_call: Option<usize>,
    calls: usize,
}

impl MockOracle {
    pub fn new(scores: Vec<f32>) -> Self {
        Self {
            scores: scores.into(),
            fallback: 0.0,
            resets: 0,
            fail_on_call: None,
            calls: 0,
        }
    }

    /// Score returned once the scripted sequence is exhausted.
    pub fn with_fallback(mut self, fallback: f32) -> Self {
        self.fallback = fallback;
        self
    }

    /// Fails the zero-based nth `score` call with an inference error.
    pub fn with_failure_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn reset_count(&self) -> usize {
        self.resets
    }
}

impl SpeechActivityOracle for MockOracle {
    fn score(&mut self, _chunk: &[f32]) -> Result<f32> {
        let call = self.calls;
        self.calls += 1;
        if self.fail_on_call == Some(call) {
            return Err(ParloError::Inference {
                message: "scripted oracle failure".to_string(),
            });
        }
        Ok(self.scores.pop_front().unwrap_or(self.fallback))
    }

    fn reset(&mut self) {
        self.resets += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_oracle_silence_scores_low() {
        let mut oracle = EnergyOracle::default();
        let score = oracle.score(&vec![0.0; 512]).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_energy_oracle_loud_signal_scores_high() {
        let mut oracle = EnergyOracle::default();
        let loud = vec![0.5; 512];
        // Push enough chunks to fill the smoothing window.
        oracle.score(&loud).unwrap();
        oracle.score(&loud).unwrap();
        let score = oracle.score(&loud).unwrap();
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_energy_oracle_smoothing_lags_single_spike() {
        // 0.05 RMS sits inside the (0.01, 0.12) ramp, so neither score
        // saturates and the smoothing lag is visible.
        let mut oracle = EnergyOracle::default();
        oracle.score(&vec![0.0; 512]).unwrap();
        oracle.score(&vec![0.0; 512]).unwrap();
        // One audible chunk among quiet ones scores lower than sustained sound.
        let spike = oracle.score(&vec![0.05; 512]).unwrap();
        let mut sustained_oracle = EnergyOracle::default();
        let sustained = sustained_oracle.score(&vec![0.05; 512]).unwrap();
        assert!(spike < 1.0);
        assert!(spike < sustained);
    }

    #[test]
    fn test_energy_oracle_reset_clears_window() {
        let mut oracle = EnergyOracle::default();
        oracle.score(&vec![0.5; 512]).unwrap();
        oracle.reset();
        let score = oracle.score(&vec![0.0; 512]).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_energy_oracle_invalid_calibration_errors() {
        let mut oracle = EnergyOracle::new(0.5, 0.1);
        assert!(oracle.score(&vec![0.2; 512]).is_err());
    }

    #[test]
    fn test_mock_oracle_replays_then_falls_back() {
        let mut oracle = MockOracle::new(vec![0.9, 0.8]).with_fallback(0.1);
        assert_eq!(oracle.score(&[]).unwrap(), 0.9);
        assert_eq!(oracle.score(&[]).unwrap(), 0.8);
        assert_eq!(oracle.score(&[]).unwrap(), 0.1);
    }

    #[test]
    fn test_mock_oracle_scripted_failure() {
        let mut oracle = MockOracle::new(vec![0.9, 0.9]).with_failure_on_call(1);
        assert!(oracle.score(&[]).is_ok());
        assert!(oracle.score(&[]).is_err());
    }

    #[test]
    fn test_mock_oracle_counts_resets() {
        let mut oracle = MockOracle::new(vec![]);
        oracle.reset();
        oracle.reset();
        assert_eq!(oracle.reset_count(), 2);
    }
}
