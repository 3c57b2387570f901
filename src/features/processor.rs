use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Time-frequency representation computed from the raw signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpectralAnalysis {
    Spectrogram,
    LogSpectrogram,
    Lofargram,
    Melgram,
    LogMelgram,
}

impl fmt::Display for SpectralAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpectralAnalysis::Spectrogram => "spectrogram",
            SpectralAnalysis::LogSpectrogram => "log_spectrogram",
            SpectralAnalysis::Lofargram => "lofargram",
            SpectralAnalysis::Melgram => "melgram",
            SpectralAnalysis::LogMelgram => "log_melgram",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    MinMax,
    MinMaxZeroCenter,
    NormL1,
    NormL2,
    None,
}

/// Declared signal-processing parameters. Stored in the experiment
/// configuration, so any change here marks previous results as stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorSettings {
    pub analysis: SpectralAnalysis,
    pub normalization: Normalization,
    /// FFT points per window.
    pub n_pts: usize,
    /// Window overlap in samples.
    pub n_overlap: usize,
    pub decimation_rate: usize,
    /// Mel filter count, only meaningful for mel analyses.
    #[serde(default)]
    pub n_mels: Option<usize>,
    /// Seconds of signal integrated into one feature window.
    #[serde(default)]
    pub integration_interval: Option<f64>,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        ProcessorSettings {
            analysis: SpectralAnalysis::LogMelgram,
            normalization: Normalization::MinMax,
            n_pts: 1024,
            n_overlap: 0,
            decimation_rate: 3,
            n_mels: Some(256),
            integration_interval: Some(0.512),
        }
    }
}

impl ProcessorSettings {
    pub fn validate(&self) -> Result<()> {
        if self.n_pts == 0 {
            return Err(Error::config("n_pts must be positive"));
        }
        if self.n_overlap >= self.n_pts {
            return Err(Error::config(format!(
                "n_overlap ({}) must be smaller than n_pts ({})",
                self.n_overlap, self.n_pts
            )));
        }
        if self.decimation_rate == 0 {
            return Err(Error::config("decimation_rate must be at least 1"));
        }
        let is_mel = matches!(self.analysis, SpectralAnalysis::Melgram | SpectralAnalysis::LogMelgram);
        if is_mel && self.n_mels.unwrap_or(0) == 0 {
            return Err(Error::config(format!("{} needs a positive n_mels", self.analysis)));
        }
        if let Some(t) = self.integration_interval {
            if !(t > 0.0 && t.is_finite()) {
                return Err(Error::config(format!("integration_interval must be positive, got {t}")));
            }
        }
        Ok(())
    }
}

/// Maps a sample id to its feature vector. Purely functional from the
/// orchestrator's point of view: the same id always yields the same vector.
pub trait FeatureProcessor {
    fn settings(&self) -> &ProcessorSettings;

    fn process(&self, sample_id: &str) -> Result<Vec<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        ProcessorSettings::default().validate().unwrap();
    }

    #[test]
    fn mel_analysis_needs_filters() {
        let settings = ProcessorSettings { n_mels: None, ..ProcessorSettings::default() };
        assert!(settings.validate().is_err());

        let lofar = ProcessorSettings {
            analysis: SpectralAnalysis::Lofargram,
            n_mels: None,
            ..ProcessorSettings::default()
        };
        lofar.validate().unwrap();
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ProcessorSettings::default()).unwrap();
        assert!(json.contains("\"log_melgram\""));
        assert!(json.contains("\"min_max\""));
    }
}
