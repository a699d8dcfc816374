//! Run configuration.
//!
//! [`HarnessConfig`] holds every fixed parameter of a comparison run.  All
//! fields have defaults matching the beta-band MEG dataset the reference
//! detections were produced from.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{HarnessError, Result};

/// Event detection method selector passed through to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    One,
    Two,
    Three,
}

impl DetectionMethod {
    /// Parse the integer selector.  Method 2 parses but is not supported by
    /// the reference suite; see [`DetectionMethod::ensure_supported`].
    pub fn from_index(n: i64) -> Result<Self> {
        match n {
            1 => Ok(DetectionMethod::One),
            2 => Ok(DetectionMethod::Two),
            3 => Ok(DetectionMethod::Three),
            other => Err(HarnessError::UnsupportedMethod(other)),
        }
    }

    pub fn index(self) -> i64 {
        match self {
            DetectionMethod::One => 1,
            DetectionMethod::Two => 2,
            DetectionMethod::Three => 3,
        }
    }

    pub fn ensure_supported(self) -> Result<Self> {
        match self {
            DetectionMethod::Two => Err(HarnessError::UnsupportedMethod(2)),
            m => Ok(m),
        }
    }

    /// File name of the reference detections produced with this method.
    pub fn reference_archive_name(self) -> Result<&'static str> {
        match self.ensure_supported()? {
            DetectionMethod::Three => Ok("beta_events_shin_2017_method3.safetensors"),
            _ => Ok("beta_events_shin_2017.safetensors"),
        }
    }
}

/// How an attribute difference is held against its tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToleranceMode {
    /// `reference − candidate <= tol`.  Negative differences always pass.
    #[default]
    Signed,
    /// `|reference − candidate| <= tol`.
    Absolute,
}

/// Per-attribute upper bounds, in comparison units (ms, Hz, FOM).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Default: `5.0` ms.
    pub peak_time_ms: f64,
    /// Default: `1.0` Hz.
    pub peak_freq_hz: f64,
    /// Default: `1.0` Hz.
    pub low_freq_hz: f64,
    /// Default: `1.0` Hz.
    pub high_freq_hz: f64,
    /// Default: `10.0` ms.
    pub onset_ms: f64,
    /// Default: `10.0` ms.
    pub offset_ms: f64,
    /// Default: `0.5` FOM.
    pub power_fom: f64,
    pub mode: ToleranceMode,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            peak_time_ms: 5.0,
            peak_freq_hz: 1.0,
            low_freq_hz: 1.0,
            high_freq_hz: 1.0,
            onset_ms: 10.0,
            offset_ms: 10.0,
            power_fom: 0.5,
            mode: ToleranceMode::Signed,
        }
    }
}

impl Tolerances {
    pub fn for_attribute(&self, attr: crate::event::Attribute) -> f64 {
        use crate::event::Attribute::*;
        match attr {
            PeakTime => self.peak_time_ms,
            PeakFreq => self.peak_freq_hz,
            LowFreq => self.low_freq_hz,
            HighFreq => self.high_freq_hz,
            Onset => self.onset_ms,
            Offset => self.offset_ms,
            PeakPower => self.power_fom,
        }
    }
}

/// Configuration for one comparison run.
///
/// All fields are `pub`, so struct-update syntax works:
///
/// ```
/// use specev::HarnessConfig;
///
/// let cfg = HarnessConfig {
///     method: 3,
///     data_dir: "/data/shin2017".into(),
///     ..HarnessConfig::default()
/// };
/// assert_eq!(cfg.freqs().len(), 60);
/// ```
///
/// Or load it from TOML; missing keys keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Sampling frequency of the raw signal in Hz.
    ///
    /// Default: `600.0`.
    pub sfreq: f64,

    /// Samples per trial.  The raw-signal matrix must have this many rows.
    ///
    /// Default: `600` (one second at 600 Hz).
    pub n_times: usize,

    /// First, last (inclusive) and step of the TFR frequency sweep, in Hz.
    ///
    /// Default: `1..=60` in 1 Hz steps.
    pub freq_min: u32,
    pub freq_max: u32,
    pub freq_step: u32,

    /// Band `[low, high]` in Hz within which events are detected.
    ///
    /// Default: `[15.0, 29.0]` (beta).
    pub event_band: [f64; 2],

    /// Factor-of-median detection threshold.
    ///
    /// Default: `6.0`.
    pub threshold_fom: f64,

    /// Detection method selector (1, 2 or 3).  Only 1 and 3 can be run.
    ///
    /// Default: `1`.
    pub method: i64,

    /// Reference trials compared, taken from the start of the archive.
    ///
    /// Default: `200` (first subject).
    pub n_trials: usize,

    /// Directory that archive paths are resolved against.
    ///
    /// Default: `.`.
    pub data_dir: PathBuf,

    /// Overrides the method-specific reference archive name when set.
    pub reference_file: Option<PathBuf>,

    /// Raw-signal archive, relative to `data_dir`.
    pub raw_signal_file: PathBuf,

    /// Tensor key of the `[n_times, n_trials]` signal matrix.
    pub raw_signal_key: String,

    pub tolerances: Tolerances,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            sfreq: 600.0,
            n_times: 600,
            freq_min: 1,
            freq_max: 60,
            freq_step: 1,
            event_band: [15.0, 29.0],
            threshold_fom: 6.0,
            method: 1,
            n_trials: 200,
            data_dir: PathBuf::from("."),
            reference_file: None,
            raw_signal_file: PathBuf::from(
                "data/prestim_humandetection_600hzMEG_subject1.safetensors",
            ),
            raw_signal_key: "prestim_raw_yes_no".to_string(),
            tolerances: Tolerances::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| HarnessError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Check everything that can be checked without touching the filesystem.
    /// Returns the parsed detection method.
    pub fn validate(&self) -> Result<DetectionMethod> {
        let method = DetectionMethod::from_index(self.method)?.ensure_supported()?;
        if self.sfreq.is_nan() || self.sfreq <= 0.0 {
            return Err(HarnessError::Config(format!("sfreq must be positive, got {}", self.sfreq)));
        }
        if self.freq_step == 0 || self.freq_min > self.freq_max {
            return Err(HarnessError::Config(format!(
                "empty frequency sweep {}..={} step {}",
                self.freq_min, self.freq_max, self.freq_step
            )));
        }
        if self.event_band[0] > self.event_band[1] {
            return Err(HarnessError::Config(format!(
                "event band [{}, {}] is inverted",
                self.event_band[0], self.event_band[1]
            )));
        }
        Ok(method)
    }

    /// TFR frequencies in Hz.
    pub fn freqs(&self) -> Vec<f64> {
        (self.freq_min..=self.freq_max)
            .step_by(self.freq_step.max(1) as usize)
            .map(f64::from)
            .collect()
    }

    /// Sample times in seconds: `arange(n_times) / sfreq`.
    pub fn times(&self) -> Vec<f64> {
        (0..self.n_times).map(|i| i as f64 / self.sfreq).collect()
    }

    pub fn reference_archive_path(&self) -> Result<PathBuf> {
        let method = DetectionMethod::from_index(self.method)?;
        let name = match &self.reference_file {
            Some(p) => p.clone(),
            None => PathBuf::from(method.reference_archive_name()?),
        };
        Ok(self.data_dir.join(name))
    }

    pub fn raw_signal_path(&self) -> PathBuf {
        self.data_dir.join(&self.raw_signal_file)
    }
}
