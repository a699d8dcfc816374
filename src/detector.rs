//! The detector under test.
//!
//! Detection itself lives outside this crate.  A comparison run only needs
//! the two-stage interface below: compute a time-frequency representation,
//! then extract events from it.  Implementations are injected by the caller,
//! so nothing here resolves a library location on disk.
use anyhow::Result;
use ndarray::{Array2, Array3};

use crate::config::DetectionMethod;
use crate::event::EventSet;

/// Parameters passed to [`Detector::find_events`].
#[derive(Debug, Clone, Copy)]
pub struct FindEventsParams<'a> {
    /// Sample times in seconds, one per TFR time bin.
    pub times: &'a [f64],
    /// TFR frequencies in Hz, one per TFR frequency bin.
    pub freqs: &'a [f64],
    /// `[low, high]` band in Hz.
    pub event_band: [f64; 2],
    /// Explicit per-frequency power thresholds.  `None` lets the detector
    /// derive them from `threshold_fom` times the per-frequency median.
    pub thresholds: Option<&'a [f64]>,
    pub threshold_fom: f64,
    pub method: DetectionMethod,
}

/// A two-stage spectral event detector.
pub trait Detector {
    /// Time-frequency power of every trial.
    ///
    /// `signal` is `[n_times, n_trials]`; the result is
    /// `[n_trials, n_freqs, n_times]`.
    fn compute_tfr(&self, signal: &Array2<f64>, freqs: &[f64], sfreq: f64) -> Result<Array3<f64>>;

    /// Events of every trial in `tfr`, one [`crate::event::Trial`] per trial,
    /// in whatever order the detector finds them.
    fn find_events(&self, tfr: &Array3<f64>, params: &FindEventsParams<'_>) -> Result<EventSet>;
}

/// Replays a fixed [`EventSet`] instead of detecting anything.
///
/// Used to compare two stored result sets (for example detections exported
/// by another implementation) through the same run as a live detector.  The
/// TFR it returns is all zeros with the correct shape; `find_events` checks
/// that the trial count matches the TFR before handing back the stored set.
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    events: EventSet,
}

impl ReplayDetector {
    pub fn new(events: EventSet) -> Self {
        Self { events }
    }
}

impl Detector for ReplayDetector {
    fn compute_tfr(&self, signal: &Array2<f64>, freqs: &[f64], _sfreq: f64) -> Result<Array3<f64>> {
        let (n_times, n_trials) = signal.dim();
        Ok(Array3::zeros((n_trials, freqs.len(), n_times)))
    }

    fn find_events(&self, tfr: &Array3<f64>, params: &FindEventsParams<'_>) -> Result<EventSet> {
        let (n_trials, n_freqs, n_times) = tfr.dim();
        anyhow::ensure!(
            n_freqs == params.freqs.len() && n_times == params.times.len(),
            "TFR shape {:?} does not match {} freqs × {} times",
            tfr.dim(),
            params.freqs.len(),
            params.times.len()
        );
        anyhow::ensure!(
            self.events.n_trials() >= n_trials,
            "replay set has {} trials, TFR has {n_trials}",
            self.events.n_trials()
        );
        Ok(self.events.clone().truncated(n_trials))
    }
}
