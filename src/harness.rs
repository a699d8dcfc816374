//! End-to-end comparison run.
//!
//! ```text
//! HarnessConfig::validate()       unsupported method → fail, nothing read
//!   ├─ io::load_reference()       first n_trials reference trials
//!   ├─ io::load_raw_signal()      [n_times, n_trials] matrix
//!   ├─ Detector::compute_tfr()
//!   ├─ Detector::find_events()    candidate EventSet
//!   └─ Reconciler::check()        structural gate, then 7 tolerance gates
//! ```
use tracing::info;

use crate::config::HarnessConfig;
use crate::detector::{Detector, FindEventsParams};
use crate::error::{HarnessError, Result};
use crate::event::EventSet;
use crate::io;
use crate::reconcile::{Reconciler, Report};

/// Everything a run needs from disk, loaded and closed.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub reference: EventSet,
    pub signal: ndarray::Array2<f64>,
}

/// Read the reference and raw-signal archives named by `cfg`.
///
/// Validates `cfg` first, so an unsupported method never touches the disk.
pub fn load_inputs(cfg: &HarnessConfig) -> Result<Inputs> {
    cfg.validate()?;

    let ref_path = cfg.reference_archive_path()?;
    let reference = io::load_reference(&ref_path)?.truncated(cfg.n_trials);
    info!(path = %ref_path.display(), trials = reference.n_trials(),
          events = reference.total_events(), "reference loaded");

    let raw_path = cfg.raw_signal_path();
    let signal = io::load_raw_signal(&raw_path, &cfg.raw_signal_key)?;
    if signal.nrows() != cfg.n_times {
        return Err(HarnessError::Shape(format!(
            "{}: signal has {} samples per trial, expected {}",
            raw_path.display(),
            signal.nrows(),
            cfg.n_times
        )));
    }
    info!(path = %raw_path.display(), n_times = signal.nrows(), trials = signal.ncols(),
          "raw signal loaded");

    Ok(Inputs { reference, signal })
}

/// Run `detector` over the raw signal and return its events.
pub fn detect<D: Detector + ?Sized>(
    cfg: &HarnessConfig,
    detector: &D,
    signal: &ndarray::Array2<f64>,
) -> Result<EventSet> {
    let method = cfg.validate()?;
    let freqs = cfg.freqs();
    let times = cfg.times();

    let tfr = detector
        .compute_tfr(signal, &freqs, cfg.sfreq)
        .map_err(HarnessError::Detector)?;

    let params = FindEventsParams {
        times: &times,
        freqs: &freqs,
        event_band: cfg.event_band,
        thresholds: None,
        threshold_fom: cfg.threshold_fom,
        method,
    };
    let events = detector.find_events(&tfr, &params).map_err(HarnessError::Detector)?;
    info!(method = method.index(), trials = events.n_trials(), events = events.total_events(),
          "candidate detections computed");
    Ok(events)
}

/// Full comparison run: load, detect, reconcile.
///
/// Returns the [`Report`] when the event counts agree and every attribute is
/// within tolerance; otherwise the first terminal [`HarnessError`].
pub fn run_comparison<D: Detector + ?Sized>(cfg: &HarnessConfig, detector: &D) -> Result<Report> {
    let inputs = load_inputs(cfg)?;
    let candidate = detect(cfg, detector, &inputs.signal)?;
    let report = Reconciler::new(cfg.tolerances.clone()).check(&inputs.reference, &candidate)?;
    info!(trials = report.n_trials, events = report.n_events, "all gates passed");
    Ok(report)
}
