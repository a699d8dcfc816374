//! # specev — spectral event agreement checks
//!
//! `specev` checks that a spectral event detector reproduces a trusted set of
//! reference detections.  Both sides are reduced to per-trial lists of events
//! (peak time, peak frequency, frequency bounds, onset, offset, FOM power),
//! aligned, and compared attribute by attribute against fixed tolerances.
//!
//! ## Run overview
//!
//! ```text
//! beta_events_shin_2017.safetensors      prestim_…_subject1.safetensors
//!   │                                      │
//!   ├─ io::load_reference()                ├─ io::load_raw_signal()   [T, trials]
//!   │    first 200 trials                  ├─ Detector::compute_tfr() [trials, F, T]
//!   │                                      └─ Detector::find_events() candidate
//!   └───────────────┬──────────────────────┘
//!                   ├─ structural_check    same #events in every trial
//!                   ├─ canonicalize        sort trials by peak time
//!                   ├─ flatten             s → ms for time attributes
//!                   └─ compare × 7         ref − cand <= tolerance
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use specev::{run_comparison, HarnessConfig, ReplayDetector, EventSet};
//!
//! // Any `Detector` implementation; here one that replays stored events.
//! let detector = ReplayDetector::new(EventSet::default());
//!
//! let cfg = HarnessConfig { method: 3, data_dir: "data".into(), ..HarnessConfig::default() };
//! let report = run_comparison(&cfg, &detector).unwrap();
//! for gate in &report.gates {
//!     println!("{:<24} max dev {:.3} (tol {})", gate.attribute, gate.max_deviation, gate.tolerance);
//! }
//! ```
//!
//! ## Comparing sets directly
//!
//! ```
//! use specev::{Event, EventSet, Reconciler};
//!
//! let ev = |t: f64| Event { peak_time: t, peak_freq: 20.0, low_freq: 17.0, high_freq: 23.0,
//!                           onset: t - 0.05, offset: t + 0.05, peak_power: 7.0 };
//! let reference = EventSet::from_trials(vec![vec![ev(0.1), ev(0.4)], vec![]]);
//! let candidate = EventSet::from_trials(vec![vec![ev(0.4), ev(0.1)], vec![]]);
//!
//! // Detection order differs; canonical ordering makes them agree.
//! assert!(Reconciler::default().check(&reference, &candidate).is_ok());
//! ```

pub mod config;
pub mod detector;
pub mod error;
pub mod event;
pub mod harness;
pub mod io;
pub mod reconcile;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{DetectionMethod, HarnessConfig, ToleranceMode, Tolerances};

// detector
pub use detector::{Detector, FindEventsParams, ReplayDetector};

// error
pub use error::{HarnessError, Violation};

// event
pub use event::{Attribute, AttributeClass, Event, EventSet, Trial};

// harness
pub use harness::{detect, load_inputs, run_comparison, Inputs};

// io — safetensors archives
pub use io::{load_raw_signal, load_reference, write_reference_archive, Archive, StWriter};

// reconcile
pub use reconcile::{
    canonical_order, canonicalize, canonicalize_set, compare, flatten, structural_check,
    GateOutcome, Reconciler, Report,
};
