//! Spectral event records and the per-trial containers that hold them.
//!
//! An [`EventSet`] is ragged: trial `i` holds however many events the
//! detector found in it, in detection order.  Nothing here reorders events;
//! canonical ordering lives in [`crate::reconcile`].
use std::fmt;

use crate::error::{HarnessError, Result};

/// One detected spectral event.
///
/// Times are in seconds, frequencies in Hz, power in factor-of-median units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Event {
    pub peak_time: f64,
    pub peak_freq: f64,
    pub low_freq: f64,
    pub high_freq: f64,
    pub onset: f64,
    pub offset: f64,
    pub peak_power: f64,
}

/// Coarse grouping used when reporting which invariant broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeClass {
    Timing,
    Frequency,
    Duration,
    Power,
}

impl fmt::Display for AttributeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AttributeClass::Timing => "timing",
            AttributeClass::Frequency => "frequency",
            AttributeClass::Duration => "duration",
            AttributeClass::Power => "power",
        })
    }
}

/// The seven scalar attributes compared per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    PeakTime,
    PeakFreq,
    LowFreq,
    HighFreq,
    Onset,
    Offset,
    PeakPower,
}

impl Attribute {
    pub const ALL: [Attribute; 7] = [
        Attribute::PeakTime,
        Attribute::PeakFreq,
        Attribute::LowFreq,
        Attribute::HighFreq,
        Attribute::Onset,
        Attribute::Offset,
        Attribute::PeakPower,
    ];

    /// Raw value of this attribute on `ev`, in storage units.
    pub fn get(self, ev: &Event) -> f64 {
        match self {
            Attribute::PeakTime => ev.peak_time,
            Attribute::PeakFreq => ev.peak_freq,
            Attribute::LowFreq => ev.low_freq,
            Attribute::HighFreq => ev.high_freq,
            Attribute::Onset => ev.onset,
            Attribute::Offset => ev.offset,
            Attribute::PeakPower => ev.peak_power,
        }
    }

    pub fn set(self, ev: &mut Event, value: f64) {
        match self {
            Attribute::PeakTime => ev.peak_time = value,
            Attribute::PeakFreq => ev.peak_freq = value,
            Attribute::LowFreq => ev.low_freq = value,
            Attribute::HighFreq => ev.high_freq = value,
            Attribute::Onset => ev.onset = value,
            Attribute::Offset => ev.offset = value,
            Attribute::PeakPower => ev.peak_power = value,
        }
    }

    /// Multiplier applied before comparison: seconds → milliseconds for the
    /// three time attributes, identity otherwise.
    pub fn unit_scale(self) -> f64 {
        match self {
            Attribute::PeakTime | Attribute::Onset | Attribute::Offset => 1000.0,
            _ => 1.0,
        }
    }

    /// Unit label of the compared (scaled) value.
    pub fn unit(self) -> &'static str {
        match self {
            Attribute::PeakTime | Attribute::Onset | Attribute::Offset => "ms",
            Attribute::PeakFreq | Attribute::LowFreq | Attribute::HighFreq => "Hz",
            Attribute::PeakPower => "FOM",
        }
    }

    pub fn class(self) -> AttributeClass {
        match self {
            Attribute::PeakTime => AttributeClass::Timing,
            Attribute::PeakFreq | Attribute::LowFreq | Attribute::HighFreq => {
                AttributeClass::Frequency
            }
            Attribute::Onset | Attribute::Offset => AttributeClass::Duration,
            Attribute::PeakPower => AttributeClass::Power,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Attribute::PeakTime => "peak time",
            Attribute::PeakFreq => "peak frequency",
            Attribute::LowFreq => "lower frequency bound",
            Attribute::HighFreq => "upper frequency bound",
            Attribute::Onset => "onset time",
            Attribute::Offset => "offset time",
            Attribute::PeakPower => "normalized peak power",
        }
    }

    /// Key prefix of this attribute's per-trial tensors in a reference archive.
    pub fn archive_key(self) -> &'static str {
        match self {
            Attribute::PeakTime => "event_times",
            Attribute::PeakFreq => "max_freq",
            Attribute::LowFreq => "low_freq",
            Attribute::HighFreq => "high_freq",
            Attribute::Onset => "onset",
            Attribute::Offset => "offset",
            Attribute::PeakPower => "power",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Events of one trial, in the order the detector emitted them.
pub type Trial = Vec<Event>;

/// All trials of one run, in trial order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventSet {
    trials: Vec<Trial>,
}

impl EventSet {
    pub fn from_trials(trials: Vec<Trial>) -> Self {
        Self { trials }
    }

    /// Build a set from the seven parallel per-trial columns of a reference
    /// archive, indexed like [`Attribute::ALL`].
    ///
    /// `columns[a][i]` holds attribute `a` for every event of trial `i`.  All
    /// seven columns must agree on the number of trials and, per trial, on the
    /// number of events.
    pub fn from_columns(columns: &[Vec<Vec<f64>>; 7]) -> Result<Self> {
        let n_trials = columns[0].len();
        for (a, col) in Attribute::ALL.iter().zip(columns.iter()) {
            if col.len() != n_trials {
                return Err(HarnessError::Shape(format!(
                    "{a}: {} trials, expected {n_trials}",
                    col.len()
                )));
            }
        }

        let mut trials = Vec::with_capacity(n_trials);
        for i in 0..n_trials {
            let n_ev = columns[0][i].len();
            let mut trial = vec![Event::default(); n_ev];
            for (a, col) in Attribute::ALL.iter().zip(columns.iter()) {
                if col[i].len() != n_ev {
                    return Err(HarnessError::Shape(format!(
                        "trial {i}: {a} has {} events, peak time has {n_ev}",
                        col[i].len()
                    )));
                }
                for (ev, &v) in trial.iter_mut().zip(col[i].iter()) {
                    a.set(ev, v);
                }
            }
            trials.push(trial);
        }
        Ok(Self { trials })
    }

    pub fn n_trials(&self) -> usize {
        self.trials.len()
    }

    pub fn trials(&self) -> &[Trial] {
        &self.trials
    }

    pub fn trial(&self, i: usize) -> Option<&Trial> {
        self.trials.get(i)
    }

    /// Number of events in each trial.
    pub fn event_counts(&self) -> Vec<usize> {
        self.trials.iter().map(Vec::len).collect()
    }

    pub fn total_events(&self) -> usize {
        self.trials.iter().map(Vec::len).sum()
    }

    /// The first `n` trials (all of them if there are fewer).
    pub fn truncated(mut self, n: usize) -> Self {
        self.trials.truncate(n);
        self
    }

    pub fn into_trials(self) -> Vec<Trial> {
        self.trials
    }
}

impl From<Vec<Trial>> for EventSet {
    fn from(trials: Vec<Trial>) -> Self {
        Self::from_trials(trials)
    }
}
