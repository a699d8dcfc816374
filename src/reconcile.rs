//! Reference-vs-candidate event set reconciliation.
//!
//! ```text
//! reference ─┐
//!            ├─ structural_check   per-trial event counts must match
//! candidate ─┘        │
//!                     ├─ canonicalize   sort each trial by peak time (both sides)
//!                     ├─ flatten        7 attributes × 2 sets, trial order, ms/Hz/FOM
//!                     └─ compare        one independent gate per attribute
//! ```
//!
//! A structural failure stops the run before any attribute array is built.
//! Gate failures do not short-circuit: every gate runs so one report lists
//! every attribute out of tolerance.
use ndarray::Array1;
use tracing::{debug, info, warn};

use crate::config::{ToleranceMode, Tolerances};
use crate::error::{HarnessError, Result, Violation};
use crate::event::{Attribute, EventSet, Trial};

/// Fail unless both sets have the same number of trials and, trial by trial,
/// the same number of events.
pub fn structural_check(reference: &EventSet, candidate: &EventSet) -> Result<()> {
    if reference.n_trials() != candidate.n_trials() {
        return Err(HarnessError::TrialCountMismatch {
            reference: reference.n_trials(),
            candidate: candidate.n_trials(),
        });
    }

    let mismatches: Vec<(usize, usize, usize)> = reference
        .event_counts()
        .into_iter()
        .zip(candidate.event_counts())
        .enumerate()
        .filter(|(_, (r, c))| r != c)
        .map(|(i, (r, c))| (i, r, c))
        .collect();

    if mismatches.is_empty() {
        return Ok(());
    }
    for &(i, r, c) in &mismatches {
        debug!(trial = i, reference = r, candidate = c, "event count mismatch");
    }
    warn!(trials = mismatches.len(), "event counts differ");
    Err(HarnessError::EventCountMismatch { mismatches })
}

/// Permutation that sorts `trial` by ascending peak time.
///
/// The sort is stable, so events with equal peak times keep their detection
/// order.  NaN peak times sort last.
pub fn canonical_order(trial: &[crate::event::Event]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..trial.len()).collect();
    idx.sort_by(|&a, &b| trial[a].peak_time.total_cmp(&trial[b].peak_time));
    idx
}

/// `trial` reordered by [`canonical_order`].  All seven attributes move together.
pub fn canonicalize(trial: &[crate::event::Event]) -> Trial {
    canonical_order(trial).into_iter().map(|i| trial[i]).collect()
}

/// Canonicalize every trial of `set`.
pub fn canonicalize_set(set: &EventSet) -> EventSet {
    EventSet::from_trials(set.trials().iter().map(|t| canonicalize(t.as_slice())).collect())
}

/// Concatenate one attribute across all trials, in trial order, converted to
/// comparison units (see [`Attribute::unit_scale`]).
pub fn flatten(set: &EventSet, attr: Attribute) -> Array1<f64> {
    let scale = attr.unit_scale();
    set.trials()
        .iter()
        .flat_map(|t| t.iter().map(move |ev| attr.get(ev) * scale))
        .collect()
}

/// Result of one attribute gate.
#[derive(Debug, Clone, PartialEq)]
pub struct GateOutcome {
    pub attribute: Attribute,
    pub tolerance: f64,
    pub mode: ToleranceMode,
    /// Largest `reference − candidate` (signed mode, may be negative) or
    /// `|reference − candidate|` (absolute mode).  NaN if any difference is
    /// NaN; `0.0` for no events.
    pub max_deviation: f64,
    /// Flat indices whose deviation exceeds the tolerance or is NaN.
    pub violations: Vec<usize>,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    fn to_violation(&self) -> Violation {
        Violation {
            attribute: self.attribute.name(),
            class: self.attribute.class(),
            tolerance: self.tolerance,
            max_deviation: self.max_deviation,
            n_violations: self.violations.len(),
        }
    }
}

/// Elementwise `reference − candidate` held against `tolerance`.
///
/// Both arrays must have the same length; [`structural_check`] guarantees
/// this for flattened event sets.
pub fn compare(
    attr: Attribute,
    reference: &Array1<f64>,
    candidate: &Array1<f64>,
    tolerance: f64,
    mode: ToleranceMode,
) -> Result<GateOutcome> {
    if reference.len() != candidate.len() {
        return Err(HarnessError::Shape(format!(
            "{attr}: {} reference values vs {} candidate values",
            reference.len(),
            candidate.len()
        )));
    }

    let diff = reference - candidate;
    let dev = match mode {
        ToleranceMode::Signed => diff,
        ToleranceMode::Absolute => diff.mapv(f64::abs),
    };

    // Written as `!(d <= tol)` so NaN lands in the violations.
    let violations: Vec<usize> = dev
        .iter()
        .enumerate()
        .filter(|&(_, &d)| !(d <= tolerance))
        .map(|(i, _)| i)
        .collect();

    let max_deviation = if dev.is_empty() {
        0.0
    } else if dev.iter().any(|d| d.is_nan()) {
        f64::NAN
    } else {
        dev.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    };

    Ok(GateOutcome { attribute: attr, tolerance, mode, max_deviation, violations })
}

/// Outcome of a run that got past the structural check.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub n_trials: usize,
    pub n_events: usize,
    /// One entry per attribute, in [`Attribute::ALL`] order.
    pub gates: Vec<GateOutcome>,
}

impl Report {
    pub fn passed(&self) -> bool {
        self.gates.iter().all(GateOutcome::passed)
    }

    pub fn gate(&self, attr: Attribute) -> Option<&GateOutcome> {
        self.gates.iter().find(|g| g.attribute == attr)
    }

    pub fn failures(&self) -> impl Iterator<Item = &GateOutcome> {
        self.gates.iter().filter(|g| !g.passed())
    }

    /// `Ok(self)` when every gate passed, otherwise a
    /// [`HarnessError::ToleranceViolation`] naming every failing attribute.
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }
        Err(HarnessError::ToleranceViolation {
            violations: self.failures().map(GateOutcome::to_violation).collect(),
        })
    }
}

/// Decides whether two event sets describe the same detections.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    pub tolerances: Tolerances,
}

impl Reconciler {
    pub fn new(tolerances: Tolerances) -> Self {
        Self { tolerances }
    }

    /// Run the structural check, canonicalize both sides, and evaluate all
    /// seven gates.
    ///
    /// Returns `Err` only for structural problems.  Gate failures are recorded
    /// in the [`Report`]; use [`Report::into_result`] to turn them into an error.
    pub fn reconcile(&self, reference: &EventSet, candidate: &EventSet) -> Result<Report> {
        structural_check(reference, candidate)?;
        info!(
            trials = reference.n_trials(),
            events = reference.total_events(),
            "event counts agree"
        );

        let reference = canonicalize_set(reference);
        let candidate = canonicalize_set(candidate);

        let mode = self.tolerances.mode;
        let mut gates = Vec::with_capacity(Attribute::ALL.len());
        for attr in Attribute::ALL {
            let tol = self.tolerances.for_attribute(attr);
            let ref_vals = flatten(&reference, attr);
            let cand_vals = flatten(&candidate, attr);
            let gate = compare(attr, &ref_vals, &cand_vals, tol, mode)?;
            if gate.passed() {
                info!(attribute = %attr, max_deviation = gate.max_deviation, tolerance = tol,
                      unit = attr.unit(), "gate passed");
            } else {
                warn!(attribute = %attr, class = %attr.class(), max_deviation = gate.max_deviation,
                      tolerance = tol, unit = attr.unit(), violations = gate.violations.len(),
                      "gate failed");
            }
            gates.push(gate);
        }

        Ok(Report { n_trials: reference.n_trials(), n_events: reference.total_events(), gates })
    }

    /// [`Reconciler::reconcile`] followed by [`Report::into_result`].
    pub fn check(&self, reference: &EventSet, candidate: &EventSet) -> Result<Report> {
        self.reconcile(reference, candidate)?.into_result()
    }
}
