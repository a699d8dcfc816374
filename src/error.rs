//! Error taxonomy for a comparison run.
//!
//! Every variant is terminal for the run that produced it.
use std::path::PathBuf;

use crate::event::AttributeClass;

/// One failing tolerance gate, as carried by [`HarnessError::ToleranceViolation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    /// Display name of the attribute (`"peak time"`, …).
    pub attribute: &'static str,
    pub class: AttributeClass,
    pub tolerance: f64,
    /// Largest deviation seen, in comparison units.
    pub max_deviation: f64,
    /// Number of flattened events outside the bound.
    pub n_violations: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("unsupported detection method {0}: only methods 1 and 3 are supported")]
    UnsupportedMethod(i64),

    #[error("reference has {reference} trials but candidate has {candidate}")]
    TrialCountMismatch { reference: usize, candidate: usize },

    /// `(trial, reference_count, candidate_count)` for every disagreeing trial.
    #[error("event counts differ between reference and candidate in {}", describe_counts(.mismatches))]
    EventCountMismatch { mismatches: Vec<(usize, usize, usize)> },

    #[error("{} attribute gate(s) out of tolerance: {}", .violations.len(), describe(.violations))]
    ToleranceViolation { violations: Vec<Violation> },

    #[error("archive {}: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("shape mismatch: {0}")]
    Shape(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("detector failed: {0:#}")]
    Detector(anyhow::Error),
}

impl HarnessError {
    pub(crate) fn archive(path: &std::path::Path, reason: impl Into<String>) -> Self {
        HarnessError::Archive { path: path.to_path_buf(), reason: reason.into() }
    }
}

fn describe_counts(mismatches: &[(usize, usize, usize)]) -> String {
    match mismatches.first() {
        Some(&(trial, r, c)) => format!(
            "{} trial(s), first at trial {trial}: reference={r} candidate={c}",
            mismatches.len()
        ),
        None => "0 trial(s)".to_string(),
    }
}

fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| {
            format!(
                "{} {} (max deviation {:.4} > {}, {} event(s))",
                v.class, v.attribute, v.max_deviation, v.tolerance, v.n_violations
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
