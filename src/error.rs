//! Error taxonomy for the clustering engine.
//!
//! Every public entry point returns [`Result<T, InfomapError>`](InfomapError)
//! rather than a boxed `dyn Error` or `anyhow::Error`, so callers can match on
//! [`InfomapError`]'s variant and apply the recovery policy of their choosing
//! (e.g. treat [`InfomapError::NonconvergedFlow`] as a warning and keep going).

use thiserror::Error;

/// The five error kinds the engine can surface.
#[derive(Debug, Error, Clone)]
pub enum InfomapError {
    /// A configuration value was out of range or contradicted another.
    #[error("invalid configuration: {message} (option: {option})")]
    InvalidConfiguration {
        /// The option name that failed validation.
        option: &'static str,
        /// Human-readable detail.
        message: String,
    },

    /// The input graph violated a structural precondition.
    #[error("invalid graph: {message}")]
    InvalidGraph {
        /// Human-readable detail, including offending ids where known.
        message: String,
    },

    /// The requested combination of options has no supported implementation.
    #[error("flow model unsupported: {message}")]
    FlowModelUnsupported {
        /// Human-readable detail naming the unsupported combination.
        message: String,
    },

    /// The flow power iteration did not converge within its iteration budget.
    ///
    /// This is surfaced as a warning alongside the best available flow, not
    /// as a fatal error; callers that want strict behavior can still match
    /// on this variant and abort.
    #[error("flow did not converge after {iterations} iterations (final error {final_error:e})")]
    NonconvergedFlow {
        /// Number of power-iteration steps performed.
        iterations: usize,
        /// The L1 error at the final iteration.
        final_error: f64,
    },

    /// An internal invariant (see the data-model invariants) was violated.
    ///
    /// Reaching this indicates a defect in the engine itself, not bad input.
    #[error("internal consistency violation: {message}")]
    InternalConsistency {
        /// Which invariant was violated and the observed values.
        message: String,
    },
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, InfomapError>;

impl InfomapError {
    pub(crate) fn invalid_config(option: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            option,
            message: message.into(),
        }
    }

    pub(crate) fn invalid_graph(message: impl Into<String>) -> Self {
        Self::InvalidGraph {
            message: message.into(),
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::InternalConsistency {
            message: message.into(),
        }
    }

    /// True for errors the §7 recovery policy treats as non-fatal warnings
    /// rather than a reason to abort: [`Infomap::run`](crate::Infomap::run)
    /// never returns this variant as `Err` -- flow computation still
    /// produces its best-effort result and the caller finds it attached to
    /// [`Outcome::convergence_warning`](crate::Outcome::convergence_warning)
    /// instead. Exposed for callers who construct or forward
    /// [`InfomapError`] values themselves and need to tell a non-fatal kind
    /// apart from one that should actually stop a run.
    #[must_use]
    pub fn is_trial_local(&self) -> bool {
        matches!(self, Self::NonconvergedFlow { .. })
    }
}
