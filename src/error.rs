//! Error types.
//!
//! - `DecayError` is the library-level taxonomy returned by loading, fitting
//!   and rescaling. Batch callers inspect it to decide whether a failure is
//!   isolated to one (event, species) pair or aborts an event.
//! - `AppError` is the binary boundary: a message plus a process exit code.

use chrono::{DateTime, Utc};

/// Exit code for invalid input or configuration.
pub const EXIT_INPUT: u8 = 2;
/// Exit code for unusable upstream data.
pub const EXIT_DATA: u8 = 3;
/// Exit code for network and computation failures.
pub const EXIT_COMPUTE: u8 = 4;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures of the decay analysis core.
#[derive(Debug, Clone, PartialEq)]
pub enum DecayError {
    /// Network/API failure retrieving sample records (after retries).
    UpstreamFetch { message: String },
    /// The upstream returned zero records for the requested window.
    EmptyWindow {
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
    },
    /// A later record lacks a species key present in the first record.
    SpeciesMismatch { index: usize, species: String },
    /// A record could not be interpreted (bad timestamp, non-finite value).
    MalformedRecord { index: usize, message: String },
    /// A query window is unusable (stop not after start, bad bound token).
    InvalidWindow { message: String },
    /// The nonlinear fit failed or its input was degenerate.
    FitConvergence { species: String, reason: String },
    /// The fitted amplitude is (numerically) zero; `(y - c) / a` is undefined.
    DegenerateRescale { species: String, amplitude: f64 },
    /// `rescale_fitted` was called for a species that has not been fitted.
    NotFitted { species: String },
    /// The species is not present in the event's time series.
    UnknownSpecies { species: String },
}

impl DecayError {
    /// Whether this error is scoped to a single (event, species) pair.
    pub fn is_pair_scoped(&self) -> bool {
        matches!(
            self,
            DecayError::FitConvergence { .. }
                | DecayError::DegenerateRescale { .. }
                | DecayError::NotFitted { .. }
                | DecayError::UnknownSpecies { .. }
        )
    }

    pub(crate) fn fit(species: &str, reason: impl Into<String>) -> Self {
        DecayError::FitConvergence {
            species: species.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for DecayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecayError::UpstreamFetch { message } => write!(f, "Upstream fetch failed: {message}"),
            DecayError::EmptyWindow { start, stop } => write!(
                f,
                "No records returned for window {} .. {}.",
                start.to_rfc3339(),
                stop.to_rfc3339()
            ),
            DecayError::SpeciesMismatch { index, species } => write!(
                f,
                "Record {index} is missing species `{species}` present in the first record."
            ),
            DecayError::MalformedRecord { index, message } => {
                write!(f, "Malformed record {index}: {message}")
            }
            DecayError::InvalidWindow { message } => write!(f, "Invalid window: {message}"),
            DecayError::FitConvergence { species, reason } => {
                write!(f, "Fit failed for `{species}`: {reason}")
            }
            DecayError::DegenerateRescale { species, amplitude } => write!(
                f,
                "Cannot rescale `{species}`: fitted amplitude {amplitude:e} is indistinguishable from zero."
            ),
            DecayError::NotFitted { species } => {
                write!(f, "Species `{species}` must be fitted before it can be rescaled.")
            }
            DecayError::UnknownSpecies { species } => {
                write!(f, "Species `{species}` is not present in this time series.")
            }
        }
    }
}

impl std::error::Error for DecayError {}

impl From<DecayError> for AppError {
    fn from(err: DecayError) -> Self {
        let code = match &err {
            DecayError::InvalidWindow { .. } | DecayError::UnknownSpecies { .. } => EXIT_INPUT,
            DecayError::EmptyWindow { .. }
            | DecayError::SpeciesMismatch { .. }
            | DecayError::MalformedRecord { .. } => EXIT_DATA,
            DecayError::UpstreamFetch { .. }
            | DecayError::FitConvergence { .. }
            | DecayError::DegenerateRescale { .. }
            | DecayError::NotFitted { .. } => EXIT_COMPUTE,
        };
        AppError::new(code, err.to_string())
    }
}
