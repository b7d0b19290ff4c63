//! Error types for the simulator core.
//!
//! Every fallible operation in the library returns [`SimError`]. The
//! variants follow the three failure classes of a run: problems with the
//! netlist itself (raised before anything is solved), inconsistent
//! excitation in steady-state mode, and numerically singular systems.

use std::fmt;

use thiserror::Error;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Where a linear solve was attempted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolveLocation {
    /// A transient step, with its index and simulated time.
    TransientStep { step: usize, time: f64 },
    /// The single phasor solve.
    SteadyState,
    /// A bare call into the linear solver.
    Unspecified,
}

impl fmt::Display for SolveLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveLocation::TransientStep { step, time } => {
                write!(f, "transient step {} (t = {:.6e} s)", step, time)
            }
            SolveLocation::SteadyState => write!(f, "steady-state solve"),
            SolveLocation::Unspecified => write!(f, "linear solve"),
        }
    }
}

/// Problems with the netlist or run parameters. Always raised before solving.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("netlist is empty")]
    EmptyNetlist,

    #[error("unknown device kind '{kind}'")]
    UnknownKind { kind: String },

    #[error("malformed designator '{designator}' (expected <Kind>-<serial>)")]
    MalformedDesignator { designator: String },

    #[error("duplicate designator '{designator}'")]
    DuplicateDesignator { designator: String },

    #[error("invalid value for '{designator}': {message}")]
    InvalidValue { designator: String, message: String },

    #[error("branch '{designator}' is degenerate: both terminals on node {node}")]
    DegenerateBranch { designator: String, node: usize },

    #[error("node {missing} is not connected to any component (nodes must be numbered 1..={max})")]
    NonContiguousNodes { missing: usize, max: usize },

    #[error("malformed coupling on '{designator}': {message}")]
    MalformedCoupling { designator: String, message: String },

    #[error("invalid time parameters: t = {t}, dt = {dt}")]
    InvalidTimeStep { t: f64, dt: f64 },
}

/// Unified error type for all simulator operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("inconsistent sources: {message}")]
    InconsistentSource { message: String },

    #[error("singular system matrix at {location} - check for floating nodes or source loops")]
    SingularSystem { location: SolveLocation },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("simulation cancelled before step {step}")]
    Cancelled { step: usize },
}

impl SimError {
    /// Create an inconsistent-source error
    pub fn inconsistent_source(message: impl Into<String>) -> Self {
        Self::InconsistentSource {
            message: message.into(),
        }
    }

    /// Attach a solve location to a singular-system error. Other errors pass through.
    pub fn at(self, location: SolveLocation) -> Self {
        match self {
            SimError::SingularSystem { .. } => SimError::SingularSystem { location },
            other => other,
        }
    }
}

impl ConfigurationError {
    /// Create an invalid value error
    pub fn invalid_value(designator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            designator: designator.into(),
            message: message.into(),
        }
    }

    /// Create a malformed coupling error
    pub fn malformed_coupling(designator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedCoupling {
            designator: designator.into(),
            message: message.into(),
        }
    }
}
