//! Error types for the simulation kernel.

use thiserror::Error;

/// Result type for kernel operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// Configuration-time errors (see spec §7: "fail loudly at configuration
/// time"). `step()` itself never returns an error — any failure there is an
/// implementation bug, not a caller mistake.
#[derive(Error, Debug)]
pub enum SimError {
    /// A population or topology size was zero or exceeded `i32::MAX - 1`.
    #[error("invalid size for {what}: {value} ({constraint})")]
    InvalidSize {
        /// What the size described (population, topology side, ...).
        what: String,
        /// The offending value.
        value: i64,
        /// Human-readable constraint that was violated.
        constraint: String,
    },

    /// `fixed_probability`'s `p` was outside `[0, 1]`.
    #[error("invalid edge probability {p} (must be in [0, 1])")]
    InvalidProbability {
        /// The offending probability.
        p: f64,
    },

    /// A connection's delay was outside `[1, max_delay]`.
    #[error("invalid delay {delay} (must be in [1, {max_delay}])")]
    InvalidDelay {
        /// The requested delay in ticks.
        delay: i64,
        /// The driver's configured maximum delay in ticks.
        max_delay: i64,
    },

    /// An adjacency list contained the same `(src, dst)` edge twice.
    #[error("duplicate edge ({src}, {dst}) in adjacency list")]
    DuplicateEdge {
        /// Source index of the duplicated edge.
        src: i32,
        /// Destination index of the duplicated edge.
        dst: i32,
    },

    /// An edge referenced a source or destination index outside the bound
    /// population size.
    #[error("edge index {index} out of range for {side} count {count}")]
    IndexOutOfRange {
        /// The offending index.
        index: i32,
        /// Which side of the edge ("source" or "destination").
        side: &'static str,
        /// The bound count for that side.
        count: i32,
    },

    /// A handle referred to a population or connection that does not exist.
    #[error("unknown {what} handle {index}")]
    UnknownHandle {
        /// What kind of handle was looked up.
        what: &'static str,
        /// The raw handle index.
        index: usize,
    },

    /// `dt` or `max_delay` failed basic sanity checks.
    #[error("invalid simulation configuration: {reason}")]
    InvalidConfiguration {
        /// Reason the configuration was rejected.
        reason: String,
    },

    /// A size computation overflowed the representable range (`Int32`).
    #[error("numeric overflow computing {what}")]
    Overflow {
        /// What computation overflowed.
        what: String,
    },
}

impl SimError {
    /// Construct an [`SimError::InvalidSize`].
    pub fn invalid_size(what: impl Into<String>, value: i64, constraint: impl Into<String>) -> Self {
        Self::InvalidSize {
            what: what.into(),
            value,
            constraint: constraint.into(),
        }
    }

    /// Construct an [`SimError::InvalidProbability`].
    pub fn invalid_probability(p: f64) -> Self {
        Self::InvalidProbability { p }
    }

    /// Construct an [`SimError::InvalidDelay`].
    pub fn invalid_delay(delay: i64, max_delay: i64) -> Self {
        Self::InvalidDelay { delay, max_delay }
    }

    /// Construct an [`SimError::DuplicateEdge`].
    pub fn duplicate_edge(src: i32, dst: i32) -> Self {
        Self::DuplicateEdge { src, dst }
    }

    /// Construct an [`SimError::IndexOutOfRange`].
    pub fn index_out_of_range(index: i32, side: &'static str, count: i32) -> Self {
        Self::IndexOutOfRange { index, side, count }
    }

    /// Construct an [`SimError::UnknownHandle`].
    pub fn unknown_handle(what: &'static str, index: usize) -> Self {
        Self::UnknownHandle { what, index }
    }

    /// Construct an [`SimError::InvalidConfiguration`].
    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    /// Construct an [`SimError::Overflow`].
    pub fn overflow(what: impl Into<String>) -> Self {
        Self::Overflow { what: what.into() }
    }
}
