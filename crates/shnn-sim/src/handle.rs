//! Stable integer handles issued at add-time (spec §5, "Ownership").
//!
//! Connections reference populations by handle rather than by raw pointer,
//! in the newtype-ID style used throughout the workspace (see
//! `shnn-storage::ids`).

use std::fmt;

/// Handle to a neuron population, issued by [`crate::Snn::add_population`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NeuronHandle(u32);

impl NeuronHandle {
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw index this handle wraps.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NeuronHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Handle to a synapse population (connection), issued by
/// [`crate::Snn::connect_to`] and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SynapseHandle(u32);

impl SynapseHandle {
    pub(crate) const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw index this handle wraps.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SynapseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_prefix_and_index() {
        assert_eq!(NeuronHandle::new(3).to_string(), "N3");
        assert_eq!(SynapseHandle::new(7).to_string(), "S7");
    }
}
