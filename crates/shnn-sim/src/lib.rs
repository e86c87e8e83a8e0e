//! Generic time-discrete spiking neural network simulation kernel
//!
//! This crate steps a time-discrete event simulation in which neurons fire
//! binary spikes, spikes propagate through sparsely-connected synapses with
//! configurable axonal delay, and stateful synapses undergo plasticity
//! updates driven by pre-/post-synaptic spike coincidences. Neuron and
//! synapse dynamics are supplied by the caller as small callback *kinds*
//! (see [`kind`]); this crate owns population storage, connectivity
//! generation, spike history, delay buffering, and the fixed per-tick
//! evaluation order.

#![warn(clippy::all)]

pub mod csr;
pub mod driver;
pub mod error;
pub mod handle;
pub mod kind;
pub mod population;
pub mod rng;
#[cfg(feature = "std")]
pub mod sink;
pub mod topology;

pub use driver::{SimConfig, Snn};
pub use error::{Result, SimError};
pub use handle::{NeuronHandle, SynapseHandle};
pub use kind::{
    DeliverFromTo, DeliverTo, NeuronKind, PlasticSynapse, PopulationNeuronUpdate, StatefulNeuronUpdate,
    StatelessNeuronUpdate, SynapseKind,
};
pub use population::{NeuronPopulation, SynapsePopulation};
pub use rng::{binomial, canonical_f32, exponential, uniform_real, NormalState, Seed, TickRng};
#[cfg(feature = "std")]
pub use sink::{JsonSink, SpikeSink};
pub use topology::{AdjacencyList, FixedProbability, Topology};

/// Crate version for compatibility checking between a saved configuration
/// and the engine that replays it.
pub const KERNEL_VERSION: u32 = 1;
