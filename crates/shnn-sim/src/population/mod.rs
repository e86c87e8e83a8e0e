//! Neuron and synapse populations (spec §4.4 and §4.5, components C4/C5).

mod neuron;
mod synapse;

pub use neuron::NeuronPopulation;
pub use synapse::SynapsePopulation;
