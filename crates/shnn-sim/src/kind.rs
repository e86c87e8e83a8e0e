//! Callback-dispatch contracts a user implements to describe a neuron or
//! synapse kind (spec §4.7, component C7).
//!
//! Each kind picks exactly one update/deliver shape by implementing the
//! matching trait; the population/synapse-population constructors are
//! generic over that trait, so the shape is resolved and monomorphized at
//! compile time rather than inspected at runtime (spec §9, "template/concept
//! heavy dispatch"). Init shapes remain separate, default-no-op methods
//! rather than a type-level mutual-exclusion check: Rust has no stable
//! equivalent of the original's `concepts.h` static-assert diagnostics
//! without specialization, so exclusivity of the init shape a kind
//! implements is documented, not enforced by the type system.

use crate::rng::TickRng;

/// A neuron kind's per-neuron state record and shared metadata. `State`
/// is `()` for stateless kinds.
pub trait NeuronKind {
    /// Per-neuron state record, `()` for stateless kinds.
    type State: Default + Clone;
}

/// Stateless per-neuron update: `fn update(&self, dt, &mut rng) -> bool`.
/// Called once per neuron index; returns whether that neuron fires.
pub trait StatelessNeuronUpdate: NeuronKind<State = ()> {
    /// Evaluates one neuron for this tick, returning whether it fires.
    fn update(&self, dt: f32, rng: &mut TickRng) -> bool;
}

/// Stateful per-neuron update: operates on the neuron's own state record.
pub trait StatefulNeuronUpdate: NeuronKind {
    /// Evaluates one neuron for this tick, returning whether it fires.
    fn update(&self, state: &mut Self::State, dt: f32, rng: &mut TickRng) -> bool;

    /// Per-neuron init, called once per index at construction with
    /// `(state, id, rng)`. No-op unless overridden.
    fn init_neuron(&self, _state: &mut Self::State, _id: i32, _rng: &mut TickRng) {}

    /// Per-population init, called once at construction with
    /// `(&mut states, rng)`. No-op unless overridden.
    fn init_population(&self, _states: &mut [Self::State], _rng: &mut TickRng) {}
}

/// Per-population update: appends firing indices directly instead of
/// being polled neuron-by-neuron. `&mut self` lets the kind hold its own
/// internal schedule (e.g. a cyclic input program).
pub trait PopulationNeuronUpdate: NeuronKind {
    /// Evaluates the whole population for this tick, appending the
    /// indices of neurons that fire to `out_spikes`.
    fn update(&mut self, dt: f32, rng: &mut TickRng, out_spikes: &mut Vec<i32>);
}

/// A synapse kind's per-edge state record. `State` is `()` for stateless
/// kinds (see [`crate::csr::Csr`]'s empty-payload specialization).
pub trait SynapseKind {
    /// Per-edge state record, `()` for stateless kinds.
    type State: Default + Clone;

    /// Per-synapse init, called once per edge at construction with
    /// `(&mut syn_state, src, dst, rng)`. No-op unless overridden.
    fn init_synapse(&self, _state: &mut Self::State, _src: i32, _dst: i32, _rng: &mut TickRng) {}
}

/// `deliver(&self, &syn_state, &mut dst_state)` (stateless kinds receive
/// `&()` and simply ignore it).
pub trait DeliverTo<DstState>: SynapseKind {
    /// Applies this synapse's effect to the destination neuron's state.
    fn deliver(&self, syn: &Self::State, dst: &mut DstState);
}

/// `deliver(&self, &syn_state, &src_state, &mut dst_state)`. Requires the
/// source population to be stateful, matching the original's
/// `StatefulNeuron<SrcNeur>` bound on this shape.
pub trait DeliverFromTo<SrcState, DstState>: SynapseKind {
    /// Applies this synapse's effect, additionally reading the source
    /// neuron's state.
    fn deliver(&self, syn: &Self::State, src: &SrcState, dst: &mut DstState);
}

/// The plasticity pair for stateful synapse kinds. `update` records a
/// pre/post coincidence; `skip` advances the synapse by `n` quiet ticks in
/// closed form (spec §4.5/Glossary, "Catch-up").
pub trait PlasticSynapse: SynapseKind {
    /// Records a pre/post coincidence observed `dt` apart.
    fn update(&self, syn: &mut Self::State, dt: f32, pre: bool, post: bool);

    /// Advances the synapse by `n` quiet ticks (no pre or post events)
    /// in closed form.
    fn skip(&self, syn: &mut Self::State, dt: f32, n: u32);
}
