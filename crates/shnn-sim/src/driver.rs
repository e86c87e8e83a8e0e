//! Step driver: owns populations and connections and schedules one tick
//! (spec §4.6, component C6).

use std::time::Duration;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{Result, SimError};
use crate::handle::{NeuronHandle, SynapseHandle};
use crate::kind::{
    DeliverFromTo, DeliverTo, PlasticSynapse, PopulationNeuronUpdate, StatefulNeuronUpdate, StatelessNeuronUpdate,
    SynapseKind,
};
use crate::population::{NeuronPopulation, SynapsePopulation};
use crate::rng::{Seed, TickRng};
use crate::topology::Topology;

/// The one configuration struct accepted by [`Snn::new`].
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Simulated seconds per tick.
    pub dt: f32,
    /// Axonal delays and the plastic-history window are expressed in
    /// ticks; `max_delay` is given as a duration and rounded to ticks.
    pub max_delay: Duration,
    /// Seed fed to [`Seed::from_u64`] to build the master 128-bit seed.
    pub seed: u64,
}

impl SimConfig {
    /// Validates `dt > 0` and `max_delay >= dt` (spec §6, "max_delay is
    /// specified as a duration ... the engine converts to ticks by
    /// rounding").
    pub fn validate(&self) -> Result<()> {
        if !(self.dt > 0.0) {
            return Err(SimError::invalid_configuration(format!(
                "dt must be positive, got {}",
                self.dt
            )));
        }
        if self.max_delay.as_secs_f32() < self.dt {
            return Err(SimError::invalid_configuration(format!(
                "max_delay ({:?}) must be at least one tick (dt={})",
                self.max_delay, self.dt
            )));
        }
        Ok(())
    }

    fn max_delay_ticks(&self) -> i64 {
        (self.max_delay.as_secs_f32() / self.dt).round() as i64
    }
}

/// Kahan-compensated running sum of simulated time (spec §9, "Kahan
/// accumulator for simulated time").
#[derive(Debug, Clone, Copy, Default)]
struct KahanAccumulator {
    sum: f32,
    compensation: f32,
}

impl KahanAccumulator {
    fn add(&mut self, x: f32) {
        let y = x - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
        if self.sum >= 1.0 {
            self.sum -= 1.0;
        }
    }

    fn reset(&mut self) {
        self.sum = 0.0;
        self.compensation = 0.0;
    }
}

struct Connection {
    from: NeuronHandle,
    synapse: SynapseHandle,
    to: NeuronHandle,
    delay: i64,
}

/// Owns neuron populations, synapse populations, and the connections
/// between them; schedules `step()` (spec §3, "Step driver (SNN)").
pub struct Snn {
    dt: f32,
    max_delay: i64,
    seed: Seed,
    time: i64,
    accumulator: KahanAccumulator,
    populations: Vec<NeuronPopulation>,
    synapses: Vec<SynapsePopulation>,
    connections: Vec<Connection>,
    has_plastic: bool,
}

impl Snn {
    /// The sole entry point: validates `config` and returns an empty
    /// simulation instance.
    pub fn new(config: SimConfig) -> Result<Self> {
        config.validate()?;
        log::debug!(
            "constructing simulation: dt={} max_delay={:?}",
            config.dt,
            config.max_delay
        );
        Ok(Self {
            dt: config.dt,
            max_delay: config.max_delay_ticks(),
            seed: Seed::from_u64(config.seed),
            time: 0,
            accumulator: KahanAccumulator::default(),
            populations: Vec::new(),
            synapses: Vec::new(),
            connections: Vec::new(),
            has_plastic: false,
        })
    }

    /// The current tick counter.
    pub fn time(&self) -> i64 {
        self.time
    }

    /// The configured timestep.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    /// The configured delay window, in ticks.
    pub fn max_delay(&self) -> i64 {
        self.max_delay
    }

    /// Adds a stateless per-neuron population.
    pub fn add_population_stateless<K: StatelessNeuronUpdate + 'static>(
        &mut self,
        kind: K,
        size: usize,
    ) -> NeuronHandle {
        log::trace!("population {} constructed: stateless, size={}", self.populations.len(), size);
        self.push_population(NeuronPopulation::stateless(kind, size))
    }

    /// Adds a stateful per-neuron population.
    pub fn add_population_stateful<K: StatefulNeuronUpdate + 'static>(
        &mut self,
        kind: K,
        size: usize,
    ) -> NeuronHandle
    where
        K::State: 'static,
    {
        let stream = self.seed.stream(self.populations.len() as u64);
        log::trace!("population {} constructed: stateful, size={}", self.populations.len(), size);
        self.push_population(NeuronPopulation::stateful(kind, size, &stream))
    }

    /// Adds a per-population-update population.
    pub fn add_population_per_population<K: PopulationNeuronUpdate + 'static>(
        &mut self,
        kind: K,
        size: usize,
    ) -> NeuronHandle {
        log::trace!("population {} constructed: per-population, size={}", self.populations.len(), size);
        self.push_population(NeuronPopulation::per_population(kind, size))
    }

    fn push_population(&mut self, population: NeuronPopulation) -> NeuronHandle {
        let handle = NeuronHandle::new(self.populations.len() as u32);
        self.populations.push(population);
        handle
    }

    /// Connects `from -> to` with a non-plastic `deliver(&syn, &mut dst)`
    /// synapse kind over `topology`.
    pub fn connect_to<Syn, DstState>(
        &mut self,
        from: NeuronHandle,
        to: NeuronHandle,
        kind: Syn,
        topology: impl Topology,
        delay: Duration,
    ) -> Result<SynapseHandle>
    where
        Syn: DeliverTo<DstState> + 'static,
        Syn::State: 'static,
        DstState: 'static,
    {
        let delay_ticks = self.ticks(delay);
        let seed = self.synapse_seed();
        let synapse = SynapsePopulation::connect_to(
            kind,
            topology,
            self.size_of(from)?,
            self.size_of(to)?,
            delay_ticks,
            self.max_delay,
            &seed,
        )?;
        self.push_connection(from, to, synapse, delay_ticks, false)
    }

    /// Connects `from -> to` with a plastic `deliver(&syn, &mut dst)`
    /// synapse kind.
    pub fn connect_to_plastic<Syn, DstState>(
        &mut self,
        from: NeuronHandle,
        to: NeuronHandle,
        kind: Syn,
        topology: impl Topology,
        delay: Duration,
    ) -> Result<SynapseHandle>
    where
        Syn: DeliverTo<DstState> + PlasticSynapse + 'static,
        Syn::State: 'static,
        DstState: 'static,
    {
        let delay_ticks = self.ticks(delay);
        let seed = self.synapse_seed();
        let synapse = SynapsePopulation::connect_to_plastic(
            kind,
            topology,
            self.size_of(from)?,
            self.size_of(to)?,
            delay_ticks,
            self.max_delay,
            &seed,
        )?;
        self.populations[to.raw() as usize].enable_plastic();
        self.push_connection(from, to, synapse, delay_ticks, true)
    }

    /// Connects `from -> to` with a non-plastic `deliver(&syn, &src, &mut
    /// dst)` synapse kind. `from` must be a stateful population.
    pub fn connect_from_to<Syn, SrcState, DstState>(
        &mut self,
        from: NeuronHandle,
        to: NeuronHandle,
        kind: Syn,
        topology: impl Topology,
        delay: Duration,
    ) -> Result<SynapseHandle>
    where
        Syn: DeliverFromTo<SrcState, DstState> + 'static,
        Syn::State: 'static,
        SrcState: 'static,
        DstState: 'static,
    {
        let delay_ticks = self.ticks(delay);
        let seed = self.synapse_seed();
        let synapse = SynapsePopulation::connect_from_to(
            kind,
            topology,
            self.size_of(from)?,
            self.size_of(to)?,
            delay_ticks,
            self.max_delay,
            &seed,
        )?;
        self.push_connection(from, to, synapse, delay_ticks, false)
    }

    /// Connects `from -> to` with a plastic `deliver(&syn, &src, &mut
    /// dst)` synapse kind. `from` must be a stateful population.
    pub fn connect_from_to_plastic<Syn, SrcState, DstState>(
        &mut self,
        from: NeuronHandle,
        to: NeuronHandle,
        kind: Syn,
        topology: impl Topology,
        delay: Duration,
    ) -> Result<SynapseHandle>
    where
        Syn: DeliverFromTo<SrcState, DstState> + PlasticSynapse + 'static,
        Syn::State: 'static,
        SrcState: 'static,
        DstState: 'static,
    {
        let delay_ticks = self.ticks(delay);
        let seed = self.synapse_seed();
        let synapse = SynapsePopulation::connect_from_to_plastic(
            kind,
            topology,
            self.size_of(from)?,
            self.size_of(to)?,
            delay_ticks,
            self.max_delay,
            &seed,
        )?;
        self.populations[to.raw() as usize].enable_plastic();
        self.push_connection(from, to, synapse, delay_ticks, true)
    }

    fn synapse_seed(&mut self) -> Seed {
        self.seed.stream(0x5000_0000 + self.synapses.len() as u64)
    }

    fn size_of(&self, handle: NeuronHandle) -> Result<i32> {
        self.populations
            .get(handle.raw() as usize)
            .map(|p| p.size() as i32)
            .ok_or_else(|| SimError::unknown_handle("neuron population", handle.raw() as usize))
    }

    fn ticks(&self, delay: Duration) -> i64 {
        (delay.as_secs_f32() / self.dt).round() as i64
    }

    fn push_connection(
        &mut self,
        from: NeuronHandle,
        to: NeuronHandle,
        synapse: SynapsePopulation,
        delay: i64,
        plastic: bool,
    ) -> Result<SynapseHandle> {
        let handle = SynapseHandle::new(self.synapses.len() as u32);
        log::trace!("connection {} constructed: {} -> {}, delay={}", handle, from, to, delay);
        self.has_plastic |= plastic;
        self.synapses.push(synapse);
        self.connections.push(Connection { from, synapse: handle, to, delay });
        Ok(handle)
    }

    /// Executes one tick (spec §4.6).
    pub fn step(&mut self) {
        let tick_seed = self.seed.advance();
        self.accumulator.add(self.dt);

        // Populations are independent during evaluation (spikes from this
        // tick aren't read until the delivery phase below), so the
        // `parallel` feature fans this loop out across them. Each
        // population draws from its own `tick_seed.stream(index)`
        // sub-stream rather than one rng threaded through every
        // population in turn, so the per-population spike trains are the
        // same bit-for-bit whether or not `parallel` is enabled (spec §5,
        // parallelism condition (c), applied at population rather than
        // per-neuron granularity to match this crate's population-scope
        // dispatch cost, see C7).
        let max_delay = self.max_delay as usize;
        let dt = self.dt;
        #[cfg(feature = "parallel")]
        self.populations.par_iter_mut().enumerate().for_each(|(i, population)| {
            let mut rng = TickRng::from_seed(&tick_seed.stream(i as u64));
            population.update(max_delay, dt, &mut rng);
        });
        #[cfg(not(feature = "parallel"))]
        for (i, population) in self.populations.iter_mut().enumerate() {
            let mut rng = TickRng::from_seed(&tick_seed.stream(i as u64));
            population.update(max_delay, dt, &mut rng);
        }

        if self.has_plastic && self.time % 64 == 0 {
            log::trace!("plastic-only sweep at tick {}", self.time);
            for connection in &self.connections {
                if !self.synapses[connection.synapse.raw() as usize].eval.is_plastic() {
                    continue;
                }
                let src_size = self.populations[connection.from.raw() as usize].size();
                let dst_history = self.populations[connection.to.raw() as usize]
                    .history()
                    .map(|h| h.to_vec())
                    .unwrap_or_default();
                self.synapses[connection.synapse.raw() as usize].eval.plastic_sweep(
                    self.time,
                    self.dt,
                    src_size,
                    &dst_history,
                );
            }
        }

        for connection in &self.connections {
            if connection.delay - 1 > self.time {
                continue;
            }
            let age = (connection.delay - 1) as usize;
            let from_idx = connection.from.raw() as usize;
            let to_idx = connection.to.raw() as usize;

            let spikes = self.populations[from_idx].spikes(age).to_vec();
            let dst_history = self.populations[to_idx]
                .history()
                .map(|h| h.to_vec())
                .unwrap_or_default();

            // A self-connection (graph-algorithm populations like SSSP route
            // edges between vertices of the same population) needs the
            // source state read *and* the destination state written from the
            // one underlying array; snapshot the source side by value so the
            // borrow checker never has to alias a shared and a mutable
            // reference to it (spec §5, "the source state is read-only").
            let snapshot;
            let (src_states, dst_states) = if from_idx == to_idx {
                snapshot = self.populations[from_idx].clone_states_boxed();
                let dst_states = self.populations[to_idx]
                    .states_as_any_mut()
                    .expect("destination population must be stateful to receive deliveries");
                (snapshot.as_deref(), dst_states)
            } else if from_idx < to_idx {
                let (left, right) = self.populations.split_at_mut(to_idx);
                let dst_states = right[0]
                    .states_as_any_mut()
                    .expect("destination population must be stateful to receive deliveries");
                (left[from_idx].states_as_any(), dst_states)
            } else {
                let (left, right) = self.populations.split_at_mut(from_idx);
                let dst_states = left[to_idx]
                    .states_as_any_mut()
                    .expect("destination population must be stateful to receive deliveries");
                (right[0].states_as_any(), dst_states)
            };

            self.synapses[connection.synapse.raw() as usize].eval.deliver(
                self.time,
                self.dt,
                &spikes,
                src_states,
                dst_states,
                &dst_history,
            );
        }

        self.time += 1;
    }

    /// Resets the Kahan-compensated simulated-time accumulator to zero
    /// (spec §9, "exposes `reset()` for the yearly-rollover pattern").
    pub fn reset_accumulator(&mut self) {
        self.accumulator.reset();
    }

    /// The current value of the simulated-time accumulator.
    pub fn accumulated_time(&self) -> f32 {
        self.accumulator.sum
    }

    /// The Int32 slice of indices that fired `age` ticks ago in the
    /// population named by `handle`.
    pub fn spikes(&self, handle: NeuronHandle, age: usize) -> &[i32] {
        self.populations[handle.raw() as usize].spikes(age)
    }

    /// Downcasts to the per-neuron state slice of the population named by
    /// `handle`, or `None` if its kind does not match `K`.
    pub fn neuron_states<K: StatefulNeuronUpdate + 'static>(&self, handle: NeuronHandle) -> Option<&[K::State]>
    where
        K::State: 'static,
    {
        self.populations[handle.raw() as usize].states::<K>()
    }

    /// The number of neurons in the population named by `handle`.
    pub fn population_size(&self, handle: NeuronHandle) -> usize {
        self.populations[handle.raw() as usize].size()
    }

    /// Downcasts to the per-edge state slice of the connection named by
    /// `handle`, in CSR order, or `None` if `Syn` doesn't match the kind it
    /// was built with or the kind has a zero-sized payload.
    pub fn synapse_states<Syn: SynapseKind + 'static>(&self, handle: SynapseHandle) -> Option<&[Syn::State]>
    where
        Syn::State: 'static,
    {
        self.synapses[handle.raw() as usize]
            .eval
            .edge_states_as_any()
            .and_then(|any| any.downcast_ref::<Vec<Syn::State>>())
            .map(|v| v.as_slice())
    }
}
