//! Neuron population: per-step evaluation, spike ring-buffer, and the
//! plastic history bitmap (spec §4.4, component C4).

use std::any::Any;

use crate::kind::{NeuronKind, PopulationNeuronUpdate, StatefulNeuronUpdate, StatelessNeuronUpdate};
use crate::rng::{Seed, TickRng};

/// Object-safe evaluation shape behind a [`NeuronPopulation`]. One virtual
/// call per tick per population (spec §9: acceptable at population
/// granularity); the loop inside each impl is monomorphized over the
/// concrete kind, so per-neuron dispatch costs nothing extra.
pub(crate) trait NeuronEval: Any {
    fn size(&self) -> usize;
    fn eval(&mut self, dt: f32, rng: &mut TickRng, out_spikes: &mut Vec<i32>);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn states_as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn states_as_any_mut(&mut self) -> Option<&mut dyn Any> {
        None
    }
    /// Snapshots the state array by value, boxed behind `Any`. Needed only
    /// when a connection's source and destination population are the same
    /// (see `Snn::step`'s self-connection branch): reading and writing the
    /// same `Vec<State>` during one `deliver` call would otherwise alias a
    /// shared borrow against a mutable one.
    fn clone_states_boxed(&self) -> Option<Box<dyn Any>> {
        None
    }
}

struct StatelessEval<K: StatelessNeuronUpdate> {
    kind: K,
    size: usize,
}

impl<K: StatelessNeuronUpdate + 'static> NeuronEval for StatelessEval<K> {
    fn size(&self) -> usize {
        self.size
    }

    fn eval(&mut self, dt: f32, rng: &mut TickRng, out_spikes: &mut Vec<i32>) {
        for i in 0..self.size {
            if self.kind.update(dt, rng) {
                out_spikes.push(i as i32);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct StatefulEval<K: StatefulNeuronUpdate>
where
    K::State: 'static,
{
    kind: K,
    states: Vec<K::State>,
}

impl<K: StatefulNeuronUpdate + 'static> NeuronEval for StatefulEval<K>
where
    K::State: 'static,
{
    fn size(&self) -> usize {
        self.states.len()
    }

    fn eval(&mut self, dt: f32, rng: &mut TickRng, out_spikes: &mut Vec<i32>) {
        for (i, state) in self.states.iter_mut().enumerate() {
            if self.kind.update(state, dt, rng) {
                out_spikes.push(i as i32);
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn states_as_any(&self) -> Option<&dyn Any> {
        Some(&self.states)
    }

    fn states_as_any_mut(&mut self) -> Option<&mut dyn Any> {
        Some(&mut self.states)
    }

    fn clone_states_boxed(&self) -> Option<Box<dyn Any>> {
        Some(Box::new(self.states.clone()))
    }
}

struct PopulationEval<K: PopulationNeuronUpdate> {
    kind: K,
    size: usize,
}

impl<K: PopulationNeuronUpdate + 'static> NeuronEval for PopulationEval<K> {
    fn size(&self) -> usize {
        self.size
    }

    fn eval(&mut self, dt: f32, rng: &mut TickRng, out_spikes: &mut Vec<i32>) {
        let before = out_spikes.len();
        self.kind.update(dt, rng, out_spikes);
        debug_assert!(out_spikes[before..].iter().all(|&i| i >= 0 && (i as usize) < self.size));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A homogeneous array of neurons of one kind (spec §3, "Population
/// (neuron)"). Owns the spike ring-buffer and, once plasticity is enabled,
/// the per-neuron history bitmap.
pub struct NeuronPopulation {
    pub(crate) eval: Box<dyn NeuronEval>,
    spikes: Vec<i32>,
    spike_counts: Vec<usize>,
    history: Option<Vec<u64>>,
    plastic: bool,
}

impl NeuronPopulation {
    /// Builds a population of a stateless per-neuron kind.
    pub fn stateless<K: StatelessNeuronUpdate + 'static>(kind: K, size: usize) -> Self {
        Self::from_eval(Box::new(StatelessEval { kind, size }))
    }

    /// Builds a population of a stateful per-neuron kind, running the
    /// kind's init (per-neuron or per-population) if it overrides one.
    pub fn stateful<K: StatefulNeuronUpdate + 'static>(kind: K, size: usize, seed: &Seed) -> Self
    where
        K::State: 'static,
    {
        let mut states = vec![K::State::default(); size];
        let mut rng = TickRng::from_seed(&seed.stream(0));
        for (i, state) in states.iter_mut().enumerate() {
            kind.init_neuron(state, i as i32, &mut rng);
        }
        kind.init_population(&mut states, &mut rng);
        Self::from_eval(Box::new(StatefulEval { kind, states }))
    }

    /// Builds a population of a per-population kind, which owns no
    /// separate state array (its own fields serve that role).
    pub fn per_population<K: PopulationNeuronUpdate + 'static>(kind: K, size: usize) -> Self {
        Self::from_eval(Box::new(PopulationEval { kind, size }))
    }

    fn from_eval(eval: Box<dyn NeuronEval>) -> Self {
        Self {
            eval,
            spikes: Vec::new(),
            spike_counts: Vec::new(),
            history: None,
            plastic: false,
        }
    }

    /// Number of neurons in this population.
    pub fn size(&self) -> usize {
        self.eval.size()
    }

    /// Enables the plastic history bitmap. Idempotent.
    pub fn enable_plastic(&mut self) {
        if self.history.is_none() {
            self.history = Some(vec![0u64; self.size()]);
        }
        self.plastic = true;
    }

    /// Whether the plastic history bitmap is enabled.
    pub fn is_plastic(&self) -> bool {
        self.plastic
    }

    /// The per-neuron history bitmap, if plasticity is enabled.
    pub fn history(&self) -> Option<&[u64]> {
        self.history.as_deref()
    }

    /// Evaluates one tick: rotates the ring buffer, runs the kind's
    /// update, then shifts+ORs the history bitmap if plasticity is
    /// enabled (spec §4.4, operation 2).
    pub fn update(&mut self, max_delay: usize, dt: f32, rng: &mut TickRng) {
        if self.spike_counts.len() == max_delay {
            let drop = self.spike_counts[0];
            self.spikes.drain(0..drop);
            self.spike_counts.drain(0..1);
        }

        let previous_len = self.spikes.len();
        self.eval.eval(dt, rng, &mut self.spikes);
        let new_count = self.spikes.len() - previous_len;

        if self.plastic {
            if let Some(history) = &mut self.history {
                for word in history.iter_mut() {
                    *word <<= 1;
                }
                for &i in &self.spikes[previous_len..] {
                    history[i as usize] |= 1;
                }
            }
        }

        self.spike_counts.push(new_count);
        debug_assert_eq!(self.spike_counts.iter().sum::<usize>(), self.spikes.len());
        debug_assert!(self.spike_counts.len() <= max_delay);
    }

    /// The Int32 slice of indices that fired `age` ticks ago (`age = 0` is
    /// the most recent tick).
    pub fn spikes(&self, age: usize) -> &[i32] {
        debug_assert!(age < self.spike_counts.len());
        let total = self.spikes.len();
        let end = total - self.spike_counts.iter().rev().take(age).sum::<usize>();
        let start = total - self.spike_counts.iter().rev().take(age + 1).sum::<usize>();
        &self.spikes[start..end]
    }

    /// Number of ticks currently held in the ring buffer.
    pub fn ring_depth(&self) -> usize {
        self.spike_counts.len()
    }

    /// Downcasts to the per-neuron state slice of a [`StatefulNeuronUpdate`]
    /// kind `K`, or `None` if this population was built with a different
    /// shape.
    pub fn states<K: StatefulNeuronUpdate + 'static>(&self) -> Option<&[K::State]>
    where
        K::State: 'static,
    {
        self.eval
            .states_as_any()
            .and_then(|any| any.downcast_ref::<Vec<K::State>>())
            .map(|v| v.as_slice())
    }

    pub(crate) fn states_as_any(&self) -> Option<&dyn Any> {
        self.eval.states_as_any()
    }

    pub(crate) fn states_as_any_mut(&mut self) -> Option<&mut dyn Any> {
        self.eval.states_as_any_mut()
    }

    pub(crate) fn clone_states_boxed(&self) -> Option<Box<dyn Any>> {
        self.eval.clone_states_boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::NeuronKind;

    #[derive(Default, Clone, Copy)]
    struct Toggle {
        should_spike: bool,
    }

    struct Flip;
    impl NeuronKind for Flip {
        type State = Toggle;
    }
    impl StatefulNeuronUpdate for Flip {
        fn update(&self, state: &mut Toggle, _dt: f32, _rng: &mut TickRng) -> bool {
            let fired = state.should_spike;
            state.should_spike = !fired;
            fired
        }
    }

    fn rng() -> TickRng {
        TickRng::from_seed(&Seed::new(&[0]))
    }

    #[test]
    fn spikes_zero_returns_most_recent_tick_only() {
        let mut pop = NeuronPopulation::stateful(Flip, 4, &Seed::new(&[1]));
        let mut rng = rng();
        pop.update(8, 1.0, &mut rng);
        assert_eq!(pop.spikes(0).len(), 0);
        pop.update(8, 1.0, &mut rng);
        assert_eq!(pop.spikes(0).len(), 4);
        assert_eq!(pop.spikes(1).len(), 0);
    }

    #[test]
    fn ring_buffer_sum_matches_invariant() {
        let mut pop = NeuronPopulation::stateless(
            {
                struct Never;
                impl NeuronKind for Never {
                    type State = ();
                }
                impl StatelessNeuronUpdate for Never {
                    fn update(&self, _dt: f32, _rng: &mut TickRng) -> bool {
                        false
                    }
                }
                Never
            },
            10,
        );
        let mut rng = rng();
        for _ in 0..20 {
            pop.update(5, 1.0, &mut rng);
        }
        assert!(pop.ring_depth() <= 5);
    }

    #[test]
    fn plastic_history_records_most_recent_tick_in_bit_zero() {
        let mut pop = NeuronPopulation::stateful(Flip, 2, &Seed::new(&[2]));
        pop.enable_plastic();
        let mut rng = rng();
        pop.update(64, 1.0, &mut rng);
        pop.update(64, 1.0, &mut rng);
        let history = pop.history().unwrap();
        for &word in history {
            assert_eq!(word & 1, 1);
        }
    }

    /// spec.md P3: `(history[i] >> b) & 1` must equal 1 iff neuron `i`
    /// fired exactly `b` ticks ago, for every `0 <= b < 64`. Exercised
    /// against a neuron whose fire schedule (every 3rd tick) is tracked
    /// independently and compared bit-by-bit after 64 ticks.
    #[derive(Default, Clone, Copy)]
    struct EveryThird {
        tick: u32,
    }

    struct Periodic {
        period: u32,
    }
    impl NeuronKind for Periodic {
        type State = EveryThird;
    }
    impl StatefulNeuronUpdate for Periodic {
        fn update(&self, state: &mut EveryThird, _dt: f32, _rng: &mut TickRng) -> bool {
            let fired = state.tick % self.period == 0;
            state.tick += 1;
            fired
        }
    }

    #[test]
    fn history_bitmap_matches_ground_truth_fire_log_across_full_window() {
        let mut pop = NeuronPopulation::stateful(Periodic { period: 3 }, 1, &Seed::new(&[3]));
        pop.enable_plastic();
        let mut rng = rng();
        let mut fired_at = Vec::new();
        for t in 0..64 {
            pop.update(64, 1.0, &mut rng);
            fired_at.push(t % 3 == 0);
        }
        let history = pop.history().unwrap()[0];
        for b in 0..64 {
            let tick = 63 - b;
            let expected = fired_at[tick as usize];
            let actual = (history >> b) & 1 == 1;
            assert_eq!(actual, expected, "bit {b} (tick {tick}) mismatched");
        }
    }

    use proptest::prelude::*;

    proptest! {
        // spec.md P2: sum(spike_counts) == total stored spikes at all
        // times, for any retained-window depth and tick count. `Flip`
        // alternates its whole population in lockstep (every neuron fires
        // on odd absolute ticks, none on even ticks), so the expected
        // per-tick and windowed totals are computable independently of the
        // ring buffer under test.
        #[test]
        fn ring_buffer_sum_invariant_holds_for_any_window_and_tick_count(
            max_delay in 1usize..20,
            ticks in 1usize..50,
            size in 1usize..30,
        ) {
            let mut pop = NeuronPopulation::stateful(Flip, size, &Seed::new(&[7]));
            let mut rng = rng();
            for _ in 0..ticks {
                pop.update(max_delay, 1.0, &mut rng);
            }
            let depth = pop.ring_depth();
            prop_assert!(depth <= max_delay);

            let window_start = ticks - depth;
            let expected: usize = (window_start..ticks).filter(|t| t % 2 == 1).count() * size;
            let actual: usize = (0..depth).map(|age| pop.spikes(age).len()).sum();
            prop_assert_eq!(actual, expected);

            for age in 0..depth {
                let tick = ticks - 1 - age;
                let expected_count = if tick % 2 == 1 { size } else { 0 };
                prop_assert_eq!(pop.spikes(age).len(), expected_count);
            }
        }
    }

    proptest! {
        // spec.md P3: `(history[i] >> b) & 1` must equal 1 iff neuron `i`
        // fired exactly `b` ticks ago, generalized across random periods
        // and random window lengths up to the full 64-bit history.
        #[test]
        fn history_bitmap_matches_ground_truth_for_any_period_and_window(
            period in 2u32..11,
            ticks in 1u32..65,
        ) {
            let mut pop = NeuronPopulation::stateful(Periodic { period }, 1, &Seed::new(&[11]));
            pop.enable_plastic();
            let mut rng = rng();
            let mut fired_at = Vec::new();
            for t in 0..ticks {
                pop.update(64, 1.0, &mut rng);
                fired_at.push(t % period == 0);
            }
            let history = pop.history().unwrap()[0];
            for b in 0..ticks {
                let tick = ticks - 1 - b;
                let expected = fired_at[tick as usize];
                let actual = (history >> b) & 1 == 1;
                prop_assert_eq!(actual, expected, "bit {} (tick {}) mismatched", b, tick);
            }
        }
    }
}
