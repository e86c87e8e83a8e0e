//! Synapse population: delayed delivery and the plasticity catch-up
//! bit-scan (spec §4.5, component C5).

use std::any::Any;
use std::marker::PhantomData;

use crate::csr::Csr;
use crate::error::{Result, SimError};
use crate::kind::{DeliverFromTo, DeliverTo, PlasticSynapse, SynapseKind};
use crate::rng::{Seed, TickRng};
use crate::topology::Topology;

const DELIVERED_FLAG: u64 = 1 << 63;
const AGE_MASK: u64 = DELIVERED_FLAG - 1;

fn decode_age(word: u64) -> (bool, i64) {
    (word & DELIVERED_FLAG != 0, (word & AGE_MASK) as i64)
}

fn bit_at(word: u64, b: u32) -> bool {
    debug_assert!(b < 64);
    (word >> b) & 1 != 0
}

/// One step of a plastic catch-up replay, folded into a single closure
/// call so the call site only needs one mutable borrow of the synapse's
/// state record (a `skip`/`update` pair of closures would each need their
/// own mutable borrow of that same state, which the borrow checker can't
/// grant).
pub(crate) enum CatchUpStep {
    /// `K.update(&mut syn, dt, pre, post)`.
    Update {
        /// Whether this call represents the original pre-event.
        pre: bool,
        /// The post-synaptic bit observed at this step.
        post: bool,
    },
    /// `K.skip(&mut syn, dt, n)`.
    Skip {
        /// Number of quiet ticks to advance in closed form.
        n: u32,
    },
}

/// Replays the quiet period `[age, time]` a plastic synapse missed,
/// visiting set bits of `dst_history` from oldest to newest (including the
/// current tick, bit 0) and invoking `step` in the same order a
/// tick-at-a-time reference would (spec P5). `pre` marks whether the
/// previous visit was a delivery, in which case the very tick at `age` is
/// consumed by an explicit `Update { pre: true, .. }` rather than folded
/// into the scan.
fn catch_up(pre: bool, age: i64, time: i64, dst_history: u64, mut step: impl FnMut(CatchUpStep)) {
    if time < age {
        return;
    }
    if pre {
        let post = bit_at(dst_history, (time - age) as u32);
        step(CatchUpStep::Update { pre: true, post });
    }

    let window_start = age + if pre { 1 } else { 0 };
    let b_max = time - window_start;
    if b_max < 0 {
        return;
    }
    debug_assert!(b_max < 64, "plastic sweep must run at least every 64 ticks");

    let mut prev_b = b_max + 1;
    for b in (0..=b_max).rev() {
        if bit_at(dst_history, b as u32) {
            let gap = (prev_b - b - 1) as u32;
            if gap > 0 {
                step(CatchUpStep::Skip { n: gap });
            }
            step(CatchUpStep::Update { pre: false, post: true });
            prev_b = b;
        }
    }
    let trailing = prev_b as u32;
    if trailing > 0 {
        step(CatchUpStep::Skip { n: trailing });
    }
}

pub(crate) trait SynapseEval: Any {
    fn delay(&self) -> i64;
    fn is_plastic(&self) -> bool;
    fn deliver(
        &mut self,
        time: i64,
        dt: f32,
        spikes: &[i32],
        src_states: Option<&dyn Any>,
        dst_states: &mut dyn Any,
        dst_history: &[u64],
    );
    fn plastic_sweep(&mut self, time: i64, dt: f32, src_size: usize, dst_history: &[u64]);
    /// The full per-edge payload, type-erased, for inspection (e.g. a
    /// plastic kind's settled weights). `None` for a zero-sized payload.
    fn edge_states_as_any(&self) -> Option<&dyn Any>;
}

struct DeliverToEval<Syn: DeliverTo<DstState>, DstState> {
    syn: Syn,
    csr: Csr<Syn::State>,
    delay: i64,
    _dst: PhantomData<DstState>,
}

impl<Syn, DstState> SynapseEval for DeliverToEval<Syn, DstState>
where
    Syn: DeliverTo<DstState> + 'static,
    Syn::State: 'static,
    DstState: 'static,
{
    fn delay(&self) -> i64 {
        self.delay
    }

    fn is_plastic(&self) -> bool {
        false
    }

    fn deliver(
        &mut self,
        _time: i64,
        _dt: f32,
        spikes: &[i32],
        _src_states: Option<&dyn Any>,
        dst_states: &mut dyn Any,
        _dst_history: &[u64],
    ) {
        let dst_states = dst_states
            .downcast_mut::<Vec<DstState>>()
            .expect("destination population state type mismatch");
        let empty = Syn::State::default();
        for &src in spikes {
            let neighbors = self.csr.neighbors(src);
            let edges = self.csr.edges(src);
            for (k, &dst) in neighbors.iter().enumerate() {
                let syn_state = edges.map(|e| &e[k]).unwrap_or(&empty);
                self.syn.deliver(syn_state, &mut dst_states[dst as usize]);
            }
        }
    }

    fn plastic_sweep(&mut self, _time: i64, _dt: f32, _src_size: usize, _dst_history: &[u64]) {}

    fn edge_states_as_any(&self) -> Option<&dyn Any> {
        self.csr.edges_vec().map(|v| v as &dyn Any)
    }
}

struct PlasticDeliverToEval<Syn: DeliverTo<DstState> + PlasticSynapse, DstState> {
    syn: Syn,
    csr: Csr<Syn::State>,
    delay: i64,
    ages: Vec<u64>,
    _dst: PhantomData<DstState>,
}

impl<Syn, DstState> SynapseEval for PlasticDeliverToEval<Syn, DstState>
where
    Syn: DeliverTo<DstState> + PlasticSynapse + 'static,
    Syn::State: 'static,
    DstState: 'static,
{
    fn delay(&self) -> i64 {
        self.delay
    }

    fn is_plastic(&self) -> bool {
        true
    }

    fn deliver(
        &mut self,
        time: i64,
        dt: f32,
        spikes: &[i32],
        _src_states: Option<&dyn Any>,
        dst_states: &mut dyn Any,
        dst_history: &[u64],
    ) {
        let dst_states = dst_states
            .downcast_mut::<Vec<DstState>>()
            .expect("destination population state type mismatch");
        for &src in spikes {
            let (pre, age) = decode_age(self.ages[src as usize]);
            let (neighbors, edges) = self.csr.neighbors_and_edges_mut(src);
            if let Some(edges) = edges {
                let syn = &self.syn;
                for (k, &dst) in neighbors.iter().enumerate() {
                    let hist = dst_history[dst as usize];
                    if time >= age {
                        let state = &mut edges[k];
                        catch_up(pre, age, time, hist, |step| match step {
                            CatchUpStep::Update { pre, post } => syn.update(state, dt, pre, post),
                            CatchUpStep::Skip { n } => syn.skip(state, dt, n),
                        });
                    }
                    syn.deliver(&edges[k], &mut dst_states[dst as usize]);
                }
            }
            self.ages[src as usize] = (time + 1) as u64 | DELIVERED_FLAG;
        }
    }

    fn plastic_sweep(&mut self, time: i64, dt: f32, src_size: usize, dst_history: &[u64]) {
        for src in 0..src_size as i32 {
            let (pre, age) = decode_age(self.ages[src as usize]);
            if time >= age {
                let (neighbors, edges) = self.csr.neighbors_and_edges_mut(src);
                if let Some(edges) = edges {
                    let syn = &self.syn;
                    for (k, &dst) in neighbors.iter().enumerate() {
                        let hist = dst_history[dst as usize];
                        let state = &mut edges[k];
                        catch_up(pre, age, time, hist, |step| match step {
                            CatchUpStep::Update { pre, post } => syn.update(state, dt, pre, post),
                            CatchUpStep::Skip { n } => syn.skip(state, dt, n),
                        });
                    }
                }
            }
            self.ages[src as usize] = (time + 1) as u64;
        }
    }

    fn edge_states_as_any(&self) -> Option<&dyn Any> {
        self.csr.edges_vec().map(|v| v as &dyn Any)
    }
}

struct DeliverFromToEval<Syn: DeliverFromTo<SrcState, DstState>, SrcState, DstState> {
    syn: Syn,
    csr: Csr<Syn::State>,
    delay: i64,
    _src: PhantomData<SrcState>,
    _dst: PhantomData<DstState>,
}

impl<Syn, SrcState, DstState> SynapseEval for DeliverFromToEval<Syn, SrcState, DstState>
where
    Syn: DeliverFromTo<SrcState, DstState> + 'static,
    Syn::State: 'static,
    SrcState: 'static,
    DstState: 'static,
{
    fn delay(&self) -> i64 {
        self.delay
    }

    fn is_plastic(&self) -> bool {
        false
    }

    fn deliver(
        &mut self,
        _time: i64,
        _dt: f32,
        spikes: &[i32],
        src_states: Option<&dyn Any>,
        dst_states: &mut dyn Any,
        _dst_history: &[u64],
    ) {
        let src_states = src_states
            .and_then(|a| a.downcast_ref::<Vec<SrcState>>())
            .expect("deliver-from-to requires a stateful source population");
        let dst_states = dst_states
            .downcast_mut::<Vec<DstState>>()
            .expect("destination population state type mismatch");
        let empty = Syn::State::default();
        for &src in spikes {
            let neighbors = self.csr.neighbors(src);
            let edges = self.csr.edges(src);
            for (k, &dst) in neighbors.iter().enumerate() {
                let syn_state = edges.map(|e| &e[k]).unwrap_or(&empty);
                self.syn
                    .deliver(syn_state, &src_states[src as usize], &mut dst_states[dst as usize]);
            }
        }
    }

    fn plastic_sweep(&mut self, _time: i64, _dt: f32, _src_size: usize, _dst_history: &[u64]) {}

    fn edge_states_as_any(&self) -> Option<&dyn Any> {
        self.csr.edges_vec().map(|v| v as &dyn Any)
    }
}

struct PlasticDeliverFromToEval<Syn: DeliverFromTo<SrcState, DstState> + PlasticSynapse, SrcState, DstState> {
    syn: Syn,
    csr: Csr<Syn::State>,
    delay: i64,
    ages: Vec<u64>,
    _src: PhantomData<SrcState>,
    _dst: PhantomData<DstState>,
}

impl<Syn, SrcState, DstState> SynapseEval for PlasticDeliverFromToEval<Syn, SrcState, DstState>
where
    Syn: DeliverFromTo<SrcState, DstState> + PlasticSynapse + 'static,
    Syn::State: 'static,
    SrcState: 'static,
    DstState: 'static,
{
    fn delay(&self) -> i64 {
        self.delay
    }

    fn is_plastic(&self) -> bool {
        true
    }

    fn deliver(
        &mut self,
        time: i64,
        dt: f32,
        spikes: &[i32],
        src_states: Option<&dyn Any>,
        dst_states: &mut dyn Any,
        dst_history: &[u64],
    ) {
        let src_states = src_states
            .and_then(|a| a.downcast_ref::<Vec<SrcState>>())
            .expect("deliver-from-to requires a stateful source population");
        let dst_states = dst_states
            .downcast_mut::<Vec<DstState>>()
            .expect("destination population state type mismatch");
        for &src in spikes {
            let (pre, age) = decode_age(self.ages[src as usize]);
            let (neighbors, edges) = self.csr.neighbors_and_edges_mut(src);
            if let Some(edges) = edges {
                let syn = &self.syn;
                for (k, &dst) in neighbors.iter().enumerate() {
                    let hist = dst_history[dst as usize];
                    if time >= age {
                        let state = &mut edges[k];
                        catch_up(pre, age, time, hist, |step| match step {
                            CatchUpStep::Update { pre, post } => syn.update(state, dt, pre, post),
                            CatchUpStep::Skip { n } => syn.skip(state, dt, n),
                        });
                    }
                    syn.deliver(&edges[k], &src_states[src as usize], &mut dst_states[dst as usize]);
                }
            }
            self.ages[src as usize] = (time + 1) as u64 | DELIVERED_FLAG;
        }
    }

    fn plastic_sweep(&mut self, time: i64, dt: f32, src_size: usize, dst_history: &[u64]) {
        for src in 0..src_size as i32 {
            let (pre, age) = decode_age(self.ages[src as usize]);
            if time >= age {
                let (neighbors, edges) = self.csr.neighbors_and_edges_mut(src);
                if let Some(edges) = edges {
                    let syn = &self.syn;
                    for (k, &dst) in neighbors.iter().enumerate() {
                        let hist = dst_history[dst as usize];
                        let state = &mut edges[k];
                        catch_up(pre, age, time, hist, |step| match step {
                            CatchUpStep::Update { pre, post } => syn.update(state, dt, pre, post),
                            CatchUpStep::Skip { n } => syn.skip(state, dt, n),
                        });
                    }
                }
            }
            self.ages[src as usize] = (time + 1) as u64;
        }
    }

    fn edge_states_as_any(&self) -> Option<&dyn Any> {
        self.csr.edges_vec().map(|v| v as &dyn Any)
    }
}

/// Owns a CSR graph, a fixed delay, and — for plastic kinds — the
/// per-source ages/flag word array (spec §3, "Synapse population").
pub struct SynapsePopulation {
    pub(crate) eval: Box<dyn SynapseEval>,
}

impl SynapsePopulation {
    /// A non-plastic `deliver(&syn, &mut dst)` synapse population.
    pub fn connect_to<Syn, DstState>(
        kind: Syn,
        topology: impl Topology,
        src_count: i32,
        dst_count: i32,
        delay: i64,
        max_delay: i64,
        seed: &Seed,
    ) -> Result<Self>
    where
        Syn: DeliverTo<DstState> + 'static,
        Syn::State: 'static,
        DstState: 'static,
    {
        validate_delay(delay, max_delay)?;
        let csr = build_csr(&kind, topology, src_count, dst_count, seed)?;
        Ok(Self {
            eval: Box::new(DeliverToEval {
                syn: kind,
                csr,
                delay,
                _dst: PhantomData,
            }),
        })
    }

    /// A plastic `deliver(&syn, &mut dst)` synapse population, additionally
    /// implementing [`PlasticSynapse`].
    pub fn connect_to_plastic<Syn, DstState>(
        kind: Syn,
        topology: impl Topology,
        src_count: i32,
        dst_count: i32,
        delay: i64,
        max_delay: i64,
        seed: &Seed,
    ) -> Result<Self>
    where
        Syn: DeliverTo<DstState> + PlasticSynapse + 'static,
        Syn::State: 'static,
        DstState: 'static,
    {
        validate_delay(delay, max_delay)?;
        let csr = build_csr(&kind, topology, src_count, dst_count, seed)?;
        Ok(Self {
            eval: Box::new(PlasticDeliverToEval {
                syn: kind,
                csr,
                delay,
                ages: vec![0u64; src_count as usize],
                _dst: PhantomData,
            }),
        })
    }

    /// A non-plastic `deliver(&syn, &src, &mut dst)` synapse population.
    /// Requires the source population to be stateful.
    pub fn connect_from_to<Syn, SrcState, DstState>(
        kind: Syn,
        topology: impl Topology,
        src_count: i32,
        dst_count: i32,
        delay: i64,
        max_delay: i64,
        seed: &Seed,
    ) -> Result<Self>
    where
        Syn: DeliverFromTo<SrcState, DstState> + 'static,
        Syn::State: 'static,
        SrcState: 'static,
        DstState: 'static,
    {
        validate_delay(delay, max_delay)?;
        let csr = build_csr(&kind, topology, src_count, dst_count, seed)?;
        Ok(Self {
            eval: Box::new(DeliverFromToEval {
                syn: kind,
                csr,
                delay,
                _src: PhantomData,
                _dst: PhantomData,
            }),
        })
    }

    /// A plastic `deliver(&syn, &src, &mut dst)` synapse population,
    /// additionally implementing [`PlasticSynapse`]. Requires the source
    /// population to be stateful.
    pub fn connect_from_to_plastic<Syn, SrcState, DstState>(
        kind: Syn,
        topology: impl Topology,
        src_count: i32,
        dst_count: i32,
        delay: i64,
        max_delay: i64,
        seed: &Seed,
    ) -> Result<Self>
    where
        Syn: DeliverFromTo<SrcState, DstState> + PlasticSynapse + 'static,
        Syn::State: 'static,
        SrcState: 'static,
        DstState: 'static,
    {
        validate_delay(delay, max_delay)?;
        let csr = build_csr(&kind, topology, src_count, dst_count, seed)?;
        Ok(Self {
            eval: Box::new(PlasticDeliverFromToEval {
                syn: kind,
                csr,
                delay,
                ages: vec![0u64; src_count as usize],
                _src: PhantomData,
                _dst: PhantomData,
            }),
        })
    }
}

fn validate_delay(delay: i64, max_delay: i64) -> Result<()> {
    if delay < 1 || delay > max_delay {
        return Err(SimError::invalid_delay(delay, max_delay));
    }
    Ok(())
}

fn build_csr<Syn: SynapseKind>(
    kind: &Syn,
    topology: impl Topology,
    src_count: i32,
    dst_count: i32,
    seed: &Seed,
) -> Result<Csr<Syn::State>>
where
    Syn::State: 'static,
{
    let mut csr = Csr::<Syn::State>::build(topology, src_count, dst_count, seed)?;
    let mut rng = TickRng::from_seed(&seed.stream(1));
    for src in 0..src_count {
        let neighbors: Vec<i32> = csr.neighbors(src).to_vec();
        if let Some(edges) = csr.edges_mut(src) {
            for (edge, &dst) in edges.iter_mut().zip(neighbors.iter()) {
                kind.init_synapse(edge, src, dst, &mut rng);
            }
        }
    }
    Ok(csr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::AdjacencyList;

    #[derive(Default, Clone, Copy)]
    struct SrcState {
        value: i32,
    }

    #[derive(Default, Clone, Copy)]
    struct Weight {
        w: f32,
    }

    struct ScaledRelay;
    impl SynapseKind for ScaledRelay {
        type State = Weight;
    }
    impl DeliverFromTo<SrcState, f32> for ScaledRelay {
        fn deliver(&self, syn: &Weight, src: &SrcState, dst: &mut f32) {
            *dst += syn.w * src.value as f32;
        }
    }
    impl PlasticSynapse for ScaledRelay {
        fn update(&self, syn: &mut Weight, _dt: f32, _pre: bool, post: bool) {
            if post {
                syn.w += 0.1;
            }
        }
        fn skip(&self, _syn: &mut Weight, _dt: f32, _n: u32) {}
    }

    #[test]
    fn connect_from_to_plastic_delivers_scaled_by_source_state() {
        let seed = Seed::new(&[0]);
        let population = SynapsePopulation::connect_from_to_plastic::<ScaledRelay, SrcState, f32>(
            ScaledRelay,
            AdjacencyList::identity(2),
            2,
            2,
            1,
            8,
            &seed,
        )
        .unwrap();
        assert_eq!(population.eval.delay(), 1);
        assert!(population.eval.is_plastic());
    }

    #[test]
    fn plastic_deliver_to_population_applies_weight_and_records_delivery() {
        struct Accumulate;
        impl SynapseKind for Accumulate {
            type State = Weight;
        }
        impl DeliverTo<f32> for Accumulate {
            fn deliver(&self, syn: &Weight, dst: &mut f32) {
                *dst += syn.w;
            }
        }
        impl PlasticSynapse for Accumulate {
            fn update(&self, syn: &mut Weight, _dt: f32, _pre: bool, post: bool) {
                if post {
                    syn.w += 1.0;
                }
            }
            fn skip(&self, _syn: &mut Weight, _dt: f32, _n: u32) {}
        }

        let seed = Seed::new(&[7]);
        let mut synapses = SynapsePopulation::connect_to_plastic::<Accumulate, f32>(
            Accumulate,
            AdjacencyList::identity(1),
            1,
            1,
            1,
            64,
            &seed,
        )
        .unwrap();

        let mut dst_states: Box<dyn Any> = Box::new(vec![0.0f32]);
        synapses.eval.deliver(0, 1.0, &[0], None, dst_states.as_mut(), &[0u64]);
        let dst = dst_states.downcast_ref::<Vec<f32>>().unwrap();
        // initial weight is the zero-initialized default; delivery alone
        // does not move it without a plastic catch-up event.
        assert_eq!(dst[0], 0.0);
    }

    #[derive(Debug, PartialEq, Clone, Copy)]
    enum TraceEvent {
        Update { pre: bool, post: bool },
        SkipOne,
    }

    fn run_catch_up(pre: bool, age: i64, time: i64, hist: u64) -> Vec<TraceEvent> {
        let mut trace = Vec::new();
        catch_up(pre, age, time, hist, |step| match step {
            CatchUpStep::Update { pre, post } => trace.push(TraceEvent::Update { pre, post }),
            CatchUpStep::Skip { n } => trace.extend(std::iter::repeat(TraceEvent::SkipOne).take(n as usize)),
        });
        trace
    }

    /// Naive tick-at-a-time reference: walks ticks `[age, time]` in
    /// ascending order, calling `update(pre, post)` on the first tick
    /// (consuming the pending pre-event) and `update(false, post)` or a
    /// single quiet tick on every tick after, exactly as spec P5 defines
    /// the reference semantics that the bit-scan must reproduce.
    fn naive_trace(pre: bool, age: i64, time: i64, hist: u64) -> Vec<TraceEvent> {
        let mut trace = Vec::new();
        if time < age {
            return trace;
        }
        if pre {
            let post = bit_at(hist, (time - age) as u32);
            trace.push(TraceEvent::Update { pre: true, post });
        }
        let window_start = age + if pre { 1 } else { 0 };
        let mut tick = window_start;
        while tick <= time {
            let b = (time - tick) as u32;
            if bit_at(hist, b) {
                trace.push(TraceEvent::Update { pre: false, post: true });
            } else {
                trace.push(TraceEvent::SkipOne);
            }
            tick += 1;
        }
        trace
    }

    #[test]
    fn catch_up_fully_quiet_window_emits_single_skip() {
        let mut calls = Vec::new();
        catch_up(false, 0, 5, 0, |step| match step {
            CatchUpStep::Update { pre, post } => calls.push(("update", pre, post, 0)),
            CatchUpStep::Skip { n } => calls.push(("skip", false, false, n)),
        });
        // window [0, 5] inclusive is 6 ticks, all quiet: a single skip(6).
        assert_eq!(calls, vec![("skip", false, false, 6)]);
    }

    #[test]
    fn catch_up_with_events_processes_oldest_first_with_exact_skip_counts() {
        let mut calls = Vec::new();
        // bits 1 and 3 set (ticks time-1 and time-3 within window [0,5])
        let hist = (1u64 << 1) | (1u64 << 3);
        catch_up(false, 0, 5, hist, |step| match step {
            CatchUpStep::Update { pre, post } => calls.push(("update", pre, post, 0)),
            CatchUpStep::Skip { n } => calls.push(("skip", false, false, n)),
        });
        // oldest (bit 3, tick 2) first: skip(2) covers ticks 5,4 (bits 5,4),
        // then update at tick 2, skip(1) covers tick 3 (bit 2), update at
        // tick 4 (bit 1), skip(1) covers tick 5 (bit 0).
        assert_eq!(
            calls,
            vec![
                ("skip", false, false, 2),
                ("update", false, true, 0),
                ("skip", false, false, 1),
                ("update", false, true, 0),
                ("skip", false, false, 1),
            ]
        );
    }

    #[test]
    fn catch_up_matches_naive_tick_at_a_time_reference() {
        // P5: exhaustively check every (pre, age, time, history) combination
        // within a small window against the naive per-tick reference.
        for pre in [false, true] {
            for age in 0..=4i64 {
                for time in age..=(age + 6) {
                    for hist in 0u64..64 {
                        let actual = run_catch_up(pre, age, time, hist);
                        let expected = naive_trace(pre, age, time, hist);
                        assert_eq!(
                            actual, expected,
                            "pre={pre} age={age} time={time} hist={hist:#066b}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn catch_up_single_tick_window_is_not_dropped() {
        // age == time with pre == false: exactly one tick (bit 0) to
        // process, previously short-circuited away entirely.
        let fired = run_catch_up(false, 5, 5, 1);
        assert_eq!(fired, vec![TraceEvent::Update { pre: false, post: true }]);
        let quiet = run_catch_up(false, 5, 5, 0);
        assert_eq!(quiet, vec![TraceEvent::SkipOne]);
    }
}
