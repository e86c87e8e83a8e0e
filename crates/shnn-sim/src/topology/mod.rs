//! Edge generators (spec §4.2, component C2).
//!
//! A [`Topology`] is bound to a source and destination count, reports an
//! upper bound on the edges it will produce, then fills a pair of
//! pre-allocated `offsets`/`neighbors` buffers directly. This crate follows
//! the later, simpler direct-fill shape of the original implementation
//! rather than its older streaming `edge_stream` abstraction — see
//! `SPEC_FULL.md`, "Direct offsets/neighbors CSR fill".

mod adjacency;
mod fixed_probability;

pub use adjacency::AdjacencyList;
pub use fixed_probability::FixedProbability;

use crate::error::Result;
use crate::rng::Seed;

/// An abstract edge source bound to a source-count `S` and
/// destination-count `D`, producing edges `(src, dst)` with no duplicates.
pub trait Topology {
    /// Fixes the source and destination population sizes this topology
    /// generates edges between. Must be called before [`Topology::size`]
    /// or [`Topology::fill_csr`].
    fn bind(&mut self, src_count: i32, dst_count: i32);

    /// The bound source count.
    fn src_count(&self) -> i32;

    /// The bound destination count.
    fn dst_count(&self) -> i32;

    /// An upper bound on the number of edges [`Topology::fill_csr`] will
    /// write, used to size the `neighbors`/`edges` buffers.
    fn size(&self) -> usize;

    /// Fills `offsets[0..=src_count]` and `neighbors[0..size()]` in place.
    /// `offsets` must come out monotonically non-decreasing with
    /// `offsets[0] == 0`; `neighbors[offsets[s]..offsets[s+1]]` must be the
    /// sorted, unique destination list for source `s`. Returns the number
    /// of edges actually written (`<= size()`).
    fn fill_csr(&mut self, offsets: &mut [i64], neighbors: &mut [i32], seed: &Seed) -> Result<usize>;
}
