//! Compressed sparse row graph (spec §4.3, component C3).

use crate::error::Result;
use crate::rng::Seed;
use crate::topology::Topology;
use std::mem::size_of;

/// `offsets[0..=src_count]` plus `neighbors[0..E]`, with an optional
/// per-edge payload. Per spec §9 ("CSR with empty payload"), `edges` is
/// `None` rather than `Some(Vec<()>)` when the payload type is zero-sized —
/// allocating and indexing a zero-sized-type vector is a needless
/// corner case this representation avoids entirely.
#[derive(Debug, Clone)]
pub struct Csr<E> {
    offsets: Vec<i64>,
    neighbors: Vec<i32>,
    edges: Option<Vec<E>>,
}

impl<E: Default + Clone> Csr<E> {
    /// Builds a CSR graph by binding `topology` to `(src_count, dst_count)`
    /// and invoking [`Topology::fill_csr`]. Allocates a per-edge payload
    /// vector unless `E` is zero-sized.
    pub fn build(
        mut topology: impl Topology,
        src_count: i32,
        dst_count: i32,
        seed: &Seed,
    ) -> Result<Self> {
        topology.bind(src_count, dst_count);
        let bound = topology.size();

        let mut offsets = vec![0i64; src_count as usize + 1];
        let mut neighbors = vec![0i32; bound];
        let written = topology.fill_csr(&mut offsets, &mut neighbors, seed)?;
        neighbors.truncate(written);

        debug_assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "CSR offsets must be non-decreasing");
        debug_assert_eq!(offsets[0], 0);
        debug_assert_eq!(*offsets.last().unwrap(), written as i64);

        let edges = if size_of::<E>() == 0 {
            None
        } else {
            Some(vec![E::default(); written])
        };

        Ok(Self {
            offsets,
            neighbors,
            edges,
        })
    }

    /// Number of sources (`offsets.len() - 1`).
    pub fn src_count(&self) -> i32 {
        self.offsets.len() as i32 - 1
    }

    /// Total number of edges.
    pub fn edge_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Destination indices for `src`, sorted ascending.
    pub fn neighbors(&self, src: i32) -> &[i32] {
        let (start, end) = self.row_bounds(src);
        &self.neighbors[start..end]
    }

    /// Per-edge payload slice for `src`, if the payload is non-empty.
    pub fn edges(&self, src: i32) -> Option<&[E]> {
        let (start, end) = self.row_bounds(src);
        self.edges.as_deref().map(|e| &e[start..end])
    }

    /// Destination indices and mutable per-edge payload for `src`
    /// together, without the double borrow of `self` that calling
    /// [`Csr::neighbors`] and [`Csr::edges_mut`] separately would require.
    pub fn neighbors_and_edges_mut(&mut self, src: i32) -> (&[i32], Option<&mut [E]>) {
        let (start, end) = self.row_bounds(src);
        let neighbors = &self.neighbors[start..end];
        let edges = self.edges.as_deref_mut().map(|e| &mut e[start..end]);
        (neighbors, edges)
    }

    /// Mutable per-edge payload slice for `src`, if the payload is
    /// non-empty.
    pub fn edges_mut(&mut self, src: i32) -> Option<&mut [E]> {
        let (start, end) = self.row_bounds(src);
        self.edges.as_deref_mut().map(|e| &mut e[start..end])
    }

    /// The full per-edge payload across every source row, in CSR order
    /// (`offsets`-indexed, not grouped by source). Used to expose a
    /// synapse population's edge states for inspection (e.g. plastic
    /// weights) without the caller needing to walk every source.
    pub fn all_edges(&self) -> Option<&[E]> {
        self.edges.as_deref()
    }

    /// Same as [`Csr::all_edges`] but returns the backing `Vec<E>`
    /// reference rather than a slice, so callers erasing it behind
    /// `dyn Any` can downcast back to `Vec<E>` (a slice's `TypeId` differs
    /// from its owning `Vec`'s).
    pub(crate) fn edges_vec(&self) -> Option<&Vec<E>> {
        self.edges.as_ref()
    }

    fn row_bounds(&self, src: i32) -> (usize, usize) {
        let start = self.offsets[src as usize] as usize;
        let end = self.offsets[src as usize + 1] as usize;
        (start, end)
    }
}
