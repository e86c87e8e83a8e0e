//! Seeded 128-bit PRNG family and the canonical-float/distribution layer
//! built on top of it (spec §4.1, component C1).
//!
//! [`Seed`] is the 128-bit fingerprint threaded through configuration;
//! [`Xoroshiro64`] is the generator threaded through every per-tick
//! callback. [`Xoroshiro32`] exists for parity with the 32-bit-output
//! variant the original implementation also ships (see `SPEC_FULL.md`,
//! "Two generator widths"), though this crate's driver and kinds only ever
//! construct the 64-bit one.

fn fmix64(mut k: u64) -> u64 {
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51afd7ed558ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ceb9fe1a85ec53);
    k ^= k >> 33;
    k
}

/// Murmur3-derived mixing of a 128-bit value, split across two 64-bit
/// lanes. Used both to fold an initializer list of 32-bit seeds into a
/// [`Seed`] and to derive the next seed from the current one.
fn murmur3_mix(lo: u64, hi: u64) -> (u64, u64) {
    let mut h1 = lo;
    let mut h2 = hi;
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    h1 = fmix64(h1);
    h2 = fmix64(h2);
    h1 = h1.wrapping_add(h2);
    h2 = h2.wrapping_add(h1);
    (h1, h2)
}

/// A 128-bit seed fingerprint (spec §4.1 "Seed object").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seed {
    lo: u64,
    hi: u64,
}

impl Seed {
    /// Folds a list of 32-bit seed values into a 128-bit fingerprint via
    /// repeated Murmur3-derived mixing.
    pub fn new(values: &[u32]) -> Self {
        let mut lo = 0x9E37_79B9_7F4A_7C15u64;
        let mut hi = 0xBF58_476D_1CE4_E5B9u64;
        for &v in values {
            let (a, b) = murmur3_mix(lo ^ v as u64, hi);
            lo = a;
            hi = b;
        }
        Self { lo, hi }
    }

    /// A seed derived from a single `u64` (the common `create(seed: u32...)`
    /// entry point collapses to one word).
    pub fn from_u64(value: u64) -> Self {
        Self::new(&[(value & 0xFFFF_FFFF) as u32, (value >> 32) as u32])
    }

    /// Returns a copy of the current seed, then replaces the internal value
    /// with `mix(self)`. Used to hand out a fresh per-tick sub-stream
    /// without advancing it again until the next tick.
    pub fn advance(&mut self) -> Seed {
        let snapshot = *self;
        let (lo, hi) = murmur3_mix(self.lo, self.hi);
        self.lo = lo;
        self.hi = hi;
        snapshot
    }

    /// Derives an independent sub-stream by XOR-mixing with `hash(id + 1)`,
    /// matching the original's `stream(id)` (see `SPEC_FULL.md`).
    pub fn stream(&self, id: u64) -> Seed {
        let h = fmix64(id.wrapping_add(1));
        Seed {
            lo: self.lo ^ h,
            hi: self.hi ^ h.rotate_left(32),
        }
    }

    /// The raw 128-bit state as a `(lo, hi)` pair, for bootstrapping a
    /// generator.
    pub fn state(&self) -> (u64, u64) {
        (self.lo, self.hi)
    }
}

/// `xoroshiro128+`, 64-bit output, state initialized directly from a
/// [`Seed`]'s 128 bits. This is the generator threaded through every
/// neuron/synapse callback.
#[derive(Debug, Clone)]
pub struct Xoroshiro64 {
    s0: u64,
    s1: u64,
}

impl Xoroshiro64 {
    /// Builds a generator from a seed's raw state, substituting a fixed
    /// non-zero state if the seed happened to mix to all-zero (an
    /// all-zero state is a fixed point of xoroshiro and must never occur).
    pub fn from_seed(seed: &Seed) -> Self {
        let (lo, hi) = seed.state();
        if lo == 0 && hi == 0 {
            Self { s0: 1, s1: 2 }
        } else {
            Self { s0: lo, s1: hi }
        }
    }

    /// Returns the next 64-bit uniform word and advances the state.
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.s0;
        let mut s1 = self.s1;
        let result = s0.wrapping_add(s1);
        s1 ^= s0;
        self.s0 = s0.rotate_left(55) ^ s1 ^ (s1 << 14);
        self.s1 = s1.rotate_left(36);
        result
    }
}

/// `xoroshiro128+` with 32-bit output (4x32-word state), the companion
/// generator the original implementation also defines. Not used by the
/// default driver, which standardizes on [`Xoroshiro64`] for the single
/// per-tick sub-stream threaded through callbacks.
#[derive(Debug, Clone)]
pub struct Xoroshiro32 {
    s: [u32; 4],
}

impl Xoroshiro32 {
    /// Builds a generator from a seed's raw 128 bits split into four
    /// 32-bit words.
    pub fn from_seed(seed: &Seed) -> Self {
        let (lo, hi) = seed.state();
        let s = [lo as u32, (lo >> 32) as u32, hi as u32, (hi >> 32) as u32];
        if s.iter().all(|&w| w == 0) {
            Self { s: [1, 2, 3, 4] }
        } else {
            Self { s }
        }
    }

    /// Returns the next 32-bit uniform word and advances the state.
    pub fn next_u32(&mut self) -> u32 {
        let result = self.s[0].wrapping_add(self.s[3]);
        let t = self.s[1] << 9;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(11);
        result
    }
}

/// The generator type threaded through every per-tick callback.
pub type TickRng = Xoroshiro64;

/// Lets a [`TickRng`] feed the `rand` crate's distributions directly
/// (`rng.gen_range(..)`, `rand::seq::SliceRandom`, etc.) alongside the
/// canonical/uniform/exponential/normal/binomial samplers this module
/// defines for spec-pinned reproducibility.
impl rand::RngCore for Xoroshiro64 {
    fn next_u32(&mut self) -> u32 {
        (Xoroshiro64::next_u64(self) >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        Xoroshiro64::next_u64(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut chunks = dest.chunks_exact_mut(8);
        for chunk in &mut chunks {
            chunk.copy_from_slice(&Xoroshiro64::next_u64(self).to_le_bytes());
        }
        let remainder = chunks.into_remainder();
        if !remainder.is_empty() {
            let word = Xoroshiro64::next_u64(self).to_le_bytes();
            remainder.copy_from_slice(&word[..remainder.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Converts a uniform word into a canonical `f32`.
///
/// Masks to the 24-bit mantissa width of `f32`, optionally adding 1 to turn
/// a `[0, 1)` sample into `(0, 1]` (`left_open`), then divides by `2^24`.
pub fn canonical_f32(rng: &mut TickRng, left_open: bool) -> f32 {
    const MANTISSA_BITS: u32 = 24;
    let word = rng.next_u64() >> (64 - MANTISSA_BITS);
    let word = if left_open { word + 1 } else { word };
    word as f32 / (1u64 << MANTISSA_BITS) as f32
}

/// Samples `U[a, b)`, or `(a, b]` when `left_open`.
pub fn uniform_real(rng: &mut TickRng, a: f32, b: f32, left_open: bool) -> f32 {
    a + (b - a) * canonical_f32(rng, left_open)
}

/// Samples an exponential distribution with the given `scale` (mean).
/// Draws its canonical float from `(0, 1]` so `ln` never sees zero.
pub fn exponential(rng: &mut TickRng, scale: f32) -> f32 {
    -scale * canonical_f32(rng, true).ln()
}

/// Buffers the second sample of a Box-Muller pair across calls, so every
/// two canonical draws yield two normal samples instead of one.
#[derive(Debug, Clone, Default)]
pub struct NormalState {
    cached: Option<f32>,
}

impl NormalState {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Samples `Normal(mean, sd)`, consuming the buffered second sample
    /// from the previous call when one is available.
    pub fn sample(&mut self, rng: &mut TickRng, mean: f32, sd: f32) -> f32 {
        if let Some(z) = self.cached.take() {
            return mean + sd * z;
        }
        let u1 = canonical_f32(rng, true);
        let u2 = canonical_f32(rng, false);
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * std::f32::consts::PI * u2;
        self.cached = Some(r * theta.sin());
        mean + sd * (r * theta.cos())
    }
}

/// Samples `Binomial(n, p)` via the normal approximation (mean `np`,
/// standard deviation `sqrt(np(1-p))`), rounded and clamped to `[0, n]`.
pub fn binomial(rng: &mut TickRng, normal: &mut NormalState, n: u32, p: f32) -> u32 {
    let mean = n as f32 * p;
    let sd = (mean * (1.0 - p)).max(0.0).sqrt();
    let sample = normal.sample(rng, mean, sd).round();
    sample.clamp(0.0, n as f32) as u32
}
