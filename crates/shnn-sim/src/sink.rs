//! Opaque spike accumulator (spec §6, component C8).
//!
//! The engine is silent on I/O: it hands each tick's per-population spike
//! indices to a [`SpikeSink`] and never looks at what the sink does with
//! them. [`JsonSink`] is the one concrete sink this crate ships, matching
//! the text-sink format spec.md §6 describes for sample CLIs.

/// Receives, for each step, the firing indices of one or more named
/// populations, addressed by their position in the submission order fixed
/// at construction. Implementations decide how (or whether) to persist
/// them.
pub trait SpikeSink {
    /// Records one tick's spikes for the population at `submission_index`,
    /// given as local indices into that population (not yet offset by
    /// earlier populations in the submission order).
    fn record(&mut self, submission_index: usize, indices: &[i32]);

    /// Advances the sink to the next tick, closing out the current one.
    fn end_tick(&mut self);
}

/// Accumulates ticks as a JSON document shaped
/// `{ "name": "...", "spikes": [[i32, ...], ...] }`, concatenating
/// per-population indices after applying each population's cumulative
/// offset in submission order (spec §6).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JsonSink {
    name: String,
    offsets: Vec<i32>,
    current_tick: Vec<i32>,
    ticks: Vec<Vec<i32>>,
}

impl JsonSink {
    /// Creates an empty sink labeled `name`, with `population_sizes` fixing
    /// the submission order and per-population index offset.
    pub fn new(name: impl Into<String>, population_sizes: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(population_sizes.len());
        let mut cumulative = 0i32;
        for &size in population_sizes {
            offsets.push(cumulative);
            cumulative += size as i32;
        }
        Self {
            name: name.into(),
            offsets,
            current_tick: Vec::new(),
            ticks: Vec::new(),
        }
    }

    /// The recorded ticks so far, one `Vec<i32>` per tick.
    pub fn ticks(&self) -> &[Vec<i32>] {
        &self.ticks
    }

    /// Serializes the accumulated ticks as the JSON document spec.md §6
    /// describes. Hand-rolled rather than pulling in `serde_json`: the
    /// shape is fixed and small enough that a formatter is simpler than a
    /// dependency (see `SPEC_FULL.md`, "Feature flags").
    pub fn to_json(&self) -> String {
        let mut out = String::new();
        out.push_str("{\"name\": \"");
        escape_into(&self.name, &mut out);
        out.push_str("\", \"spikes\": [");
        for (i, tick) in self.ticks.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push('[');
            for (j, index) in tick.iter().enumerate() {
                if j > 0 {
                    out.push_str(", ");
                }
                out.push_str(&index.to_string());
            }
            out.push(']');
        }
        out.push_str("]}");
        out
    }
}

impl SpikeSink for JsonSink {
    fn record(&mut self, submission_index: usize, indices: &[i32]) {
        let offset = self.offsets[submission_index];
        self.current_tick.extend(indices.iter().map(|&i| i + offset));
    }

    fn end_tick(&mut self) {
        self.ticks.push(std::mem::take(&mut self.current_tick));
    }
}

fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
}
