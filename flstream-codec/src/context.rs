//! Adaptive binary probability models.
//!
//! [`QuantizedStats`] is a 127-state machine over a geometric ladder of
//! probabilities between ~0.01875 and ~0.98125, centred on state 63 (p = 0.5).
//! Each state carries fixed-point frequencies `p0 + p1 ≈ 1024` and the states
//! to move to after observing a 0 or a 1. The table is built once per process
//! and is read-only afterwards.
//!
//! [`ContextBinaryStats`] selects one of `2^order` quantized models from the
//! last `order` observed bits.

use std::sync::OnceLock;

/// Number of states in the quantized ladder.
pub const STATE_COUNT: usize = 127;
/// State of maximal uncertainty (p0 = p1 = 512).
pub const CENTRE_STATE: usize = 63;
/// Probability of the less likely symbol at either end of the ladder.
const EDGE_PROBABILITY: f64 = 0.01875;
/// Fixed-point scale of the frequencies.
const SCALE: f64 = 1024.0;

/// Frequency estimates consumed by the range coder.
pub trait BinaryModel {
    /// Frequency of a 0 bit; always at least 1.
    fn p0(&self) -> u32;
    /// Frequency of a 1 bit; always at least 1.
    fn p1(&self) -> u32;
    /// Adapts the model after a bit was coded.
    fn update(&mut self, bit: bool);
}

#[derive(Debug)]
pub(crate) struct StateTable {
    pub(crate) p0: [u32; STATE_COUNT],
    pub(crate) p1: [u32; STATE_COUNT],
    pub(crate) trans0: [usize; STATE_COUNT],
    pub(crate) trans1: [usize; STATE_COUNT],
}

impl StateTable {
    fn build() -> Self {
        let mut p0 = [0u32; STATE_COUNT];
        let mut p1 = [0u32; STATE_COUNT];
        let mut trans0 = [0usize; STATE_COUNT];
        let mut trans1 = [0usize; STATE_COUNT];

        let c = CENTRE_STATE;
        let a = (EDGE_PROBABILITY / 0.5).powf(1.0 / c as f64);
        let mut p = 0.5;

        p0[c] = 512;
        p1[c] = 512;
        trans0[c] = c - 1;
        trans1[c] = c + 1;

        for i in 1..=c {
            p *= a;
            p0[c + i] = (SCALE * p) as u32;
            p1[c + i] = 1024 - p0[c + i];
            p1[c - i] = p0[c + i];
            p0[c - i] = p1[c + i];

            if c + i + 1 < STATE_COUNT {
                trans1[c + i] = c + i + 1;
            }
            trans0[c - i] = (c - i).saturating_sub(1);

            // after a 0 the estimate moves to a*p + (1 - a); pick the first
            // state at or above that probability of 0
            let desired = (SCALE * (a * p + (1.0 - a))) as u32;
            let mut index = c + i;
            while index > c - i && p0[index - 1] < desired {
                index -= 1;
            }
            trans0[c + i] = index;
            trans1[c - i] = STATE_COUNT - 1 - index;
        }
        trans1[STATE_COUNT - 1] = STATE_COUNT - 1;
        trans0[0] = 0;

        Self {
            p0,
            p1,
            trans0,
            trans1,
        }
    }
}

pub(crate) fn state_table() -> &'static StateTable {
    static TABLE: OnceLock<StateTable> = OnceLock::new();
    TABLE.get_or_init(StateTable::build)
}

/// Quantized log-domain probability state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuantizedStats {
    state: usize,
}

impl Default for QuantizedStats {
    fn default() -> Self {
        Self {
            state: CENTRE_STATE,
        }
    }
}

impl QuantizedStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> usize {
        self.state
    }
}

impl BinaryModel for QuantizedStats {
    fn p0(&self) -> u32 {
        state_table().p0[self.state]
    }

    fn p1(&self) -> u32 {
        state_table().p1[self.state]
    }

    fn update(&mut self, bit: bool) {
        let table = state_table();
        self.state = if bit {
            table.trans1[self.state]
        } else {
            table.trans0[self.state]
        };
    }
}

/// Order-k finite context model over quantized states.
#[derive(Clone, Debug)]
pub struct ContextBinaryStats {
    stats: Vec<QuantizedStats>,
    context: usize,
    mask: usize,
}

impl ContextBinaryStats {
    /// `order` previous bits select the sub-model; order 0 is a single model.
    pub fn new(order: usize) -> Self {
        let count = 1usize << order;
        Self {
            stats: vec![QuantizedStats::new(); count],
            context: 0,
            mask: count - 1,
        }
    }

    pub fn context(&self) -> usize {
        self.context
    }
}

impl BinaryModel for ContextBinaryStats {
    fn p0(&self) -> u32 {
        self.stats[self.context].p0()
    }

    fn p1(&self) -> u32 {
        self.stats[self.context].p1()
    }

    fn update(&mut self, bit: bool) {
        self.stats[self.context].update(bit);
        self.context = ((self.context << 1) | usize::from(bit)) & self.mask;
    }
}

/// Plain adaptive frequency counter, `1 + occurrences` per symbol.
///
/// Counts are halved once their sum reaches `MAX_TOTAL` so they stay well
/// below the coder's quarter range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountingStats {
    c0: u32,
    c1: u32,
}

impl CountingStats {
    const MAX_TOTAL: u32 = 1 << 16;

    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for CountingStats {
    fn default() -> Self {
        Self { c0: 1, c1: 1 }
    }
}

impl BinaryModel for CountingStats {
    fn p0(&self) -> u32 {
        self.c0
    }

    fn p1(&self) -> u32 {
        self.c1
    }

    fn update(&mut self, bit: bool) {
        if bit {
            self.c1 += 1;
        } else {
            self.c0 += 1;
        }
        if self.c0 + self.c1 >= Self::MAX_TOTAL {
            self.c0 = self.c0.div_ceil(2);
            self.c1 = self.c1.div_ceil(2);
        }
    }
}
