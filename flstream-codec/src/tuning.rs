//! Offline search for coder parameters.
//!
//! Tries every `(cutoff, order, context_count, context_depth)` combination
//! within the given ranges and keeps the one producing the smallest payload.
//! The chosen configuration is not recorded in the block, so callers must
//! store it next to the data to be able to decode.

use std::io::Write;
use std::ops::Range;

use log::{debug, info};
use rayon::prelude::*;

use crate::arith::{ArithCoder, ArithCoderConfig};
use crate::error::{CodecError, CodecResult};

/// Half-open search ranges for each parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TuningRanges {
    pub cutoff: Range<u32>,
    pub order: Range<u32>,
    pub context_count: Range<usize>,
    pub context_depth: Range<usize>,
}

impl Default for TuningRanges {
    fn default() -> Self {
        Self {
            cutoff: 1..20,
            order: 1..10,
            context_count: 1..20,
            context_depth: 0..4,
        }
    }
}

impl TuningRanges {
    fn candidates(&self) -> Vec<ArithCoderConfig> {
        let mut out = Vec::new();
        for cutoff in self.cutoff.clone() {
            for order in self.order.clone() {
                for context_count in self.context_count.clone() {
                    for context_depth in self.context_depth.clone() {
                        out.push(ArithCoderConfig {
                            cutoff,
                            order,
                            context_count,
                            context_depth,
                        });
                    }
                }
            }
        }
        out
    }
}

/// Returns the configuration with the smallest payload for `values` and that
/// payload's size. Ties go to the earliest candidate in scan order.
pub fn tune(values: &[i32], ranges: &TuningRanges) -> CodecResult<(ArithCoderConfig, usize)> {
    let candidates = ranges.candidates();
    info!(
        "Tuning coder over {} configurations for {} values",
        candidates.len(),
        values.len()
    );

    let sizes: Vec<CodecResult<usize>> = candidates
        .par_iter()
        .map(|config| -> CodecResult<usize> {
            Ok(ArithCoder::new(*config)?.encode_payload(values).len())
        })
        .collect();

    let mut best: Option<(usize, usize)> = None;
    for (i, size) in sizes.into_iter().enumerate() {
        let size = size?;
        if best.is_none_or(|(_, best_size)| size < best_size) {
            best = Some((i, size));
        }
    }

    let (index, size) = best.ok_or_else(|| {
        CodecError::InvalidConfig("tuning ranges contain no configuration".to_string())
    })?;
    debug!("Best coder configuration {:?}: {} bytes", candidates[index], size);
    Ok((candidates[index], size))
}

/// Tunes the coder for `values`, writes one block with the winner and returns
/// the configuration used.
pub fn encode_tuned<W: Write>(
    values: &[i32],
    ranges: &TuningRanges,
    out: &mut W,
) -> CodecResult<ArithCoderConfig> {
    let (config, _) = tune(values, ranges)?;
    ArithCoder::new(config)?.encode(values, out)?;
    Ok(config)
}
