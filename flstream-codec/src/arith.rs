//! Arithmetic coder façade over integer arrays.
//!
//! Every value is binarized and its bits are coded with a bank of
//! order-`context_depth` context models: one model per bit position below
//! `context_count`, one shared model for the remaining positions, and one
//! dedicated model for the sign bit of every multi-bit code.
//!
//! Block layout, little endian:
//! ```text
//! i32  value_count
//! i32  encoded_byte_length
//! u8[encoded_byte_length]  range-coded payload
//! ```
//! Decoding reads exactly the block, so blocks can be embedded in larger
//! files with other fields following them.

use std::io::{Read, Write};

use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::binarizer::Binarizer;
use crate::context::{BinaryModel, ContextBinaryStats};
use crate::error::{CodecError, CodecResult};
use crate::range_coder::{RangeDecoder, RangeEncoder};

/// Size of the block header in bytes.
pub const HEADER_LEN: usize = 8;
/// Largest accepted context order.
pub const MAX_CONTEXT_DEPTH: usize = 16;

/// Parameters of the arithmetic coder. Encoder and decoder must agree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArithCoderConfig {
    /// Length of the truncated unary prefix.
    pub cutoff: u32,
    /// Exp-Golomb order of the tail.
    pub order: u32,
    /// Number of bit positions with their own context model.
    pub context_count: usize,
    /// Number of previous bits selecting the sub-model.
    pub context_depth: usize,
}

impl Default for ArithCoderConfig {
    fn default() -> Self {
        Self {
            cutoff: 9,
            order: 3,
            context_count: 12,
            context_depth: 2,
        }
    }
}

impl ArithCoderConfig {
    pub fn with_cutoff(mut self, cutoff: u32) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = order;
        self
    }

    pub fn with_context_count(mut self, count: usize) -> Self {
        self.context_count = count;
        self
    }

    pub fn with_context_depth(mut self, depth: usize) -> Self {
        self.context_depth = depth;
        self
    }

    pub fn validate(&self) -> CodecResult<()> {
        if self.context_depth > MAX_CONTEXT_DEPTH {
            return Err(CodecError::InvalidConfig(format!(
                "context depth {} exceeds {}",
                self.context_depth, MAX_CONTEXT_DEPTH
            )));
        }
        Binarizer::new(self.cutoff, self.order).map(|_| ())
    }
}

/// Per-call bank of context models.
struct ModelBank {
    positional: Vec<ContextBinaryStats>,
    rest: ContextBinaryStats,
    sign: ContextBinaryStats,
}

impl ModelBank {
    fn new(config: &ArithCoderConfig) -> Self {
        Self {
            positional: vec![ContextBinaryStats::new(config.context_depth); config.context_count],
            rest: ContextBinaryStats::new(config.context_depth),
            sign: ContextBinaryStats::new(config.context_depth),
        }
    }

    fn select(&mut self, position: usize, is_sign: bool) -> &mut ContextBinaryStats {
        if is_sign {
            &mut self.sign
        } else if position < self.positional.len() {
            &mut self.positional[position]
        } else {
            &mut self.rest
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArithCoder {
    config: ArithCoderConfig,
    binarizer: Binarizer,
}

impl Default for ArithCoder {
    fn default() -> Self {
        let config = ArithCoderConfig::default();
        Self {
            config,
            binarizer: Binarizer::from_parts(config.cutoff, config.order),
        }
    }
}

impl ArithCoder {
    pub fn new(config: ArithCoderConfig) -> CodecResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            binarizer: Binarizer::new(config.cutoff, config.order)?,
        })
    }

    pub fn config(&self) -> &ArithCoderConfig {
        &self.config
    }

    /// Range-codes `values` without the block header.
    pub fn encode_payload(&self, values: &[i32]) -> Vec<u8> {
        let mut coder = RangeEncoder::new();
        let mut models = ModelBank::new(&self.config);
        let mut code = Vec::with_capacity(self.binarizer.max_code_len());

        for &value in values {
            code.clear();
            self.binarizer.code_into(value, &mut code);
            let last = code.len() - 1;
            for (j, &bit) in code.iter().enumerate() {
                let model = models.select(j, j > 0 && j == last);
                coder.encode_bit(model.p0(), model.p1(), bit);
                model.update(bit);
            }
        }
        coder.finish()
    }

    /// Decodes `count` values from a bare payload.
    pub fn decode_payload(&self, payload: &[u8], count: usize) -> CodecResult<Vec<i32>> {
        let mut coder = RangeDecoder::new(payload)?;
        let mut models = ModelBank::new(&self.config);
        let max_len = self.binarizer.max_code_len();
        let mut values = Vec::with_capacity(count);
        let mut code = Vec::with_capacity(max_len);

        for i in 0..count {
            code.clear();
            while !self.binarizer.is_code(&code) {
                if code.len() >= max_len {
                    return Err(CodecError::CorruptStream(format!(
                        "value {} does not terminate within {} bits",
                        i, max_len
                    )));
                }
                let model = models.select(code.len(), self.binarizer.is_sign(&code));
                let bit = coder.decode_bit(model.p0(), model.p1())?;
                model.update(bit);
                code.push(bit);
            }
            values.push(self.binarizer.decode(&code)?);
        }
        trace!(
            "decoded {} values from {} of {} payload bytes",
            count,
            coder.bytes_consumed(),
            payload.len()
        );
        Ok(values)
    }

    /// Writes one coded block; returns the number of bytes written.
    pub fn encode<W: Write>(&self, values: &[i32], out: &mut W) -> CodecResult<usize> {
        let count = i32::try_from(values.len()).map_err(|_| {
            CodecError::InvalidConfig(format!("{} values do not fit a block", values.len()))
        })?;
        let payload = self.encode_payload(values);
        let len = i32::try_from(payload.len()).map_err(|_| {
            CodecError::InvalidConfig(format!("payload of {} bytes is too large", payload.len()))
        })?;

        out.write_all(&count.to_le_bytes())?;
        out.write_all(&len.to_le_bytes())?;
        out.write_all(&payload)?;

        debug!(
            "encoded {} values into {} bytes ({:.3} bits/value)",
            values.len(),
            payload.len(),
            8.0 * payload.len() as f64 / values.len().max(1) as f64
        );
        Ok(HEADER_LEN + payload.len())
    }

    /// Reads one coded block, leaving `input` just past its payload.
    pub fn decode<R: Read>(&self, input: &mut R) -> CodecResult<Vec<i32>> {
        let count = read_len(input, "value count")?;
        let len = read_len(input, "payload length")?;

        let mut payload = vec![0u8; len];
        input.read_exact(&mut payload).map_err(|e| {
            CodecError::CorruptStream(format!("payload of {} bytes truncated: {}", len, e))
        })?;
        self.decode_payload(&payload, count)
    }

    /// Quantizes `data` with step `q` (nearest integer, ties to even) and
    /// writes one coded block.
    pub fn encode_doubles<W: Write>(&self, data: &[f64], q: f64, out: &mut W) -> CodecResult<usize> {
        check_step(q)?;
        let quantized = data
            .iter()
            .map(|&v| {
                let scaled = (v / q).round_ties_even();
                if scaled.is_finite() && scaled >= i32::MIN as f64 && scaled <= i32::MAX as f64 {
                    Ok(scaled as i32)
                } else {
                    Err(CodecError::InvalidConfig(format!(
                        "value {} is out of range for quantization step {}",
                        v, q
                    )))
                }
            })
            .collect::<CodecResult<Vec<i32>>>()?;
        self.encode(&quantized, out)
    }

    /// Inverse of [`ArithCoder::encode_doubles`], exact up to `q / 2`.
    pub fn decode_doubles<R: Read>(&self, q: f64, input: &mut R) -> CodecResult<Vec<f64>> {
        check_step(q)?;
        Ok(self
            .decode(input)?
            .into_iter()
            .map(|v| f64::from(v) * q)
            .collect())
    }
}

fn check_step(q: f64) -> CodecResult<()> {
    if q > 0.0 && q.is_finite() {
        Ok(())
    } else {
        Err(CodecError::InvalidConfig(format!(
            "quantization step must be positive and finite, got {}",
            q
        )))
    }
}

fn read_len<R: Read>(input: &mut R, what: &str) -> CodecResult<usize> {
    let mut buf = [0u8; 4];
    input
        .read_exact(&mut buf)
        .map_err(|e| CodecError::CorruptStream(format!("missing {}: {}", what, e)))?;
    let value = i32::from_le_bytes(buf);
    usize::try_from(value)
        .map_err(|_| CodecError::CorruptStream(format!("negative {}: {}", what, value)))
}
