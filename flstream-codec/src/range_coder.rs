//! Binary range coder.
//!
//! Classic arithmetic coder over a `B = 30` bit code space with
//! "bit plus follow" carry handling. The interval is kept as `(low, range)`;
//! after every coded bit the interval is renormalized until
//! `range > QUARTER`. The decoder keeps the offset of the code value from
//! `low` and so never needs `low` itself.
//!
//! Both sides must be driven with the same sequence of `(c0, c1)` frequency
//! pairs. Bits are packed least significant first within each byte.
//!
//! The encoder terminates the stream with all `B + 1` bits of `low`, which is
//! exactly the look-ahead window the decoder primes with. A decoder therefore
//! never reads past the bytes the encoder produced, and running out of input is
//! reported as [`CodecError::CorruptStream`].

use crate::error::{CodecError, CodecResult};

/// Magnitude bits of the code space.
const B: u32 = 30;
const QUARTER: u32 = 2 << (B - 2);
const HALF: u32 = 2 << (B - 1);
/// Full code space, `[0, 2 * HALF)`.
const FULL: u32 = 2 * HALF;

/// Splits the interval for one bit: returns which symbol is less probable and
/// the width given to it.
#[inline]
fn split(range: u32, c0: u32, c1: u32) -> (bool, u32) {
    debug_assert!(c0 >= 1 && c1 >= 1, "frequency counts must be positive");
    let (lps, c_lps) = if c0 < c1 { (false, c0) } else { (true, c1) };
    let r = range / (c0 + c1);
    (lps, r * c_lps)
}

#[derive(Debug, Default)]
struct BitWriter {
    bytes: Vec<u8>,
    buffer: u8,
    position: u8,
}

impl BitWriter {
    fn write_bit(&mut self, bit: bool) {
        if bit {
            self.buffer |= 1 << self.position;
        }
        self.position += 1;
        if self.position == 8 {
            self.bytes.push(self.buffer);
            self.buffer = 0;
            self.position = 0;
        }
    }

    fn flush(mut self) -> Vec<u8> {
        if self.position != 0 {
            self.bytes.push(self.buffer);
        }
        self.bytes
    }
}

#[derive(Debug)]
struct BitReader<'a> {
    bytes: &'a [u8],
    index: usize,
    position: u8,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            index: 0,
            position: 0,
        }
    }

    fn read_bit(&mut self) -> CodecResult<bool> {
        let byte = *self.bytes.get(self.index).ok_or_else(|| {
            CodecError::CorruptStream(format!(
                "read past the end of a {} byte payload",
                self.bytes.len()
            ))
        })?;
        let bit = (byte >> self.position) & 1 == 1;
        self.position += 1;
        if self.position == 8 {
            self.position = 0;
            self.index += 1;
        }
        Ok(bit)
    }
}

/// Encoding half of the range coder. Consumed by [`RangeEncoder::finish`].
#[derive(Debug)]
pub struct RangeEncoder {
    low: u32,
    range: u32,
    bits_outstanding: u64,
    writer: BitWriter,
}

impl Default for RangeEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RangeEncoder {
    pub fn new() -> Self {
        Self {
            low: 0,
            range: FULL,
            bits_outstanding: 0,
            writer: BitWriter::default(),
        }
    }

    /// Codes one bit given the current frequency estimates of 0 and 1.
    pub fn encode_bit(&mut self, c0: u32, c1: u32, bit: bool) {
        let (lps, r_lps) = split(self.range, c0, c1);
        if bit == lps {
            self.low += self.range - r_lps;
            self.range = r_lps;
        } else {
            self.range -= r_lps;
        }
        self.renormalize();
    }

    /// Flushes the final interval and any pending carry bits and returns the
    /// coded payload.
    pub fn finish(mut self) -> Vec<u8> {
        for i in 0..=B {
            let bit = (self.low >> (B - i)) & 1 == 1;
            self.bit_plus_follow(bit);
        }
        self.writer.flush()
    }

    fn renormalize(&mut self) {
        while self.range <= QUARTER {
            if self.low >= HALF {
                self.bit_plus_follow(true);
                self.low -= HALF;
            } else if self.low + self.range <= HALF {
                self.bit_plus_follow(false);
            } else {
                // interval straddles the midpoint, defer the decision
                self.bits_outstanding += 1;
                self.low -= QUARTER;
            }
            self.low *= 2;
            self.range *= 2;
        }
    }

    fn bit_plus_follow(&mut self, bit: bool) {
        self.writer.write_bit(bit);
        while self.bits_outstanding > 0 {
            self.writer.write_bit(!bit);
            self.bits_outstanding -= 1;
        }
    }
}

/// Decoding half of the range coder, reading from a borrowed payload.
#[derive(Debug)]
pub struct RangeDecoder<'a> {
    range: u32,
    /// Offset of the code value from the interval's low end.
    value: u32,
    reader: BitReader<'a>,
}

impl<'a> RangeDecoder<'a> {
    /// Primes the `B + 1` bit look-ahead window.
    pub fn new(payload: &'a [u8]) -> CodecResult<Self> {
        let mut reader = BitReader::new(payload);
        let mut value = 0u32;
        for _ in 0..=B {
            value = 2 * value + u32::from(reader.read_bit()?);
        }
        Ok(Self {
            range: FULL,
            value,
            reader,
        })
    }

    /// Decodes one bit; must see the same `(c0, c1)` the encoder saw.
    pub fn decode_bit(&mut self, c0: u32, c1: u32) -> CodecResult<bool> {
        let (lps, r_lps) = split(self.range, c0, c1);
        let split_point = self.range - r_lps;
        let bit = if self.value >= split_point {
            self.value -= split_point;
            self.range = r_lps;
            lps
        } else {
            self.range = split_point;
            !lps
        };
        while self.range <= QUARTER {
            self.range *= 2;
            self.value = 2 * self.value + u32::from(self.reader.read_bit()?);
        }
        Ok(bit)
    }

    /// Number of payload bytes touched so far.
    pub fn bytes_consumed(&self) -> usize {
        self.reader.index + usize::from(self.reader.position > 0)
    }
}
