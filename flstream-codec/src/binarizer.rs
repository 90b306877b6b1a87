//! Signed integer binarization.
//!
//! A value `v` is mapped to a self-delimiting bit string:
//! - `0` is the single bit `0`
//! - otherwise `min(cutoff, |v|)` ones, then a terminating `0` if
//!   `|v| < cutoff`, or else the Exp-Golomb code of order `k` of `|v| - cutoff`,
//!   and finally one sign bit (`1` = negative)
//!
//! [`Binarizer::is_code`] and [`Binarizer::is_sign`] let a decoder that sees
//! the code one bit at a time know when the code is complete and when the next
//! bit is the sign. They follow the exact length arithmetic of
//! [`Binarizer::code`]; any disagreement desynchronizes decoding.

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult};

/// Largest accepted Exp-Golomb order.
pub const MAX_ORDER: u32 = 24;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binarizer {
    cutoff: u32,
    order: u32,
}

impl Binarizer {
    pub fn new(cutoff: u32, order: u32) -> CodecResult<Self> {
        if cutoff == 0 {
            return Err(CodecError::InvalidConfig(
                "binarizer cutoff must be at least 1".to_string(),
            ));
        }
        if order > MAX_ORDER {
            return Err(CodecError::InvalidConfig(format!(
                "Exp-Golomb order {} exceeds {}",
                order, MAX_ORDER
            )));
        }
        Ok(Self { cutoff, order })
    }

    /// Skips validation; callers pass known-good parameters.
    pub(crate) const fn from_parts(cutoff: u32, order: u32) -> Self {
        Self { cutoff, order }
    }

    pub fn cutoff(&self) -> u32 {
        self.cutoff
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Upper bound on the length of any code for an `i32`.
    pub fn max_code_len(&self) -> usize {
        // at most 33 Exp-Golomb prefix ones are needed to cover 2^31
        (self.cutoff + 1 + 2 * (self.order + 34) + 1) as usize
    }

    /// Binarizes one value.
    pub fn code(&self, value: i32) -> Vec<bool> {
        let mut bits = Vec::new();
        self.code_into(value, &mut bits);
        bits
    }

    /// Binarizes one value, appending to `bits`.
    pub fn code_into(&self, value: i32, bits: &mut Vec<bool>) {
        if value == 0 {
            bits.push(false);
            return;
        }
        let abs = u64::from(value.unsigned_abs());
        let cutoff = u64::from(self.cutoff);
        let ones = abs.min(cutoff);
        bits.extend(std::iter::repeat_n(true, ones as usize));
        if abs < cutoff {
            bits.push(false);
        } else {
            exp_golomb(abs - cutoff, self.order, bits);
        }
        bits.push(value < 0);
    }

    /// Inverts [`Binarizer::code`] on a complete code.
    pub fn decode(&self, bits: &[bool]) -> CodecResult<i32> {
        let n = bits.len();
        match n {
            0 => return Err(corrupt("empty code")),
            1 if !bits[0] => return Ok(0),
            1 => return Err(corrupt("single-bit code must be 0")),
            _ => {}
        }

        let cutoff = self.cutoff as usize;
        let magnitude: u64 = if n < cutoff + 2 {
            (n - 2) as u64
        } else {
            // the Exp-Golomb tail starts right after the `cutoff` unary ones
            let mut p = cutoff;
            let mut lk = self.order;
            let mut prefix = 0u64;
            while bit_at(bits, p)? {
                if lk >= 40 {
                    return Err(corrupt("Exp-Golomb prefix too long"));
                }
                prefix += 1u64 << lk;
                lk += 1;
                p += 1;
            }
            p += 1;
            let mut tail = 0u64;
            for _ in 0..lk {
                tail = 2 * tail + u64::from(bit_at(bits, p)?);
                p += 1;
            }
            if p + 1 != n {
                return Err(corrupt("code length does not match its Exp-Golomb prefix"));
            }
            prefix + cutoff as u64 + tail
        };

        let signed = if bits[n - 1] {
            -(magnitude as i64)
        } else {
            magnitude as i64
        };
        i32::try_from(signed).map_err(|_| corrupt("decoded value does not fit in i32"))
    }

    /// True iff `bits` is a complete code.
    pub fn is_code(&self, bits: &[bool]) -> bool {
        self.expected_len(bits).is_some_and(|len| bits.len() == len)
    }

    /// True iff the next bit to be appended to `bits` is the sign bit.
    pub fn is_sign(&self, bits: &[bool]) -> bool {
        bits.len() >= 2 && self.expected_len(bits).is_some_and(|len| bits.len() + 1 == len)
    }

    /// Total code length implied by the prefix seen so far, if the prefix
    /// already determines it.
    fn expected_len(&self, bits: &[bool]) -> Option<usize> {
        let n = bits.len();
        if n == 0 {
            return None;
        }
        if n == 1 {
            return if bits[0] { None } else { Some(1) };
        }
        let cutoff = self.cutoff as usize;
        let mut p = 0;
        while p < n && bits[p] && p < cutoff {
            p += 1;
        }
        if p < cutoff {
            if p == n {
                return None;
            }
            // p ones, the terminating zero and the sign
            return Some(p + 2);
        }
        let k = self.order as usize;
        let mut lk = k;
        while p < n && bits[p] {
            p += 1;
            lk += 1;
        }
        if p == n {
            return None;
        }
        Some(cutoff + (lk - k) + 1 + lk + 1)
    }
}

/// Exp-Golomb code of order `k`.
pub fn exp_golomb(mut value: u64, mut k: u32, bits: &mut Vec<bool>) {
    loop {
        if value >= 1u64 << k {
            bits.push(true);
            value -= 1u64 << k;
            k += 1;
        } else {
            bits.push(false);
            for j in (0..k).rev() {
                bits.push((value >> j) & 1 == 1);
            }
            break;
        }
    }
}

fn bit_at(bits: &[bool], p: usize) -> CodecResult<bool> {
    bits.get(p)
        .copied()
        .ok_or_else(|| corrupt("code ends inside its Exp-Golomb tail"))
}

fn corrupt(msg: &str) -> CodecError {
    CodecError::CorruptStream(msg.to_string())
}
