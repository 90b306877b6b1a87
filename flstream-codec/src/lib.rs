//! Adaptive binary arithmetic coding for integer streams.
//!
//! The codec is layered bottom-up:
//! - [`range_coder`]: binary range coder with bit-plus-follow carry handling
//! - [`context`]: quantized probability state machine and order-k context models
//! - [`binarizer`]: signed integer to self-delimiting bit code (truncated unary,
//!   Exp-Golomb tail, sign bit)
//! - [`arith`]: the façade driving binarization and context models over whole
//!   arrays, writing length-prefixed blocks
//! - [`tuning`]: offline exhaustive search for the coder parameters
//!
//! Every encode/decode call owns its own coder and model bank, so no state is
//! shared between concurrent operations. The only process-wide data is the
//! read-only state transition table built on first use.

pub mod arith;
pub mod binarizer;
pub mod context;
pub mod error;
pub mod range_coder;
pub mod tuning;

#[cfg(test)]
mod tests;

pub use arith::{ArithCoder, ArithCoderConfig};
pub use binarizer::Binarizer;
pub use context::{BinaryModel, ContextBinaryStats, CountingStats, QuantizedStats};
pub use error::{CodecError, CodecResult};
pub use range_coder::{RangeDecoder, RangeEncoder};
pub use tuning::{TuningRanges, encode_tuned, tune};
