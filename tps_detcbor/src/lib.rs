/***************************************************************************************************
 * Copyright (c) 2023-2024 Qualcomm Innovation Center, Inc. All rights reserved.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy of this software
 * and associated documentation files (the “Software”), to deal in the Software without
 * restriction, including without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice (including the next
 * paragraph) shall be included in all copies or substantial portions of the
 * Software.
 *
 * THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
 * BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
 * DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
 **************************************************************************************************/
/***************************************************************************************************
 * tps_detcbor module definition
 *
 * A deterministic CBOR (RFC8949) encoder and streaming decoder for constrained systems. This
 * implementation is designed for use in constrained systems and requires neither the Rust
 * standard library nor an allocator.
 **************************************************************************************************/

// Default configuration
#![no_std]
#![warn(missing_docs)]

//! # TPS_DETCBOR
//!
//! The `tps_detcbor` crate provides a CBOR implementation for embedded targets that need the
//! deterministic encodings used by COSE [RFC 9052](https://datatracker.ietf.org/doc/rfc9052/),
//! CWT and CDDL-driven IoT protocols: preferred serialization, sorted (CDE) map ordering and
//! the dCBOR numeric reduction profile.
//!
//! The encoder writes into a byte buffer of your choice and the decoder traverses one; neither
//! allocates, and all working state lives in a fixed-size context that fits on the stack. An
//! allocator is only used by tests and the `full` diagnostic printer.
//!
//! ## Features
//!
//! - All CBOR primitive types: positive and negative integers (the full 65 bit negative
//!   range), `tstr`, `bstr`, arrays, maps, tags, simples and floats including `f16`.
//! - Preferred serialization for integers and floats; dCBOR float-to-integer reduction.
//! - Deterministic map encoding: maps are sorted in place at close with duplicate detection.
//! - Big numbers (tags 2/3), decimal fractions (tag 4), big floats (tag 5) and dates (tags
//!   0/1) are understood on both sides.
//! - Byte-string-wrapped CBOR for COSE payload construction, with in-place back-patching.
//! - A bounded decode mode: enter a map, look entries up by label in one pass, rewind, exit.
//! - Numeric projection of any numeric item into i64/u64/f64 with explicit overflow
//!   reporting.
//!
//! ## Encoding
//!
//! ```
//! use tps_detcbor::encoder::Encoder;
//! use tps_detcbor::error::CBORError;
//!
//! fn main() -> Result<(), CBORError> {
//!     let mut bytes = [0u8; 64];
//!     let mut enc = Encoder::new(&mut bytes);
//!     enc.open_map();
//!     enc.add_i64(10).add_bytes(&[0x94, 0x8f, 0x88, 0x60]);
//!     enc.add_i64(258).add_u64(64242);
//!     enc.add_i64(262).add_bool(true);
//!     enc.close_map_sorted();
//!     let encoded = enc.finish()?;
//!     assert_eq!(encoded[0], 0xa3);
//!     Ok(())
//! }
//! ```
//!
//! ## Decoding
//!
//! ```
//! use core::convert::TryFrom;
//! use tps_detcbor::decoder::{Allowable, Decoder, MapKey};
//! use tps_detcbor::error::CBORError;
//! use tps_detcbor::types::allow;
//!
//! fn main() -> Result<(), CBORError> {
//!     let input: &[u8] = &[0xa2, 0x01, 0x02, 0x03, 0x04];
//!     let mut dec = Decoder::new(input);
//!     dec.enter_map()?;
//!     let item = dec.item_in_map(MapKey::Int(3), Allowable::new(allow::UINT))?;
//!     assert_eq!(u64::try_from(&item)?, 4);
//!     dec.exit_map()?;
//!     Ok(())
//! }
//! ```

// Pull in std if we are testing or if it is defined as feature (because we run tests on a
// platform supporting I/O and full feature set.
#[cfg(any(feature = "std", test))]
extern crate std;

// If we are really building no_std, pull in core as well. It is aliased as std so that "use"
// statements are always the same
#[cfg(all(not(feature = "std"), not(test)))]
extern crate core as std;

extern crate half;

#[cfg(feature = "full")]
extern crate chrono;

pub(crate) mod bounded;
pub(crate) mod buffer;
pub(crate) mod constants;
pub(crate) mod decode;
mod diag;
pub(crate) mod encode;
pub(crate) mod float;
pub(crate) mod head;
pub(crate) mod number;

/// The `error` module contains error definitions used throughout `tps_detcbor`.
pub mod error;

/// The `types` module exports the decoded item model ([`types::CborItem`] and its parts) and
/// the bitmask constant modules used by lookups and numeric conversions.
pub mod types {
    pub use super::constants::{allow, convert};
    pub use super::decode::{CborItem, Label, Mantissa, Tags, Value};
}

/// The `encoder` module exports the [`encoder::Encoder`] context used to serialize values as
/// CBOR items on a caller-supplied buffer.
pub mod encoder {
    pub use super::encode::{EncodeMode, Encoder};
}

/// The `decoder` module exports the pull [`decoder::Decoder`], the bounded-mode lookup types,
/// and the numeric conversion functions.
pub mod decoder {
    pub use super::bounded::{Allowable, MapKey, MapQuery};
    pub use super::decode::{DecodeMode, Decoder};
    #[cfg(feature = "float")]
    pub use super::number::to_f64;
    pub use super::number::{
        extract_big_number, promote_number, to_i64, to_u64, Conversions,
    };
}

/// The `ieee754` module exports the bit-level float conversion core: lossless widening,
/// lossless-only shrinking and whole-number classification, none of which require floating
/// point hardware.
pub mod ieee754 {
    pub use super::float::{
        double_nan_has_payload, double_round_to_integer, double_to_half, double_to_integer,
        double_to_single, half_to_double_bits, shrink_double, shrink_single,
        single_nan_has_payload, single_to_double_bits, single_to_half, single_to_integer,
        u64_to_double_exact, IntResult, Shrunk, HALF_QUIET_NAN,
    };
}

/// Diagnostic notation rendering, available with the `full` feature.
#[cfg(feature = "full")]
pub mod debug {
    pub use super::diag::{diag_to_string, print_hex, Diag};
}
