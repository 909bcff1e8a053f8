/***************************************************************************************************
 * Copyright (c) 2023-2024 Qualcomm Innovation Center, Inc. All rights reserved.
 *
 * Permission is hereby granted, free of charge, to any person obtaining a copy of this software
 * and associated documentation files (the “Software”), to deal in the Software without
 * restriction, including without limitation the rights to use, copy, modify, merge, publish,
 * distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the
 * Software is furnished to do so, subject to the following conditions:
 *
 * The above copyright notice and this permission notice shall be included in all copies or
 * substantial portions of the Software.
 *
 * THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING
 * BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND
 * NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM,
 * DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
 * OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.
 **************************************************************************************************/
/***************************************************************************************************
 * tps_detcbor CBOR head codec
 *
 * Every CBOR data item starts with a head: an initial byte holding the major type and the
 * additional information, followed by 0, 1, 2, 4 or 8 argument bytes in network byte order.
 * This module encodes and decodes heads and nothing else.
 **************************************************************************************************/
use crate::buffer::ReadCursor;
use crate::constants::*;
use crate::error::{CBORError, Result};

#[cfg(feature = "trace")]
use func_trace::trace;

#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/// The longest possible head: initial byte plus an eight byte argument.
pub const MAX_HEAD_LEN: usize = 9;

/// A decoded CBOR head.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Head {
    /// The major type, 0..=7
    pub major: u8,
    /// The argument. Zero for an indefinite length head.
    pub arg: u64,
    /// The additional information bits, needed to tell a half float from a single float and a
    /// definite length from an indefinite one.
    pub ai: u8,
}

impl Head {
    /// `true` if this head opens an indefinite length item or is a break.
    #[inline]
    pub fn is_indefinite(&self) -> bool {
        self.ai == AI_INDEFINITE
    }
}

/// A head encoded into its scratch buffer. The populated bytes are `scratch[..len]`.
#[derive(Debug, Copy, Clone)]
pub struct EncodedHead {
    pub scratch: [u8; MAX_HEAD_LEN],
    pub len: usize,
}

impl EncodedHead {
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.scratch[..self.len]
    }
}

/// Return the number of argument bytes (0, 1, 2, 4 or 8) of the preferred encoding of `arg`,
/// no less than `min_len`. Float encodings pass their exact width as `min_len` so that the bit
/// pattern is never shortened into the wrong additional information value.
pub fn preferred_arg_len(arg: u64, min_len: usize) -> usize {
    let natural = if arg <= AI_DIRECT_MAX as u64 {
        0
    } else if arg <= u8::MAX as u64 {
        1
    } else if arg <= u16::MAX as u64 {
        2
    } else if arg <= u32::MAX as u64 {
        4
    } else {
        8
    };
    if natural >= min_len {
        natural
    } else {
        min_len
    }
}

/// Encode a head with the preferred (shortest) argument width that satisfies `min_len`.
///
/// The argument is written backward from the end of a nine byte scratch buffer by successive
/// right shifts, so the encoding is independent of host endianness; the populated tail is then
/// copied to the front of the scratch.
#[cfg_attr(feature = "trace", trace)]
pub fn encode_head(major: u8, arg: u64, min_len: usize) -> EncodedHead {
    debug_assert!(major <= 7);
    let mut scratch = [0u8; MAX_HEAD_LEN];
    let arg_len = preferred_arg_len(arg, min_len);

    // Fill argument bytes from the back of the scratch, least significant first
    let mut v = arg;
    for i in 0..arg_len {
        scratch[MAX_HEAD_LEN - 1 - i] = (v & 0xff) as u8;
        v >>= 8;
    }

    let ai = match arg_len {
        0 => arg as u8,
        1 => AI_ONE_BYTE,
        2 => AI_TWO_BYTES,
        4 => AI_FOUR_BYTES,
        _ => AI_EIGHT_BYTES,
    };
    scratch[MAX_HEAD_LEN - 1 - arg_len] = (major << MT_SHIFT) | ai;

    // Forward copy of the populated tail
    let len = arg_len + 1;
    scratch.copy_within(MAX_HEAD_LEN - len..MAX_HEAD_LEN, 0);
    EncodedHead { scratch, len }
}

/// Encode the head that opens an indefinite length item of `major` type.
pub fn encode_indefinite_head(major: u8) -> EncodedHead {
    let mut scratch = [0u8; MAX_HEAD_LEN];
    scratch[0] = (major << MT_SHIFT) | AI_INDEFINITE;
    EncodedHead { scratch, len: 1 }
}

/// Decode one head from the cursor.
///
/// Reserved additional information values 28..=30 report `Unsupported`; short input reports
/// `HitEnd`. An indefinite length head (including the break byte) comes back with
/// `ai == AI_INDEFINITE` and a zero argument.
#[cfg_attr(feature = "trace", trace)]
pub fn decode_head(cur: &mut ReadCursor) -> Result<Head> {
    let initial = cur.get_u8()?;
    let major = initial >> MT_SHIFT;
    let ai = initial & AI_MASK;

    let arg = match ai {
        0..=AI_DIRECT_MAX => ai as u64,
        AI_ONE_BYTE => u8::from_be_bytes(cur.get_array::<1>()?) as u64,
        AI_TWO_BYTES => u16::from_be_bytes(cur.get_array::<2>()?) as u64,
        AI_FOUR_BYTES => u32::from_be_bytes(cur.get_array::<4>()?) as u64,
        AI_EIGHT_BYTES => u64::from_be_bytes(cur.get_array::<8>()?),
        28..=30 => return Err(CBORError::Unsupported),
        _ => 0, // AI_INDEFINITE
    };
    Ok(Head { major, arg, ai })
}

/// `true` if `ai` is the shortest additional information encoding of `arg`, the preferred
/// serialization check applied on decode in the deterministic modes.
pub fn is_preferred_head(arg: u64, ai: u8) -> bool {
    if ai == AI_INDEFINITE {
        return true;
    }
    let actual = match ai {
        0..=AI_DIRECT_MAX => 0,
        AI_ONE_BYTE => 1,
        AI_TWO_BYTES => 2,
        AI_FOUR_BYTES => 4,
        _ => 8,
    };
    actual == preferred_arg_len(arg, 0)
}
