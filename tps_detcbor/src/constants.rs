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
 * tps_detcbor CBOR constants
 *
 * A deterministic CBOR encoder and streaming decoder for constrained systems. Requires neither
 * the Rust standard library nor an allocator.
 **************************************************************************************************/

/// Major Type bitmask
pub const MT_MASK: u8 = 0b111_00000;
/// Additional Information bitmask
pub const AI_MASK: u8 = 0b000_11111;
/// Shift to move a Major Type to/from the top three bits of the initial byte
pub const MT_SHIFT: u8 = 5;

/// Major Type 0 (Positive integers)
pub const MT_UINT: u8 = 0;
/// Major Type 1 (Negative integers)
pub const MT_NINT: u8 = 1;
/// Major Type 2 (Byte Strings)
pub const MT_BSTR: u8 = 2;
/// Major Type 3 (Text Strings)
pub const MT_TSTR: u8 = 3;
/// Major Type 4 (Array)
pub const MT_ARRAY: u8 = 4;
/// Major Type 5 (Map)
pub const MT_MAP: u8 = 5;
/// Major Type 6 (Tag)
pub const MT_TAG: u8 = 6;
/// Major Type 7 (Floats, simple types and break)
pub const MT_SIMPLE: u8 = 7;

/// Maximum value of an argument mapped directly on the AI bits
pub const AI_DIRECT_MAX: u8 = 23;
/// Indicates one byte of argument follows the initial byte
pub const AI_ONE_BYTE: u8 = 24;
/// Indicates two bytes of argument follow the initial byte
pub const AI_TWO_BYTES: u8 = 25;
/// Indicates four bytes of argument follow the initial byte
pub const AI_FOUR_BYTES: u8 = 26;
/// Indicates eight bytes of argument follow the initial byte
pub const AI_EIGHT_BYTES: u8 = 27;
/// Indicates an indefinite length item (or, with Major Type 7, a break)
pub const AI_INDEFINITE: u8 = 31;

/// The break byte terminating an indefinite length array or map
pub const BREAK_BYTE: u8 = 0xff;

/// Maximum depth of nested arrays, maps and byte string wraps, on both the encode and the
/// decode side. Contexts hold their nesting stack inline, so this bound is what keeps them
/// stack-allocatable.
pub const MAX_NESTING: usize = 16;
/// Maximum number of items (arrays) or entries (maps) in a single aggregate
pub const MAX_AGGREGATE_ITEMS: u64 = 65534;
/// Maximum size of an encoded CBOR document
pub const MAX_ENCODED_SIZE: usize = u32::MAX as usize;
/// Maximum number of tag numbers retained on a single decoded item
pub const MAX_TAGS_PER_ITEM: usize = 4;

/// Tag 0: RFC 3339 date/time string
pub const TAG_DATE_TEXT: u64 = 0;
/// Tag 1: epoch-based date/time
pub const TAG_DATE_EPOCH: u64 = 1;
/// Tag 2: positive big number
pub const TAG_POS_BIGNUM: u64 = 2;
/// Tag 3: negative big number
pub const TAG_NEG_BIGNUM: u64 = 3;
/// Tag 4: decimal fraction
pub const TAG_DECIMAL_FRACTION: u64 = 4;
/// Tag 5: big float
pub const TAG_BIGFLOAT: u64 = 5;
/// Tag 24: encoded CBOR item in a byte string
pub const TAG_CBOR_ENCODED: u64 = 24;

/// Module defining bitfield values for the types accepted by a lookup in a bounded map. See
/// `Allowable`.
pub mod allow {
    pub const NONE: u32 = 1;
    pub const UINT: u32 = 2;
    pub const NINT: u32 = 4;
    pub const BSTR: u32 = 8;
    pub const TSTR: u32 = 16;
    pub const ARRAY: u32 = 32;
    pub const MAP: u32 = 64;
    pub const TAG: u32 = 128;
    pub const FLOAT: u32 = 256;
    pub const SIMPLE: u32 = 512;
    pub const BIGNUM: u32 = 1024;
    pub const EXPONENT: u32 = 2048;
    pub const DATE: u32 = 4096;
    pub const ANY: u32 = 0xffff_ffff;
}

/// Module defining bitfield values for the source types a numeric conversion may draw from.
/// See `Conversions`.
pub mod convert {
    pub const XINT: u32 = 1;
    pub const FLOAT: u32 = 2;
    pub const BIGNUM: u32 = 4;
    pub const DECIMAL_FRACTION: u32 = 8;
    pub const BIGFLOAT: u32 = 16;
    pub const ALL: u32 = 0xffff_ffff;
}
