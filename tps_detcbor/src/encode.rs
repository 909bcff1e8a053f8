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
 * tps_detcbor CBOR Encoder
 *
 * A deterministic CBOR serializer writing into a caller-supplied buffer. Aggregate heads are
 * inserted in place when the aggregate closes, so no two-pass size measurement is needed, and
 * maps can be closed in sorted (deterministic) order. All operations follow the sticky error
 * discipline: the first failure latches, later operations are no-ops, and `finish` reports it.
 **************************************************************************************************/
use crate::buffer::{ReadCursor, WriteCursor};
use crate::constants::*;
use crate::decode::skip_item;
use crate::error::{CBORError, Result};
use crate::float::{
    double_nan_has_payload, double_to_integer, half_to_double_bits, shrink_double,
    single_to_double_bits, IntResult, Shrunk,
};
use crate::head::{encode_head, encode_indefinite_head};

use std::cmp::Ordering;

use half::f16;

#[cfg(feature = "trace")]
use func_trace::trace;

#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/// Frame marker for an in-place byte string region opened with [`Encoder::open_bytes`]. Not a
/// real major type, so mismatched closes are caught.
const FRAME_BYTES: u8 = 0xfe;
/// Frame marker for the top level pseudo-frame.
const FRAME_TOP: u8 = 0xff;

/// The serialization discipline of an encoder.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EncodeMode {
    /// Any well-formed CBOR: integers still use preferred serialization, floats keep the
    /// width the caller gave them, maps close unsorted
    Cbor,
    /// Preferred serialization: floats shrink to their smallest lossless width
    Preferred,
    /// Common Deterministic Encoding: preferred serialization, sorted maps, no indefinite
    /// lengths
    Cde,
    /// dCBOR: CDE plus reduction of whole-number floats to integers and rejection of NaN
    /// payloads
    DCbor,
}

impl EncodeMode {
    #[inline]
    fn preferred_floats(&self) -> bool {
        *self != EncodeMode::Cbor
    }

    #[inline]
    fn sorted_maps(&self) -> bool {
        matches!(self, EncodeMode::Cde | EncodeMode::DCbor)
    }

    #[inline]
    fn no_indefinite(&self) -> bool {
        matches!(self, EncodeMode::Cde | EncodeMode::DCbor)
    }
}

/// One open aggregate on the encode side: where its head will be inserted, what opened it and
/// how many items it has accumulated so far.
#[derive(Debug, Copy, Clone)]
struct EncodeFrame {
    major: u8,
    start: u32,
    items: u32,
    indefinite: bool,
}

impl EncodeFrame {
    const TOP: EncodeFrame = EncodeFrame {
        major: FRAME_TOP,
        start: 0,
        items: 0,
        indefinite: false,
    };
}

/// A CBOR encoder over a caller-supplied output buffer.
///
/// Operations chain without intermediate error handling; the first failure latches and
/// [`Encoder::finish`] returns it. A partial buffer is never handed back.
///
/// ```
/// use tps_detcbor::encoder::Encoder;
/// use tps_detcbor::error::CBORError;
///
/// fn main() -> Result<(), CBORError> {
///     let mut bytes = [0u8; 32];
///     let mut enc = Encoder::new(&mut bytes);
///     enc.open_map();
///     enc.add_i64(1).add_text("a");
///     enc.add_i64(2).add_text("b");
///     enc.close_map_sorted();
///     assert_eq!(enc.finish()?, &[0xa2, 0x01, 0x61, 0x61, 0x02, 0x61, 0x62]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct Encoder<'buf> {
    out: WriteCursor<'buf>,
    frames: [EncodeFrame; MAX_NESTING],
    depth: usize,
    err: Option<CBORError>,
    mode: EncodeMode,
    allow_nan_payload: bool,
    only_preferred_big_numbers: bool,
    float_reduction: bool,
    bytes_open: bool,
}

impl<'buf> Encoder<'buf> {
    /// Construct an encoder using preferred serialization, the common case.
    pub fn new(buf: &'buf mut [u8]) -> Encoder<'buf> {
        Encoder::with_mode(buf, EncodeMode::Preferred)
    }

    /// Construct an encoder with an explicit serialization discipline. dCBOR implies float
    /// reduction, canonical NaNs and preferred big numbers; the flag setters below can adjust
    /// the profile afterwards.
    pub fn with_mode(buf: &'buf mut [u8], mode: EncodeMode) -> Encoder<'buf> {
        let dcbor = mode == EncodeMode::DCbor;
        Encoder {
            out: WriteCursor::new(buf),
            frames: [EncodeFrame::TOP; MAX_NESTING],
            depth: 0,
            err: None,
            mode,
            allow_nan_payload: !dcbor,
            only_preferred_big_numbers: dcbor,
            float_reduction: dcbor,
            bytes_open: false,
        }
    }

    /// Permit or reject NaNs whose significand differs from the canonical quiet pattern.
    pub fn set_allow_nan_payload(&mut self, allow: bool) -> &mut Self {
        self.allow_nan_payload = allow;
        self
    }

    /// Refuse the raw (tagged byte string) big number form even when small values would fit.
    pub fn set_only_preferred_big_numbers(&mut self, only: bool) -> &mut Self {
        self.only_preferred_big_numbers = only;
        self
    }

    /// Reduce whole-number floats to integers on the wire.
    pub fn set_float_reduction(&mut self, reduce: bool) -> &mut Self {
        self.float_reduction = reduce;
        self
    }

    /// The latched error, if any operation so far has failed.
    pub fn error(&self) -> Option<CBORError> {
        self.err.or(self.out.error())
    }

    #[inline]
    fn fail(&mut self, e: CBORError) {
        if self.err.is_none() {
            self.err = Some(e);
        }
    }

    /// `true` if the next operation may proceed. Latches `OpenByteString` on use while an
    /// in-place byte region is open.
    fn ready(&mut self) -> bool {
        if self.err.is_some() || self.out.error().is_some() {
            return false;
        }
        if self.bytes_open {
            self.fail(CBORError::OpenByteString);
            return false;
        }
        true
    }

    /// Count one item at the current nesting level. Tags do not count; everything else does.
    fn bump_count(&mut self) {
        self.frames[self.depth].items += 1;
        // Maps count label and value separately here, so the cap check at close is the
        // authoritative one; this only stops runaway loops early
        if self.depth != 0 && self.frames[self.depth].items as u64 > MAX_AGGREGATE_ITEMS * 2 {
            self.fail(CBORError::ArrayTooLong);
        }
    }

    fn emit_head(&mut self, major: u8, arg: u64, min_len: usize) {
        let h = encode_head(major, arg, min_len);
        self.out.append(h.bytes());
    }

    /***********************************************************************************************
     * Scalars
     **********************************************************************************************/

    /// Append an unsigned integer, major type 0, preferred serialization.
    pub fn add_u64(&mut self, v: u64) -> &mut Self {
        if self.ready() {
            self.emit_head(MT_UINT, v, 0);
            self.bump_count();
        }
        self
    }

    /// Append a signed integer as major type 0 or 1, preferred serialization.
    pub fn add_i64(&mut self, v: i64) -> &mut Self {
        if self.ready() {
            if v < 0 {
                self.emit_head(MT_NINT, (-1 - v) as u64, 0);
            } else {
                self.emit_head(MT_UINT, v as u64, 0);
            }
            self.bump_count();
        }
        self
    }

    /// Append the negative integer -1 - `n` as major type 1. This reaches the values down to
    /// -2^64 that do not fit an i64.
    pub fn add_negative_u64(&mut self, n: u64) -> &mut Self {
        if self.ready() {
            self.emit_head(MT_NINT, n, 0);
            self.bump_count();
        }
        self
    }

    /// Append a byte string, major type 2.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        if self.ready() {
            self.emit_head(MT_BSTR, bytes.len() as u64, 0);
            self.out.append(bytes);
            self.bump_count();
        }
        self
    }

    /// Append a text string, major type 3.
    pub fn add_text(&mut self, text: &str) -> &mut Self {
        if self.ready() {
            self.emit_head(MT_TSTR, text.len() as u64, 0);
            self.out.append(text.as_bytes());
            self.bump_count();
        }
        self
    }

    /// Append bytes that are already encoded CBOR, verbatim. The content counts as one item
    /// of the open aggregate regardless of how many items it contains.
    pub fn add_encoded(&mut self, cbor: &[u8]) -> &mut Self {
        if self.ready() {
            self.out.append(cbor);
            self.bump_count();
        }
        self
    }

    /// Tag the next item, major type 6. Tags chain; they do not count as items themselves.
    pub fn add_tag(&mut self, tag: u64) -> &mut Self {
        if self.ready() {
            self.emit_head(MT_TAG, tag, 0);
        }
        self
    }

    /// Append a boolean.
    pub fn add_bool(&mut self, v: bool) -> &mut Self {
        self.add_simple(if v { 21 } else { 20 })
    }

    /// Append null.
    pub fn add_null(&mut self) -> &mut Self {
        self.add_simple(22)
    }

    /// Append undefined.
    pub fn add_undefined(&mut self) -> &mut Self {
        self.add_simple(23)
    }

    /// Append a simple value, major type 7. The values 24..=31 are reserved by RFC 8949 and
    /// latch `EncodeUnsupported`.
    pub fn add_simple(&mut self, v: u8) -> &mut Self {
        if self.ready() {
            if (24..=31).contains(&v) {
                self.fail(CBORError::EncodeUnsupported);
            } else {
                self.emit_head(MT_SIMPLE, v as u64, 0);
                self.bump_count();
            }
        }
        self
    }

    /***********************************************************************************************
     * Floats
     **********************************************************************************************/

    /// Append a double. Under preferred serialization the value shrinks to the smallest
    /// lossless width; with float reduction on, whole numbers in range become integers.
    pub fn add_f64(&mut self, v: f64) -> &mut Self {
        if self.ready() {
            let bits = v.to_bits();
            self.add_float_common(bits, Shrunk::Double(bits));
        }
        self
    }

    /// Append a single precision float, with the same shrinking and reduction rules.
    pub fn add_f32(&mut self, v: f32) -> &mut Self {
        if self.ready() {
            let bits = v.to_bits();
            self.add_float_common(single_to_double_bits(bits), Shrunk::Single(bits));
        }
        self
    }

    /// Append a half precision float, with the same shrinking and reduction rules.
    pub fn add_f16(&mut self, v: f16) -> &mut Self {
        if self.ready() {
            let bits = v.to_bits();
            self.add_float_common(half_to_double_bits(bits), Shrunk::Half(bits));
        }
        self
    }

    /// Append a double at full eight byte width, bypassing preferred shrinking. Refused in
    /// the deterministic modes.
    pub fn add_f64_no_preferred(&mut self, v: f64) -> &mut Self {
        if self.ready() {
            if self.mode.sorted_maps() {
                // CDE and dCBOR never carry non-preferred floats
                self.fail(CBORError::NotPreferred);
            } else if self.nan_rejected(v.to_bits()) {
                self.fail(CBORError::NotAllowed);
            } else {
                self.emit_head(MT_SIMPLE, v.to_bits(), 8);
                self.bump_count();
            }
        }
        self
    }

    /// Append a single precision float at full four byte width, bypassing preferred
    /// shrinking. Refused in the deterministic modes.
    pub fn add_f32_no_preferred(&mut self, v: f32) -> &mut Self {
        if self.ready() {
            if self.mode.sorted_maps() {
                self.fail(CBORError::NotPreferred);
            } else if self.nan_rejected(crate::float::single_to_double_bits(v.to_bits())) {
                self.fail(CBORError::NotAllowed);
            } else {
                self.emit_head(MT_SIMPLE, v.to_bits() as u64, 4);
                self.bump_count();
            }
        }
        self
    }

    fn nan_rejected(&self, d: u64) -> bool {
        !self.allow_nan_payload && double_nan_has_payload(d)
    }

    /// The common float path. `d` is the value's lossless double widening, used for the
    /// reduction and NaN policy decisions; `as_given` is the width the caller supplied, which
    /// is what goes on the wire when preferred shrinking is off.
    fn add_float_common(&mut self, d: u64, as_given: Shrunk) {
        if self.nan_rejected(d) {
            self.fail(CBORError::NotAllowed);
            return;
        }
        if self.float_reduction {
            match double_to_integer(d) {
                IntResult::UInt(v) => {
                    self.emit_head(MT_UINT, v, 0);
                    self.bump_count();
                    return;
                }
                IntResult::Int(v) => {
                    self.emit_head(MT_NINT, (-1 - v) as u64, 0);
                    self.bump_count();
                    return;
                }
                IntResult::Neg65(n) => {
                    self.emit_head(MT_NINT, n, 0);
                    self.bump_count();
                    return;
                }
                IntResult::NaN | IntResult::NoConversion => {}
            }
        }
        let on_wire = if self.mode.preferred_floats() {
            shrink_double(d, !self.allow_nan_payload)
        } else {
            as_given
        };
        match on_wire {
            Shrunk::Half(h) => self.emit_head(MT_SIMPLE, h as u64, 2),
            Shrunk::Single(s) => self.emit_head(MT_SIMPLE, s as u64, 4),
            Shrunk::Double(b) => self.emit_head(MT_SIMPLE, b, 8),
        }
        self.bump_count();
    }

    /***********************************************************************************************
     * Aggregates
     **********************************************************************************************/

    /// Open a definite length array. No head is emitted until the matching close.
    pub fn open_array(&mut self) -> &mut Self {
        self.open_frame(MT_ARRAY, false);
        self
    }

    /// Close the innermost open array, inserting its head with the final item count.
    pub fn close_array(&mut self) -> &mut Self {
        self.close_frame(MT_ARRAY, false, false);
        self
    }

    /// Open a definite length map. Entries are added as label/value item pairs.
    pub fn open_map(&mut self) -> &mut Self {
        self.open_frame(MT_MAP, false);
        self
    }

    /// Close the innermost open map. In the CDE and dCBOR modes the entries are sorted into
    /// deterministic order first.
    pub fn close_map(&mut self) -> &mut Self {
        self.close_frame(MT_MAP, false, self.mode.sorted_maps());
        self
    }

    /// Close the innermost open map, sorting its entries into bytewise ascending order of
    /// their encoded labels. Equal labels latch `DuplicateLabel`.
    pub fn close_map_sorted(&mut self) -> &mut Self {
        self.close_frame(MT_MAP, false, true);
        self
    }

    /// Close the innermost open map without sorting, whatever the mode.
    pub fn close_map_unsorted(&mut self) -> &mut Self {
        self.close_frame(MT_MAP, false, false);
        self
    }

    /// Open an indefinite length array: the head is emitted at once and the close emits the
    /// break byte. Refused in the deterministic modes.
    pub fn open_array_indefinite(&mut self) -> &mut Self {
        self.open_frame(MT_ARRAY, true);
        self
    }

    /// Close an indefinite length array with the break byte.
    pub fn close_array_indefinite(&mut self) -> &mut Self {
        self.close_frame(MT_ARRAY, true, false);
        self
    }

    /// Open an indefinite length map. Refused in the deterministic modes.
    pub fn open_map_indefinite(&mut self) -> &mut Self {
        self.open_frame(MT_MAP, true);
        self
    }

    /// Close an indefinite length map with the break byte.
    pub fn close_map_indefinite(&mut self) -> &mut Self {
        self.close_frame(MT_MAP, true, false);
        self
    }

    /// Open a byte string whose content is the CBOR encoded by the operations up to the
    /// matching close. COSE uses this to sign serialized payloads without a second buffer.
    pub fn open_bstr_wrap(&mut self) -> &mut Self {
        self.open_frame(MT_BSTR, false);
        self
    }

    /// Close the byte string wrap, inserting the byte string head with the content length.
    pub fn close_bstr_wrap(&mut self) -> &mut Self {
        self.close_frame(MT_BSTR, false, false);
        self
    }

    /// Abandon an open byte string wrap before anything was written into it. The wrap is
    /// removed as if it was never opened; content makes the cancel fail with `CannotCancel`.
    pub fn cancel_bstr_wrap(&mut self) -> &mut Self {
        if self.ready() {
            if self.depth == 0 {
                self.fail(CBORError::TooManyCloses);
            } else {
                let f = self.frames[self.depth];
                if f.major != MT_BSTR || f.indefinite {
                    self.fail(CBORError::CloseMismatch);
                } else if self.out.tell() as u32 > f.start {
                    self.fail(CBORError::CannotCancel);
                } else {
                    self.depth -= 1;
                    self.frames[self.depth].items -= 1;
                }
            }
        }
        self
    }

    fn open_frame(&mut self, major: u8, indefinite: bool) {
        if !self.ready() {
            return;
        }
        if indefinite && self.mode.no_indefinite() {
            self.fail(CBORError::EncodeUnsupported);
            return;
        }
        if self.depth + 1 >= MAX_NESTING {
            self.fail(CBORError::NestingTooDeep);
            return;
        }
        self.bump_count();
        if indefinite {
            self.out.append(encode_indefinite_head(major).bytes());
        }
        self.depth += 1;
        self.frames[self.depth] = EncodeFrame {
            major,
            start: self.out.tell() as u32,
            items: 0,
            indefinite,
        };
    }

    fn close_frame(&mut self, major: u8, indefinite: bool, sort: bool) {
        if !self.ready() {
            return;
        }
        if self.depth == 0 {
            self.fail(CBORError::TooManyCloses);
            return;
        }
        let f = self.frames[self.depth];
        if f.major != major || f.indefinite != indefinite {
            self.fail(CBORError::CloseMismatch);
            return;
        }
        if major == MT_MAP && f.items % 2 != 0 {
            self.fail(CBORError::CloseMismatch);
            return;
        }

        let arg = match major {
            MT_ARRAY => f.items as u64,
            MT_MAP => (f.items / 2) as u64,
            // Byte string wrap: the argument is the content length in bytes
            _ => (self.out.tell() as u32 - f.start) as u64,
        };
        if (major == MT_ARRAY || major == MT_MAP) && arg > MAX_AGGREGATE_ITEMS {
            self.fail(CBORError::ArrayTooLong);
            return;
        }

        if indefinite {
            self.out.push(BREAK_BYTE);
            self.depth -= 1;
            return;
        }

        if sort {
            if let Err(e) = self.sort_map_range(f.start as usize, self.out.tell()) {
                self.fail(e);
                return;
            }
        }
        let head = encode_head(major, arg, 0);
        self.out.insert_at(f.start as usize, head.bytes());
        self.depth -= 1;
    }

    /***********************************************************************************************
     * In-place byte string regions
     **********************************************************************************************/

    /// Reserve the unwritten remainder of the output buffer for the caller to produce byte
    /// string content in place, avoiding a copy. Pair with [`Encoder::close_bytes`]; no other
    /// operation is permitted in between, and regions do not nest.
    pub fn open_bytes(&mut self) -> Result<&mut [u8]> {
        if let Some(e) = self.error() {
            return Err(e);
        }
        if self.bytes_open {
            self.fail(CBORError::OpenByteString);
            return Err(CBORError::OpenByteString);
        }
        if self.depth + 1 >= MAX_NESTING {
            self.fail(CBORError::NestingTooDeep);
            return Err(CBORError::NestingTooDeep);
        }
        self.bump_count();
        self.depth += 1;
        self.frames[self.depth] = EncodeFrame {
            major: FRAME_BYTES,
            start: self.out.tell() as u32,
            items: 0,
            indefinite: false,
        };
        self.bytes_open = true;
        Ok(self.out.unwritten())
    }

    /// Seal the in-place region: `used` bytes of it become a byte string item.
    pub fn close_bytes(&mut self, used: usize) -> &mut Self {
        if self.err.is_some() || self.out.error().is_some() {
            return self;
        }
        if !self.bytes_open || self.frames[self.depth].major != FRAME_BYTES {
            self.fail(CBORError::TooManyCloses);
            return self;
        }
        let start = self.frames[self.depth].start;
        self.out.advance(used);
        let head = encode_head(MT_BSTR, used as u64, 0);
        self.out.insert_at(start as usize, head.bytes());
        self.depth -= 1;
        self.bytes_open = false;
        self
    }

    /***********************************************************************************************
     * Big numbers, decimal fractions, big floats
     **********************************************************************************************/

    /// Append a big number given as a sign and a big-endian magnitude. Under preferred
    /// serialization a magnitude that fits the integer range is emitted as a plain integer
    /// (negative magnitudes of exactly 2^64 use the far end of major type 1); anything larger
    /// becomes a tag 2 or tag 3 byte string, the negative form carrying the magnitude minus
    /// one per the -1 - n convention.
    pub fn add_big_number(&mut self, negative: bool, magnitude: &[u8]) -> &mut Self {
        if !self.ready() {
            return self;
        }
        let mut mag = magnitude;
        while let Some((&0, rest)) = mag.split_first() {
            mag = rest;
        }
        if mag.is_empty() {
            // The value 0; sign carries no information here
            return self.add_u64(0);
        }

        let preferred = self.mode.preferred_floats() || self.only_preferred_big_numbers;
        if preferred {
            if mag.len() <= 8 {
                let mut v: u64 = 0;
                for &b in mag {
                    v = (v << 8) | b as u64;
                }
                if negative {
                    self.emit_head(MT_NINT, v - 1, 0);
                    self.bump_count();
                } else {
                    self.emit_head(MT_UINT, v, 0);
                    self.bump_count();
                }
                return self;
            }
            if negative && mag.len() == 9 && mag[0] == 1 && mag[1..].iter().all(|&b| b == 0) {
                // Magnitude exactly 2^64: encodable as major type 1 with argument u64::MAX
                self.emit_head(MT_NINT, u64::MAX, 0);
                self.bump_count();
                return self;
            }
        }

        self.add_tag(if negative {
            TAG_NEG_BIGNUM
        } else {
            TAG_POS_BIGNUM
        });
        if negative {
            self.append_bignum_minus_one(mag);
        } else {
            self.emit_head(MT_BSTR, mag.len() as u64, 0);
            self.out.append(mag);
            self.bump_count();
        }
        self
    }

    /// Append a big number in the raw tagged form, the content bytes taken verbatim with no
    /// offset adjustment or reduction. Latches `NotPreferred` when the profile forbids the
    /// raw form.
    pub fn add_big_number_raw(&mut self, negative: bool, content: &[u8]) -> &mut Self {
        if self.ready() {
            if self.only_preferred_big_numbers {
                self.fail(CBORError::NotPreferred);
            } else {
                self.add_tag(if negative {
                    TAG_NEG_BIGNUM
                } else {
                    TAG_POS_BIGNUM
                });
                self.emit_head(MT_BSTR, content.len() as u64, 0);
                self.out.append(content);
                self.bump_count();
            }
        }
        self
    }

    /// Emit `mag - 1` as a byte string, most significant byte first. The subtraction runs
    /// while emitting: trailing zeros become 0xff, the lowest non-zero byte decrements, and a
    /// leading byte of one over all zeros drops the length by one. `mag` is non-empty with a
    /// non-zero leading byte.
    fn append_bignum_minus_one(&mut self, mag: &[u8]) {
        let shortens = mag[0] == 1 && mag[1..].iter().all(|&b| b == 0);
        if shortens {
            let len = mag.len() - 1;
            self.emit_head(MT_BSTR, len as u64, 0);
            for _ in 0..len {
                self.out.push(0xff);
            }
        } else {
            // Index of the lowest non-zero byte; the borrow stops there
            let mut k = mag.len() - 1;
            while mag[k] == 0 {
                k -= 1;
            }
            self.emit_head(MT_BSTR, mag.len() as u64, 0);
            for (i, &b) in mag.iter().enumerate() {
                if i < k {
                    self.out.push(b);
                } else if i == k {
                    self.out.push(b - 1);
                } else {
                    self.out.push(0xff);
                }
            }
        }
        self.bump_count();
    }

    /// Append a tag 4 decimal fraction: mantissa * 10^exponent as a two element array.
    pub fn add_decimal_fraction(&mut self, mantissa: i64, exponent: i64) -> &mut Self {
        self.add_tag(TAG_DECIMAL_FRACTION);
        self.exp_mantissa_body(exponent, |enc| {
            enc.add_i64(mantissa);
        });
        self
    }

    /// Append a tag 4 decimal fraction with a big number mantissa.
    pub fn add_decimal_fraction_big_mantissa(
        &mut self,
        negative: bool,
        magnitude: &[u8],
        exponent: i64,
    ) -> &mut Self {
        self.add_tag(TAG_DECIMAL_FRACTION);
        self.exp_mantissa_body(exponent, |enc| {
            enc.add_big_number(negative, magnitude);
        });
        self
    }

    /// Append a tag 5 big float: mantissa * 2^exponent as a two element array.
    pub fn add_big_float(&mut self, mantissa: i64, exponent: i64) -> &mut Self {
        self.add_tag(TAG_BIGFLOAT);
        self.exp_mantissa_body(exponent, |enc| {
            enc.add_i64(mantissa);
        });
        self
    }

    /// Append a tag 5 big float with a big number mantissa.
    pub fn add_big_float_big_mantissa(
        &mut self,
        negative: bool,
        magnitude: &[u8],
        exponent: i64,
    ) -> &mut Self {
        self.add_tag(TAG_BIGFLOAT);
        self.exp_mantissa_body(exponent, |enc| {
            enc.add_big_number(negative, magnitude);
        });
        self
    }

    fn exp_mantissa_body<F: FnOnce(&mut Self)>(&mut self, exponent: i64, mantissa: F) {
        self.open_array();
        self.add_i64(exponent);
        mantissa(self);
        self.close_array();
    }

    /***********************************************************************************************
     * Deterministic map sort
     **********************************************************************************************/

    /// Stable bubble sort of the label/value pairs in `[start, end)` into bytewise ascending
    /// order of their encoded labels. Pairs have variable sizes, so each out-of-order
    /// neighbour swap is an in-place rotation of the joint byte range; no index table or
    /// scratch buffer is needed. Equal labels are duplicates.
    fn sort_map_range(&mut self, start: usize, end: usize) -> Result<()> {
        loop {
            let mut swapped = false;
            let mut pos = start;
            loop {
                if pos >= end {
                    break;
                }
                let (l1, n1) = self.pair_extents(pos, end)?;
                if pos + n1 >= end {
                    break;
                }
                let (l2, n2) = self.pair_extents(pos + n1, end)?;
                match self
                    .out
                    .compare_ranges(pos..pos + l1, pos + n1..pos + n1 + l2)
                {
                    Ordering::Equal => return Err(CBORError::DuplicateLabel),
                    Ordering::Greater => {
                        self.out.swap_adjacent_ranges(pos, pos + n1, pos + n1 + n2);
                        swapped = true;
                        pos += n2;
                    }
                    Ordering::Less => pos += n1,
                }
            }
            if !swapped {
                return Ok(());
            }
        }
    }

    /// Byte lengths of the label and of the whole label/value pair starting at `pos`, found
    /// by traversing this encoder's own well-formed output.
    fn pair_extents(&self, pos: usize, end: usize) -> Result<(usize, usize)> {
        let written = self.out.written();
        let mut cur = ReadCursor::new(&written[..end]);
        cur.seek(pos);
        skip_item(&mut cur, 0)?;
        let label_len = cur.tell() - pos;
        skip_item(&mut cur, 0)?;
        Ok((label_len, cur.tell() - pos))
    }

    /***********************************************************************************************
     * Finish
     **********************************************************************************************/

    /// Terminate encoding: the first latched error if there is one, `ArrayOrMapStillOpen` if
    /// any aggregate is unbalanced, otherwise the encoded slice.
    pub fn finish(self) -> Result<&'buf [u8]> {
        if let Some(e) = self.err.or(self.out.error()) {
            return Err(e);
        }
        if self.bytes_open {
            return Err(CBORError::OpenByteString);
        }
        if self.depth > 0 {
            return Err(CBORError::ArrayOrMapStillOpen);
        }
        self.out.into_written()
    }
}
