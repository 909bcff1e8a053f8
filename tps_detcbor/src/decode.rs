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
 * tps_detcbor CBOR Decoder
 *
 * A streaming, nesting-aware pull parser for CBOR (RFC8949). One call to `next_item` consumes
 * one complete data item. The decoder keeps all state in a fixed-size context suitable for the
 * stack; string and big number content is exposed as borrowed slices of the input buffer.
 **************************************************************************************************/
use crate::buffer::ReadCursor;
use crate::constants::*;
use crate::error::{CBORError, Result};
use crate::float::{
    double_nan_has_payload, double_to_integer, half_to_double_bits, single_to_double_bits,
    single_to_half, double_to_single, IntResult,
};
use crate::head::{decode_head, is_preferred_head, Head};

use std::convert::TryFrom;
use std::str::from_utf8;

use half::f16;

#[cfg(feature = "full")]
use chrono::{DateTime, FixedOffset, TimeZone};

#[cfg(feature = "trace")]
use func_trace::trace;

#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/// Count sentinel marking an indefinite length aggregate in a nesting frame.
pub(crate) const INDEFINITE_COUNT: u16 = u16::MAX;

/***************************************************************************************************
 * Decoded item model
 **************************************************************************************************/

/// The mantissa of a decimal fraction or big float: either an integer or a big number borrowed
/// from the input buffer.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Mantissa<'buf> {
    Int(i64),
    BigNum { negative: bool, content: &'buf [u8] },
}

/// A decoded CBOR data item value. Items may borrow immutably from the underlying input
/// buffer, which must therefore outlive them - this is the 'buf lifetime.
///
/// Numbers decode as follows:
///
/// - Major type 0 is always `UInt`.
/// - Major type 1 is `Int` while the value fits an i64, `NegInt65` for the remaining range
///   [-2^64, -2^63) where the carrier `n` stands for the value -1 - n.
/// - Major type 7 floats keep their encoded width.
/// - Tags 2/3 (big numbers), 4 (decimal fraction), 5 (big float), 0 and 1 (dates) are
///   recognized and rewrite the tagged content to the rich variants below; any other tag stays
///   on the item's tag stack.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Value<'buf> {
    UInt(u64),
    Int(i64),
    NegInt65(u64),
    Float16(f16),
    Float32(f32),
    Float64(f64),
    Bstr(&'buf [u8]),
    Tstr(&'buf str),
    /// Definite length array header with its element count
    Array(u16),
    /// Definite length map header with its entry (pair) count
    Map(u16),
    ArrayIndefinite,
    MapIndefinite,
    Simple(u8),
    False,
    True,
    Null,
    Undefined,
    BigNum { negative: bool, content: &'buf [u8] },
    DecimalFraction { exponent: i64, mantissa: Mantissa<'buf> },
    BigFloat { exponent: i64, mantissa: Mantissa<'buf> },
    DateText(&'buf str),
    Epoch(i64),
}

/// The label of a map entry. Integers and strings cover the label types used by the IETF
/// protocols this crate targets; anything else reports `MapLabelType`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Label<'buf> {
    UInt(u64),
    Int(i64),
    Tstr(&'buf str),
    Bstr(&'buf [u8]),
}

/// The tag numbers attached to one item, outermost first, to a fixed depth.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Tags {
    nums: [u64; MAX_TAGS_PER_ITEM],
    len: u8,
}

impl Tags {
    pub(crate) fn new() -> Tags {
        Tags {
            nums: [0; MAX_TAGS_PER_ITEM],
            len: 0,
        }
    }

    pub(crate) fn push(&mut self, tag: u64) -> Result<()> {
        if (self.len as usize) < MAX_TAGS_PER_ITEM {
            self.nums[self.len as usize] = tag;
            self.len += 1;
            Ok(())
        } else {
            Err(CBORError::TooManyTags)
        }
    }

    /// The tag closest to the item content, if any.
    pub fn innermost(&self) -> Option<u64> {
        if self.len > 0 {
            Some(self.nums[self.len as usize - 1])
        } else {
            None
        }
    }

    pub(crate) fn pop_innermost(&mut self) {
        if self.len > 0 {
            self.len -= 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The `n`th tag, outermost first.
    pub fn get(&self, n: usize) -> Option<u64> {
        if n < self.len as usize {
            Some(self.nums[n])
        } else {
            None
        }
    }
}

/// One decoded data item: its value, its label when it is a map entry, any tag numbers that
/// were not consumed by promotion, and the nesting level before and after it was consumed.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CborItem<'buf> {
    pub value: Value<'buf>,
    pub label: Option<Label<'buf>>,
    pub tags: Tags,
    /// Nesting level of the item itself (0 is the top level)
    pub nest_level: u8,
    /// Nesting level in effect for the item that follows, after any aggregates closed behind
    /// this one
    pub next_nest_level: u8,
}

impl<'buf> CborItem<'buf> {
    /// Convert a recognized date item to a `chrono` date/time. Tag 0 text is parsed as
    /// RFC 3339; tag 1 integers are seconds relative to the epoch.
    #[cfg(feature = "full")]
    pub fn as_date_time(&self) -> Result<DateTime<FixedOffset>> {
        match self.value {
            Value::DateText(s) => {
                DateTime::parse_from_rfc3339(s).map_err(|_| CBORError::UnexpectedType)
            }
            Value::Epoch(secs) => {
                let utc = match chrono::Utc.timestamp_opt(secs, 0).single() {
                    Some(t) => t,
                    None => return Err(CBORError::ConversionUnderOverFlow),
                };
                match FixedOffset::east_opt(0) {
                    Some(off) => Ok(utc.with_timezone(&off)),
                    None => Err(CBORError::UnexpectedType),
                }
            }
            _ => Err(CBORError::UnexpectedType),
        }
    }
}

/// Attempt to convert an item into a u64
impl<'buf> TryFrom<&CborItem<'buf>> for u64 {
    type Error = CBORError;

    fn try_from(item: &CborItem<'buf>) -> Result<Self> {
        match item.value {
            Value::UInt(v) => Ok(v),
            Value::Int(_) | Value::NegInt65(_) => Err(CBORError::NumberSignConversion),
            _ => Err(CBORError::UnexpectedType),
        }
    }
}

/// Attempt to convert an item into an i64
impl<'buf> TryFrom<&CborItem<'buf>> for i64 {
    type Error = CBORError;

    fn try_from(item: &CborItem<'buf>) -> Result<Self> {
        match item.value {
            Value::UInt(v) => {
                if v <= i64::MAX as u64 {
                    Ok(v as i64)
                } else {
                    Err(CBORError::ConversionUnderOverFlow)
                }
            }
            Value::Int(v) => Ok(v),
            Value::NegInt65(_) => Err(CBORError::ConversionUnderOverFlow),
            _ => Err(CBORError::UnexpectedType),
        }
    }
}

/// Attempt to convert an item into a bool
impl<'buf> TryFrom<&CborItem<'buf>> for bool {
    type Error = CBORError;

    fn try_from(item: &CborItem<'buf>) -> Result<Self> {
        match item.value {
            Value::True => Ok(true),
            Value::False => Ok(false),
            _ => Err(CBORError::UnexpectedType),
        }
    }
}

/// Attempt to convert an item into a borrowed str
///
/// # Lifetime
///
/// The lifetime of the str is the lifetime of the underlying input buffer.
impl<'buf> TryFrom<&CborItem<'buf>> for &'buf str {
    type Error = CBORError;

    fn try_from(item: &CborItem<'buf>) -> Result<Self> {
        match item.value {
            Value::Tstr(s) => Ok(s),
            _ => Err(CBORError::UnexpectedType),
        }
    }
}

/// Attempt to convert an item into a borrowed byte slice
///
/// # Lifetime
///
/// The lifetime of the slice is the lifetime of the underlying input buffer.
impl<'buf> TryFrom<&CborItem<'buf>> for &'buf [u8] {
    type Error = CBORError;

    fn try_from(item: &CborItem<'buf>) -> Result<Self> {
        match item.value {
            Value::Bstr(b) => Ok(b),
            _ => Err(CBORError::UnexpectedType),
        }
    }
}

/// Attempt to convert a float item into an f64, widening losslessly
impl<'buf> TryFrom<&CborItem<'buf>> for f64 {
    type Error = CBORError;

    fn try_from(item: &CborItem<'buf>) -> Result<Self> {
        match item.value {
            Value::Float16(h) => Ok(f64::from_bits(half_to_double_bits(h.to_bits()))),
            Value::Float32(s) => Ok(f64::from_bits(single_to_double_bits(s.to_bits()))),
            Value::Float64(d) => Ok(d),
            _ => Err(CBORError::UnexpectedType),
        }
    }
}

/***************************************************************************************************
 * Decode-side nesting tracker
 **************************************************************************************************/

/// One entered or traversed level. Arrays and maps carry a count cursor; the whole input and
/// each byte-string-wrapped payload are `Wrap` frames bounded by a saved read limit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum FrameKind {
    Wrap {
        /// Read limit to restore when the wrap is exited
        saved_limit: u32,
    },
    Aggregate {
        is_map: bool,
        /// Item count (arrays) or entry count (maps); `INDEFINITE_COUNT` when indefinite
        total: u16,
        /// Counts down as items are consumed; reaching zero marks end of level
        remaining: u16,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub(crate) kind: FrameKind,
    /// Offset of the first byte of the level's content
    pub(crate) start: u32,
    /// Entered levels are bounded: traversal below them cannot escape upward
    pub(crate) bounded: bool,
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct Nesting {
    frames: [Frame; MAX_NESTING],
    /// Index of the current traversal level; 0 is the whole-input frame
    current: usize,
    /// Index of the innermost bounded level at or below `current`
    pub(crate) bounded_idx: usize,
}

impl Nesting {
    fn new(input_len: usize) -> Nesting {
        let top = Frame {
            kind: FrameKind::Wrap {
                saved_limit: input_len as u32,
            },
            start: 0,
            bounded: true,
        };
        Nesting {
            frames: [top; MAX_NESTING],
            current: 0,
            bounded_idx: 0,
        }
    }

    #[inline]
    pub(crate) fn level(&self) -> u8 {
        self.current as u8
    }

    #[inline]
    pub(crate) fn current(&self) -> &Frame {
        &self.frames[self.current]
    }

    #[inline]
    pub(crate) fn current_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.current]
    }

    #[inline]
    pub(crate) fn bounded(&self) -> &Frame {
        &self.frames[self.bounded_idx]
    }

    #[inline]
    pub(crate) fn bounded_mut(&mut self) -> &mut Frame {
        &mut self.frames[self.bounded_idx]
    }

    pub(crate) fn push(&mut self, frame: Frame) -> Result<()> {
        if self.current + 1 >= MAX_NESTING {
            return Err(CBORError::NestingTooDeep);
        }
        self.current += 1;
        self.frames[self.current] = frame;
        Ok(())
    }

    pub(crate) fn pop(&mut self) {
        debug_assert!(self.current > 0);
        self.current -= 1;
        if self.bounded_idx > self.current {
            self.recompute_bounded();
        }
    }

    /// Drop any traversal levels above the bounded one.
    pub(crate) fn pop_to_bounded(&mut self) {
        self.current = self.bounded_idx;
    }

    pub(crate) fn mark_bounded(&mut self) {
        self.frames[self.current].bounded = true;
        self.bounded_idx = self.current;
    }

    fn recompute_bounded(&mut self) {
        let mut i = self.current;
        while i > 0 && !self.frames[i].bounded {
            i -= 1;
        }
        self.bounded_idx = i;
    }

    /// `true` if the current level is a map whose next item is an entry label.
    pub(crate) fn in_map(&self) -> bool {
        match self.frames[self.current].kind {
            FrameKind::Aggregate { is_map, .. } => is_map,
            _ => false,
        }
    }

    /// Note that one item (or one map entry) has been consumed at the current level.
    pub(crate) fn note_consumed(&mut self) {
        if let FrameKind::Aggregate {
            total, remaining, ..
        } = &mut self.frames[self.current].kind
        {
            if *total != INDEFINITE_COUNT {
                debug_assert!(*remaining > 0);
                *remaining -= 1;
            }
        }
    }

    /// Mark an indefinite bounded level as exhausted once its break has been consumed.
    pub(crate) fn mark_exhausted(&mut self) {
        if let FrameKind::Aggregate { remaining, .. } = &mut self.frames[self.current].kind {
            *remaining = 0;
        }
    }
}

/***************************************************************************************************
 * Decode modes
 **************************************************************************************************/

/// Conformance checking applied while decoding, mirroring the encode modes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DecodeMode {
    /// Accept any well-formed CBOR
    Cbor,
    /// Require preferred (shortest) integer and float serializations
    Preferred,
    /// Common Deterministic Encoding: preferred serializations, no indefinite lengths
    Cde,
    /// dCBOR: CDE plus float reduction (whole-number floats must be integers) and no NaN
    /// payloads
    DCbor,
}

impl DecodeMode {
    #[inline]
    pub(crate) fn preferred(&self) -> bool {
        *self != DecodeMode::Cbor
    }

    #[inline]
    pub(crate) fn no_indefinite(&self) -> bool {
        matches!(self, DecodeMode::Cde | DecodeMode::DCbor)
    }
}

/***************************************************************************************************
 * The decoder context
 **************************************************************************************************/

/// Cache of the end offset of the most recently scanned bounded map, so that an exit after a
/// label search does not scan the map a second time.
#[derive(Debug, Copy, Clone)]
pub(crate) struct MapEndCache {
    pub(crate) start: u32,
    pub(crate) end: u32,
}

impl MapEndCache {
    const INVALID: MapEndCache = MapEndCache {
        start: u32::MAX,
        end: u32::MAX,
    };
}

/// Snapshot of the traversal state, used by peek and by label searches that must not move the
/// caller's cursor.
#[derive(Copy, Clone)]
pub(crate) struct SavedState<'buf> {
    input: ReadCursor<'buf>,
    nesting: Nesting,
    map_end_cache: MapEndCache,
}

/// A pull decoder over a caller-supplied input buffer.
///
/// `next_item` consumes one complete data item at a time. Maps and arrays may additionally be
/// entered, turning them into a bounded level that supports label lookup, rewind and exit.
///
/// Unrecoverable errors (truncated or malformed input, conformance violations) latch: every
/// later operation returns the same error until the decoder is rebuilt. Recoverable errors
/// (an absent label, a type mismatch) leave the traversal cursor consistent.
#[derive(Debug)]
pub struct Decoder<'buf> {
    pub(crate) input: ReadCursor<'buf>,
    pub(crate) nesting: Nesting,
    pub(crate) mode: DecodeMode,
    latched: Option<CBORError>,
    last_err: Option<CBORError>,
    pub(crate) map_end_cache: MapEndCache,
}

impl<'buf> Decoder<'buf> {
    /// Construct a decoder over `input` accepting any well-formed CBOR.
    pub fn new(input: &'buf [u8]) -> Decoder<'buf> {
        Decoder::with_mode(input, DecodeMode::Cbor)
    }

    /// Construct a decoder over `input` with conformance checking per `mode`.
    pub fn with_mode(input: &'buf [u8], mode: DecodeMode) -> Decoder<'buf> {
        let latched = if input.len() > MAX_ENCODED_SIZE {
            Some(CBORError::BufferTooLarge)
        } else {
            None
        };
        Decoder {
            input: ReadCursor::new(input),
            nesting: Nesting::new(input.len()),
            mode,
            latched,
            last_err: latched,
            map_end_cache: MapEndCache::INVALID,
        }
    }

    /// The byte offset of the traversal cursor.
    #[inline]
    pub fn position(&self) -> usize {
        self.input.tell()
    }

    /// The most recent error, recoverable or not.
    #[inline]
    pub fn last_error(&self) -> Option<CBORError> {
        self.last_err
    }

    /// Read and clear the recoverable error slot. A latched unrecoverable error stays.
    pub fn take_error(&mut self) -> Option<CBORError> {
        let e = self.last_err;
        self.last_err = None;
        e
    }

    pub(crate) fn save(&self) -> SavedState<'buf> {
        SavedState {
            input: self.input,
            nesting: self.nesting,
            map_end_cache: self.map_end_cache,
        }
    }

    pub(crate) fn restore(&mut self, s: SavedState<'buf>) {
        self.input = s.input;
        self.nesting = s.nesting;
        self.map_end_cache = s.map_end_cache;
    }

    pub(crate) fn record(&mut self, e: CBORError) -> CBORError {
        if e.is_unrecoverable() && self.latched.is_none() {
            self.latched = Some(e);
        }
        self.last_err = Some(e);
        e
    }

    #[inline]
    pub(crate) fn latched(&self) -> Option<CBORError> {
        self.latched
    }

    /// Drop a recoverable error from the last-error slot. Entering or exiting a bounded level
    /// successfully clears the previous recoverable condition.
    pub(crate) fn clear_recoverable(&mut self) {
        if let Some(e) = self.last_err {
            if !e.is_unrecoverable() {
                self.last_err = None;
            }
        }
    }

    /// Decode the next complete data item at the traversal cursor.
    #[cfg_attr(feature = "trace", trace)]
    pub fn next_item(&mut self) -> Result<CborItem<'buf>> {
        if let Some(e) = self.latched {
            return Err(e);
        }
        match self.next_item_inner() {
            Ok(item) => Ok(item),
            Err(e) => Err(self.record(e)),
        }
    }

    /// Decode the next item without consuming it. The traversal state, including the error
    /// slots, is left exactly as it was.
    pub fn peek_item(&mut self) -> Result<CborItem<'buf>> {
        let saved = self.save();
        let latched = self.latched;
        let last_err = self.last_err;
        let r = self.next_item();
        self.restore(saved);
        self.latched = latched;
        self.last_err = last_err;
        r
    }

    fn next_item_inner(&mut self) -> Result<CborItem<'buf>> {
        self.check_level_end()?;
        let level = self.nesting.level();

        let (value, label, tags) = match self.read_entry() {
            Ok(t) => t,
            Err(e @ CBORError::UnexpectedType)
            | Err(e @ CBORError::ConversionUnderOverFlow) => {
                // Tag content of the wrong shape: the item has been skipped in full, so it
                // still counts against the current level and traversal may continue
                self.nesting.note_consumed();
                let _ = self.ascend();
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        self.nesting.note_consumed();
        match value {
            Value::Array(n) => self.descend(false, n)?,
            Value::Map(n) => self.descend(true, n)?,
            Value::ArrayIndefinite => self.descend(false, INDEFINITE_COUNT)?,
            Value::MapIndefinite => self.descend(true, INDEFINITE_COUNT)?,
            _ => {}
        }
        let next_level = self.ascend();

        Ok(CborItem {
            value,
            label,
            tags,
            nest_level: level,
            next_nest_level: next_level,
        })
    }

    /// `NoMoreItems` when the current level has nothing left to consume.
    fn check_level_end(&self) -> Result<()> {
        match self.nesting.current().kind {
            FrameKind::Wrap { .. } => {
                if self.input.at_end() {
                    Err(CBORError::NoMoreItems)
                } else {
                    Ok(())
                }
            }
            FrameKind::Aggregate { remaining, .. } => {
                if remaining == 0 {
                    Err(CBORError::NoMoreItems)
                } else {
                    Ok(())
                }
            }
        }
    }

    fn descend(&mut self, is_map: bool, count: u16) -> Result<()> {
        self.nesting.push(Frame {
            kind: FrameKind::Aggregate {
                is_map,
                total: count,
                remaining: count,
            },
            start: self.input.tell() as u32,
            bounded: false,
        })
    }

    /// Close as many completed unbounded levels as the input allows, consuming break bytes of
    /// indefinite aggregates. Bounded levels are never closed here; that is what the explicit
    /// exit operations are for.
    pub(crate) fn ascend(&mut self) -> u8 {
        loop {
            if self.nesting.level() == 0 {
                break;
            }
            let f = *self.nesting.current();
            match f.kind {
                FrameKind::Wrap { .. } => break,
                FrameKind::Aggregate {
                    total, remaining, ..
                } => {
                    if total == INDEFINITE_COUNT {
                        if remaining == 0 {
                            // Bounded indefinite level already exhausted
                            break;
                        }
                        if self.input.peek_u8() == Some(BREAK_BYTE) {
                            let _ = self.input.get_u8();
                            if f.bounded {
                                self.nesting.mark_exhausted();
                                break;
                            }
                            self.nesting.pop();
                            continue;
                        }
                        break;
                    } else if remaining == 0 {
                        if f.bounded {
                            break;
                        }
                        self.nesting.pop();
                        continue;
                    } else {
                        break;
                    }
                }
            }
        }
        self.nesting.level()
    }

    /// Read one entry at the cursor: a lone item, or a label/value pair inside a map.
    fn read_entry(&mut self) -> Result<(Value<'buf>, Option<Label<'buf>>, Tags)> {
        if self.nesting.in_map() {
            // A label that fails tag promotion leaves no way to pair the entry; that is a
            // label type problem, not a recoverable skip
            let (lv, ltags) = match self.read_tagged_value() {
                Ok(t) => t,
                Err(CBORError::UnexpectedType) | Err(CBORError::ConversionUnderOverFlow) => {
                    return Err(CBORError::MapLabelType)
                }
                Err(e) => return Err(e),
            };
            let label = match (lv, ltags.is_empty()) {
                (Value::UInt(v), true) => Label::UInt(v),
                (Value::Int(v), true) => Label::Int(v),
                (Value::Tstr(s), true) => Label::Tstr(s),
                (Value::Bstr(b), true) => Label::Bstr(b),
                _ => return Err(CBORError::MapLabelType),
            };
            let (value, tags) = self.read_tagged_value()?;
            Ok((value, Some(label), tags))
        } else {
            let (value, tags) = self.read_tagged_value()?;
            Ok((value, None, tags))
        }
    }

    /// Read one item with its chain of tag numbers, applying tag promotion for the tags this
    /// crate understands.
    fn read_tagged_value(&mut self) -> Result<(Value<'buf>, Tags)> {
        let item_start = self.input.tell();
        let mut tags = Tags::new();
        let head = loop {
            let h = decode_head(&mut self.input)?;
            if h.major == MT_TAG {
                if h.is_indefinite() {
                    return Err(CBORError::Unsupported);
                }
                if self.mode.preferred() && !is_preferred_head(h.arg, h.ai) {
                    return Err(CBORError::NotPreferred);
                }
                tags.push(h.arg)?;
                continue;
            }
            break h;
        };

        let value = self.value_from_head(&head)?;
        match self.promote(value, &mut tags) {
            Ok(v) => Ok((v, tags)),
            Err(e @ CBORError::UnexpectedType)
            | Err(e @ CBORError::ConversionUnderOverFlow) => {
                // Leave the cursor just past the malformed tagged item so that traversal can
                // continue; the raw skip cannot fail where the partial parse got this far
                self.input.seek(item_start);
                skip_item(&mut self.input, 0)?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Turn a decoded head into a value, reading string content where needed.
    fn value_from_head(&mut self, h: &Head) -> Result<Value<'buf>> {
        if self.mode.preferred() && h.major != MT_SIMPLE && !is_preferred_head(h.arg, h.ai) {
            return Err(CBORError::NotPreferred);
        }
        match h.major {
            MT_UINT => Ok(Value::UInt(h.arg)),
            MT_NINT => {
                if h.arg <= i64::MAX as u64 {
                    Ok(Value::Int(-1 - (h.arg as i64)))
                } else {
                    Ok(Value::NegInt65(h.arg))
                }
            }
            MT_BSTR => {
                if h.is_indefinite() {
                    Err(CBORError::IndefiniteStringChunk)
                } else {
                    Ok(Value::Bstr(self.get_string(h.arg)?))
                }
            }
            MT_TSTR => {
                if h.is_indefinite() {
                    Err(CBORError::IndefiniteStringChunk)
                } else {
                    match from_utf8(self.get_string(h.arg)?) {
                        Ok(s) => Ok(Value::Tstr(s)),
                        Err(_) => Err(CBORError::InvalidUtf8),
                    }
                }
            }
            MT_ARRAY => self.aggregate_from_head(h, false),
            MT_MAP => self.aggregate_from_head(h, true),
            MT_SIMPLE => self.simple_from_head(h),
            // MT_TAG is consumed by the caller's loop
            _ => Err(CBORError::Unsupported),
        }
    }

    fn get_string(&mut self, len: u64) -> Result<&'buf [u8]> {
        if len > MAX_ENCODED_SIZE as u64 {
            return Err(CBORError::HitEnd);
        }
        self.input.get_slice(len as usize)
    }

    fn aggregate_from_head(&mut self, h: &Head, is_map: bool) -> Result<Value<'buf>> {
        if h.is_indefinite() {
            if self.mode.no_indefinite() {
                return Err(CBORError::NotPreferred);
            }
            return Ok(if is_map {
                Value::MapIndefinite
            } else {
                Value::ArrayIndefinite
            });
        }
        if h.arg > MAX_AGGREGATE_ITEMS {
            return Err(CBORError::ArrayTooLong);
        }
        Ok(if is_map {
            Value::Map(h.arg as u16)
        } else {
            Value::Array(h.arg as u16)
        })
    }

    fn simple_from_head(&mut self, h: &Head) -> Result<Value<'buf>> {
        match h.ai {
            0..=AI_DIRECT_MAX => Ok(match h.arg as u8 {
                20 => Value::False,
                21 => Value::True,
                22 => Value::Null,
                23 => Value::Undefined,
                v => Value::Simple(v),
            }),
            AI_ONE_BYTE => {
                // Two byte simple values below 32 are reserved or non-minimal
                if h.arg < 32 {
                    Err(CBORError::BadType7)
                } else {
                    Ok(Value::Simple(h.arg as u8))
                }
            }
            AI_TWO_BYTES => {
                let bits = h.arg as u16;
                self.check_float_conformance(half_to_double_bits(bits), true)?;
                Ok(Value::Float16(f16::from_bits(bits)))
            }
            AI_FOUR_BYTES => {
                let bits = h.arg as u32;
                if self.mode.preferred() && single_to_half(bits).is_some() {
                    return Err(CBORError::NotPreferred);
                }
                self.check_float_conformance(single_to_double_bits(bits), false)?;
                Ok(Value::Float32(f32::from_bits(bits)))
            }
            AI_EIGHT_BYTES => {
                let bits = h.arg;
                if self.mode.preferred() && double_to_single(bits).is_some() {
                    return Err(CBORError::NotPreferred);
                }
                self.check_float_conformance(bits, false)?;
                Ok(Value::Float64(f64::from_bits(bits)))
            }
            AI_INDEFINITE => Err(CBORError::BadBreak),
            _ => Err(CBORError::Unsupported),
        }
    }

    /// dCBOR conformance for a float given as its double widening: whole numbers must have
    /// been reduced to integers, and NaN payloads are not allowed.
    fn check_float_conformance(&self, d: u64, half_width: bool) -> Result<()> {
        if self.mode != DecodeMode::DCbor {
            return Ok(());
        }
        match double_to_integer(d) {
            IntResult::NaN => {
                if double_nan_has_payload(d) || !half_width {
                    // Only the canonical half precision quiet NaN survives reduction
                    Err(CBORError::NotAllowed)
                } else {
                    Ok(())
                }
            }
            IntResult::NoConversion => Ok(()),
            _ => Err(CBORError::NotPreferred),
        }
    }

    /// Rewrite tagged content into the rich variants for tags 0, 1, 2, 3, 4 and 5. Any other
    /// tag stays on the item's tag stack.
    fn promote(&mut self, value: Value<'buf>, tags: &mut Tags) -> Result<Value<'buf>> {
        let tag = match tags.innermost() {
            Some(t) => t,
            None => return Ok(value),
        };
        match tag {
            TAG_POS_BIGNUM | TAG_NEG_BIGNUM => {
                if let Value::Bstr(content) = value {
                    tags.pop_innermost();
                    Ok(Value::BigNum {
                        negative: tag == TAG_NEG_BIGNUM,
                        content,
                    })
                } else {
                    Err(CBORError::UnexpectedType)
                }
            }
            TAG_DECIMAL_FRACTION | TAG_BIGFLOAT => {
                if value != Value::Array(2) {
                    return Err(CBORError::UnexpectedType);
                }
                tags.pop_innermost();
                let (exponent, mantissa) = self.read_exp_mantissa()?;
                Ok(if tag == TAG_DECIMAL_FRACTION {
                    Value::DecimalFraction { exponent, mantissa }
                } else {
                    Value::BigFloat { exponent, mantissa }
                })
            }
            TAG_DATE_TEXT => {
                if let Value::Tstr(s) = value {
                    tags.pop_innermost();
                    Ok(Value::DateText(s))
                } else {
                    Err(CBORError::UnexpectedType)
                }
            }
            TAG_DATE_EPOCH => {
                tags.pop_innermost();
                match value {
                    Value::UInt(v) => {
                        if v <= i64::MAX as u64 {
                            Ok(Value::Epoch(v as i64))
                        } else {
                            Err(CBORError::ConversionUnderOverFlow)
                        }
                    }
                    Value::Int(v) => Ok(Value::Epoch(v)),
                    Value::Float16(_) | Value::Float32(_) | Value::Float64(_) => {
                        let d = match value {
                            Value::Float16(h) => half_to_double_bits(h.to_bits()),
                            Value::Float32(s) => single_to_double_bits(s.to_bits()),
                            Value::Float64(d) => d.to_bits(),
                            _ => 0,
                        };
                        match double_to_integer(d) {
                            IntResult::UInt(v) if v <= i64::MAX as u64 => {
                                Ok(Value::Epoch(v as i64))
                            }
                            IntResult::Int(v) => Ok(Value::Epoch(v)),
                            IntResult::NaN => Err(CBORError::FloatException),
                            _ => Err(CBORError::ConversionUnderOverFlow),
                        }
                    }
                    _ => Err(CBORError::UnexpectedType),
                }
            }
            _ => Ok(value),
        }
    }

    /// Read the two element [exponent, mantissa] array body of a decimal fraction or big
    /// float. The array head has already been consumed.
    fn read_exp_mantissa(&mut self) -> Result<(i64, Mantissa<'buf>)> {
        let eh = decode_head(&mut self.input)?;
        let exponent = match eh.major {
            MT_UINT if eh.arg <= i64::MAX as u64 => eh.arg as i64,
            MT_NINT if eh.arg <= i64::MAX as u64 => -1 - (eh.arg as i64),
            MT_UINT | MT_NINT => return Err(CBORError::ConversionUnderOverFlow),
            _ => return Err(CBORError::UnexpectedType),
        };

        let mh = decode_head(&mut self.input)?;
        let mantissa = match mh.major {
            MT_UINT => {
                if mh.arg <= i64::MAX as u64 {
                    Mantissa::Int(mh.arg as i64)
                } else {
                    return Err(CBORError::ConversionUnderOverFlow);
                }
            }
            MT_NINT => {
                if mh.arg <= i64::MAX as u64 {
                    Mantissa::Int(-1 - (mh.arg as i64))
                } else {
                    return Err(CBORError::ConversionUnderOverFlow);
                }
            }
            MT_TAG if mh.arg == TAG_POS_BIGNUM || mh.arg == TAG_NEG_BIGNUM => {
                let bh = decode_head(&mut self.input)?;
                if bh.major != MT_BSTR || bh.is_indefinite() {
                    return Err(CBORError::UnexpectedType);
                }
                Mantissa::BigNum {
                    negative: mh.arg == TAG_NEG_BIGNUM,
                    content: self.get_string(bh.arg)?,
                }
            }
            _ => return Err(CBORError::UnexpectedType),
        };
        Ok((exponent, mantissa))
    }
}

/***************************************************************************************************
 * Raw traversal
 **************************************************************************************************/

/// Skip one complete encoded item, including all nested content, without building values.
/// Used to recover past malformed tag content and by the encoder's map sort to find item
/// boundaries in its own output.
#[cfg_attr(feature = "trace", trace)]
pub(crate) fn skip_item(cur: &mut ReadCursor, depth: usize) -> Result<()> {
    if depth >= MAX_NESTING {
        return Err(CBORError::NestingTooDeep);
    }
    // Tags chain onto the following item; consume them iteratively
    let head = loop {
        let h = decode_head(cur)?;
        if h.major != MT_TAG {
            break h;
        }
        if h.is_indefinite() {
            return Err(CBORError::Unsupported);
        }
    };
    match head.major {
        MT_UINT | MT_NINT => Ok(()),
        MT_BSTR | MT_TSTR => {
            if head.is_indefinite() {
                return Err(CBORError::IndefiniteStringChunk);
            }
            if head.arg > MAX_ENCODED_SIZE as u64 {
                return Err(CBORError::HitEnd);
            }
            cur.get_slice(head.arg as usize)?;
            Ok(())
        }
        MT_ARRAY | MT_MAP => {
            let per_entry = if head.major == MT_MAP { 2 } else { 1 };
            if head.is_indefinite() {
                while cur.peek_u8() != Some(BREAK_BYTE) {
                    skip_item(cur, depth + 1)?;
                }
                let _ = cur.get_u8();
                Ok(())
            } else {
                if head.arg > MAX_AGGREGATE_ITEMS {
                    return Err(CBORError::ArrayTooLong);
                }
                for _ in 0..head.arg * per_entry {
                    skip_item(cur, depth + 1)?;
                }
                Ok(())
            }
        }
        MT_SIMPLE => {
            if head.ai == AI_INDEFINITE {
                Err(CBORError::BadBreak)
            } else {
                Ok(())
            }
        }
        _ => Err(CBORError::Unsupported),
    }
}
