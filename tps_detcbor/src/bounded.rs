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
 * tps_detcbor bounded-mode decoding
 *
 * Entering a map or array turns it into a bounded level: traversal is confined to its
 * interior, entries can be looked up by label in one pass, and the level can be rewound or
 * exited without the caller tracking item counts. Byte-string-wrapped CBOR is entered the same
 * way, by narrowing the read limit to the wrapped payload.
 **************************************************************************************************/
use crate::constants::*;
use crate::decode::{
    skip_item, CborItem, Decoder, Frame, FrameKind, Label, MapEndCache, Value, INDEFINITE_COUNT,
};
use crate::error::{CBORError, Result};
use crate::head::{decode_head, is_preferred_head};

#[cfg(feature = "trace")]
use func_trace::trace;

#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/***************************************************************************************************
 * Lookup keys and type filters
 **************************************************************************************************/

/// A label to search for in a bounded map. Integer and text labels cover the IETF protocols
/// this crate targets; byte string labels appear in a few certificate formats.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum MapKey<'k> {
    Int(i64),
    Tstr(&'k str),
    Bstr(&'k [u8]),
}

impl<'k> MapKey<'k> {
    fn matches(&self, label: Option<Label>) -> bool {
        match (self, label) {
            (MapKey::Int(i), Some(Label::UInt(u))) => *i >= 0 && *i as u64 == u,
            (MapKey::Int(i), Some(Label::Int(v))) => *i == v,
            (MapKey::Tstr(s), Some(Label::Tstr(t))) => *s == t,
            (MapKey::Bstr(b), Some(Label::Bstr(t))) => *b == t,
            _ => false,
        }
    }
}

/// A bitmask over the `allow` constants restricting the types accepted by a lookup.
#[derive(Debug, Copy, Clone)]
pub struct Allowable(u32);

impl Allowable {
    pub fn new(v: u32) -> Self {
        Allowable(v)
    }

    /// `true` if `value` is of a permitted type.
    pub fn admits(&self, value: &Value) -> bool {
        let bit = match value {
            Value::UInt(_) => allow::UINT,
            Value::Int(_) | Value::NegInt65(_) => allow::NINT,
            Value::Bstr(_) => allow::BSTR,
            Value::Tstr(_) => allow::TSTR,
            Value::Array(_) | Value::ArrayIndefinite => allow::ARRAY,
            Value::Map(_) | Value::MapIndefinite => allow::MAP,
            Value::Float16(_) | Value::Float32(_) | Value::Float64(_) => allow::FLOAT,
            Value::Simple(_)
            | Value::False
            | Value::True
            | Value::Null
            | Value::Undefined => allow::SIMPLE,
            Value::BigNum { .. } => allow::BIGNUM,
            Value::DecimalFraction { .. } | Value::BigFloat { .. } => allow::EXPONENT,
            Value::DateText(_) | Value::Epoch(_) => allow::DATE,
        };
        self.0 & bit != 0
    }
}

/// One target of a multi-label map extraction: the label to find, the types to accept, and the
/// found item once the pass completes.
#[derive(Debug, Copy, Clone)]
pub struct MapQuery<'k, 'buf> {
    pub key: MapKey<'k>,
    pub allow: Allowable,
    pub item: Option<CborItem<'buf>>,
}

impl<'k, 'buf> MapQuery<'k, 'buf> {
    pub fn new(key: MapKey<'k>, allow: Allowable) -> Self {
        MapQuery {
            key,
            allow,
            item: None,
        }
    }
}

/***************************************************************************************************
 * Bounded-mode operations
 **************************************************************************************************/

impl<'buf> Decoder<'buf> {
    /// Consume the next item, which must be a map, and make its interior the bounded level.
    #[cfg_attr(feature = "trace", trace)]
    pub fn enter_map(&mut self) -> Result<()> {
        self.enter_aggregate(true)
    }

    /// Consume the next item, which must be an array, and make its interior the bounded level.
    #[cfg_attr(feature = "trace", trace)]
    pub fn enter_array(&mut self) -> Result<()> {
        self.enter_aggregate(false)
    }

    fn enter_aggregate(&mut self, is_map: bool) -> Result<()> {
        if let Some(e) = self.latched() {
            return Err(e);
        }
        if self.nesting.in_map() {
            // The next item here is an entry label, never a lone aggregate
            return Err(self.record(CBORError::UnexpectedType));
        }
        let saved = self.save();
        match self.enter_aggregate_inner(is_map) {
            Ok(()) => {
                self.clear_recoverable();
                Ok(())
            }
            Err(e) => {
                if !e.is_unrecoverable() {
                    self.restore(saved);
                }
                Err(self.record(e))
            }
        }
    }

    fn enter_aggregate_inner(&mut self, is_map: bool) -> Result<()> {
        self.level_has_item()?;
        self.enter_aggregate_at_value(is_map)
    }

    /// Parse an aggregate head at the cursor and descend into it as the bounded level. The
    /// cursor must be at an item boundary; the caller has done the level accounting checks.
    fn enter_aggregate_at_value(&mut self, is_map: bool) -> Result<()> {
        // Tags on the aggregate are permitted and skipped
        let head = loop {
            let h = decode_head(&mut self.input)?;
            if h.major != MT_TAG {
                break h;
            }
            if h.is_indefinite() {
                return Err(CBORError::Unsupported);
            }
        };
        let want = if is_map { MT_MAP } else { MT_ARRAY };
        if head.major != want {
            return Err(CBORError::UnexpectedType);
        }
        if self.mode.preferred() && !is_preferred_head(head.arg, head.ai) {
            return Err(CBORError::NotPreferred);
        }
        let count = if head.is_indefinite() {
            if self.mode.no_indefinite() {
                return Err(CBORError::NotPreferred);
            }
            INDEFINITE_COUNT
        } else {
            if head.arg > MAX_AGGREGATE_ITEMS {
                return Err(CBORError::ArrayTooLong);
            }
            head.arg as u16
        };

        self.nesting.note_consumed();
        self.nesting.push(Frame {
            kind: FrameKind::Aggregate {
                is_map,
                total: count,
                remaining: count,
            },
            start: self.input.tell() as u32,
            bounded: false,
        })?;
        self.nesting.mark_bounded();
        // An empty indefinite aggregate is all break; consume it now so the level reads as
        // exhausted rather than malformed
        let _ = self.ascend();
        Ok(())
    }

    /// `NoMoreItems` when the current level has nothing left for an enter to consume.
    fn level_has_item(&self) -> Result<()> {
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

    /// Leave the bounded map: position the cursor immediately after the map's last item and
    /// restore the enclosing bounded level.
    #[cfg_attr(feature = "trace", trace)]
    pub fn exit_map(&mut self) -> Result<()> {
        self.exit_aggregate(true)
    }

    /// Leave the bounded array, as [`Decoder::exit_map`] does for maps.
    #[cfg_attr(feature = "trace", trace)]
    pub fn exit_array(&mut self) -> Result<()> {
        self.exit_aggregate(false)
    }

    fn exit_aggregate(&mut self, is_map: bool) -> Result<()> {
        if let Some(e) = self.latched() {
            return Err(e);
        }
        let bidx = self.nesting.bounded_idx;
        if bidx == 0 {
            return Err(self.record(CBORError::MapNotEntered));
        }
        let frame = *self.nesting.bounded();
        match frame.kind {
            FrameKind::Aggregate { is_map: m, .. } if m == is_map => {}
            _ => return Err(self.record(CBORError::ExitMismatch)),
        }

        // Find the end of the aggregate: a cached end offset from an earlier full scan, or a
        // consuming traversal from wherever the cursor is now
        if self.map_end_cache.start == frame.start {
            self.input.seek(self.map_end_cache.end as usize);
        } else {
            loop {
                match self.next_item() {
                    Ok(_) => {}
                    Err(CBORError::NoMoreItems) => break,
                    Err(e) if e.is_unrecoverable() => return Err(e),
                    Err(_) => {}
                }
            }
        }

        self.nesting.pop_to_bounded();
        self.nesting.pop();
        let _ = self.ascend();
        self.clear_recoverable();
        Ok(())
    }

    /// Consume the next item, which must be a (possibly tagged) definite length byte string
    /// holding encoded CBOR, and confine traversal to its payload.
    #[cfg_attr(feature = "trace", trace)]
    pub fn enter_bstr_wrapped(&mut self) -> Result<()> {
        if let Some(e) = self.latched() {
            return Err(e);
        }
        if self.nesting.in_map() {
            return Err(self.record(CBORError::UnexpectedType));
        }
        let saved = self.save();
        match self.enter_bstr_inner() {
            Ok(()) => {
                self.clear_recoverable();
                Ok(())
            }
            Err(e) => {
                if !e.is_unrecoverable() {
                    self.restore(saved);
                }
                Err(self.record(e))
            }
        }
    }

    fn enter_bstr_inner(&mut self) -> Result<()> {
        self.level_has_item()?;
        let head = loop {
            let h = decode_head(&mut self.input)?;
            if h.major != MT_TAG {
                break h;
            }
            if h.is_indefinite() {
                return Err(CBORError::Unsupported);
            }
        };
        if head.major != MT_BSTR || head.is_indefinite() {
            return Err(CBORError::UnexpectedType);
        }
        let start = self.input.tell();
        if head.arg > (self.input.limit() - start) as u64 {
            return Err(CBORError::HitEnd);
        }
        let end = start + head.arg as usize;

        self.nesting.note_consumed();
        self.nesting.push(Frame {
            kind: FrameKind::Wrap {
                saved_limit: self.input.limit() as u32,
            },
            start: start as u32,
            bounded: false,
        })?;
        self.nesting.mark_bounded();
        self.input.set_limit(end);
        Ok(())
    }

    /// Leave the byte-string-wrapped payload: the cursor moves to the first item after the
    /// wrapping byte string and the outer read limit is restored.
    #[cfg_attr(feature = "trace", trace)]
    pub fn exit_bstr_wrapped(&mut self) -> Result<()> {
        if let Some(e) = self.latched() {
            return Err(e);
        }
        let bidx = self.nesting.bounded_idx;
        if bidx == 0 {
            return Err(self.record(CBORError::MapNotEntered));
        }
        let frame = *self.nesting.bounded();
        let saved_limit = match frame.kind {
            FrameKind::Wrap { saved_limit } => saved_limit,
            _ => return Err(self.record(CBORError::ExitMismatch)),
        };

        let end = self.input.limit();
        self.input.set_limit(saved_limit as usize);
        self.input.seek(end);
        self.nesting.pop_to_bounded();
        self.nesting.pop();
        let _ = self.ascend();
        self.clear_recoverable();
        Ok(())
    }

    /// Reposition the traversal cursor to the start of the bounded level and reset its count
    /// cursor. At the top level this restarts traversal of the whole input.
    #[cfg_attr(feature = "trace", trace)]
    pub fn rewind(&mut self) {
        self.rewind_to_bounded_start();
        self.clear_recoverable();
    }

    pub(crate) fn rewind_to_bounded_start(&mut self) {
        self.nesting.pop_to_bounded();
        let frame = self.nesting.bounded_mut();
        let start = frame.start;
        if let FrameKind::Aggregate {
            total, remaining, ..
        } = &mut frame.kind
        {
            *remaining = *total;
        }
        self.input.seek(start as usize);
        // Re-consume the break of an empty indefinite level
        let _ = self.ascend();
    }

    /// Search the bounded map for `key`, checking the found item against `allow`. The scan
    /// runs over the whole map so that duplicate labels are detected, caches the map's end
    /// offset, and restores the traversal cursor before returning.
    #[cfg_attr(feature = "trace", trace)]
    pub fn item_in_map(&mut self, key: MapKey, allow: Allowable) -> Result<CborItem<'buf>> {
        let mut queries = [MapQuery::new(key, allow)];
        let _ = self.items_in_map(&mut queries)?;
        match queries[0].item.take() {
            Some(item) => Ok(item),
            None => Err(self.record(CBORError::LabelNotFound)),
        }
    }

    /// Extract up to 32 labelled items from the bounded map in a single pass. Returns a bitmap
    /// with bit `i` set when `queries[i]` was found; absent labels simply leave their bit
    /// clear. A label found twice reports `DuplicateLabel`; a found item of a type its query
    /// does not admit reports `UnexpectedType`.
    pub fn items_in_map(&mut self, queries: &mut [MapQuery<'_, 'buf>]) -> Result<u32> {
        if let Some(e) = self.latched() {
            return Err(e);
        }
        if queries.len() > 32 {
            return Err(self.record(CBORError::NotAllowed));
        }
        let bidx = self.nesting.bounded_idx;
        if bidx == 0 {
            return Err(self.record(CBORError::MapNotEntered));
        }
        let frame = *self.nesting.bounded();
        match frame.kind {
            FrameKind::Aggregate { is_map: true, .. } => {}
            _ => return Err(self.record(CBORError::MapNotEntered)),
        }
        let map_level = bidx as u8;

        let saved = self.save();
        self.rewind_to_bounded_start();

        let mut found_bits: u32 = 0;
        let mut bad_type = false;
        let mut duplicate = false;
        'scan: loop {
            match self.next_item() {
                Ok(item) => {
                    for (i, q) in queries.iter_mut().enumerate() {
                        if q.key.matches(item.label) {
                            if found_bits & (1 << i) != 0 {
                                duplicate = true;
                                break 'scan;
                            }
                            found_bits |= 1 << i;
                            if q.allow.admits(&item.value) {
                                q.item = Some(item);
                            } else {
                                bad_type = true;
                            }
                        }
                    }
                    if item.next_nest_level > map_level {
                        self.consume_to_level(map_level)?;
                    }
                }
                Err(CBORError::NoMoreItems) => break,
                Err(e) if e.is_unrecoverable() => return Err(e),
                Err(_) => {}
            }
        }

        if !duplicate {
            self.map_end_cache = MapEndCache {
                start: frame.start,
                end: self.input.tell() as u32,
            };
        }
        self.restore(saved);

        if duplicate {
            return Err(self.record(CBORError::DuplicateLabel));
        }
        if bad_type {
            return Err(self.record(CBORError::UnexpectedType));
        }
        self.clear_recoverable();
        Ok(found_bits)
    }

    /// Search the bounded map for `key` and descend into the map stored under it.
    #[cfg_attr(feature = "trace", trace)]
    pub fn enter_map_in_map(&mut self, key: MapKey) -> Result<()> {
        self.enter_in_map(key, true)
    }

    /// Search the bounded map for `key` and descend into the array stored under it.
    #[cfg_attr(feature = "trace", trace)]
    pub fn enter_array_in_map(&mut self, key: MapKey) -> Result<()> {
        self.enter_in_map(key, false)
    }

    fn enter_in_map(&mut self, key: MapKey, is_map: bool) -> Result<()> {
        if let Some(e) = self.latched() {
            return Err(e);
        }
        let bidx = self.nesting.bounded_idx;
        if bidx == 0 {
            return Err(self.record(CBORError::MapNotEntered));
        }
        let frame = *self.nesting.bounded();
        match frame.kind {
            FrameKind::Aggregate { is_map: true, .. } => {}
            _ => return Err(self.record(CBORError::MapNotEntered)),
        }
        let map_level = bidx as u8;

        let saved = self.save();
        self.rewind_to_bounded_start();

        // Scan the whole map: the entry offset and the count cursor in force just before it
        // are enough to resume there, and running to the end catches duplicates
        let mut found: Option<(usize, u16)> = None;
        let mut duplicate = false;
        loop {
            let pos = self.input.tell();
            let rem = match self.nesting.current().kind {
                FrameKind::Aggregate { remaining, .. } => remaining,
                _ => 0,
            };
            match self.next_item() {
                Ok(item) => {
                    if key.matches(item.label) {
                        if found.is_some() {
                            duplicate = true;
                            break;
                        }
                        found = Some((pos, rem));
                    }
                    if item.next_nest_level > map_level {
                        self.consume_to_level(map_level)?;
                    }
                }
                Err(CBORError::NoMoreItems) => break,
                Err(e) if e.is_unrecoverable() => return Err(e),
                Err(_) => {}
            }
        }

        if duplicate {
            self.restore(saved);
            return Err(self.record(CBORError::DuplicateLabel));
        }
        let (pos, rem) = match found {
            Some(t) => t,
            None => {
                self.restore(saved);
                return Err(self.record(CBORError::LabelNotFound));
            }
        };

        self.nesting.pop_to_bounded();
        if let FrameKind::Aggregate { remaining, .. } = &mut self.nesting.bounded_mut().kind {
            *remaining = rem;
        }
        self.input.seek(pos);
        // Step over the entry's label; the value follows
        skip_item(&mut self.input, 0)?;
        match self.enter_aggregate_at_value(is_map) {
            Ok(()) => {
                self.clear_recoverable();
                Ok(())
            }
            Err(e) => {
                if !e.is_unrecoverable() {
                    self.restore(saved);
                }
                Err(self.record(e))
            }
        }
    }

    /// Consume items until traversal is back at `level`. Recoverable errors on the way are
    /// skipped items and do not stop the descent.
    fn consume_to_level(&mut self, level: u8) -> Result<()> {
        while self.nesting.level() > level {
            match self.next_item() {
                Ok(_) => {}
                Err(e) if e.is_unrecoverable() => return Err(e),
                Err(CBORError::NoMoreItems) => break,
                Err(_) => {}
            }
        }
        Ok(())
    }
}
