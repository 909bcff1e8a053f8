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
 * tps_detcbor byte cursors
 *
 * A deterministic CBOR encoder and streaming decoder for constrained systems. Requires neither
 * the Rust standard library nor an allocator.
 **************************************************************************************************/
use crate::constants::MAX_ENCODED_SIZE;
use crate::error::{CBORError, Result};

use std::cmp::Ordering;

#[cfg(feature = "trace")]
use func_trace::trace;

#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/// Return `true` if it is possible to obtain a slice of length `len` starting from `start` from
/// `buf`
#[inline]
pub fn within(buf: &[u8], start: usize, len: usize) -> bool {
    match start.checked_add(len) {
        Some(end) => end <= buf.len(),
        None => false,
    }
}

/***************************************************************************************************
 * Write cursor
 **************************************************************************************************/

/// An append/insert cursor over a caller-supplied output buffer.
///
/// All operations are bounds checked. The first operation that would write past the end of the
/// buffer (or past the 4 GiB encoding bound) latches a sticky error; every later operation is a
/// no-op. The error is read back with [`WriteCursor::error`], so long runs of writes need no
/// per-call handling.
#[derive(Debug)]
pub struct WriteCursor<'buf> {
    bytes: &'buf mut [u8],
    index: usize,
    err: Option<CBORError>,
}

impl<'buf> WriteCursor<'buf> {
    /// Construct a write cursor over `b`. The buffer is not cleared; only bytes up to the final
    /// cursor position are ever returned.
    pub fn new(b: &'buf mut [u8]) -> WriteCursor<'buf> {
        WriteCursor {
            bytes: b,
            index: 0,
            err: None,
        }
    }

    /// The current append position, which is also the number of valid bytes.
    #[inline]
    pub fn tell(&self) -> usize {
        self.index
    }

    /// The sticky error state, if any operation has overflowed.
    #[inline]
    pub fn error(&self) -> Option<CBORError> {
        self.err
    }

    #[inline]
    fn fail(&mut self, e: CBORError) {
        if self.err.is_none() {
            self.err = Some(e);
        }
    }

    /// `true` if `len` more bytes can be appended without overflow.
    fn writable(&mut self, len: usize) -> bool {
        if self.err.is_some() {
            return false;
        }
        if !within(self.bytes, self.index, len) {
            self.fail(CBORError::BufferTooSmall);
            return false;
        }
        if self.index + len > MAX_ENCODED_SIZE {
            self.fail(CBORError::BufferTooLarge);
            return false;
        }
        true
    }

    /// Append a single byte at the cursor.
    #[cfg_attr(feature = "trace", trace)]
    pub fn push(&mut self, val: u8) {
        if self.writable(1) {
            self.bytes[self.index] = val;
            self.index += 1;
        }
    }

    /// Append a slice at the cursor.
    #[cfg_attr(feature = "trace", trace)]
    pub fn append(&mut self, src: &[u8]) {
        if self.writable(src.len()) {
            self.bytes[self.index..self.index + src.len()].copy_from_slice(src);
            self.index += src.len();
        }
    }

    /// Insert `src` at `offset`, shifting everything from `offset` to the cursor right by
    /// `src.len()`. This is how aggregate heads are patched in once their content length is
    /// known.
    #[cfg_attr(feature = "trace", trace)]
    pub fn insert_at(&mut self, offset: usize, src: &[u8]) {
        debug_assert!(offset <= self.index);
        if self.writable(src.len()) {
            let tail = self.index - offset;
            // Move the tail up, back to front, then drop the head into the gap
            for i in (0..tail).rev() {
                self.bytes[offset + src.len() + i] = self.bytes[offset + i];
            }
            self.bytes[offset..offset + src.len()].copy_from_slice(src);
            self.index += src.len();
        }
    }

    /// Advance the cursor over `len` bytes the caller has already written in place through
    /// [`WriteCursor::unwritten`].
    pub fn advance(&mut self, len: usize) {
        if self.writable(len) {
            self.index += len;
        }
    }

    /// The unwritten remainder of the buffer, for callers that produce byte string content in
    /// place. Pair with [`WriteCursor::advance`].
    pub fn unwritten(&mut self) -> &mut [u8] {
        &mut self.bytes[self.index..]
    }

    /// The bytes written so far.
    #[inline]
    pub fn written(&self) -> &[u8] {
        &self.bytes[..self.index]
    }

    /// Compare two written sub-ranges as unsigned byte strings.
    pub fn compare_ranges(&self, a: core::ops::Range<usize>, b: core::ops::Range<usize>) -> Ordering {
        self.bytes[a].cmp(&self.bytes[b])
    }

    /// Swap two adjacent written sub-ranges `[start..mid)` and `[mid..end)` of possibly
    /// different lengths, in place and without auxiliary storage.
    #[cfg_attr(feature = "trace", trace)]
    pub fn swap_adjacent_ranges(&mut self, start: usize, mid: usize, end: usize) {
        debug_assert!(start <= mid && mid <= end && end <= self.index);
        self.bytes[start..end].rotate_left(mid - start);
    }

    /// Consume the cursor, returning the written slice or the latched error.
    pub fn into_written(self) -> Result<&'buf [u8]> {
        match self.err {
            Some(e) => Err(e),
            None => Ok(&self.bytes[..self.index]),
        }
    }
}

/***************************************************************************************************
 * Read cursor
 **************************************************************************************************/

/// A bounds-checked reader over a caller-supplied input buffer.
///
/// The cursor carries a settable `limit` so that traversal can be confined to the payload of a
/// byte-string-wrapped CBOR item; `limit` never exceeds the buffer length. Reads past `limit`
/// fail with `HitEnd` and do not advance.
#[derive(Debug, Copy, Clone)]
pub struct ReadCursor<'buf> {
    bytes: &'buf [u8],
    index: usize,
    limit: usize,
}

impl<'buf> ReadCursor<'buf> {
    /// Construct a read cursor over the whole of `init`.
    pub fn new(init: &'buf [u8]) -> ReadCursor<'buf> {
        ReadCursor {
            bytes: init,
            index: 0,
            limit: init.len(),
        }
    }

    /// The current read position.
    #[inline]
    pub fn tell(&self) -> usize {
        self.index
    }

    /// Reposition the cursor. `pos` may be anywhere up to the current limit.
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        debug_assert!(pos <= self.limit);
        self.index = pos;
    }

    /// The current upper bound of readable input.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Restrict or restore the upper bound of readable input.
    #[inline]
    pub fn set_limit(&mut self, limit: usize) {
        debug_assert!(limit <= self.bytes.len());
        self.limit = limit;
    }

    /// `true` if the cursor has consumed all input up to the limit.
    #[inline]
    pub fn at_end(&self) -> bool {
        self.index >= self.limit
    }

    /// Read one byte.
    #[cfg_attr(feature = "trace", trace)]
    pub fn get_u8(&mut self) -> Result<u8> {
        if self.index < self.limit {
            let b = self.bytes[self.index];
            self.index += 1;
            Ok(b)
        } else {
            Err(CBORError::HitEnd)
        }
    }

    /// Look at the next byte without consuming it.
    #[inline]
    pub fn peek_u8(&self) -> Option<u8> {
        if self.index < self.limit {
            Some(self.bytes[self.index])
        } else {
            None
        }
    }

    /// Read a length-delimited slice out of the input.
    #[cfg_attr(feature = "trace", trace)]
    pub fn get_slice(&mut self, len: usize) -> Result<&'buf [u8]> {
        if within(&self.bytes[..self.limit], self.index, len) {
            let s = &self.bytes[self.index..self.index + len];
            self.index += len;
            Ok(s)
        } else {
            Err(CBORError::HitEnd)
        }
    }

    /// Read `N` bytes into an array, network byte order preserved.
    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        let s = self.get_slice(N)?;
        out.copy_from_slice(s);
        Ok(out)
    }
}
