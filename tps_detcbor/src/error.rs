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
 * tps_detcbor CBOR Error API
 *
 * A deterministic CBOR encoder and streaming decoder for constrained systems. Requires neither
 * the Rust standard library nor an allocator.
 **************************************************************************************************/
use std::result;

#[cfg(any(feature = "full", test))]
use thiserror::Error;

/// An alias for Result<T, CBORError> used throughout this crate.
pub type Result<T> = result::Result<T, CBORError>;

/// `CBORError` provides information about errors encoding or decoding CBOR.
///
/// Each variant has a stable numeric code, exposed through [`CBORError::code`], so that errors
/// can be reported over constrained channels that cannot carry strings.
#[cfg_attr(any(feature = "full", test), derive(Copy, Clone, Error, Debug, PartialEq, Eq))]
#[cfg_attr(all(not(feature = "full"), not(test)), derive(Copy, Clone, Debug, PartialEq, Eq))]
pub enum CBORError {
    /// The output buffer cannot hold the bytes of the next operation.
    #[cfg_attr(any(feature = "full", test), error("Output buffer too small for the encoded item"))]
    BufferTooSmall,
    /// The encoded document would exceed the 4 GiB encoding bound.
    #[cfg_attr(any(feature = "full", test), error("Encoded size exceeds the 4 GiB bound"))]
    BufferTooLarge,
    /// More than `MAX_NESTING` arrays, maps and byte string wraps are open or entered.
    #[cfg_attr(any(feature = "full", test), error("Nesting deeper than the fixed stack bound"))]
    NestingTooDeep,
    /// An aggregate holds more than `MAX_AGGREGATE_ITEMS` items or entries.
    #[cfg_attr(any(feature = "full", test), error("Too many items in one array or map"))]
    ArrayTooLong,
    /// A close operation was issued with no aggregate open.
    #[cfg_attr(any(feature = "full", test), error("Close with no open array or map"))]
    TooManyCloses,
    /// A close operation does not match the innermost open aggregate.
    #[cfg_attr(any(feature = "full", test), error("Close does not match the open aggregate"))]
    CloseMismatch,
    /// Finish was called while an array, map or byte string wrap is still open.
    #[cfg_attr(any(feature = "full", test), error("Array or map still open at finish"))]
    ArrayOrMapStillOpen,
    /// A byte string wrap cannot be cancelled after content has been written.
    #[cfg_attr(any(feature = "full", test), error("Byte string wrap already holds content"))]
    CannotCancel,
    /// Operation attempted while an in-place byte string region is open.
    #[cfg_attr(any(feature = "full", test), error("An in-place byte string region is open"))]
    OpenByteString,
    /// A non-preferred serialization was requested or found where preferred forms are required.
    #[cfg_attr(any(feature = "full", test), error("Not the preferred serialization"))]
    NotPreferred,
    /// The value is not allowed under the selected encoding or decoding mode.
    #[cfg_attr(any(feature = "full", test), error("Value not allowed in this mode"))]
    NotAllowed,
    /// The requested encoding is not supported in the selected mode.
    #[cfg_attr(any(feature = "full", test), error("Encoding unsupported in this mode"))]
    EncodeUnsupported,
    /// Two entries of a map carry the same label.
    #[cfg_attr(any(feature = "full", test), error("Duplicate label in map"))]
    DuplicateLabel,
    /// The input ended in the middle of a data item.
    #[cfg_attr(any(feature = "full", test), error("Input ends inside a data item"))]
    HitEnd,
    /// A reserved additional-information value (28, 29, 30) was encountered.
    #[cfg_attr(any(feature = "full", test), error("Reserved additional information value"))]
    Unsupported,
    /// A reserved simple value (24..=31 in two-byte form) was encountered.
    #[cfg_attr(any(feature = "full", test), error("Reserved simple value"))]
    BadType7,
    /// An indefinite length string was encountered; chunk reassembly needs an allocator.
    #[cfg_attr(any(feature = "full", test), error("Indefinite length string chunks unsupported"))]
    IndefiniteStringChunk,
    /// A break byte appeared outside an indefinite length aggregate.
    #[cfg_attr(any(feature = "full", test), error("Break outside an indefinite length item"))]
    BadBreak,
    /// More tag numbers are chained on one item than can be retained.
    #[cfg_attr(any(feature = "full", test), error("Too many tags on one item"))]
    TooManyTags,
    /// A map label is not an integer, text string or byte string.
    #[cfg_attr(any(feature = "full", test), error("Map label of unsupported type"))]
    MapLabelType,
    /// A text string contains an invalid UTF-8 sequence.
    #[cfg_attr(any(feature = "full", test), error("A tstr contains an invalid UTF8 sequence"))]
    InvalidUtf8,
    /// The decoded item does not have the requested type.
    #[cfg_attr(any(feature = "full", test), error("Item does not have the expected type"))]
    UnexpectedType,
    /// The bounded map does not contain the requested label.
    #[cfg_attr(any(feature = "full", test), error("Map does not contain the requested label"))]
    LabelNotFound,
    /// A bounded-map operation was issued with no map entered.
    #[cfg_attr(any(feature = "full", test), error("No map entered"))]
    MapNotEntered,
    /// An exit operation does not match the entered aggregate.
    #[cfg_attr(any(feature = "full", test), error("Exit does not match the entered aggregate"))]
    ExitMismatch,
    /// A number conversion has overflowed or underflowed.
    #[cfg_attr(any(feature = "full", test), error("Overflow or underflow in number conversion"))]
    ConversionUnderOverFlow,
    /// A negative number cannot be converted to an unsigned type.
    #[cfg_attr(any(feature = "full", test), error("Sign lost in number conversion"))]
    NumberSignConversion,
    /// A floating point source is NaN or otherwise unusable for the conversion.
    #[cfg_attr(any(feature = "full", test), error("Floating point exception in conversion"))]
    FloatException,
    /// No more items at the current (bounded) nesting level. Usually recoverable.
    #[cfg_attr(any(feature = "full", test), error("No more items at this level"))]
    NoMoreItems,
}

impl CBORError {
    /// The stable numeric code for this error.
    pub fn code(&self) -> u8 {
        match self {
            CBORError::BufferTooSmall => 1,
            CBORError::BufferTooLarge => 2,
            CBORError::NestingTooDeep => 3,
            CBORError::ArrayTooLong => 4,
            CBORError::TooManyCloses => 5,
            CBORError::CloseMismatch => 6,
            CBORError::ArrayOrMapStillOpen => 7,
            CBORError::CannotCancel => 8,
            CBORError::OpenByteString => 9,
            CBORError::NotPreferred => 10,
            CBORError::NotAllowed => 11,
            CBORError::EncodeUnsupported => 12,
            CBORError::DuplicateLabel => 13,
            CBORError::HitEnd => 14,
            CBORError::Unsupported => 15,
            CBORError::BadType7 => 16,
            CBORError::IndefiniteStringChunk => 17,
            CBORError::BadBreak => 18,
            CBORError::TooManyTags => 19,
            CBORError::MapLabelType => 20,
            CBORError::InvalidUtf8 => 21,
            CBORError::UnexpectedType => 22,
            CBORError::LabelNotFound => 23,
            CBORError::MapNotEntered => 24,
            CBORError::ExitMismatch => 25,
            CBORError::ConversionUnderOverFlow => 26,
            CBORError::NumberSignConversion => 27,
            CBORError::FloatException => 28,
            CBORError::NoMoreItems => 29,
        }
    }

    /// `true` if the error terminates all further forward progress on the decode side.
    ///
    /// Recoverable errors (a type mismatch on a user-requested item, a label that is not
    /// present) leave the traversal cursor in a consistent state; everything that indicates
    /// malformed or truncated input does not.
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            CBORError::HitEnd
            | CBORError::Unsupported
            | CBORError::BadType7
            | CBORError::IndefiniteStringChunk
            | CBORError::BadBreak
            | CBORError::TooManyTags
            | CBORError::MapLabelType
            | CBORError::InvalidUtf8
            | CBORError::NestingTooDeep
            | CBORError::ArrayTooLong
            | CBORError::BufferTooLarge
            | CBORError::NotPreferred
            | CBORError::NotAllowed => true,
            _ => false,
        }
    }
}
