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
 * tps_detcbor numeric conversion
 *
 * Projects any numeric CBOR item (integer, float, big number, decimal fraction, big float)
 * into a requested scalar type. Every conversion is gated by a caller-supplied mask of
 * acceptable source types and reports under/overflow and sign loss explicitly. Exponents are
 * applied by repeated multiplication or division so that integer results are exact or refused;
 * nothing here rounds silently.
 **************************************************************************************************/
use crate::constants::convert;
use crate::decode::{CborItem, Mantissa, Value};
use crate::error::{CBORError, Result};
use crate::float::{
    double_round_to_integer, double_to_integer, half_to_double_bits, single_to_double_bits,
    IntResult,
};

#[cfg(feature = "trace")]
use func_trace::trace;

#[cfg(feature = "trace")]
func_trace::init_depth_var!();

/// A bitmask over the `convert` constants naming the source types a conversion may draw from.
#[derive(Debug, Copy, Clone)]
pub struct Conversions(u32);

impl Conversions {
    pub fn new(v: u32) -> Self {
        Conversions(v)
    }

    /// Every source type accepted.
    pub fn all() -> Self {
        Conversions(convert::ALL)
    }

    #[inline]
    fn permits(&self, bit: u32) -> Result<()> {
        if self.0 & bit != 0 {
            Ok(())
        } else {
            Err(CBORError::UnexpectedType)
        }
    }
}

/// The double widening of a float item, or `None` for non-float items.
fn float_bits(value: &Value) -> Option<u64> {
    match value {
        Value::Float16(h) => Some(half_to_double_bits(h.to_bits())),
        Value::Float32(s) => Some(single_to_double_bits(s.to_bits())),
        Value::Float64(d) => Some(d.to_bits()),
        _ => None,
    }
}

/// Fold a big number content slice into a u64 magnitude, most significant byte first.
fn bignum_to_u64(content: &[u8]) -> Result<u64> {
    let mut v: u64 = 0;
    for &b in content {
        v = v
            .checked_mul(256)
            .and_then(|v| v.checked_add(b as u64))
            .ok_or(CBORError::ConversionUnderOverFlow)?;
    }
    Ok(v)
}

/***************************************************************************************************
 * Conversion to i64
 **************************************************************************************************/

/// Convert a numeric item to an i64, accepting the source types named in `conv`.
#[cfg_attr(feature = "trace", trace)]
pub fn to_i64(item: &CborItem, conv: Conversions) -> Result<i64> {
    match item.value {
        Value::UInt(v) => {
            conv.permits(convert::XINT)?;
            if v <= i64::MAX as u64 {
                Ok(v as i64)
            } else {
                Err(CBORError::ConversionUnderOverFlow)
            }
        }
        Value::Int(v) => {
            conv.permits(convert::XINT)?;
            Ok(v)
        }
        Value::NegInt65(_) => {
            conv.permits(convert::XINT)?;
            Err(CBORError::ConversionUnderOverFlow)
        }
        Value::Float16(_) | Value::Float32(_) | Value::Float64(_) => {
            conv.permits(convert::FLOAT)?;
            // float_bits is total over the float variants
            let d = float_bits(&item.value).ok_or(CBORError::UnexpectedType)?;
            match double_round_to_integer(d) {
                IntResult::Int(v) => Ok(v),
                IntResult::UInt(v) => {
                    if v <= i64::MAX as u64 {
                        Ok(v as i64)
                    } else {
                        Err(CBORError::ConversionUnderOverFlow)
                    }
                }
                IntResult::Neg65(_) => Err(CBORError::ConversionUnderOverFlow),
                IntResult::NaN => Err(CBORError::FloatException),
                IntResult::NoConversion => Err(CBORError::ConversionUnderOverFlow),
            }
        }
        Value::BigNum { negative, content } => {
            conv.permits(convert::BIGNUM)?;
            let n = bignum_to_u64(content)?;
            if negative {
                // Content n stands for the value -1 - n
                if n <= i64::MAX as u64 {
                    Ok(-1 - (n as i64))
                } else {
                    Err(CBORError::ConversionUnderOverFlow)
                }
            } else if n <= i64::MAX as u64 {
                Ok(n as i64)
            } else {
                Err(CBORError::ConversionUnderOverFlow)
            }
        }
        Value::DecimalFraction { exponent, mantissa } => {
            conv.permits(convert::DECIMAL_FRACTION)?;
            exponentiate10_i64(mantissa_to_i64(&mantissa)?, exponent)
        }
        Value::BigFloat { exponent, mantissa } => {
            conv.permits(convert::BIGFLOAT)?;
            exponentiate2_i64(mantissa_to_i64(&mantissa)?, exponent)
        }
        _ => Err(CBORError::UnexpectedType),
    }
}

fn mantissa_to_i64(m: &Mantissa) -> Result<i64> {
    match m {
        Mantissa::Int(v) => Ok(*v),
        Mantissa::BigNum { negative, content } => {
            let n = bignum_to_u64(content)?;
            if *negative {
                if n <= i64::MAX as u64 {
                    Ok(-1 - (n as i64))
                } else {
                    Err(CBORError::ConversionUnderOverFlow)
                }
            } else if n <= i64::MAX as u64 {
                Ok(n as i64)
            } else {
                Err(CBORError::ConversionUnderOverFlow)
            }
        }
    }
}

/// Apply a base 10 exponent to an i64 mantissa. Positive exponents multiply with overflow
/// checking; negative exponents divide and refuse any inexact result. No i64 survives more
/// than 19 steps in either direction.
fn exponentiate10_i64(mantissa: i64, exponent: i64) -> Result<i64> {
    if mantissa == 0 {
        return Ok(0);
    }
    if exponent.unsigned_abs() > 19 {
        return Err(CBORError::ConversionUnderOverFlow);
    }
    let mut v = mantissa;
    if exponent >= 0 {
        for _ in 0..exponent {
            v = v.checked_mul(10).ok_or(CBORError::ConversionUnderOverFlow)?;
        }
    } else {
        for _ in 0..-exponent {
            if v % 10 != 0 {
                return Err(CBORError::ConversionUnderOverFlow);
            }
            v /= 10;
        }
    }
    Ok(v)
}

/// Apply a base 2 exponent to an i64 mantissa, with the same exactness rules as base 10.
fn exponentiate2_i64(mantissa: i64, exponent: i64) -> Result<i64> {
    if mantissa == 0 {
        return Ok(0);
    }
    if exponent.unsigned_abs() > 64 {
        return Err(CBORError::ConversionUnderOverFlow);
    }
    let mut v = mantissa;
    if exponent >= 0 {
        for _ in 0..exponent {
            v = v.checked_mul(2).ok_or(CBORError::ConversionUnderOverFlow)?;
        }
    } else {
        for _ in 0..-exponent {
            if v % 2 != 0 {
                return Err(CBORError::ConversionUnderOverFlow);
            }
            v /= 2;
        }
    }
    Ok(v)
}

/***************************************************************************************************
 * Conversion to u64
 **************************************************************************************************/

/// Convert a numeric item to a u64, accepting the source types named in `conv`. Negative
/// sources report `NumberSignConversion`.
#[cfg_attr(feature = "trace", trace)]
pub fn to_u64(item: &CborItem, conv: Conversions) -> Result<u64> {
    match item.value {
        Value::UInt(v) => {
            conv.permits(convert::XINT)?;
            Ok(v)
        }
        Value::Int(_) | Value::NegInt65(_) => {
            conv.permits(convert::XINT)?;
            Err(CBORError::NumberSignConversion)
        }
        Value::Float16(_) | Value::Float32(_) | Value::Float64(_) => {
            conv.permits(convert::FLOAT)?;
            let d = float_bits(&item.value).ok_or(CBORError::UnexpectedType)?;
            match double_round_to_integer(d) {
                IntResult::UInt(v) => Ok(v),
                IntResult::Int(_) | IntResult::Neg65(_) => Err(CBORError::NumberSignConversion),
                IntResult::NaN => Err(CBORError::FloatException),
                IntResult::NoConversion => Err(CBORError::ConversionUnderOverFlow),
            }
        }
        Value::BigNum { negative, content } => {
            conv.permits(convert::BIGNUM)?;
            if negative {
                Err(CBORError::NumberSignConversion)
            } else {
                bignum_to_u64(content)
            }
        }
        Value::DecimalFraction { exponent, mantissa } => {
            conv.permits(convert::DECIMAL_FRACTION)?;
            exponentiate10_u64(mantissa_to_u64(&mantissa)?, exponent)
        }
        Value::BigFloat { exponent, mantissa } => {
            conv.permits(convert::BIGFLOAT)?;
            exponentiate2_u64(mantissa_to_u64(&mantissa)?, exponent)
        }
        _ => Err(CBORError::UnexpectedType),
    }
}

fn mantissa_to_u64(m: &Mantissa) -> Result<u64> {
    match m {
        Mantissa::Int(v) => {
            if *v >= 0 {
                Ok(*v as u64)
            } else {
                Err(CBORError::NumberSignConversion)
            }
        }
        Mantissa::BigNum { negative, content } => {
            if *negative {
                Err(CBORError::NumberSignConversion)
            } else {
                bignum_to_u64(content)
            }
        }
    }
}

fn exponentiate10_u64(mantissa: u64, exponent: i64) -> Result<u64> {
    if mantissa == 0 {
        return Ok(0);
    }
    if exponent.unsigned_abs() > 19 {
        return Err(CBORError::ConversionUnderOverFlow);
    }
    let mut v = mantissa;
    if exponent >= 0 {
        for _ in 0..exponent {
            v = v.checked_mul(10).ok_or(CBORError::ConversionUnderOverFlow)?;
        }
    } else {
        for _ in 0..-exponent {
            if v % 10 != 0 {
                return Err(CBORError::ConversionUnderOverFlow);
            }
            v /= 10;
        }
    }
    Ok(v)
}

fn exponentiate2_u64(mantissa: u64, exponent: i64) -> Result<u64> {
    if mantissa == 0 {
        return Ok(0);
    }
    if exponent.unsigned_abs() > 64 {
        return Err(CBORError::ConversionUnderOverFlow);
    }
    let mut v = mantissa;
    if exponent >= 0 {
        for _ in 0..exponent {
            v = v.checked_mul(2).ok_or(CBORError::ConversionUnderOverFlow)?;
        }
    } else {
        for _ in 0..-exponent {
            if v % 2 != 0 {
                return Err(CBORError::ConversionUnderOverFlow);
            }
            v /= 2;
        }
    }
    Ok(v)
}

/***************************************************************************************************
 * Conversion to f64
 **************************************************************************************************/

/// Convert a numeric item to an f64, accepting the source types named in `conv`. Big numbers
/// fold in by repeated multiply-and-add; values beyond double precision round.
#[cfg(feature = "float")]
#[cfg_attr(feature = "trace", trace)]
pub fn to_f64(item: &CborItem, conv: Conversions) -> Result<f64> {
    match item.value {
        Value::UInt(v) => {
            conv.permits(convert::XINT)?;
            Ok(v as f64)
        }
        Value::Int(v) => {
            conv.permits(convert::XINT)?;
            Ok(v as f64)
        }
        Value::NegInt65(n) => {
            conv.permits(convert::XINT)?;
            Ok(-1.0 - (n as f64))
        }
        Value::Float16(_) | Value::Float32(_) | Value::Float64(_) => {
            conv.permits(convert::FLOAT)?;
            let d = float_bits(&item.value).ok_or(CBORError::UnexpectedType)?;
            Ok(f64::from_bits(d))
        }
        Value::BigNum { negative, content } => {
            conv.permits(convert::BIGNUM)?;
            let mag = bignum_to_f64(content);
            if negative {
                Ok(-1.0 - mag)
            } else {
                Ok(mag)
            }
        }
        Value::DecimalFraction { exponent, mantissa } => {
            conv.permits(convert::DECIMAL_FRACTION)?;
            Ok(scale_f64(mantissa_to_f64(&mantissa), exponent, 10.0))
        }
        Value::BigFloat { exponent, mantissa } => {
            conv.permits(convert::BIGFLOAT)?;
            Ok(scale_f64(mantissa_to_f64(&mantissa), exponent, 2.0))
        }
        _ => Err(CBORError::UnexpectedType),
    }
}

#[cfg(feature = "float")]
fn bignum_to_f64(content: &[u8]) -> f64 {
    let mut v = 0.0f64;
    for &b in content {
        v = v * 256.0 + b as f64;
    }
    v
}

#[cfg(feature = "float")]
fn mantissa_to_f64(m: &Mantissa) -> f64 {
    match m {
        Mantissa::Int(v) => *v as f64,
        Mantissa::BigNum { negative, content } => {
            let mag = bignum_to_f64(content);
            if *negative {
                -1.0 - mag
            } else {
                mag
            }
        }
    }
}

/// Multiply `v` by `base` raised to `exponent`. Overflow saturates to infinity and underflow
/// to zero, the usual float semantics.
#[cfg(feature = "float")]
fn scale_f64(v: f64, exponent: i64, base: f64) -> f64 {
    let mut r = v;
    if exponent >= 0 {
        for _ in 0..exponent {
            r *= base;
            if r.is_infinite() {
                break;
            }
        }
    } else {
        for _ in 0..-exponent {
            r /= base;
            if r == 0.0 {
                break;
            }
        }
    }
    r
}

/***************************************************************************************************
 * Whole-number promotion and big number extraction
 **************************************************************************************************/

/// Promote a float item to an integer value when it is a whole number in range, the dCBOR
/// numeric reduction viewed from the decode side. Integer items pass through unchanged, as do
/// floats that are fractional, infinite or NaN.
///
/// The one asymmetry: -2^64 converts to a 65 bit carrier of `u64::MAX`, which is out of the
/// carrier's domain, so that value is returned as the exact double instead.
pub fn promote_number<'buf>(item: &CborItem<'buf>) -> Result<Value<'buf>> {
    match item.value {
        Value::UInt(_)
        | Value::Int(_)
        | Value::NegInt65(_)
        | Value::BigNum { .. }
        | Value::DecimalFraction { .. }
        | Value::BigFloat { .. } => Ok(item.value),
        Value::Float16(_) | Value::Float32(_) | Value::Float64(_) => {
            let d = float_bits(&item.value).ok_or(CBORError::UnexpectedType)?;
            match double_to_integer(d) {
                IntResult::UInt(v) => Ok(Value::UInt(v)),
                IntResult::Int(v) => Ok(Value::Int(v)),
                IntResult::Neg65(n) => {
                    if n == u64::MAX {
                        Ok(Value::Float64(-18446744073709551616.0))
                    } else {
                        Ok(Value::NegInt65(n))
                    }
                }
                IntResult::NaN | IntResult::NoConversion => Ok(item.value),
            }
        }
        _ => Err(CBORError::UnexpectedType),
    }
}

/// Extract the magnitude of an integer or big number item into `out`, most significant byte
/// first, with leading zeros stripped (the value 0 keeps one zero byte). Returns the length
/// used and whether the value is negative.
///
/// For negative big numbers the content is the offset encoding -1 - n, so one is added back
/// to recover the magnitude; the carry can lengthen the result by one byte.
#[cfg_attr(feature = "trace", trace)]
pub fn extract_big_number(item: &CborItem, out: &mut [u8]) -> Result<(usize, bool)> {
    match item.value {
        Value::BigNum { negative, content } => {
            let stripped = strip_leading_zeros(content);
            if negative {
                let len = add_one_into(stripped, out)?;
                Ok((len, true))
            } else {
                let len = copy_magnitude(stripped, out)?;
                Ok((len, false))
            }
        }
        Value::UInt(v) => {
            let len = copy_u64_magnitude(v, out)?;
            Ok((len, false))
        }
        Value::Int(v) => {
            if v >= 0 {
                let len = copy_u64_magnitude(v as u64, out)?;
                Ok((len, false))
            } else {
                let len = copy_u64_magnitude(v.unsigned_abs(), out)?;
                Ok((len, true))
            }
        }
        Value::NegInt65(n) => {
            // Value is -1 - n; the magnitude n + 1 may need a ninth byte
            match n.checked_add(1) {
                Some(mag) => {
                    let len = copy_u64_magnitude(mag, out)?;
                    Ok((len, true))
                }
                None => {
                    if out.len() < 9 {
                        return Err(CBORError::BufferTooSmall);
                    }
                    out[0] = 0x01;
                    for b in out[1..9].iter_mut() {
                        *b = 0;
                    }
                    Ok((9, true))
                }
            }
        }
        _ => Err(CBORError::UnexpectedType),
    }
}

fn strip_leading_zeros(content: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < content.len() && content[i] == 0 {
        i += 1;
    }
    &content[i..]
}

fn copy_magnitude(stripped: &[u8], out: &mut [u8]) -> Result<usize> {
    if stripped.is_empty() {
        if out.is_empty() {
            return Err(CBORError::BufferTooSmall);
        }
        out[0] = 0;
        return Ok(1);
    }
    if out.len() < stripped.len() {
        return Err(CBORError::BufferTooSmall);
    }
    out[..stripped.len()].copy_from_slice(stripped);
    Ok(stripped.len())
}

fn copy_u64_magnitude(v: u64, out: &mut [u8]) -> Result<usize> {
    let bytes = v.to_be_bytes();
    copy_magnitude(strip_leading_zeros(&bytes), out)
}

/// Write `content + 1` into `out`, where `content` is a leading-zero-stripped big-endian
/// magnitude. All-ones content grows by one byte.
fn add_one_into(content: &[u8], out: &mut [u8]) -> Result<usize> {
    if content.iter().all(|&b| b == 0xff) {
        // Includes the empty content, whose magnitude is 1
        let len = content.len() + 1;
        if out.len() < len {
            return Err(CBORError::BufferTooSmall);
        }
        out[0] = 0x01;
        for b in out[1..len].iter_mut() {
            *b = 0;
        }
        return Ok(len);
    }
    if out.len() < content.len() {
        return Err(CBORError::BufferTooSmall);
    }
    out[..content.len()].copy_from_slice(content);
    let mut i = content.len() - 1;
    loop {
        let (v, carry) = out[i].overflowing_add(1);
        out[i] = v;
        if !carry {
            break;
        }
        // The all-ones case is handled above, so a more significant byte always absorbs
        // the carry
        i -= 1;
    }
    Ok(content.len())
}
