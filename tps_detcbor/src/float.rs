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
 * tps_detcbor IEEE 754 conversion core
 *
 * Lossless conversions between half, single and double precision and classification of floats
 * as integers, all done by shifting and masking bit patterns. Nothing here requires floating
 * point hardware; NaN significands are treated as opaque payloads and carried across widths
 * whenever the dropped bits are zero.
 **************************************************************************************************/

// Half precision: 1 sign, 5 exponent (bias 15), 10 significand bits.
const HALF_SIGN_SHIFT: u32 = 15;
const HALF_EXP_SHIFT: u32 = 10;
const HALF_EXP_MASK: u16 = 0x7c00;
const HALF_MANT_MASK: u16 = 0x03ff;
const HALF_BIAS: i32 = 15;
const HALF_EXP_MIN: i32 = -14;
/// Canonical half precision quiet NaN
pub const HALF_QUIET_NAN: u16 = 0x7e00;

// Single precision: 1 sign, 8 exponent (bias 127), 23 significand bits.
const SINGLE_SIGN_SHIFT: u32 = 31;
const SINGLE_EXP_SHIFT: u32 = 23;
const SINGLE_EXP_MASK: u32 = 0x7f80_0000;
const SINGLE_MANT_MASK: u32 = 0x007f_ffff;
const SINGLE_BIAS: i32 = 127;
const SINGLE_EXP_MIN: i32 = -126;
const SINGLE_QUIET_BIT: u32 = 0x0040_0000;

// Double precision: 1 sign, 11 exponent (bias 1023), 52 significand bits.
const DOUBLE_SIGN_SHIFT: u32 = 63;
const DOUBLE_EXP_SHIFT: u32 = 52;
const DOUBLE_EXP_MASK: u64 = 0x7ff0_0000_0000_0000;
const DOUBLE_MANT_MASK: u64 = 0x000f_ffff_ffff_ffff;
const DOUBLE_BIAS: i32 = 1023;
const DOUBLE_QUIET_BIT: u64 = 0x0008_0000_0000_0000;

/// A float value shrunk to its smallest lossless width, carrying the bit pattern for the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Shrunk {
    /// Two byte encoding
    Half(u16),
    /// Four byte encoding
    Single(u32),
    /// Eight byte encoding
    Double(u64),
}

/// The result of classifying a float as an integer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IntResult {
    /// Whole number representable as i64 (always negative here; positives report as `UInt`)
    Int(i64),
    /// Whole number representable as u64
    UInt(u64),
    /// Negative whole number in [-2^64, -2^63); the carrier `n` represents the value -1 - n
    Neg65(u64),
    /// Not a number
    NaN,
    /// Finite but not a whole number in range, or infinite
    NoConversion,
}

/***************************************************************************************************
 * Widening conversions (always lossless)
 **************************************************************************************************/

/// Convert a half precision bit pattern to a double precision bit pattern. Lossless for all
/// inputs; NaN payloads shift left into the wider significand.
pub fn half_to_double_bits(h: u16) -> u64 {
    let sign = ((h >> HALF_SIGN_SHIFT) as u64) << DOUBLE_SIGN_SHIFT;
    let exp = ((h & HALF_EXP_MASK) >> HALF_EXP_SHIFT) as i32;
    let mant = (h & HALF_MANT_MASK) as u64;

    if exp == 0x1f {
        // Infinity and NaN
        sign | DOUBLE_EXP_MASK | (mant << (DOUBLE_EXP_SHIFT - HALF_EXP_SHIFT))
    } else if exp == 0 {
        if mant == 0 {
            sign
        } else {
            // Subnormal: normalize mant = 1.xxx * 2^p with p the highest set bit
            let p = 63 - mant.leading_zeros() as i32;
            let e2 = (p - HALF_EXP_SHIFT as i32) + HALF_EXP_MIN;
            let m2 = (mant << (DOUBLE_EXP_SHIFT - p as u32)) & DOUBLE_MANT_MASK;
            sign | (((e2 + DOUBLE_BIAS) as u64) << DOUBLE_EXP_SHIFT) | m2
        }
    } else {
        let e2 = (exp - HALF_BIAS + DOUBLE_BIAS) as u64;
        sign | (e2 << DOUBLE_EXP_SHIFT) | (mant << (DOUBLE_EXP_SHIFT - HALF_EXP_SHIFT))
    }
}

/// Convert a single precision bit pattern to a double precision bit pattern. Lossless for all
/// inputs; NaN payloads shift left into the wider significand.
pub fn single_to_double_bits(s: u32) -> u64 {
    let sign = ((s >> SINGLE_SIGN_SHIFT) as u64) << DOUBLE_SIGN_SHIFT;
    let exp = ((s & SINGLE_EXP_MASK) >> SINGLE_EXP_SHIFT) as i32;
    let mant = (s & SINGLE_MANT_MASK) as u64;

    if exp == 0xff {
        sign | DOUBLE_EXP_MASK | (mant << (DOUBLE_EXP_SHIFT - SINGLE_EXP_SHIFT))
    } else if exp == 0 {
        if mant == 0 {
            sign
        } else {
            let p = 63 - mant.leading_zeros() as i32;
            let e2 = (p - SINGLE_EXP_SHIFT as i32) + SINGLE_EXP_MIN;
            let m2 = (mant << (DOUBLE_EXP_SHIFT - p as u32)) & DOUBLE_MANT_MASK;
            sign | (((e2 + DOUBLE_BIAS) as u64) << DOUBLE_EXP_SHIFT) | m2
        }
    } else {
        let e2 = (exp - SINGLE_BIAS + DOUBLE_BIAS) as u64;
        sign | (e2 << DOUBLE_EXP_SHIFT) | (mant << (DOUBLE_EXP_SHIFT - SINGLE_EXP_SHIFT))
    }
}

/***************************************************************************************************
 * Shrinking conversions (succeed only when no precision is lost)
 **************************************************************************************************/

/// Convert a double precision bit pattern to single precision, succeeding only if the value
/// (or the NaN payload) survives unchanged. Subnormal results are produced when exact.
pub fn double_to_single(d: u64) -> Option<u32> {
    shrink(
        d as u128,
        FloatFormat::DOUBLE,
        FloatFormat::SINGLE,
    )
    .map(|b| b as u32)
}

/// Convert a double precision bit pattern to half precision, succeeding only if the value
/// (or the NaN payload) survives unchanged.
pub fn double_to_half(d: u64) -> Option<u16> {
    shrink(d as u128, FloatFormat::DOUBLE, FloatFormat::HALF).map(|b| b as u16)
}

/// Convert a single precision bit pattern to half precision, succeeding only if the value
/// (or the NaN payload) survives unchanged.
pub fn single_to_half(s: u32) -> Option<u16> {
    shrink(s as u128, FloatFormat::SINGLE, FloatFormat::HALF).map(|b| b as u16)
}

/// Field geometry of one IEEE 754 interchange format. Shrinking is the same shift-and-mask
/// procedure for every (wider, narrower) pair, so it is written once over this description.
#[derive(Copy, Clone)]
struct FloatFormat {
    exp_bits: u32,
    mant_bits: u32,
    bias: i32,
}

impl FloatFormat {
    const HALF: FloatFormat = FloatFormat {
        exp_bits: 5,
        mant_bits: 10,
        bias: HALF_BIAS,
    };
    const SINGLE: FloatFormat = FloatFormat {
        exp_bits: 8,
        mant_bits: 23,
        bias: SINGLE_BIAS,
    };
    const DOUBLE: FloatFormat = FloatFormat {
        exp_bits: 11,
        mant_bits: 52,
        bias: DOUBLE_BIAS,
    };

    #[inline]
    fn exp_max(&self) -> i32 {
        self.bias
    }

    #[inline]
    fn exp_min(&self) -> i32 {
        1 - self.bias
    }

    #[inline]
    fn exp_field_max(&self) -> i32 {
        (1 << self.exp_bits) - 1
    }
}

fn shrink(bits: u128, src: FloatFormat, dst: FloatFormat) -> Option<u128> {
    let mant_mask = (1u128 << src.mant_bits) - 1;
    let sign = (bits >> (src.exp_bits + src.mant_bits)) & 1;
    let exp_field = ((bits >> src.mant_bits) as i32) & src.exp_field_max();
    let mant = bits & mant_mask;
    let drop = src.mant_bits - dst.mant_bits;

    let dst_sign = sign << (dst.exp_bits + dst.mant_bits);

    if exp_field == src.exp_field_max() {
        // Infinity converts freely; a NaN converts only if the dropped payload bits are zero
        if mant != 0 && mant & ((1u128 << drop) - 1) != 0 {
            return None;
        }
        let dst_exp = (dst.exp_field_max() as u128) << dst.mant_bits;
        return Some(dst_sign | dst_exp | (mant >> drop));
    }

    if exp_field == 0 {
        // Zero always converts; a source subnormal is below the smallest target subnormal
        // by a margin no shift can recover exactly
        return if mant == 0 { Some(dst_sign) } else { None };
    }

    let exp = exp_field - src.bias;
    if exp >= dst.exp_min() && exp <= dst.exp_max() {
        // Normal in the target: the dropped significand bits must be zero
        if mant & ((1u128 << drop) - 1) != 0 {
            return None;
        }
        let dst_exp = ((exp + dst.bias) as u128) << dst.mant_bits;
        Some(dst_sign | dst_exp | (mant >> drop))
    } else if exp < dst.exp_min() && exp >= dst.exp_min() - dst.mant_bits as i32 {
        // Subnormal in the target: shift the full significand (implicit bit restored) right
        // and require exactness
        let shift = (dst.exp_min() - exp) as u32;
        let full = (1u128 << src.mant_bits) | mant;
        if full & ((1u128 << (drop + shift)) - 1) != 0 {
            return None;
        }
        Some(dst_sign | (full >> (drop + shift)))
    } else {
        None
    }
}

/// Shrink a double precision bit pattern to its smallest lossless width, the preferred float
/// serialization. When `no_nan_payload` is set, every NaN becomes the canonical half precision
/// quiet NaN regardless of payload.
pub fn shrink_double(d: u64, no_nan_payload: bool) -> Shrunk {
    if no_nan_payload && is_double_nan(d) {
        return Shrunk::Half(HALF_QUIET_NAN);
    }
    match double_to_single(d) {
        Some(s) => match single_to_half(s) {
            Some(h) => Shrunk::Half(h),
            None => Shrunk::Single(s),
        },
        None => Shrunk::Double(d),
    }
}

/// Shrink a single precision bit pattern to its smallest lossless width.
pub fn shrink_single(s: u32, no_nan_payload: bool) -> Shrunk {
    if no_nan_payload && is_single_nan(s) {
        return Shrunk::Half(HALF_QUIET_NAN);
    }
    match single_to_half(s) {
        Some(h) => Shrunk::Half(h),
        None => Shrunk::Single(s),
    }
}

/***************************************************************************************************
 * Integer classification
 **************************************************************************************************/

#[inline]
fn is_double_nan(d: u64) -> bool {
    d & DOUBLE_EXP_MASK == DOUBLE_EXP_MASK && d & DOUBLE_MANT_MASK != 0
}

#[inline]
fn is_single_nan(s: u32) -> bool {
    s & SINGLE_EXP_MASK == SINGLE_EXP_MASK && s & SINGLE_MANT_MASK != 0
}

/// `true` if the double is a NaN whose significand differs from the canonical quiet pattern.
pub fn double_nan_has_payload(d: u64) -> bool {
    is_double_nan(d) && d & DOUBLE_MANT_MASK != DOUBLE_QUIET_BIT
}

/// `true` if the single is a NaN whose significand differs from the canonical quiet pattern.
pub fn single_nan_has_payload(s: u32) -> bool {
    is_single_nan(s) && s & SINGLE_MANT_MASK != SINGLE_QUIET_BIT
}

fn classify_magnitude(mag: u64, negative: bool) -> IntResult {
    if negative {
        if mag <= (1u64 << 63) {
            // -2^63 .. 0; the wrapping negation maps 2^63 onto i64::MIN
            IntResult::Int((mag as i64).wrapping_neg())
        } else {
            IntResult::Neg65(mag - 1)
        }
    } else {
        IntResult::UInt(mag)
    }
}

/// Classify a double as an integer. Succeeds only for finite whole numbers in
/// [-2^64, 2^64); everything else reports `NaN` or `NoConversion`.
pub fn double_to_integer(d: u64) -> IntResult {
    double_integer_inner(d, false)
}

/// Classify a double as an integer, rounding to nearest with ties to even. Used by number
/// conversion, where 2.5 becomes 2 rather than failing.
pub fn double_round_to_integer(d: u64) -> IntResult {
    double_integer_inner(d, true)
}

/// Classify a single as an integer via its exact double widening.
pub fn single_to_integer(s: u32) -> IntResult {
    double_integer_inner(single_to_double_bits(s), false)
}

fn double_integer_inner(d: u64, round: bool) -> IntResult {
    let negative = d >> DOUBLE_SIGN_SHIFT != 0;
    let exp_field = ((d & DOUBLE_EXP_MASK) >> DOUBLE_EXP_SHIFT) as i32;
    let mant = d & DOUBLE_MANT_MASK;

    if exp_field == 0x7ff {
        return if mant != 0 {
            IntResult::NaN
        } else {
            IntResult::NoConversion
        };
    }
    if exp_field == 0 {
        // Zero and subnormals; the largest subnormal is far below 1/2
        return if mant == 0 || round {
            IntResult::UInt(0)
        } else {
            IntResult::NoConversion
        };
    }

    let exp = exp_field - DOUBLE_BIAS;
    let full = (1u64 << DOUBLE_EXP_SHIFT) | mant;

    if exp < 0 {
        // Magnitude below one
        if !round {
            return IntResult::NoConversion;
        }
        // Only exp == -1 (magnitude in [1/2, 1)) can round away from zero; exactly 1/2
        // rounds to the even value 0
        return if exp == -1 && mant != 0 {
            classify_magnitude(1, negative)
        } else {
            IntResult::UInt(0)
        };
    }

    if exp <= 52 {
        let dropped = (52 - exp) as u32;
        let frac_mask = (1u64 << dropped).wrapping_sub(1);
        let frac = full & frac_mask;
        let mut mag = full >> dropped;
        if frac != 0 {
            if !round {
                return IntResult::NoConversion;
            }
            let half = 1u64 << (dropped - 1);
            if frac > half || (frac == half && mag & 1 == 1) {
                mag += 1; // cannot overflow: mag < 2^53 here
            }
        }
        classify_magnitude(mag, negative)
    } else if exp <= 63 {
        classify_magnitude(full << (exp - 52), negative)
    } else if exp == 64 && negative && mant == 0 {
        // Exactly -2^64, the far end of the 65 bit negative range
        IntResult::Neg65(u64::MAX)
    } else {
        IntResult::NoConversion
    }
}

/// Produce the double that exactly equals `v`, or `None` when `v` needs more than 53
/// significant bits and cannot be represented without rounding.
pub fn u64_to_double_exact(v: u64) -> Option<f64> {
    if v == 0 {
        return Some(0.0);
    }
    let span = 64 - v.leading_zeros() - v.trailing_zeros();
    if span <= 53 {
        Some(v as f64)
    } else {
        None
    }
}

/***************************************************************************************************
 * Unit tests. Everything here is self-contained bit manipulation, so the tests live with it.
 **************************************************************************************************/
