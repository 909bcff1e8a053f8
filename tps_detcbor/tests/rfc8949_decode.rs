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
 * Test cases from RFC8949, for decoding
 *
 * Decoding vectors from RFC8949 Appendix A through the pull parser, plus nesting levels, tag
 * capture and well-formedness errors.
 **************************************************************************************************/

extern crate tps_detcbor;

use half::f16;

use tps_detcbor::decoder::Decoder;
use tps_detcbor::error::CBORError;
use tps_detcbor::types::{Label, Mantissa, Value};

fn decode_single(input: &[u8]) -> Result<Value, CBORError> {
    let mut dec = Decoder::new(input);
    dec.next_item().map(|item| item.value)
}

#[test]
fn rfc8949_decode_integers() -> Result<(), CBORError> {
    println!("<======================= rfc8949_decode_integers =====================>");
    assert_eq!(decode_single(&[0x00])?, Value::UInt(0));
    assert_eq!(decode_single(&[0x01])?, Value::UInt(1));
    assert_eq!(decode_single(&[0x0a])?, Value::UInt(10));
    assert_eq!(decode_single(&[0x17])?, Value::UInt(23));
    assert_eq!(decode_single(&[0x18, 0x18])?, Value::UInt(24));
    assert_eq!(decode_single(&[0x18, 0x64])?, Value::UInt(100));
    assert_eq!(decode_single(&[0x19, 0x03, 0xe8])?, Value::UInt(1000));
    assert_eq!(
        decode_single(&[0x1a, 0x00, 0x0f, 0x42, 0x40])?,
        Value::UInt(1000000)
    );
    assert_eq!(
        decode_single(&[0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])?,
        Value::UInt(u64::MAX)
    );
    assert_eq!(decode_single(&[0x20])?, Value::Int(-1));
    assert_eq!(decode_single(&[0x29])?, Value::Int(-10));
    assert_eq!(decode_single(&[0x38, 0x63])?, Value::Int(-100));
    assert_eq!(decode_single(&[0x39, 0x03, 0xe7])?, Value::Int(-1000));
    assert_eq!(
        decode_single(&[0x3b, 0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])?,
        Value::Int(i64::MIN)
    );
    // Below i64::MIN the value arrives as the 65 bit negative carrier
    assert_eq!(
        decode_single(&[0x3b, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00])?,
        Value::NegInt65(0x8000_0000_0000_0000)
    );
    assert_eq!(
        decode_single(&[0x3b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff])?,
        Value::NegInt65(u64::MAX)
    );
    Ok(())
}

#[test]
fn rfc8949_decode_floats() -> Result<(), CBORError> {
    println!("<======================= rfc8949_decode_floats =====================>");
    assert_eq!(
        decode_single(&[0xf9, 0x00, 0x00])?,
        Value::Float16(f16::from_bits(0x0000))
    );
    assert_eq!(
        decode_single(&[0xf9, 0x3c, 0x00])?,
        Value::Float16(f16::from_bits(0x3c00))
    );
    assert_eq!(
        decode_single(&[0xf9, 0x00, 0x01])?,
        Value::Float16(f16::from_bits(0x0001))
    );
    assert_eq!(
        decode_single(&[0xfa, 0x47, 0xc3, 0x50, 0x00])?,
        Value::Float32(100000.0)
    );
    assert_eq!(
        decode_single(&[0xfb, 0x3f, 0xf1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9a])?,
        Value::Float64(1.1)
    );
    assert_eq!(
        decode_single(&[0xf9, 0x7c, 0x00])?,
        Value::Float16(f16::INFINITY)
    );
    // NaN compares by bit pattern, not by PartialEq
    match decode_single(&[0xf9, 0x7e, 0x00])? {
        Value::Float16(h) => assert_eq!(h.to_bits(), 0x7e00),
        v => panic!("unexpected {:?}", v),
    }
    Ok(())
}

#[test]
fn rfc8949_decode_simple() -> Result<(), CBORError> {
    assert_eq!(decode_single(&[0xf4])?, Value::False);
    assert_eq!(decode_single(&[0xf5])?, Value::True);
    assert_eq!(decode_single(&[0xf6])?, Value::Null);
    assert_eq!(decode_single(&[0xf7])?, Value::Undefined);
    assert_eq!(decode_single(&[0xf0])?, Value::Simple(16));
    assert_eq!(decode_single(&[0xf8, 0xff])?, Value::Simple(255));
    // Two byte simple values below 32 are reserved
    assert_eq!(decode_single(&[0xf8, 0x18]), Err(CBORError::BadType7));
    Ok(())
}

#[test]
fn rfc8949_decode_strings() -> Result<(), CBORError> {
    assert_eq!(decode_single(&[0x40])?, Value::Bstr(&[]));
    assert_eq!(
        decode_single(&[0x44, 0x01, 0x02, 0x03, 0x04])?,
        Value::Bstr(&[0x01, 0x02, 0x03, 0x04])
    );
    assert_eq!(decode_single(&[0x60])?, Value::Tstr(""));
    assert_eq!(
        decode_single(&[0x64, 0x49, 0x45, 0x54, 0x46])?,
        Value::Tstr("IETF")
    );
    assert_eq!(
        decode_single(&[0x62, 0xc3, 0xbc])?,
        Value::Tstr("\u{00fc}")
    );
    // Invalid UTF-8 in a tstr
    assert_eq!(
        decode_single(&[0x62, 0xff, 0xfe]),
        Err(CBORError::InvalidUtf8)
    );
    Ok(())
}

#[test]
fn decode_nest_levels() -> Result<(), CBORError> {
    println!("<======================= decode_nest_levels =====================>");
    // [1, [2, 3], 4]
    let input: &[u8] = &[0x83, 0x01, 0x82, 0x02, 0x03, 0x04];
    let mut dec = Decoder::new(input);

    let item = dec.next_item()?;
    assert_eq!(item.value, Value::Array(3));
    assert_eq!((item.nest_level, item.next_nest_level), (0, 1));

    let item = dec.next_item()?;
    assert_eq!(item.value, Value::UInt(1));
    assert_eq!((item.nest_level, item.next_nest_level), (1, 1));

    let item = dec.next_item()?;
    assert_eq!(item.value, Value::Array(2));
    assert_eq!((item.nest_level, item.next_nest_level), (1, 2));

    let item = dec.next_item()?;
    assert_eq!(item.value, Value::UInt(2));
    assert_eq!((item.nest_level, item.next_nest_level), (2, 2));

    // The last element of the inner array ascends one level
    let item = dec.next_item()?;
    assert_eq!(item.value, Value::UInt(3));
    assert_eq!((item.nest_level, item.next_nest_level), (2, 1));

    let item = dec.next_item()?;
    assert_eq!(item.value, Value::UInt(4));
    assert_eq!((item.nest_level, item.next_nest_level), (1, 0));

    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::NoMoreItems));
    Ok(())
}

#[test]
fn decode_map_entries_pair_up() -> Result<(), CBORError> {
    // {"a": 1, "b": [2, 3]}
    let input: &[u8] = &[0xa2, 0x61, 0x61, 0x01, 0x61, 0x62, 0x82, 0x02, 0x03];
    let mut dec = Decoder::new(input);

    assert_eq!(dec.next_item()?.value, Value::Map(2));

    let item = dec.next_item()?;
    assert_eq!(item.label, Some(Label::Tstr("a")));
    assert_eq!(item.value, Value::UInt(1));

    let item = dec.next_item()?;
    assert_eq!(item.label, Some(Label::Tstr("b")));
    assert_eq!(item.value, Value::Array(2));

    assert_eq!(dec.next_item()?.value, Value::UInt(2));
    let item = dec.next_item()?;
    assert_eq!(item.value, Value::UInt(3));
    assert_eq!(item.next_nest_level, 0);
    Ok(())
}

#[test]
fn decode_indefinite_length() -> Result<(), CBORError> {
    println!("<======================= decode_indefinite_length =====================>");
    // [_ 1, [2, 3], [_ 4, 5]]
    let input: &[u8] = &[0x9f, 0x01, 0x82, 0x02, 0x03, 0x9f, 0x04, 0x05, 0xff, 0xff];
    let mut dec = Decoder::new(input);
    assert_eq!(dec.next_item()?.value, Value::ArrayIndefinite);
    assert_eq!(dec.next_item()?.value, Value::UInt(1));
    assert_eq!(dec.next_item()?.value, Value::Array(2));
    assert_eq!(dec.next_item()?.value, Value::UInt(2));
    assert_eq!(dec.next_item()?.value, Value::UInt(3));
    assert_eq!(dec.next_item()?.value, Value::ArrayIndefinite);
    assert_eq!(dec.next_item()?.value, Value::UInt(4));
    let item = dec.next_item()?;
    assert_eq!(item.value, Value::UInt(5));
    // Both breaks are consumed on the way back up
    assert_eq!(item.next_nest_level, 0);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::NoMoreItems));

    // {_ "a": 1, "b": 2}
    let input: &[u8] = &[0xbf, 0x61, 0x61, 0x01, 0x61, 0x62, 0x02, 0xff];
    let mut dec = Decoder::new(input);
    assert_eq!(dec.next_item()?.value, Value::MapIndefinite);
    let item = dec.next_item()?;
    assert_eq!(item.label, Some(Label::Tstr("a")));
    assert_eq!(item.value, Value::UInt(1));
    let item = dec.next_item()?;
    assert_eq!(item.label, Some(Label::Tstr("b")));
    assert_eq!(item.next_nest_level, 0);
    Ok(())
}

#[test]
fn decode_indefinite_strings_unsupported() {
    // (_ h'0102', h'030405') needs an allocator to reassemble
    let input: &[u8] = &[0x5f, 0x42, 0x01, 0x02, 0x43, 0x03, 0x04, 0x05, 0xff];
    let mut dec = Decoder::new(input);
    assert_eq!(
        dec.next_item().map(|_| ()),
        Err(CBORError::IndefiniteStringChunk)
    );
}

#[test]
fn decode_tags() -> Result<(), CBORError> {
    println!("<======================= decode_tags =====================>");
    // Epoch date, tag 1
    let input: &[u8] = &[0xc1, 0x1a, 0x51, 0x4b, 0x67, 0xb0];
    assert_eq!(decode_single(input)?, Value::Epoch(1363896240));

    // Text date, tag 0
    let input: &[u8] = &[
        0xc0, 0x74, 0x32, 0x30, 0x31, 0x33, 0x2d, 0x30, 0x33, 0x2d, 0x32, 0x31, 0x54, 0x32,
        0x30, 0x3a, 0x30, 0x34, 0x3a, 0x30, 0x30, 0x5a,
    ];
    assert_eq!(decode_single(input)?, Value::DateText("2013-03-21T20:04:00Z"));

    // A fractional epoch float has no whole-number reading here
    let input: &[u8] = &[0xc1, 0xfb, 0x41, 0xd4, 0x52, 0xd9, 0xec, 0x20, 0x00, 0x00];
    assert_eq!(decode_single(input), Err(CBORError::UnexpectedType));

    // An unrecognized tag stays on the item
    let input: &[u8] = &[0xd7, 0x44, 0x01, 0x02, 0x03, 0x04];
    let mut dec = Decoder::new(input);
    let item = dec.next_item()?;
    assert_eq!(item.tags.len(), 1);
    assert_eq!(item.tags.get(0), Some(23));
    assert_eq!(item.value, Value::Bstr(&[0x01, 0x02, 0x03, 0x04]));

    // Tag chains are retained outermost first
    let input: &[u8] = &[0xd8, 0x20, 0xd8, 0x21, 0x61, 0x78];
    let mut dec = Decoder::new(input);
    let item = dec.next_item()?;
    assert_eq!((item.tags.get(0), item.tags.get(1)), (Some(32), Some(33)));

    // More than four chained tags exceed the retained depth
    let input: &[u8] = &[0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0x01];
    let mut dec = Decoder::new(input);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::TooManyTags));
    Ok(())
}

#[test]
fn decode_big_numbers() -> Result<(), CBORError> {
    // 18446744073709551616 / tag 2
    let input: &[u8] = &[
        0xc2, 0x49, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    assert_eq!(
        decode_single(input)?,
        Value::BigNum {
            negative: false,
            content: &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        }
    );

    // -18446744073709551617 / tag 3
    let input: &[u8] = &[
        0xc3, 0x49, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    assert_eq!(
        decode_single(input)?,
        Value::BigNum {
            negative: true,
            content: &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        }
    );

    // Tag 2 on anything but a byte string is recoverable and fully skipped
    let input: &[u8] = &[0xc2, 0x01, 0x0a];
    let mut dec = Decoder::new(input);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::UnexpectedType));
    assert_eq!(dec.next_item()?.value, Value::UInt(10));
    Ok(())
}

#[test]
fn decode_exp_mantissa() -> Result<(), CBORError> {
    // 273.15 as decimal fraction
    let input: &[u8] = &[0xc4, 0x82, 0x21, 0x19, 0x6a, 0xb3];
    assert_eq!(
        decode_single(input)?,
        Value::DecimalFraction {
            exponent: -2,
            mantissa: Mantissa::Int(27315)
        }
    );

    // 1.5 as bigfloat
    let input: &[u8] = &[0xc5, 0x82, 0x20, 0x03];
    assert_eq!(
        decode_single(input)?,
        Value::BigFloat {
            exponent: -1,
            mantissa: Mantissa::Int(3)
        }
    );

    // A big number mantissa
    let input: &[u8] = &[
        0xc4, 0x82, 0x03, 0xc2, 0x49, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
    assert_eq!(
        decode_single(input)?,
        Value::DecimalFraction {
            exponent: 3,
            mantissa: Mantissa::BigNum {
                negative: false,
                content: &[0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
            }
        }
    );

    // Wrong arity is recoverable; the malformed item is skipped whole
    let input: &[u8] = &[0xc4, 0x83, 0x01, 0x02, 0x03, 0x0a];
    let mut dec = Decoder::new(input);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::UnexpectedType));
    assert_eq!(dec.next_item()?.value, Value::UInt(10));
    Ok(())
}

#[test]
fn decode_wellformedness_errors() {
    println!("<======================= decode_wellformedness_errors =====================>");
    // Truncated argument
    let mut dec = Decoder::new(&[0x19, 0x03]);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::HitEnd));
    // The error is sticky
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::HitEnd));
    assert_eq!(dec.last_error(), Some(CBORError::HitEnd));

    // Truncated string body
    let mut dec = Decoder::new(&[0x62, 0x61]);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::HitEnd));

    // An array that claims three elements but stops after one: the missing items surface as
    // a hard end-of-input, not a clean end-of-level
    let mut dec = Decoder::new(&[0x83, 0x01]);
    assert!(dec.next_item().is_ok());
    assert!(dec.next_item().is_ok());
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::HitEnd));

    // Reserved additional information
    for ai in 0x1c..=0x1e {
        let input = [ai];
        let mut dec = Decoder::new(&input);
        assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::Unsupported));
    }

    // A lone break byte
    let mut dec = Decoder::new(&[0xff]);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::BadBreak));

    // Nesting deeper than the fixed stack
    let mut deep = [0x81u8; 17];
    deep[16] = 0x01;
    let mut dec = Decoder::new(&deep);
    let mut result = Ok(());
    for _ in 0..17 {
        match dec.next_item() {
            Ok(_) => {}
            Err(e) => {
                result = Err(e);
                break;
            }
        }
    }
    assert_eq!(result, Err(CBORError::NestingTooDeep));
}

#[test]
fn decode_peek_does_not_consume() -> Result<(), CBORError> {
    let input: &[u8] = &[0x01, 0x02];
    let mut dec = Decoder::new(input);
    assert_eq!(dec.peek_item()?.value, Value::UInt(1));
    assert_eq!(dec.peek_item()?.value, Value::UInt(1));
    assert_eq!(dec.next_item()?.value, Value::UInt(1));
    assert_eq!(dec.next_item()?.value, Value::UInt(2));
    Ok(())
}
