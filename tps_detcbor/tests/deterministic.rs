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
 * Deterministic encoding tests
 *
 * Sorted map closing, the CDE profile and the dCBOR numeric reduction rules, on both the
 * encode and the decode side.
 **************************************************************************************************/

extern crate tps_detcbor;

use tps_detcbor::decoder::{DecodeMode, Decoder};
use tps_detcbor::encoder::{EncodeMode, Encoder};
use tps_detcbor::error::CBORError;

#[test]
fn sorted_map_close_reorders_pairs() -> Result<(), CBORError> {
    println!("<======================= sorted_map_close_reorders_pairs =====================>");
    let mut bytes = [0u8; 64];
    // Entries inserted out of order come out in ascending encoded-label order
    let mut enc = Encoder::new(&mut bytes);
    enc.open_map();
    enc.add_i64(2).add_text("b");
    enc.add_i64(1).add_text("a");
    enc.close_map_sorted();
    assert_eq!(
        enc.finish()?,
        &[0xa2, 0x01, 0x61, 0x61, 0x02, 0x61, 0x62]
    );

    // Already sorted input is left untouched
    let mut enc = Encoder::new(&mut bytes);
    enc.open_map();
    enc.add_i64(1).add_text("a");
    enc.add_i64(2).add_text("b");
    enc.close_map_sorted();
    assert_eq!(
        enc.finish()?,
        &[0xa2, 0x01, 0x61, 0x61, 0x02, 0x61, 0x62]
    );
    Ok(())
}

#[test]
fn sorted_map_close_is_bytewise_lexicographic() -> Result<(), CBORError> {
    let mut bytes = [0u8; 64];
    // The encoded label bytes are what sorts: the one byte head of "b" (0x61) orders before
    // the head of "aa" (0x62), and integer heads (0x0n) before either
    let mut enc = Encoder::new(&mut bytes);
    enc.open_map();
    enc.add_text("aa").add_u64(1);
    enc.add_text("b").add_u64(2);
    enc.add_u64(7).add_u64(3);
    enc.close_map_sorted();
    assert_eq!(
        enc.finish()?,
        &[0xa3, 0x07, 0x03, 0x61, 0x62, 0x02, 0x62, 0x61, 0x61, 0x01]
    );
    Ok(())
}

#[test]
fn sorted_map_close_moves_whole_entries() -> Result<(), CBORError> {
    let mut bytes = [0u8; 64];
    // Values of different sizes, including a nested array, travel with their labels
    let mut enc = Encoder::new(&mut bytes);
    enc.open_map();
    enc.add_u64(3);
    enc.open_array().add_u64(1).add_u64(2).close_array();
    enc.add_u64(1).add_text("xyz");
    enc.add_u64(2).add_u64(400);
    enc.close_map_sorted();
    assert_eq!(
        enc.finish()?,
        &[
            0xa3, 0x01, 0x63, 0x78, 0x79, 0x7a, 0x02, 0x19, 0x01, 0x90, 0x03, 0x82, 0x01, 0x02
        ]
    );
    Ok(())
}

#[test]
fn sorted_map_close_detects_duplicates() {
    let mut bytes = [0u8; 64];
    let mut enc = Encoder::new(&mut bytes);
    enc.open_map();
    enc.add_u64(1).add_text("a");
    enc.add_u64(2).add_text("b");
    enc.add_u64(1).add_text("c");
    enc.close_map_sorted();
    assert_eq!(enc.finish(), Err(CBORError::DuplicateLabel));
}

#[test]
fn cde_mode_sorts_on_plain_close() -> Result<(), CBORError> {
    let mut bytes = [0u8; 64];
    let mut enc = Encoder::with_mode(&mut bytes, EncodeMode::Cde);
    enc.open_map();
    enc.add_i64(2).add_u64(20);
    enc.add_i64(1).add_u64(10);
    enc.close_map();
    assert_eq!(enc.finish()?, &[0xa2, 0x01, 0x0a, 0x02, 0x14]);

    // ... while the preferred mode leaves plain closes unsorted
    let mut enc = Encoder::new(&mut bytes);
    enc.open_map();
    enc.add_i64(2).add_u64(20);
    enc.add_i64(1).add_u64(10);
    enc.close_map();
    assert_eq!(enc.finish()?, &[0xa2, 0x02, 0x14, 0x01, 0x0a]);
    Ok(())
}

#[test]
fn cde_mode_refuses_indefinite_length() {
    let mut bytes = [0u8; 16];
    let mut enc = Encoder::with_mode(&mut bytes, EncodeMode::Cde);
    enc.open_array_indefinite();
    assert_eq!(enc.finish(), Err(CBORError::EncodeUnsupported));
}

#[test]
fn dcbor_reduces_whole_floats_to_integers() -> Result<(), CBORError> {
    println!("<======================= dcbor_reduces_whole_floats =====================>");
    let mut bytes = [0u8; 16];
    for (val, expect) in [
        (0.0f64, &[0x00u8][..]),
        (-0.0, &[0x00]),
        (1.0, &[0x01]),
        (-1.0, &[0x20]),
        (24.0, &[0x18, 0x18]),
        // Fractional values still shrink to their smallest float form
        (2.5, &[0xf9, 0x41, 0x00]),
        (
            // -2^64 reduces through the 65 bit negative carrier
            -18446744073709551616.0,
            &[0x3b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff],
        ),
        (
            // 2^64 is out of integer range and stays a float, shrunk to single precision
            18446744073709551616.0,
            &[0xfa, 0x5f, 0x80, 0x00, 0x00],
        ),
    ] {
        let mut enc = Encoder::with_mode(&mut bytes, EncodeMode::DCbor);
        enc.add_f64(val);
        assert_eq!(enc.finish()?, expect, "value {}", val);
    }
    Ok(())
}

#[test]
fn dcbor_canonicalizes_nan() -> Result<(), CBORError> {
    let mut bytes = [0u8; 16];
    let mut enc = Encoder::with_mode(&mut bytes, EncodeMode::DCbor);
    enc.add_f64(f64::NAN);
    assert_eq!(enc.finish()?, &[0xf9, 0x7e, 0x00]);

    // A NaN payload is not allowed in dCBOR
    let mut enc = Encoder::with_mode(&mut bytes, EncodeMode::DCbor);
    enc.add_f64(f64::from_bits(0x7ff8_0000_0000_0001));
    assert_eq!(enc.finish(), Err(CBORError::NotAllowed));
    Ok(())
}

#[test]
fn float_reduction_as_standalone_flag() -> Result<(), CBORError> {
    let mut bytes = [0u8; 16];
    let mut enc = Encoder::new(&mut bytes);
    enc.set_float_reduction(true);
    enc.add_f64(3.0);
    assert_eq!(enc.finish()?, &[0x03]);
    Ok(())
}

/***************************************************************************************************
 * Decode-side conformance
 **************************************************************************************************/

#[test]
fn preferred_decode_rejects_long_heads() {
    println!("<======================= preferred_decode_rejects_long_heads =====================>");
    // 23 encoded on two bytes instead of one
    let input: &[u8] = &[0x18, 0x17];
    let mut dec = Decoder::with_mode(input, DecodeMode::Preferred);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::NotPreferred));

    // ... which plain CBOR mode accepts
    let mut dec = Decoder::new(input);
    assert!(dec.next_item().is_ok());

    // A string length also follows the shortest-head rule
    let input: &[u8] = &[0x58, 0x01, 0x41];
    let mut dec = Decoder::with_mode(input, DecodeMode::Preferred);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::NotPreferred));
}

#[test]
fn preferred_decode_rejects_oversized_floats() {
    // 1.5 is exactly representable as a half, so the double form is not preferred
    let input: &[u8] = &[0xfb, 0x3f, 0xf8, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
    let mut dec = Decoder::with_mode(input, DecodeMode::Preferred);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::NotPreferred));

    // 1.1 genuinely needs the double width
    let input: &[u8] = &[0xfb, 0x3f, 0xf1, 0x99, 0x99, 0x99, 0x99, 0x99, 0x9a];
    let mut dec = Decoder::with_mode(input, DecodeMode::Preferred);
    assert!(dec.next_item().is_ok());
}

#[test]
fn cde_decode_rejects_indefinite_length() {
    let input: &[u8] = &[0x9f, 0x01, 0xff];
    let mut dec = Decoder::with_mode(input, DecodeMode::Cde);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::NotPreferred));
}

#[test]
fn dcbor_decode_rejects_unreduced_floats() {
    // 1.0 as a half float should have been the integer 1
    let input: &[u8] = &[0xf9, 0x3c, 0x00];
    let mut dec = Decoder::with_mode(input, DecodeMode::DCbor);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::NotPreferred));

    // 2.5 cannot reduce and is fine
    let input: &[u8] = &[0xf9, 0x41, 0x00];
    let mut dec = Decoder::with_mode(input, DecodeMode::DCbor);
    assert!(dec.next_item().is_ok());
}

#[test]
fn dcbor_decode_rejects_nan_payloads() {
    // The canonical half quiet NaN passes
    let input: &[u8] = &[0xf9, 0x7e, 0x00];
    let mut dec = Decoder::with_mode(input, DecodeMode::DCbor);
    assert!(dec.next_item().is_ok());

    // A payload, or a NaN at any wider width, does not
    let input: &[u8] = &[0xf9, 0x7e, 0x01];
    let mut dec = Decoder::with_mode(input, DecodeMode::DCbor);
    assert_eq!(dec.next_item().map(|_| ()), Err(CBORError::NotAllowed));
}

#[test]
fn deterministic_round_trip() -> Result<(), CBORError> {
    // What the CDE encoder produces, the CDE decoder accepts
    let mut bytes = [0u8; 64];
    let mut enc = Encoder::with_mode(&mut bytes, EncodeMode::Cde);
    enc.open_map();
    enc.add_text("z").add_f64(1.5);
    enc.add_i64(-1).add_u64(1000);
    enc.add_i64(10).open_array();
    enc.add_u64(1).add_u64(2).close_array();
    enc.close_map();
    let encoded = enc.finish()?;

    let mut dec = Decoder::with_mode(encoded, DecodeMode::Cde);
    let mut items = 0;
    loop {
        match dec.next_item() {
            Ok(_) => items += 1,
            Err(CBORError::NoMoreItems) => break,
            Err(e) => return Err(e),
        }
    }
    // The map header, three entries (a label/value pair is one item) and the two array
    // elements of the entry that holds an array
    assert_eq!(items, 6);
    Ok(())
}
