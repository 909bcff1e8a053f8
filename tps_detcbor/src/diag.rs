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
 * tps_detcbor CBOR diagnostic notation
 *
 * Renders encoded CBOR as the human-readable diagnostic notation of RFC 8949 section 8, for
 * debugging and test failure output. Only available with the `full` feature as it writes
 * through std I/O.
 **************************************************************************************************/
#![cfg(feature = "full")]

use crate::decode::{Decoder, Label, Mantissa, Value};
use crate::error::CBORError;

use std::boxed::Box;
use std::error::Error;
use std::io::Write;
use std::string::String;
use std::vec::Vec;

/// Trait for conveniently displaying encoded CBOR in diagnostic format.
pub trait Diag {
    fn cbor_diag(&self, outfp: &mut dyn Write) -> Result<(), Box<dyn Error>>;
}

impl Diag for [u8] {
    fn cbor_diag(&self, outfp: &mut dyn Write) -> Result<(), Box<dyn Error>> {
        write_diag(self, outfp)?;
        Ok(())
    }
}

/// Render an encoded buffer into a `String` of diagnostic notation.
pub fn diag_to_string(input: &[u8]) -> Result<String, Box<dyn Error>> {
    let mut out = Vec::new();
    write_diag(input, &mut out)?;
    Ok(String::from_utf8(out)?)
}

/// Dump a buffer as rows of hex bytes, sixteen to a line.
pub fn print_hex(buf: &[u8], outfp: &mut dyn Write) -> Result<(), Box<dyn Error>> {
    for (i, b) in buf.iter().enumerate() {
        if i % 16 == 0 && i != 0 {
            writeln!(outfp)?;
        }
        write!(outfp, "{:02x} ", b)?;
    }
    writeln!(outfp)?;
    Ok(())
}

/// Per-level state while rendering: the bracket that closes the level and any tag parentheses
/// wrapping the aggregate.
struct LevelCloser {
    bracket: char,
    parens: usize,
}

fn write_diag(input: &[u8], out: &mut dyn Write) -> Result<(), Box<dyn Error>> {
    let mut dec = Decoder::new(input);
    let mut closers: Vec<LevelCloser> = Vec::new();
    let mut first = true;

    loop {
        let item = match dec.next_item() {
            Ok(item) => item,
            Err(CBORError::NoMoreItems) => break,
            Err(e) => {
                write!(out, " /error: {:?}/", e)?;
                break;
            }
        };

        if !first {
            if closers.is_empty() {
                writeln!(out, ",")?;
            } else {
                write!(out, ", ")?;
            }
        }
        first = false;

        if let Some(label) = item.label {
            write_label(out, &label)?;
            write!(out, ": ")?;
        }
        for i in 0..item.tags.len() {
            if let Some(t) = item.tags.get(i) {
                write!(out, "{}(", t)?;
            }
        }
        let opens_level = matches!(
            item.value,
            Value::Array(_) | Value::Map(_) | Value::ArrayIndefinite | Value::MapIndefinite
        ) && item.next_nest_level > item.nest_level;

        write_value(out, &item.value)?;

        if opens_level {
            closers.push(LevelCloser {
                bracket: if matches!(item.value, Value::Map(_) | Value::MapIndefinite) {
                    '}'
                } else {
                    ']'
                },
                parens: item.tags.len(),
            });
            first = true;
        } else {
            // An aggregate that opened no level is empty; close it inline
            match item.value {
                Value::Array(_) | Value::ArrayIndefinite => write!(out, "]")?,
                Value::Map(_) | Value::MapIndefinite => write!(out, "}}")?,
                _ => {}
            }
            for _ in 0..item.tags.len() {
                write!(out, ")")?;
            }
            // Close every level this item was the last member of
            let mut level = item.nest_level;
            while level > item.next_nest_level {
                if let Some(c) = closers.pop() {
                    write!(out, "{}", c.bracket)?;
                    for _ in 0..c.parens {
                        write!(out, ")")?;
                    }
                }
                level -= 1;
            }
        }
    }
    writeln!(out)?;
    Ok(())
}

fn write_label(out: &mut dyn Write, label: &Label) -> Result<(), Box<dyn Error>> {
    match label {
        Label::UInt(v) => write!(out, "{}", v)?,
        Label::Int(v) => write!(out, "{}", v)?,
        Label::Tstr(s) => write!(out, "\"{}\"", s)?,
        Label::Bstr(b) => write_hex_string(out, b)?,
    }
    Ok(())
}

fn write_value(out: &mut dyn Write, value: &Value) -> Result<(), Box<dyn Error>> {
    match value {
        Value::UInt(v) => write!(out, "{}", v)?,
        Value::Int(v) => write!(out, "{}", v)?,
        Value::NegInt65(n) => {
            // The value is -1 - n, one below what an i64 could show
            write!(out, "-{}", (*n as u128) + 1)?
        }
        Value::Float16(v) => write!(out, "{}_1", f64::from(*v))?,
        Value::Float32(v) => write!(out, "{}_2", v)?,
        Value::Float64(v) => write!(out, "{}_3", v)?,
        Value::Bstr(b) => write_hex_string(out, b)?,
        Value::Tstr(s) => write!(out, "\"{}\"", s)?,
        Value::Array(_) | Value::ArrayIndefinite => write!(out, "[")?,
        Value::Map(_) | Value::MapIndefinite => write!(out, "{{")?,
        Value::Simple(v) => write!(out, "simple({})", v)?,
        Value::False => write!(out, "false")?,
        Value::True => write!(out, "true")?,
        Value::Null => write!(out, "null")?,
        Value::Undefined => write!(out, "undefined")?,
        Value::BigNum { negative, content } => {
            write!(out, "{}(", if *negative { 3 } else { 2 })?;
            write_hex_string(out, content)?;
            write!(out, ")")?;
        }
        Value::DecimalFraction { exponent, mantissa } => {
            write!(out, "4([{}, ", exponent)?;
            write_mantissa(out, mantissa)?;
            write!(out, "])")?;
        }
        Value::BigFloat { exponent, mantissa } => {
            write!(out, "5([{}, ", exponent)?;
            write_mantissa(out, mantissa)?;
            write!(out, "])")?;
        }
        Value::DateText(s) => write!(out, "0(\"{}\")", s)?,
        Value::Epoch(secs) => write!(out, "1({})", secs)?,
    }
    Ok(())
}

fn write_mantissa(out: &mut dyn Write, m: &Mantissa) -> Result<(), Box<dyn Error>> {
    match m {
        Mantissa::Int(v) => write!(out, "{}", v)?,
        Mantissa::BigNum { negative, content } => {
            write!(out, "{}(", if *negative { 3 } else { 2 })?;
            write_hex_string(out, content)?;
            write!(out, ")")?;
        }
    }
    Ok(())
}

fn write_hex_string(out: &mut dyn Write, bytes: &[u8]) -> Result<(), Box<dyn Error>> {
    write!(out, "h'")?;
    for b in bytes {
        write!(out, "{:02x}", b)?;
    }
    write!(out, "'")?;
    Ok(())
}
