//! Packed integer codec
//!
//! Used for lengths, counts, link indexes and inline integers.
//!
//! - `0` is a single zero byte
//! - `1..=122` is one byte, `n + 5`
//! - `-123..=-1` is one byte, `(n - 5) & 0xff`
//! - anything else is a signed length byte (`1..=4`, negated for negative
//!   values) followed by that many little-endian two's-complement bytes,
//!   using the fewest bytes that still sign-extend back to the value

use crate::error::{MarshalError, Result};
use crate::reader::ByteReader;
use std::io::Read;

pub fn encode(value: i32, out: &mut Vec<u8>) {
    let v = value as i64;
    if v == 0 {
        out.push(0);
        return;
    }
    if 0 < v && v < 123 {
        out.push((v + 5) as u8);
        return;
    }
    if -124 < v && v < 0 {
        out.push(((v - 5) & 0xff) as u8);
        return;
    }

    let mut buf = [0u8; 5];
    let mut x = v;
    for i in 1..5 {
        buf[i] = (x & 0xff) as u8;
        x >>= 8;
        if x == 0 {
            buf[0] = i as u8;
            out.extend_from_slice(&buf[..=i]);
            return;
        }
        if x == -1 {
            buf[0] = (-(i as i8)) as u8;
            out.extend_from_slice(&buf[..=i]);
            return;
        }
    }
}

pub fn decode<R: Read>(reader: &mut ByteReader<R>) -> Result<i32> {
    let start = reader.offset();
    let c = reader.read_byte()? as i8;
    let value: i64 = match c {
        0 => 0,
        5..=i8::MAX => c as i64 - 5,
        i8::MIN..=-5 => c as i64 + 5,
        1..=4 => {
            let mut x: i64 = 0;
            for i in 0..c as u32 {
                x |= (reader.read_byte()? as i64) << (8 * i);
            }
            x
        }
        -4..=-1 => {
            let mut x: i64 = -1;
            for i in 0..(-c) as u32 {
                x &= !(0xff << (8 * i));
                x |= (reader.read_byte()? as i64) << (8 * i);
            }
            x
        }
    };
    i32::try_from(value).map_err(|_| MarshalError::MalformedVarint { offset: start })
}
