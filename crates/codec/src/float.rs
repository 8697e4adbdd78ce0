//! Float text form
//!
//! Floats travel as decimal text: the shortest digit string that reads back
//! to the same `f64`, laid out in plain or exponent notation depending on
//! where the decimal point falls.

use crate::error::{MarshalError, Result};

pub fn format(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    // `{:e}` yields the shortest round-trip digits as `d.ddde<exp>`
    let sci = format!("{:e}", value.abs());
    let (mantissa, exp) = match sci.split_once('e') {
        Some(parts) => parts,
        None => (sci.as_str(), "0"),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let decpt = exp.parse::<i32>().unwrap_or(0) + 1;
    let digs = digits.len() as i32;

    let mut out = String::new();
    if value < 0.0 {
        out.push('-');
    }
    if decpt < -3 || decpt > digs {
        out.push_str(&digits[..1]);
        if digs > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push('e');
        out.push_str(&(decpt - 1).to_string());
    } else if decpt > 0 {
        let split = decpt as usize;
        out.push_str(&digits[..split]);
        if split < digits.len() {
            out.push('.');
            out.push_str(&digits[split..]);
        }
    } else {
        out.push_str("0.");
        for _ in 0..-decpt {
            out.push('0');
        }
        out.push_str(&digits);
    }
    out
}

/// Parse the payload of an `f` record; text ends at the first NUL byte
pub fn parse(bytes: &[u8]) -> Result<f64> {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let text = std::str::from_utf8(&bytes[..end])
        .map_err(|_| MarshalError::BadFloat(String::from_utf8_lossy(bytes).into_owned()))?;
    match text {
        "nan" => Ok(f64::NAN),
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        _ => text
            .parse::<f64>()
            .map_err(|_| MarshalError::BadFloat(text.to_string())),
    }
}
