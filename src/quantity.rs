//! Kubernetes resource quantities and their conversion to floats.
//!
//! The cloud-provider config consumers were written against configs rendered from the
//! approximate float value of a quantity, computed as `mantissa * 10^exponent` over the
//! digits as written. That multiplication is kept as-is, so `1.2` becomes
//! `12 * 0.1 = 1.2000000000000002` in 64-bit precision and `1.2` once narrowed to 32
//! bits, while `1.20` is `120 * 0.01 = 1.2`.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// A quantity string such as `1.2`, `500m` or `1Ki`.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq, JsonSchema)]
#[serde(transparent)]
pub struct Quantity(pub String);

impl Quantity {
    pub fn approximate_f64(&self) -> Result<f64> {
        self.0.parse::<ParsedQuantity>().map(|q| q.approximate())
    }

    pub fn approximate_f32(&self) -> Result<f32> {
        self.approximate_f64().map(|value| value as f32)
    }
}

impl From<&str> for Quantity {
    fn from(value: &str) -> Self {
        Quantity(value.to_owned())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `mantissa * 10^exponent`, with the digits exactly as written: `1.20` is `120 * 10^-2`.
/// Binary suffixes are multiplied into the mantissa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ParsedQuantity {
    mantissa: i128,
    exponent: i32,
}

impl ParsedQuantity {
    fn approximate(&self) -> f64 {
        let mantissa = self.mantissa as f64;
        if self.exponent == 0 {
            return mantissa;
        }
        mantissa * pow10(self.exponent)
    }
}

/// Powers of ten exactly representable as f64.
const POW10: [f64; 23] = [
    1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15, 1e16, 1e17, 1e18,
    1e19, 1e20, 1e21, 1e22,
];

fn pow10(exponent: i32) -> f64 {
    let index = exponent.unsigned_abs() as usize;
    match POW10.get(index) {
        Some(power) if exponent >= 0 => *power,
        Some(power) => 1.0 / power,
        None => 10f64.powi(exponent),
    }
}

enum Suffix {
    Decimal(i32),
    Binary(u32),
}

fn parse_suffix(suffix: &str) -> Option<Suffix> {
    let parsed = match suffix {
        "" => Suffix::Decimal(0),
        "n" => Suffix::Decimal(-9),
        "u" => Suffix::Decimal(-6),
        "m" => Suffix::Decimal(-3),
        "k" => Suffix::Decimal(3),
        "M" => Suffix::Decimal(6),
        "G" => Suffix::Decimal(9),
        "T" => Suffix::Decimal(12),
        "P" => Suffix::Decimal(15),
        "E" => Suffix::Decimal(18),
        "Ki" => Suffix::Binary(10),
        "Mi" => Suffix::Binary(20),
        "Gi" => Suffix::Binary(30),
        "Ti" => Suffix::Binary(40),
        "Pi" => Suffix::Binary(50),
        "Ei" => Suffix::Binary(60),
        _ => Suffix::Decimal(suffix.strip_prefix(['e', 'E'])?.parse::<i32>().ok()?),
    };
    Some(parsed)
}

impl FromStr for ParsedQuantity {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidQuantity(input.to_owned());
        let trimmed = input.trim();

        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let number_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(number_len);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        let suffix = parse_suffix(suffix).ok_or_else(invalid)?;

        let mut mantissa = format!("{whole}{fraction}").parse::<i128>().map_err(|_| invalid())?;
        let mut exponent = -(fraction.len() as i32);
        match suffix {
            Suffix::Decimal(suffix_exponent) => exponent += suffix_exponent,
            Suffix::Binary(shift) => mantissa = mantissa.checked_mul(1 << shift).ok_or_else(invalid)?,
        }

        if negative {
            mantissa = -mantissa;
        }
        Ok(ParsedQuantity { mantissa, exponent })
    }
}
