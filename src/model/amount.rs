//! Exact integer token amounts.
//!
//! Spec invariant: amounts are represented as unsigned 128-bit integers,
//! never floating point. Decimal-to-integer conversion happens once, here,
//! at the upstream adapter boundary.

use std::fmt;

/// An exact token amount in base units (i.e. already scaled by `10^decimals`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(pub u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn as_decimal_string(&self) -> String {
        self.0.to_string()
    }

    /// Ratio `self / other` as an f64, used only for heuristic scoring
    /// (confidence, peel-chain detection) — never for the stored amount itself.
    pub fn ratio(self, other: Amount) -> f64 {
        if other.0 == 0 {
            return 0.0;
        }
        self.0 as f64 / other.0 as f64
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u128> for Amount {
    fn from(v: u128) -> Self {
        Amount(v)
    }
}

impl serde::Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse::<u128>()
            .map(Amount)
            .map_err(serde::de::Error::custom)
    }
}

/// Convert a decimal-notation token amount (as reported by the upstream, e.g.
/// `"12.3456"`) into exact base units: `floor(tokenAmount * 10^decimals)`.
///
/// Implemented on the decimal string directly so no floating-point rounding
/// is ever introduced, per spec §9 ("Amount arithmetic... never floating
/// point").
pub fn decimal_to_base_units(token_amount: &str, decimals: u8) -> Option<Amount> {
    let token_amount = token_amount.trim();
    let negative = token_amount.starts_with('-');
    let unsigned = token_amount.strip_prefix('-').unwrap_or(token_amount);

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.is_empty() && !int_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    let decimals = decimals as usize;
    // Pad or truncate the fractional part to exactly `decimals` digits,
    // truncating (floor) rather than rounding any extra precision away.
    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(if int_part.is_empty() { "0" } else { int_part });
    if frac_part.len() >= decimals {
        digits.push_str(&frac_part[..decimals]);
    } else {
        digits.push_str(frac_part);
        digits.extend(std::iter::repeat('0').take(decimals - frac_part.len()));
    }

    let value: u128 = digits.trim_start_matches('0').parse().unwrap_or(0);
    if negative && value != 0 {
        // Negative token amounts never occur for inbound transfers; the
        // adapter treats them as malformed rather than underflowing u128.
        return None;
    }
    Some(Amount(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_simple_decimal() {
        assert_eq!(decimal_to_base_units("1.5", 6), Some(Amount(1_500_000)));
    }

    #[test]
    fn floors_excess_precision() {
        assert_eq!(decimal_to_base_units("1.23456789", 4), Some(Amount(12345)));
    }

    #[test]
    fn handles_integral_input() {
        assert_eq!(decimal_to_base_units("42", 2), Some(Amount(4200)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(decimal_to_base_units("abc", 6), None);
    }

    #[test]
    fn roundtrip_display() {
        let a = Amount(123);
        assert_eq!(a.as_decimal_string(), "123");
    }
}
