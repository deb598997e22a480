//! Fixed-point normalization of raw on-chain amounts.
//!
//! All arithmetic stays in `U256`, so a raw amount is never rounded on its way
//! to a comparison. Formatting to a fixed number of places rounds half up.

use alloy::primitives::U256;
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("10^{0} does not fit in 256 bits")]
    ScaleOverflow(u8),
    #[error("invalid amount `{0}`")]
    Invalid(String),
    #[error("`{value}` has more than {decimals} fractional digits")]
    TooPrecise { value: String, decimals: u8 },
    #[error("amount `{0}` overflows 256 bits")]
    Overflow(String),
}

fn scale(decimals: u8) -> Result<U256, AmountError> {
    U256::from(10u8)
        .checked_pow(U256::from(decimals))
        .ok_or(AmountError::ScaleOverflow(decimals))
}

/// A raw integer amount paired with the decimal shift that makes it human
/// scale: the represented value is `raw / 10^decimals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAmount {
    raw: U256,
    decimals: u8,
    scale: U256,
}

impl TokenAmount {
    pub fn new(raw: U256, decimals: u8) -> Result<Self, AmountError> {
        Ok(Self {
            raw,
            decimals,
            scale: scale(decimals)?,
        })
    }

    /// Parses a decimal string such as `"10000"` or `"0.5"` into raw units.
    pub fn parse_units(value: &str, decimals: u8) -> Result<Self, AmountError> {
        let scale = scale(decimals)?;
        let trimmed = value.trim();
        let (integral, fraction) = match trimmed.split_once('.') {
            Some((i, f)) => (i, f),
            None => (trimmed, ""),
        };
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if integral.is_empty() || !all_digits(integral) || !all_digits(fraction) {
            return Err(AmountError::Invalid(value.to_string()));
        }
        if fraction.len() > decimals as usize {
            return Err(AmountError::TooPrecise {
                value: value.to_string(),
                decimals,
            });
        }

        let overflow = || AmountError::Overflow(value.to_string());
        let integral: U256 = integral.parse().map_err(|_| overflow())?;
        let mut raw = integral.checked_mul(scale).ok_or_else(overflow)?;
        if !fraction.is_empty() {
            let padded = format!("{fraction:0<width$}", width = decimals as usize);
            let fraction: U256 = padded.parse().map_err(|_| overflow())?;
            raw = raw.checked_add(fraction).ok_or_else(overflow)?;
        }
        Ok(Self { raw, decimals, scale })
    }

    pub fn raw(&self) -> U256 {
        self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn integral(&self) -> U256 {
        self.raw / self.scale
    }

    /// Exactly `places` fractional digits, rounding half up.
    pub fn to_fixed(&self, places: u8) -> Result<String, AmountError> {
        if places >= self.decimals {
            let mut digits = fraction_digits(self.raw % self.scale, self.decimals);
            digits.extend(std::iter::repeat('0').take((places - self.decimals) as usize));
            return Ok(join(self.integral(), &digits));
        }

        let factor = scale(self.decimals - places)?;
        let mut quotient = self.raw / factor;
        let remainder = self.raw % factor;
        if remainder >= factor - remainder {
            quotient = quotient
                .checked_add(U256::from(1u8))
                .ok_or_else(|| AmountError::Overflow(self.raw.to_string()))?;
        }
        let place_scale = scale(places)?;
        let digits = fraction_digits(quotient % place_scale, places);
        Ok(join(quotient / place_scale, &digits))
    }

    fn compare(&self, other: &Self) -> Option<Ordering> {
        (self.decimals == other.decimals).then(|| self.raw.cmp(&other.raw))
    }
}

/// Zero-padded fractional part; empty when `width` is zero.
fn fraction_digits(fraction: U256, width: u8) -> String {
    if width == 0 {
        return String::new();
    }
    let digits = fraction.to_string();
    format!("{digits:0>width$}", width = width as usize)
}

fn join(integral: U256, fraction: &str) -> String {
    if fraction.is_empty() {
        integral.to_string()
    } else {
        format!("{integral}.{fraction}")
    }
}

impl PartialOrd for TokenAmount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.compare(other)
    }
}

/// Shortest exact rendering: trailing fractional zeros are dropped.
impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fraction = self.raw % self.scale;
        if fraction.is_zero() {
            return write!(f, "{}", self.integral());
        }
        let digits = fraction_digits(fraction, self.decimals);
        write!(f, "{}.{}", self.integral(), digits.trim_end_matches('0'))
    }
}

/// `amount / 10^decimals`, exact.
pub fn normalize(amount: U256, decimals: u8) -> Result<TokenAmount, AmountError> {
    TokenAmount::new(amount, decimals)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdOutcome {
    pub exceeded: bool,
    pub normalized: TokenAmount,
}

/// Strict "greater than" check of a raw amount against a human-scale limit.
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    threshold: TokenAmount,
}

impl ThresholdEvaluator {
    pub fn new(threshold: &str, decimals: u8) -> Result<Self, AmountError> {
        Ok(Self {
            threshold: TokenAmount::parse_units(threshold, decimals)?,
        })
    }

    pub fn evaluate(&self, raw: U256) -> Result<ThresholdOutcome, AmountError> {
        let normalized = normalize(raw, self.threshold.decimals())?;
        Ok(ThresholdOutcome {
            exceeded: normalized.raw() > self.threshold.raw(),
            normalized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> U256 {
        s.parse().unwrap()
    }

    #[test]
    fn normalizes_usdc_amount() {
        let amount = normalize(U256::from(20_000_000_000u64), 6).unwrap();
        assert_eq!(amount.to_string(), "20000");
        assert_eq!(amount.integral(), U256::from(20_000u64));
    }

    #[test]
    fn normalization_is_exact_beyond_u64() {
        let amount = normalize(u("1000000000000000000000000000001"), 6).unwrap();
        assert_eq!(amount.to_string(), "1000000000000000000000000.000001");

        let wei = normalize(u("123456789012345678901234567890123"), 18).unwrap();
        assert_eq!(wei.to_string(), "123456789012345.678901234567890123");
    }

    #[test]
    fn scale_overflow_fails_loudly() {
        assert_eq!(normalize(U256::from(1u8), 78), Err(AmountError::ScaleOverflow(78)));
        assert!(normalize(U256::from(1u8), 77).is_ok());
    }

    #[test]
    fn parse_units_rejects_bad_input() {
        assert!(matches!(TokenAmount::parse_units("abc", 6), Err(AmountError::Invalid(_))));
        assert!(matches!(TokenAmount::parse_units("-1", 6), Err(AmountError::Invalid(_))));
        assert!(matches!(TokenAmount::parse_units(".5", 6), Err(AmountError::Invalid(_))));
        assert!(matches!(
            TokenAmount::parse_units("1.0000001", 6),
            Err(AmountError::TooPrecise { .. })
        ));
        assert!(matches!(
            TokenAmount::parse_units(&"9".repeat(80), 0),
            Err(AmountError::Overflow(_))
        ));
    }

    #[test]
    fn parse_units_scales_fraction() {
        let amount = TokenAmount::parse_units("0.5", 18).unwrap();
        assert_eq!(amount.raw(), u("500000000000000000"));
        assert_eq!(TokenAmount::parse_units("10000", 6).unwrap().raw(), u("10000000000"));
    }

    #[test]
    fn to_fixed_rounds_half_up() {
        let eth = |raw: &str| TokenAmount::new(u(raw), 18).unwrap();
        assert_eq!(eth("1234500000000000000").to_fixed(2).unwrap(), "1.23");
        assert_eq!(eth("1235000000000000000").to_fixed(2).unwrap(), "1.24");
        assert_eq!(eth("999999999999999999").to_fixed(2).unwrap(), "1.00");
        assert_eq!(eth("0").to_fixed(4).unwrap(), "0.0000");
        assert_eq!(eth("1500000000000000000").to_fixed(0).unwrap(), "2");
        assert_eq!(TokenAmount::new(u("15"), 1).unwrap().to_fixed(3).unwrap(), "1.500");
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let evaluator = ThresholdEvaluator::new("10000", 6).unwrap();

        let over = evaluator.evaluate(U256::from(20_000_000_000u64)).unwrap();
        assert!(over.exceeded);
        assert_eq!(over.normalized.to_string(), "20000");

        let equal = evaluator.evaluate(U256::from(10_000_000_000u64)).unwrap();
        assert!(!equal.exceeded);

        let fractional = evaluator.evaluate(U256::from(10_000_000_001u64)).unwrap();
        assert!(fractional.exceeded);
        assert_eq!(fractional.normalized.to_string(), "10000.000001");
    }

    #[test]
    fn amounts_with_different_decimals_do_not_compare() {
        let a = TokenAmount::new(U256::from(1u8), 6).unwrap();
        let b = TokenAmount::new(U256::from(1u8), 18).unwrap();
        assert_eq!(a.partial_cmp(&b), None);
        assert!(a < TokenAmount::new(U256::from(2u8), 6).unwrap());
    }
}
