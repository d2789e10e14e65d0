//! Wei-denominated unit conversion.

use std::str::FromStr;

use alloy_primitives::U256;
use thiserror::Error;

/// Errors from parsing or scaling an amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),

    #[error("unknown unit `{0}`")]
    UnknownUnit(String),

    #[error("amount `{0}` does not fit in 256 bits of wei")]
    Overflow(String),

    #[error("amount `{0}` has a fractional wei component")]
    FractionalWei(String),
}

/// Ether denominations, each a power of ten of wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Wei,
    Kwei,
    Mwei,
    Gwei,
    Szabo,
    Finney,
    Ether,
    Kether,
    Mether,
    Gether,
}

impl Unit {
    const ALL: [Unit; 10] = [
        Unit::Wei,
        Unit::Kwei,
        Unit::Mwei,
        Unit::Gwei,
        Unit::Szabo,
        Unit::Finney,
        Unit::Ether,
        Unit::Kether,
        Unit::Mether,
        Unit::Gether,
    ];

    /// Power of ten relating this unit to wei.
    pub fn decimals(self) -> u32 {
        match self {
            Self::Wei => 0,
            Self::Kwei => 3,
            Self::Mwei => 6,
            Self::Gwei => 9,
            Self::Szabo => 12,
            Self::Finney => 15,
            Self::Ether => 18,
            Self::Kether => 21,
            Self::Mether => 24,
            Self::Gether => 27,
        }
    }

    /// Wei per one of this unit.
    pub fn wei_factor(self) -> U256 {
        U256::from(10u64).pow(U256::from(self.decimals()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Wei => "wei",
            Self::Kwei => "kwei",
            Self::Mwei => "mwei",
            Self::Gwei => "gwei",
            Self::Szabo => "szabo",
            Self::Finney => "finney",
            Self::Ether => "ether",
            Self::Kether => "kether",
            Self::Mether => "mether",
            Self::Gether => "gether",
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Unit {
    type Err = UnitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|u| u.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnitError::UnknownUnit(s.to_string()))
    }
}

/// Convert a decimal `amount` of `unit` into wei, exactly.
pub fn to_wei(amount: &str, unit: Unit) -> Result<U256, UnitError> {
    let trimmed = amount.trim();
    let (int_part, frac_part) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let empty = int_part.is_empty() && frac_part.is_empty();
    if empty || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(UnitError::InvalidAmount(amount.to_string()));
    }

    let decimals = unit.decimals() as usize;
    let frac_significant = frac_part.trim_end_matches('0');
    if frac_significant.len() > decimals {
        return Err(UnitError::FractionalWei(amount.to_string()));
    }

    let mut digits = String::with_capacity(int_part.len() + decimals);
    digits.push_str(int_part);
    digits.push_str(frac_significant);
    digits.extend(std::iter::repeat('0').take(decimals - frac_significant.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|_| UnitError::Overflow(amount.to_string()))
}

/// Express `wei` in `unit` as an exact decimal string.
pub fn from_wei(wei: U256, unit: Unit) -> String {
    let factor = unit.wei_factor();
    let whole = wei / factor;
    let rem = wei % factor;
    if rem.is_zero() {
        return whole.to_string();
    }
    let frac = format!("{:0>width$}", rem.to_string(), width = unit.decimals() as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_from_str_is_case_insensitive() {
        assert_eq!("GWEI".parse::<Unit>().unwrap(), Unit::Gwei);
        assert_eq!("ether".parse::<Unit>().unwrap(), Unit::Ether);
        assert!(matches!("bitcoin".parse::<Unit>(), Err(UnitError::UnknownUnit(_))));
    }

    #[test]
    fn to_wei_scales_decimals() {
        assert_eq!(to_wei("1", Unit::Ether).unwrap(), Unit::Ether.wei_factor());
        assert_eq!(to_wei("1.5", Unit::Gwei).unwrap(), U256::from(1_500_000_000u64));
        assert_eq!(to_wei("0.000000001", Unit::Ether).unwrap(), U256::from(1_000_000_000u64));
        assert_eq!(to_wei("21", Unit::Wei).unwrap(), U256::from(21u64));
        assert_eq!(to_wei("0.0", Unit::Finney).unwrap(), U256::ZERO);
    }

    #[test]
    fn to_wei_rejects_bad_input() {
        assert!(matches!(to_wei("1.5", Unit::Wei), Err(UnitError::FractionalWei(_))));
        assert!(matches!(to_wei("-1", Unit::Ether), Err(UnitError::InvalidAmount(_))));
        assert!(matches!(to_wei("1e18", Unit::Wei), Err(UnitError::InvalidAmount(_))));
        assert!(matches!(to_wei(".", Unit::Wei), Err(UnitError::InvalidAmount(_))));
        let huge = "1".repeat(60);
        assert!(matches!(to_wei(&huge, Unit::Gether), Err(UnitError::Overflow(_))));
    }

    #[test]
    fn from_wei_is_exact() {
        assert_eq!(from_wei(U256::from(1_500_000_000u64), Unit::Gwei), "1.5");
        assert_eq!(from_wei(Unit::Ether.wei_factor(), Unit::Ether), "1");
        assert_eq!(from_wei(U256::from(1u64), Unit::Kwei), "0.001");
        assert_eq!(from_wei(U256::ZERO, Unit::Mether), "0");
    }
}
