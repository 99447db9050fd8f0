//! Raw integer amounts to decimal amounts

use std::str::FromStr;

use alloy::primitives::U256;
use rust_decimal::Decimal;

use crate::error::AmountError;

/// Decimals of the native currency (1 ether = 10^18 wei)
pub const ETHER_DECIMALS: u8 = 18;

/// Convert wei to ether
pub fn from_wei(wei: U256) -> Result<Decimal, AmountError> {
    scale_amount(wei, ETHER_DECIMALS)
}

/// Divide a raw integer amount by `10^decimals`
///
/// The split is done on the decimal string so no precision is lost before the
/// value reaches `Decimal`. Fractions beyond 28 digits are rounded; an integer
/// part that does not fit 96 bits is an error.
pub fn scale_amount(raw: U256, decimals: u8) -> Result<Decimal, AmountError> {
    let digits = raw.to_string();
    let places = decimals as usize;

    let text = if places == 0 {
        digits.clone()
    } else if digits.len() > places {
        let (whole, frac) = digits.split_at(digits.len() - places);
        format!("{}.{}", whole, frac)
    } else {
        format!("0.{:0>width$}", digits, width = places)
    };

    Decimal::from_str(&text)
        .map(|value| value.normalize())
        .map_err(|err| AmountError {
            raw: digits,
            decimals,
            reason: err.to_string(),
        })
}
