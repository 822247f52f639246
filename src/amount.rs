use crate::error::{Error, Result};
use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use std::str::FromStr;

/// Converts a raw on-chain integer amount (as returned by the RPC, e.g. `"100000000"`)
/// into a decimal token amount: `raw / 10^decimals`.
///
/// The division is exact, no floating point is involved at any step.
pub fn convert(raw_amount: &str, decimals: u8) -> Result<BigDecimal> {
    let raw = raw_amount.trim();
    if raw.is_empty() {
        return Err(Error::Parse("empty token amount".to_owned()));
    }

    let units = BigInt::from_str(raw)
        .map_err(|e| Error::Parse(format!("invalid token amount '{}': {}", raw, e)))?;

    Ok(BigDecimal::new(units, decimals as i64))
}

/// Inverse of [`convert`]: `amount * 10^decimals` as an integer number of raw units.
///
/// Fails with `Error::Parse` when the amount has more fractional digits than
/// `decimals`, since that cannot be expressed on-chain.
pub fn to_raw_units(amount: &BigDecimal, decimals: u8) -> Result<BigInt> {
    let scaled = amount.with_scale(decimals as i64);
    if &scaled != amount {
        return Err(Error::Parse(format!(
            "amount {} has more than {} decimal places", amount, decimals)));
    }

    let (units, _) = scaled.into_bigint_and_exponent();

    Ok(units)
}
