//! Fixed-point arithmetic
//!
//! Ratios are WAD-scaled (`1e18 == 1.0`), oracle prices are scaled by
//! `1e36`. Every product is checked: overflow is reported, never wrapped.

use crate::{Error, Result};
use alloy_primitives::U256;
use rust_decimal::Decimal;

/// 1.0 in WAD precision (1e18)
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Scale of oracle prices (1e36)
pub const ORACLE_PRICE_SCALE: U256 =
    U256::from_limbs([0xb34b_9f10_0000_0000, 0x00c0_97ce_7bc9_0715, 0, 0]);

/// Decimal places of a WAD value
pub const WAD_DECIMALS: u32 = 18;

/// Decimal places of an oracle price
pub const PRICE_DECIMALS: u32 = 36;

/// Seconds in a 365-day year
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Rounding direction for conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero
    Down,
    /// Away from zero
    Up,
}

/// `x * y / d`, rounded down
pub fn mul_div_down(x: U256, y: U256, d: U256) -> Result<U256> {
    mul_div(x, y, d, Rounding::Down)
}

/// `x * y / d`, rounded up
pub fn mul_div_up(x: U256, y: U256, d: U256) -> Result<U256> {
    mul_div(x, y, d, Rounding::Up)
}

/// `x * y / d` with explicit rounding
pub fn mul_div(x: U256, y: U256, d: U256, rounding: Rounding) -> Result<U256> {
    if d.is_zero() {
        return Err(Error::DivisionByZero(format!("{} * {} / 0", x, y)));
    }

    let product = x
        .checked_mul(y)
        .ok_or_else(|| Error::Overflow(format!("{} * {}", x, y)))?;

    let quotient = product / d;
    match rounding {
        Rounding::Down => Ok(quotient),
        // quotient < U256::MAX whenever the remainder is nonzero
        Rounding::Up if !(product % d).is_zero() => Ok(quotient + U256::from(1u8)),
        Rounding::Up => Ok(quotient),
    }
}

/// `x * y / WAD`, rounded down
pub fn w_mul_down(x: U256, y: U256) -> Result<U256> {
    mul_div_down(x, y, WAD)
}

/// `x * y / WAD`, rounded up
pub fn w_mul_up(x: U256, y: U256) -> Result<U256> {
    mul_div_up(x, y, WAD)
}

/// `x * WAD / y`, rounded down
pub fn w_div_down(x: U256, y: U256) -> Result<U256> {
    mul_div_down(x, WAD, y)
}

/// `x * WAD / y`, rounded up
pub fn w_div_up(x: U256, y: U256) -> Result<U256> {
    mul_div_up(x, WAD, y)
}

/// `max(x - y, 0)`
pub fn zero_floor_sub(x: U256, y: U256) -> U256 {
    x.saturating_sub(y)
}

/// Checked addition with a labelled error
pub fn checked_add(x: U256, y: U256) -> Result<U256> {
    x.checked_add(y)
        .ok_or_else(|| Error::Overflow(format!("{} + {}", x, y)))
}

/// Checked subtraction with a labelled error
pub fn checked_sub(x: U256, y: U256) -> Result<U256> {
    x.checked_sub(y)
        .ok_or_else(|| Error::Overflow(format!("{} - {} underflows", x, y)))
}

/// Utilization of a pool, WAD-scaled. Zero when nothing is supplied.
pub fn utilization(total_supply_assets: U256, total_borrow_assets: U256) -> Result<U256> {
    if total_supply_assets.is_zero() {
        return Ok(U256::ZERO);
    }
    w_div_down(total_borrow_assets, total_supply_assets)
}

/// Convert a decimal ratio (e.g. `0.945`) into WAD precision
pub fn wad_from_decimal(value: Decimal) -> Result<U256> {
    scaled_from_decimal(value, WAD_DECIMALS)
}

/// Convert a decimal price (collateral per loan unit) into oracle precision
pub fn price_from_decimal(value: Decimal) -> Result<U256> {
    scaled_from_decimal(value, PRICE_DECIMALS)
}

/// Convert a yearly WAD rate into a per-second WAD rate (rounded down)
pub fn per_second_from_yearly(yearly: U256) -> U256 {
    yearly / U256::from(SECONDS_PER_YEAR)
}

/// Render a WAD value as a decimal, for logs and configuration output
pub fn wad_to_decimal(value: U256) -> Result<Decimal> {
    let raw = u128::try_from(value)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .ok_or_else(|| Error::Overflow(format!("{} does not fit a decimal", value)))?;

    Decimal::try_from_i128_with_scale(raw, WAD_DECIMALS)
        .map_err(|e| Error::Overflow(format!("{} does not fit a decimal: {}", value, e)))
}

fn scaled_from_decimal(value: Decimal, decimals: u32) -> Result<U256> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(Error::InvalidConfig(format!("negative value {}", value)));
    }

    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale();

    if scale <= decimals {
        mantissa
            .checked_mul(pow10(decimals - scale)?)
            .ok_or_else(|| Error::Overflow(format!("{} at {} decimals", value, decimals)))
    } else {
        Ok(mantissa / pow10(scale - decimals)?)
    }
}

fn pow10(exp: u32) -> Result<U256> {
    U256::from(10u8)
        .checked_pow(U256::from(exp))
        .ok_or_else(|| Error::Overflow(format!("10^{}", exp)))
}
