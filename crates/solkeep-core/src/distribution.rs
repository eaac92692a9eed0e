//! Randomized split of a total across N slots for the spread feature.
//!
//! Each slot draws `z ~ N(0, 1)` via Box–Muller and takes
//! `max(base * (1 + z * variance), base * 0.1)` with `base = total / count`;
//! the values are then rescaled so they sum to `total`.

use rand::Rng;
use std::f64::consts::PI;

use crate::error::{KeystoreError, Result};

/// Lower bound for any slot, as a fraction of the even share.
pub const MIN_SHARE: f64 = 0.1;

pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // gen::<f64>() is in [0, 1); flip it so ln never sees zero.
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

pub fn distribute<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    total: f64,
    variance: f64,
) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(KeystoreError::Validation("count must be at least 1".into()));
    }
    if !total.is_finite() || total <= 0.0 {
        return Err(KeystoreError::Validation(format!(
            "total must be a positive number, got {total}"
        )));
    }
    if !(0.0..=1.0).contains(&variance) {
        return Err(KeystoreError::Validation(format!(
            "variance must be within [0, 1], got {variance}"
        )));
    }

    let base = total / count as f64;
    let values: Vec<f64> = (0..count)
        .map(|_| {
            let z = standard_normal(rng);
            (base * (1.0 + z * variance)).max(base * MIN_SHARE)
        })
        .collect();
    let sum: f64 = values.iter().sum();
    let scale = total / sum;
    Ok(values.into_iter().map(|v| v * scale).collect())
}

/// Finest precision accepted by `round_to_decimals`.
pub const MAX_DECIMALS: u32 = 9;

/// Round each amount down to `decimals` places and put the remainder on the
/// last slot, so the rounded amounts never add up to more than `total`.
/// Fails when the precision is too coarse to keep every slot positive.
pub fn round_to_decimals(amounts: &[f64], decimals: u32, total: f64) -> Result<Vec<f64>> {
    if decimals > MAX_DECIMALS {
        return Err(KeystoreError::Validation(format!(
            "decimals must be at most {MAX_DECIMALS}, got {decimals}"
        )));
    }
    if amounts.is_empty() {
        return Ok(Vec::new());
    }
    let factor = 10f64.powi(decimals as i32);
    let total_units = (total * factor).floor();
    let mut units: Vec<f64> = amounts.iter().map(|a| (a * factor).floor()).collect();
    let assigned: f64 = units[..units.len() - 1].iter().sum();
    if let Some(last) = units.last_mut() {
        *last = (total_units - assigned).max(0.0);
    }
    if let Some(slot) = units.iter().position(|u| *u <= 0.0) {
        return Err(KeystoreError::Validation(format!(
            "slot {slot} rounds to zero at {decimals} decimals; use more decimals or a larger total"
        )));
    }
    Ok(units.into_iter().map(|u| u / factor).collect())
}
