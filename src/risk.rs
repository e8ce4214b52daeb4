// ===============================
// src/risk.rs
// ===============================
use thiserror::Error;

use crate::codec::Sizing;
use crate::domain::{AccountSnapshot, SymbolSnapshot};

#[derive(Debug, Error, PartialEq)]
pub enum SizingError {
    #[error("volume must be positive, got {0}")]
    Volume(f64),
    #[error("risk percent must be positive, got {0}")]
    Risk(f64),
    #[error("dynamic sizing needs a positive stop distance")]
    StopDistance,
    #[error("pip value must be positive, got {0}")]
    PipValue(f64),
}

/// Round down to the broker step, then clamp into [min, max].
pub fn normalize_volume(volume: f64, sym: &SymbolSnapshot) -> f64 {
    let step = sym.volume_step;
    let stepped = if step > 0.0 {
        // tolerance for 0.3 / 0.1 = 2.9999999999999996
        (volume / step + 1e-9).floor() * step
    } else {
        volume
    };
    stepped.max(sym.volume_min).min(sym.volume_max)
}

/// Units to trade so that hitting the stop loses `risk_percent` of balance.
pub fn risk_volume(balance: f64, risk_percent: f64, stop_pips: f64, pip_value: f64) -> Result<f64, SizingError> {
    if !(risk_percent > 0.0) {
        return Err(SizingError::Risk(risk_percent));
    }
    if !(stop_pips > 0.0) {
        return Err(SizingError::StopDistance);
    }
    if !(pip_value > 0.0) {
        return Err(SizingError::PipValue(pip_value));
    }
    Ok(balance * risk_percent / 100.0 / (stop_pips * pip_value))
}

/// Pre-trade sizing: resolve a signal's volume into a tradeable amount.
pub fn resolve(sizing: Sizing, account: &AccountSnapshot, sym: &SymbolSnapshot, pip_value: f64) -> Result<f64, SizingError> {
    let raw = match sizing {
        Sizing::Fixed { volume, .. } => {
            if !(volume > 0.0) {
                return Err(SizingError::Volume(volume));
            }
            volume
        }
        Sizing::Dynamic { risk_percent, stop_loss_pips } => {
            risk_volume(account.balance, risk_percent, stop_loss_pips, pip_value)?
        }
    };
    Ok(normalize_volume(raw, sym))
}

/// New volume for a "modify volume by percent" command.
pub fn scaled_volume(current: f64, percent: f64, sym: &SymbolSnapshot) -> Result<f64, SizingError> {
    if !(percent > 0.0) {
        return Err(SizingError::Volume(percent));
    }
    Ok(normalize_volume(current * percent / 100.0, sym))
}
