//! Risk-based position sizing.

pub const MIN_RISK_PCT: f64 = 0.0001;
pub const MAX_RISK_PCT: f64 = 0.05;

/// Whole units affordable when risking `risk_pct` of `equity` at `price` per unit.
///
/// `risk_pct` is clamped to `[MIN_RISK_PCT, MAX_RISK_PCT]`. A non-positive price
/// or any non-finite input yields zero.
pub fn calc_qty(price: f64, equity: f64, risk_pct: f64) -> u64 {
    if !price.is_finite() || !equity.is_finite() || !risk_pct.is_finite() || price <= 0.0 {
        return 0;
    }
    let risk = risk_pct.clamp(MIN_RISK_PCT, MAX_RISK_PCT);
    (equity * risk / price).max(0.0).floor() as u64
}
