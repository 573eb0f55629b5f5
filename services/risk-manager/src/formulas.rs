//! Risk arithmetic on exact decimals

use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits kept by every projected metric
pub const METRIC_DP: u32 = 6;

/// Round to 6 fractional digits, midpoint away from zero
#[must_use]
pub fn round6(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(METRIC_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Truncate toward zero at 6 fractional digits
#[must_use]
pub fn truncate6(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(METRIC_DP, RoundingStrategy::ToZero)
}

/// `a / b`, or zero when `b` is zero or the quotient overflows
#[must_use]
pub fn safe_div(a: Decimal, b: Decimal) -> Decimal {
    if b.is_zero() {
        return Decimal::ZERO;
    }
    a.checked_div(b).unwrap_or(Decimal::ZERO)
}

/// `notional / equity`, rounded; zero equity gives zero
#[must_use]
pub fn project_leverage(notional: Decimal, equity: Decimal) -> Decimal {
    round6(safe_div(notional, equity))
}

/// `100 * used_margin / equity`, rounded; zero equity gives zero
#[must_use]
pub fn project_margin_usage_pct(used_margin: Decimal, equity: Decimal) -> Decimal {
    percent_of_equity(used_margin, equity)
}

/// `100 * amount / equity`, rounded; zero equity gives zero
#[must_use]
pub fn percent_of_equity(amount: Decimal, equity: Decimal) -> Decimal {
    let scaled = amount.checked_mul(Decimal::ONE_HUNDRED).unwrap_or(Decimal::ZERO);
    round6(safe_div(scaled, equity))
}

/// Largest multiple of `step` not above `value`. A non-positive step
/// returns `value` unchanged.
#[must_use]
pub fn round_down_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    value
        .checked_div(step)
        .and_then(|steps| steps.floor().checked_mul(step))
        .unwrap_or(value)
}
