use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::ValuationError;
use crate::types::{Money, Multiple, Rate, Years};
use crate::ValuationResult;

/// Discount factor `1 / (1 + rate)^years` for fractional years.
///
/// Negative rates are clamped to zero by the callers that accept them; this
/// function only rejects rates at or below -100%.
pub fn discount_factor(rate: Rate, years: Years) -> ValuationResult<Decimal> {
    if rate <= dec!(-1) {
        return Err(ValuationError::InvalidInput {
            field: "rate".into(),
            reason: "Discount rate must be greater than -100%".into(),
        });
    }
    if years <= Decimal::ZERO || rate.is_zero() {
        return Ok(Decimal::ONE);
    }

    let compounded = (Decimal::ONE + rate).powd(years);
    if compounded.is_zero() {
        return Err(ValuationError::DivisionByZero {
            context: format!("discount factor at {years} years"),
        });
    }
    Ok(Decimal::ONE / compounded)
}

/// Present value of a single amount received `years` from now.
pub fn present_value(amount: Money, rate: Rate, years: Years) -> ValuationResult<Money> {
    Ok(amount * discount_factor(rate, years)?)
}

/// Annualised return implied by a multiple earned over `years`.
///
/// Returns `None` for a zero holding period; a total loss is -100%.
pub fn implied_annual_return(multiple: Multiple, years: Years) -> Option<Rate> {
    if years <= Decimal::ZERO {
        return None;
    }
    if multiple <= Decimal::ZERO {
        return Some(dec!(-1));
    }
    let exponent = Decimal::ONE / years;
    multiple
        .checked_powd(exponent)
        .map(|growth| growth - Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_discount_factor_zero_rate() {
        assert_eq!(discount_factor(dec!(0), dec!(5)).unwrap(), Decimal::ONE);
    }

    #[test]
    fn test_present_value_whole_years() {
        // 1,210 received in 2 years at 10% -> 1,000
        let pv = present_value(dec!(1210), dec!(0.10), dec!(2)).unwrap();
        assert!((pv - dec!(1000)).abs() < dec!(0.0001), "pv = {pv}");
    }

    #[test]
    fn test_present_value_fractional_years() {
        // 1.1^0.5 = 1.048809
        let pv = present_value(dec!(1000), dec!(0.10), dec!(0.5)).unwrap();
        assert!((pv - dec!(953.46)).abs() < dec!(0.01), "pv = {pv}");
    }

    #[test]
    fn test_rate_below_minus_one_rejected() {
        assert!(discount_factor(dec!(-1), dec!(1)).is_err());
    }

    #[test]
    fn test_implied_annual_return() {
        // 4x over 2 years -> 100% a year
        let r = implied_annual_return(dec!(4), dec!(2)).unwrap();
        assert!((r - dec!(1)).abs() < dec!(0.0001), "r = {r}");
        assert_eq!(implied_annual_return(dec!(0), dec!(3)), Some(dec!(-1)));
        assert_eq!(implied_annual_return(dec!(2), dec!(0)), None);
    }
}
