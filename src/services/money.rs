//! Amounts stored in `DECIMAL(15, 2)` columns.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::errors::ServiceError;

/// Largest value a `DECIMAL(15, 2)` column holds
pub const MAX_AMOUNT: Decimal = dec!(9999999999999.99);

/// Checks that a client-supplied amount is storable without rounding.
pub fn validate_amount(field: &str, value: Decimal) -> Result<Decimal, ServiceError> {
    if value.is_sign_negative() {
        return Err(ServiceError::ValidationError(format!(
            "{} must not be negative",
            field
        )));
    }
    if value > MAX_AMOUNT {
        return Err(ServiceError::ValidationError(format!(
            "{} must not exceed {}",
            field, MAX_AMOUNT
        )));
    }
    if value.normalize().scale() > 2 {
        return Err(ServiceError::ValidationError(format!(
            "{} must have at most 2 decimal places",
            field
        )));
    }
    Ok(value)
}

/// `quantity * price`, rejected when the result does not fit the column.
pub fn line_total(quantity: i32, price: Decimal) -> Result<Decimal, ServiceError> {
    Decimal::from(quantity)
        .checked_mul(price)
        .filter(|total| total.abs() <= MAX_AMOUNT)
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "total of {} x {} exceeds {}",
                quantity, price, MAX_AMOUNT
            ))
        })
}

/// Unbounded product, e.g. stock value at cost.
pub fn checked_mul(quantity: i32, price: Decimal) -> Result<Decimal, ServiceError> {
    Decimal::from(quantity).checked_mul(price).ok_or_else(overflow)
}

/// Sums amounts, failing instead of panicking on overflow.
pub fn checked_sum(amounts: impl IntoIterator<Item = Decimal>) -> Result<Decimal, ServiceError> {
    amounts
        .into_iter()
        .try_fold(Decimal::ZERO, Decimal::checked_add)
        .ok_or_else(overflow)
}

pub fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal, ServiceError> {
    a.checked_add(b).ok_or_else(overflow)
}

pub fn checked_sub(a: Decimal, b: Decimal) -> Result<Decimal, ServiceError> {
    a.checked_sub(b).ok_or_else(overflow)
}

fn overflow() -> ServiceError {
    ServiceError::ValidationError("amount out of range".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[rstest]
    #[case(dec!(0), true)]
    #[case(dec!(150000), true)]
    #[case(dec!(19.99), true)]
    #[case(dec!(1.500), true)]
    #[case(dec!(9999999999999.99), true)]
    #[case(dec!(10000000000000), false)]
    #[case(dec!(0.005), false)]
    #[case(dec!(-0.01), false)]
    #[case(Decimal::MAX, false)]
    fn amount_bounds(#[case] value: Decimal, #[case] ok: bool) {
        assert_eq!(validate_amount("price", value).is_ok(), ok, "{value}");
    }

    #[test]
    fn line_total_rejects_overflow() {
        assert_eq!(line_total(3, dec!(150000)).unwrap(), dec!(450000));
        assert_matches!(line_total(2, Decimal::MAX), Err(ServiceError::ValidationError(_)));
        assert_matches!(
            line_total(i32::MAX, dec!(9999999999999.99)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn sums_fail_instead_of_panicking() {
        assert_eq!(checked_sum([dec!(1.25), dec!(2.75)]).unwrap(), dec!(4));
        assert!(checked_sum([Decimal::MAX, Decimal::ONE]).is_err());
        assert!(checked_sub(Decimal::MIN, Decimal::ONE).is_err());
    }
}
