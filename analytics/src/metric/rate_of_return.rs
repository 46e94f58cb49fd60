use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Taxa de retorno total de um período, calculada como `(final - inicial) / inicial`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct RateOfReturn {
    pub value: Decimal,
}

impl RateOfReturn {
    pub fn calculate(initial: Decimal, r#final: Decimal) -> Option<Self> {
        if initial.is_zero() {
            None
        } else {
            Some(Self {
                value: (r#final - initial).checked_div(initial.abs())?,
            })
        }
    }

    /// Anualiza a taxa de retorno assumindo capitalização composta sobre
    /// `period_days` dias corridos, escalando para 365 dias por ano.
    pub fn annualize(self, period_days: Decimal) -> Option<Self> {
        if period_days.is_zero() {
            return None;
        }
        let growth = Decimal::ONE + self.value;
        if growth <= Decimal::ZERO {
            return None;
        }
        let exponent = Decimal::from(365) / period_days;
        let annualized = growth.powd(exponent) - Decimal::ONE;
        Some(Self { value: annualized })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn calculate_is_none_for_zero_initial_value() {
        assert!(RateOfReturn::calculate(Decimal::ZERO, dec!(100)).is_none());
    }

    #[test]
    fn calculate_returns_the_relative_change() {
        let result = RateOfReturn::calculate(dec!(100), dec!(110)).unwrap();
        assert_eq!(result.value, dec!(0.1));
    }

    #[test]
    fn annualize_scales_a_one_year_return_to_itself() {
        let result = RateOfReturn::calculate(dec!(100), dec!(110))
            .unwrap()
            .annualize(dec!(365))
            .unwrap();
        assert_eq!(result.value, dec!(0.1));
    }
}
