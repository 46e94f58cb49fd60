use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Calmar Ratio: retorno anualizado dividido pelo máximo drawdown absoluto.
///
/// Referência: <https://www.investopedia.com/terms/c/calmarratio.asp>
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct CalmarRatio {
    pub value: Decimal,
}

impl CalmarRatio {
    pub fn calculate(annualized_return: Decimal, max_drawdown_abs: Decimal) -> Option<Self> {
        if max_drawdown_abs.is_zero() {
            None
        } else {
            Some(Self {
                value: annualized_return.checked_div(max_drawdown_abs.abs())?,
            })
        }
    }
}
