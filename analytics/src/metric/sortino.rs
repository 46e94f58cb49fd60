use crate::time::TimeInterval;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Representa um valor de Sortino Ratio sobre um [`TimeInterval`] específico.
///
/// Semelhante ao Sharpe Ratio, mas usa apenas o desvio padrão dos retornos
/// negativos (downside deviation) no denominador, penalizando apenas a
/// volatilidade indesejada.
///
/// Referência: <https://www.investopedia.com/terms/s/sortinoratio.asp>
#[derive(Debug, Clone, PartialEq, PartialOrd, Default, Deserialize, Serialize)]
pub struct SortinoRatio<Interval> {
    pub value: Decimal,
    pub interval: Interval,
}

impl<Interval> SortinoRatio<Interval>
where
    Interval: TimeInterval,
{
    /// Calcula o [`SortinoRatio`] a partir do retorno médio e do desvio
    /// padrão apenas dos retornos negativos (downside std dev).
    pub fn calculate(
        risk_free_return: Decimal,
        mean_return: Decimal,
        std_dev_downside_returns: Decimal,
        returns_period: Interval,
    ) -> Self {
        if std_dev_downside_returns.is_zero() {
            Self {
                value: Decimal::MAX,
                interval: returns_period,
            }
        } else {
            let excess_returns = mean_return - risk_free_return;
            let ratio = excess_returns.checked_div(std_dev_downside_returns).unwrap();
            Self {
                value: ratio,
                interval: returns_period,
            }
        }
    }

    /// Escala o [`SortinoRatio`] do intervalo atual para o [`TimeInterval`] alvo.
    ///
    /// Assume retornos IID (independentes e identicamente distribuídos).
    pub fn scale<TargetInterval>(self, target: TargetInterval) -> SortinoRatio<TargetInterval>
    where
        TargetInterval: TimeInterval,
    {
        let target_secs = Decimal::from(target.interval().num_seconds());
        let current_secs = Decimal::from(self.interval.interval().num_seconds());

        let scale = target_secs
            .abs()
            .checked_div(current_secs.abs())
            .unwrap_or(Decimal::MAX)
            .sqrt()
            .expect("ensured seconds are Positive");

        SortinoRatio {
            value: self.value.checked_mul(scale).unwrap_or(Decimal::MAX),
            interval: target,
        }
    }
}

/// Calcula o desvio padrão considerando apenas as amostras negativas,
/// necessário como denominador do [`SortinoRatio`]. Retorna `None` com
/// menos de duas amostras negativas.
pub fn downside_std_dev(returns: &[Decimal]) -> Option<Decimal> {
    let downside: Vec<Decimal> = returns.iter().copied().filter(|r| *r < Decimal::ZERO).collect();
    if downside.len() < 2 {
        return None;
    }
    let mean = downside.iter().sum::<Decimal>().checked_div(Decimal::from(downside.len()))?;
    let variance = downside
        .iter()
        .map(|r| (*r - mean) * (*r - mean))
        .sum::<Decimal>()
        .checked_div(Decimal::from(downside.len()))?;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Daily;
    use rust_decimal_macros::dec;

    #[test]
    fn zero_downside_std_dev_saturates_to_max() {
        let result = SortinoRatio::calculate(dec!(0.001), dec!(0.002), dec!(0), Daily);
        assert_eq!(result.value, Decimal::MAX);
    }

    #[test]
    fn calculate_divides_excess_return_by_downside_std_dev() {
        let result = SortinoRatio::calculate(dec!(0.0015), dec!(0.0025), dec!(0.02), Daily);
        assert_eq!(result.value, dec!(0.05));
    }

    #[test]
    fn downside_std_dev_ignores_positive_returns() {
        let returns = vec![dec!(0.05), dec!(-0.02), dec!(-0.04), dec!(0.01)];
        let result = downside_std_dev(&returns).unwrap();
        assert!(result > Decimal::ZERO);
    }

    #[test]
    fn downside_std_dev_is_none_with_fewer_than_two_negative_samples() {
        let returns = vec![dec!(0.05), dec!(-0.02), dec!(0.01)];
        assert!(downside_std_dev(&returns).is_none());
    }
}
