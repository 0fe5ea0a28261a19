use serde::{Deserialize, Serialize};

use crate::error::MarketError;

/// Logit demand with an outside good.
///
/// The share of firm `i` is
/// `exp((a_i - p_i) / mu) / (sum_j exp((a_j - p_j) / mu) + exp(a_0 / mu))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemandModel {
    qualities: Vec<f64>,
    a_0: f64,
    mu: f64,
}

impl DemandModel {
    pub fn new(qualities: Vec<f64>, a_0: f64, mu: f64) -> Result<Self, MarketError> {
        if !(mu.is_finite() && mu > 0.0) {
            return Err(MarketError::Configuration(format!(
                "mu must be positive and finite, got {mu}"
            )));
        }
        if qualities.is_empty() {
            return Err(MarketError::Configuration(
                "demand needs at least one firm".to_string(),
            ));
        }
        Ok(DemandModel { qualities, a_0, mu })
    }

    pub fn num_firms(&self) -> usize {
        self.qualities.len()
    }

    pub fn qualities(&self) -> &[f64] {
        &self.qualities
    }

    fn utility(&self, quality: f64, price: f64) -> f64 {
        ((quality - price) / self.mu).exp()
    }

    /// Market share of firm `agent` at the given prices.
    ///
    /// # Panics
    ///
    /// Panics if `prices` does not hold one price per firm or `agent` is not
    /// a firm index.
    pub fn share(&self, prices: &[f64], agent: usize) -> f64 {
        assert_eq!(
            prices.len(),
            self.qualities.len(),
            "expected one price per firm"
        );
        assert!(agent < self.qualities.len(), "no firm with index {agent}");
        let total: f64 = self
            .qualities
            .iter()
            .zip(prices)
            .map(|(&a, &p)| self.utility(a, p))
            .sum::<f64>()
            + (self.a_0 / self.mu).exp();
        self.utility(self.qualities[agent], prices[agent]) / total
    }

    pub fn shares(&self, prices: &[f64]) -> Vec<f64> {
        (0..self.num_firms())
            .map(|agent| self.share(prices, agent))
            .collect()
    }

    /// Profit `(p_i - c) * share_i` of firm `agent` with marginal cost `cost`.
    ///
    /// # Panics
    ///
    /// Under the same conditions as [`DemandModel::share`].
    pub fn profit(&self, prices: &[f64], agent: usize, cost: f64) -> f64 {
        (prices[agent] - cost) * self.share(prices, agent)
    }
}
