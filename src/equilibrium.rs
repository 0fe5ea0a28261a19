use log::info;
use serde::{Deserialize, Serialize};

use crate::config::PriceSweep;
use crate::demand::DemandModel;
use crate::error::MarketError;

/// Symmetric Nash and Monopoly prices found by grid search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Equilibrium {
    pub nash: f64,
    pub monopoly: f64,
}

impl Equilibrium {
    /// Search the sweep for both prices. `cost` is the marginal cost of the
    /// first firm, whose profit stands in for every firm's.
    pub fn solve(
        model: &DemandModel,
        cost: f64,
        sweep: &PriceSweep,
    ) -> Result<Self, MarketError> {
        sweep.validate()?;
        let prices = sweep.prices();
        let nash = nash_price(model, cost, &prices)?;
        let monopoly = monopoly_price(model, cost, &prices)?;
        info!("Nash Price: {nash}");
        info!("Monopoly Price: {monopoly}");
        Ok(Equilibrium { nash, monopoly })
    }
}

fn checked(profit: f64, price: f64) -> Result<f64, MarketError> {
    if profit.is_finite() {
        Ok(profit)
    } else {
        Err(MarketError::Configuration(format!(
            "profit at price {price} is not finite; check mu and cost parameters"
        )))
    }
}

/// The best profit the first firm can reach by moving alone while the
/// others stay at `rivals`.
fn best_deviation_profit(
    model: &DemandModel,
    cost: f64,
    rivals: f64,
    prices: &[f64],
) -> Result<f64, MarketError> {
    let mut p = vec![rivals; model.num_firms()];
    let mut best = f64::NEG_INFINITY;
    for &own in prices {
        p[0] = own;
        best = best.max(checked(model.profit(&p, 0, cost), own)?);
    }
    Ok(best)
}

/// Symmetric price from which the first firm cannot gain by deviating.
///
/// Candidates are visited in ascending order and the last one that satisfies
/// the condition is kept, so with several equilibria on the sweep the highest
/// is reported.
pub fn nash_price(model: &DemandModel, cost: f64, prices: &[f64]) -> Result<f64, MarketError> {
    let nash = prices
        .iter()
        .try_fold(None, |nash, &candidate| -> Result<_, MarketError> {
            let p = vec![candidate; model.num_firms()];
            let symmetric = checked(model.profit(&p, 0, cost), candidate)?;
            let deviation = best_deviation_profit(model, cost, candidate, prices)?;
            Ok(if symmetric >= deviation {
                Some(candidate)
            } else {
                nash
            })
        })?;
    nash.ok_or_else(|| {
        MarketError::Configuration("no symmetric Nash price found in the price sweep".to_string())
    })
}

/// Symmetric price maximising total industry profit. Ties go to the lowest price.
pub fn monopoly_price(model: &DemandModel, cost: f64, prices: &[f64]) -> Result<f64, MarketError> {
    let n = model.num_firms() as f64;
    let mut best: Option<(f64, f64)> = None;
    for &candidate in prices {
        let p = vec![candidate; model.num_firms()];
        let joint = checked(model.profit(&p, 0, cost) * n, candidate)?;
        if best.is_none_or(|(_, best_profit)| joint > best_profit) {
            best = Some((candidate, joint));
        }
    }
    best.map(|(price, _)| price).ok_or_else(|| {
        MarketError::Configuration("price sweep is empty".to_string())
    })
}
