use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::equilibrium::Equilibrium;
use crate::error::MarketError;
use crate::{Int, UInt};

/// The discrete action space: action `i` sets the price `grid[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceGrid {
    prices: Vec<f64>,
}

impl PriceGrid {
    /// `m` evenly spaced prices from `pN - xi (pM - pN)` to `pM + xi (pM - pN)`.
    ///
    /// With more than one price, equal Nash and Monopoly prices would collapse
    /// the grid to a single repeated price and are rejected.
    pub fn new(equilibrium: &Equilibrium, xi: f64, m: UInt) -> Result<Self, MarketError> {
        let spread = equilibrium.monopoly - equilibrium.nash;
        if m > 1 && spread == 0.0 {
            return Err(MarketError::Configuration(format!(
                "Nash and Monopoly prices are both {}; a grid of {m} prices needs distinct anchors",
                equilibrium.nash
            )));
        }
        let low = equilibrium.nash - xi * spread;
        let high = equilibrium.monopoly + xi * spread;
        Ok(PriceGrid {
            prices: linspace(low, high, m as usize),
        })
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn lowest_action(&self) -> UInt {
        0
    }

    pub fn highest_action(&self) -> UInt {
        self.prices.len().saturating_sub(1) as UInt
    }

    /// Check that an action is an index into the grid.
    pub fn validate(&self, action: Int) -> Result<UInt, MarketError> {
        usize::try_from(action)
            .ok()
            .filter(|&idx| idx < self.prices.len())
            .map(|idx| idx as UInt)
            .ok_or_else(|| {
                MarketError::InvalidAction(format!(
                    "action {action} is outside [0, {})",
                    self.prices.len()
                ))
            })
    }

    /// Price of a validated action.
    pub fn price(&self, action: UInt) -> f64 {
        self.prices[action as usize]
    }

    pub fn take(&self, actions: &[UInt]) -> Vec<f64> {
        actions.iter().map(|&a| self.price(a)).collect()
    }
}

fn linspace(start: f64, end: f64, num: usize) -> Vec<f64> {
    match num {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (end - start) / (num - 1) as f64;
            let mut values: Vec<f64> = (0..num).map(|i| start + i as f64 * step).collect();
            values[num - 1] = end;
            values
        }
    }
}

/// Direction of a forced unilateral move by the first agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Deviation {
    /// Play the lowest price on the grid.
    Down,
    /// Play the highest price on the grid.
    Up,
}

impl Deviation {
    pub fn parse(direction: &str) -> Result<Self, MarketError> {
        Deviation::from_str(direction).map_err(|_| {
            MarketError::Configuration(format!(
                "unsupported deviation direction '{direction}', expected 'down' or 'up'"
            ))
        })
    }

    pub fn action(&self, grid: &PriceGrid) -> UInt {
        match self {
            Deviation::Down => grid.lowest_action(),
            Deviation::Up => grid.highest_action(),
        }
    }
}
