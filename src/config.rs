use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::UInt;
use crate::error::MarketError;

/// Upper bound on the number of candidate prices; the Nash search is quadratic in it.
pub const MAX_SWEEP_LEN: usize = 20_000;

/// Candidate prices tried by the equilibrium search: `start, start + step, ...`
/// up to but excluding `end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSweep {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl Default for PriceSweep {
    fn default() -> Self {
        PriceSweep {
            start: 0.0,
            end: 2.5,
            step: 0.01,
        }
    }
}

impl PriceSweep {
    pub fn validate(&self) -> Result<(), MarketError> {
        if !(self.start.is_finite() && self.end.is_finite() && self.step.is_finite()) {
            return Err(MarketError::Configuration(format!(
                "price sweep bounds must be finite, got {:?}",
                self
            )));
        }
        if self.step <= 0.0 {
            return Err(MarketError::Configuration(format!(
                "price sweep step must be positive, got {}",
                self.step
            )));
        }
        if self.end <= self.start {
            return Err(MarketError::Configuration(format!(
                "price sweep end ({}) must exceed start ({})",
                self.end, self.start
            )));
        }
        let len = self.raw_len();
        if !(1.0..=MAX_SWEEP_LEN as f64).contains(&len) {
            return Err(MarketError::Configuration(format!(
                "price sweep must hold between 1 and {MAX_SWEEP_LEN} prices, got {len}"
            )));
        }
        Ok(())
    }

    fn raw_len(&self) -> f64 {
        ((self.end - self.start) / self.step).ceil()
    }

    /// Number of candidate prices, capped at [`MAX_SWEEP_LEN`].
    pub fn len(&self) -> usize {
        let len = self.raw_len();
        if len.is_nan() {
            0
        } else {
            len.clamp(0.0, MAX_SWEEP_LEN as f64) as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The ascending candidate prices, each computed as `start + i * step`.
    pub fn prices(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub num_agents: UInt,
    /// Marginal cost shared by every firm.
    pub c_i: f64,
    /// Quality index in excess of marginal cost.
    pub a_minus_c_i: f64,
    /// Utility of the outside good.
    pub a_0: f64,
    /// Index of horizontal differentiation.
    pub mu: f64,
    /// Discount factor, carried for the training loop.
    pub delta: f64,
    /// Number of discrete prices.
    pub m: UInt,
    /// Padding of the price grid beyond the Nash and Monopoly prices.
    pub xi: f64,
    /// Length of memory in the observation.
    pub k: UInt,
    pub max_steps: UInt,
    pub epochs: UInt,
    /// Number of repeated actions by the first agent that ends an episode.
    pub convergence: UInt,
    pub trainer_choice: String,
    /// Seed for the random draws; OS entropy when absent.
    pub seed: Option<u64>,
    /// Directory of the JSON-lines action log written by the binary.
    pub actions_dir: Option<String>,
    pub price_sweep: PriceSweep,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            num_agents: 2,
            c_i: 1.0,
            a_minus_c_i: 1.0,
            a_0: 0.0,
            mu: 0.25,
            delta: 0.95,
            m: 15,
            xi: 0.1,
            k: 1,
            max_steps: 200,
            epochs: 10,
            convergence: 5,
            trainer_choice: "DQN".to_string(),
            seed: None,
            actions_dir: None,
            price_sweep: PriceSweep::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, MarketError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MarketError> {
        let contents = std::fs::read_to_string(path)?;
        Config::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), MarketError> {
        if self.num_agents == 0 {
            return Err(MarketError::Configuration(
                "num_agents must be at least 1".to_string(),
            ));
        }
        if !(self.mu.is_finite() && self.mu > 0.0) {
            return Err(MarketError::Configuration(format!(
                "mu must be positive and finite, got {}",
                self.mu
            )));
        }
        if self.m == 0 {
            return Err(MarketError::Configuration(
                "m must be at least 1".to_string(),
            ));
        }
        if self.convergence == 0 {
            return Err(MarketError::Configuration(
                "convergence must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("c_i", self.c_i),
            ("a_minus_c_i", self.a_minus_c_i),
            ("a_0", self.a_0),
            ("xi", self.xi),
        ] {
            if !value.is_finite() {
                return Err(MarketError::Configuration(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        self.price_sweep.validate()
    }

    /// Total number of steps the training loop is expected to run.
    pub fn total_steps(&self) -> u64 {
        u64::from(self.epochs) * u64::from(self.max_steps)
    }

    /// File stem shared by the action log and the exported trajectory.
    pub fn savefile(&self) -> String {
        format!(
            "discrete_{}_with_{}_agents_k_{}_for_{}_steps",
            self.trainer_choice,
            self.num_agents,
            self.k,
            self.total_steps()
        )
    }
}
