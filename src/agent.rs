use std::fmt;

use serde::{Deserialize, Serialize};

use crate::UInt;
use crate::config::Config;

/// Identifier of a firm, displayed as `agent_<index>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub UInt);

impl AgentId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent_{}", self.0)
    }
}

impl From<usize> for AgentId {
    fn from(index: usize) -> Self {
        AgentId(index as UInt)
    }
}

/// A price-setting firm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Firm {
    pub id: AgentId,
    pub marginal_cost: f64,
    /// Product quality index `a_i`.
    pub quality: f64,
}

impl Firm {
    pub fn new(id: AgentId, marginal_cost: f64, quality: f64) -> Self {
        Firm {
            id,
            marginal_cost,
            quality,
        }
    }

    /// Per-unit margin at the given price.
    pub fn margin(&self, price: f64) -> f64 {
        price - self.marginal_cost
    }

    /// Symmetric firms sharing the configured cost and quality.
    pub fn from_config(config: &Config) -> Vec<Firm> {
        (0..config.num_agents)
            .map(|i| Firm::new(AgentId(i), config.c_i, config.c_i + config.a_minus_c_i))
            .collect()
    }
}
