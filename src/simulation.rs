use std::collections::BTreeMap;

use itertools::Itertools;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::actions::{Deviation, PriceGrid};
use crate::agent::{AgentId, Firm};
use crate::config::Config;
use crate::demand::DemandModel;
use crate::equilibrium::Equilibrium;
use crate::error::MarketError;
use crate::sink::{ActionSink, SinkType};
use crate::{Int, UInt};

/// One action index per agent.
pub type Actions = BTreeMap<AgentId, Int>;
/// Flattened recent action indices of every agent.
pub type Observation = Vec<UInt>;

/// Termination flag shared by all agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Done {
    #[serde(rename = "__all__")]
    pub all: bool,
}

/// Per-agent diagnostics. Currently empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub observation: BTreeMap<AgentId, Observation>,
    pub reward: BTreeMap<AgentId, f64>,
    pub done: Done,
    pub info: BTreeMap<AgentId, Info>,
}

/// Price paths of every agent, for an external plotter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub title: String,
    pub savefile: String,
    pub nash: f64,
    pub monopoly: f64,
    pub series: BTreeMap<String, Vec<f64>>,
}

/// Repeated Bertrand competition over a discrete price grid.
#[derive(Debug)]
pub struct Simulation {
    config: Config,
    firms: Vec<Firm>,
    demand: DemandModel,
    equilibrium: Equilibrium,
    grid: PriceGrid,
    action_history: Vec<Vec<UInt>>,
    prices: Vec<f64>,
    current_step: UInt,
    rng: StdRng,
    sink: SinkType,
}

impl Simulation {
    /// Solve for the equilibrium prices, build the price grid, seed each
    /// agent's history with random actions and reset.
    pub fn new(config: Config, sink: SinkType) -> Result<Self, MarketError> {
        config.validate()?;
        let firms = Firm::from_config(&config);
        let demand = DemandModel::new(
            firms.iter().map(|f| f.quality).collect(),
            config.a_0,
            config.mu,
        )?;
        let equilibrium = Equilibrium::solve(&demand, firms[0].marginal_cost, &config.price_sweep)?;
        if equilibrium.nash > equilibrium.monopoly {
            warn!(
                "Nash price {} exceeds monopoly price {}",
                equilibrium.nash, equilibrium.monopoly
            );
        }
        let grid = PriceGrid::new(&equilibrium, config.xi, config.m)?;
        info!("Price grid: {:?}", grid.prices());

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let history_len = config.convergence.max(config.k);
        let action_history = firms
            .iter()
            .map(|_| {
                (0..history_len)
                    .map(|_| rng.random_range(0..config.m))
                    .collect_vec()
            })
            .collect_vec();

        let mut sim = Simulation {
            prices: vec![0.0; firms.len()],
            config,
            firms,
            demand,
            equilibrium,
            grid,
            action_history,
            current_step: 0,
            rng,
            sink,
        };
        sim.reset();
        Ok(sim)
    }

    /// Start a new episode from a random joint action. History is kept.
    pub fn reset(&mut self) -> BTreeMap<AgentId, Observation> {
        self.current_step = 0;
        for history in self.action_history.iter_mut() {
            history.push(self.rng.random_range(0..self.config.m));
        }
        self.shared_observation()
    }

    /// Play one round of prices.
    pub fn step(&mut self, actions: &Actions) -> Result<StepResult, MarketError> {
        let actions = self.validate_actions(actions)?;

        if let Err(e) = self.sink.record(&actions) {
            warn!("Failed to record actions {:?}: {}", actions, e);
        }
        for (history, &action) in self.action_history.iter_mut().zip(&actions) {
            history.push(action);
        }

        let observation = self.shared_observation();

        self.prices = self.grid.take(&actions);
        let reward = self
            .firms
            .iter()
            .enumerate()
            .map(|(i, firm)| {
                (
                    firm.id,
                    self.demand.profit(&self.prices, i, firm.marginal_cost),
                )
            })
            .collect::<BTreeMap<_, _>>();

        let done = Done {
            all: self.converged() || self.current_step == self.config.max_steps,
        };
        let info = self.players().map(|id| (id, Info::default())).collect();

        debug!(
            "Step: {:5} | Actions: {:?} | Prices: {:.3?} | Rewards: {:.4?} | Done: {}",
            self.current_step,
            actions,
            self.prices,
            reward.values().collect_vec(),
            done.all
        );
        self.current_step += 1;

        Ok(StepResult {
            observation,
            reward,
            done,
            info,
        })
    }

    /// Force the first agent to the lowest or highest price while every other
    /// agent repeats its previous action, then step.
    pub fn deviate(&mut self, direction: Deviation) -> Result<StepResult, MarketError> {
        let mut actions = Actions::new();
        actions.insert(AgentId(0), direction.action(&self.grid) as Int);
        for (i, history) in self.action_history.iter().enumerate().skip(1) {
            if let Some(&last) = history.last() {
                actions.insert(AgentId::from(i), last as Int);
            }
        }
        self.step(&actions)
    }

    pub fn render(&self) -> Result<(), MarketError> {
        Err(MarketError::UnsupportedOperation(
            "render is not implemented".to_string(),
        ))
    }

    fn validate_actions(&self, actions: &Actions) -> Result<Vec<UInt>, MarketError> {
        if actions.len() != self.firms.len() {
            return Err(MarketError::InvalidAction(format!(
                "expected {} actions, got {}",
                self.firms.len(),
                actions.len()
            )));
        }
        self.players()
            .map(|id| {
                let action = actions.get(&id).ok_or_else(|| {
                    MarketError::InvalidAction(format!("missing action for {id}"))
                })?;
                self.grid.validate(*action)
            })
            .collect()
    }

    /// Same vector for every agent: the last `k` actions of each agent in
    /// agent order, or zeros when `k` is 0.
    fn shared_observation(&self) -> BTreeMap<AgentId, Observation> {
        let obs = match self.config.k as usize {
            0 => vec![0; self.firms.len()],
            k => self
                .action_history
                .iter()
                .flat_map(|h| h[h.len().saturating_sub(k)..].iter().copied())
                .collect_vec(),
        };
        self.players().map(|id| (id, obs.clone())).collect()
    }

    /// True when the first agent's last `convergence` actions are identical.
    fn converged(&self) -> bool {
        let history = &self.action_history[0];
        let window = self.config.convergence as usize;
        history[history.len().saturating_sub(window)..]
            .iter()
            .all_equal()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn firms(&self) -> &[Firm] {
        &self.firms
    }

    pub fn players(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.firms.iter().map(|f| f.id)
    }

    pub fn current_step(&self) -> UInt {
        self.current_step
    }

    pub fn equilibrium(&self) -> &Equilibrium {
        &self.equilibrium
    }

    pub fn nash_price(&self) -> f64 {
        self.equilibrium.nash
    }

    pub fn monopoly_price(&self) -> f64 {
        self.equilibrium.monopoly
    }

    pub fn action_price_space(&self) -> &[f64] {
        self.grid.prices()
    }

    pub fn action_history(&self) -> &[Vec<UInt>] {
        &self.action_history
    }

    /// Prices realised in the most recent step.
    pub fn last_prices(&self) -> &[f64] {
        &self.prices
    }

    pub fn sink(&self) -> &SinkType {
        &self.sink
    }

    pub fn action_count(&self) -> usize {
        self.grid.len()
    }

    pub fn observation_len(&self) -> usize {
        match self.config.k as usize {
            0 => self.firms.len(),
            k => k * self.firms.len(),
        }
    }

    /// Inclusive bounds of each observation entry.
    pub fn observation_bounds(&self) -> (UInt, UInt) {
        (0, self.config.m)
    }

    /// The agent's whole action history mapped to prices.
    pub fn price_history(&self, agent: AgentId) -> Option<Vec<f64>> {
        self.action_history
            .get(agent.index())
            .map(|h| self.grid.take(h))
    }

    /// Price paths for plotting, optionally restricted to the last `last_n` rounds.
    pub fn trajectory(&self, last_n: Option<usize>) -> Trajectory {
        let base_title = format!(
            "{} with {} agents and k={} for {} Steps",
            self.config.trainer_choice,
            self.config.num_agents,
            self.config.k,
            self.config.total_steps()
        );
        let (title, savefile) = match last_n {
            Some(n) => (
                format!("{base_title}, Last Steps{n}"),
                format!("{}_last_steps_{n}", self.config.savefile()),
            ),
            None => (base_title, self.config.savefile()),
        };
        let series = self
            .firms
            .iter()
            .zip(&self.action_history)
            .map(|(firm, history)| {
                let start = last_n.map_or(0, |n| history.len().saturating_sub(n));
                (firm.id.to_string(), self.grid.take(&history[start..]))
            })
            .collect();
        Trajectory {
            title,
            savefile,
            nash: self.equilibrium.nash,
            monopoly: self.equilibrium.monopoly,
            series,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceSweep;
    use crate::sink::{JsonLinesSink, MemorySink};
    use approx::assert_abs_diff_eq;

    fn config() -> Config {
        Config {
            seed: Some(42),
            ..Config::default()
        }
    }

    fn actions(values: &[Int]) -> Actions {
        values
            .iter()
            .enumerate()
            .map(|(i, &a)| (AgentId::from(i), a))
            .collect()
    }

    fn history_lens(sim: &Simulation) -> Vec<usize> {
        sim.action_history().iter().map(|h| h.len()).collect()
    }

    #[test]
    fn test_simulation_initialization() {
        let sim = Simulation::new(config(), SinkType::default()).unwrap();
        assert_eq!(sim.current_step(), 0);
        assert_abs_diff_eq!(sim.nash_price(), 1.48, epsilon = 1e-9);
        assert_abs_diff_eq!(sim.monopoly_price(), 1.92, epsilon = 1e-9);
        assert_eq!(sim.action_price_space().len(), 15);
        assert_eq!(sim.action_count(), 15);
        // Seed history plus one reset draw.
        assert_eq!(history_lens(&sim), vec![6, 6]);
        assert!(sim.action_history().iter().flatten().all(|&a| a < 15));
        assert_eq!(
            sim.players().map(|id| id.to_string()).collect_vec(),
            vec!["agent_0", "agent_1"]
        );
    }

    #[test]
    fn test_invalid_config() {
        let err = Simulation::new(
            Config {
                mu: 0.0,
                ..config()
            },
            SinkType::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::Configuration(_)));

        let err = Simulation::new(
            Config {
                mu: 1e-3,
                ..config()
            },
            SinkType::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::Configuration(_)));
    }

    #[test]
    fn test_reset_then_step() {
        let mut sim = Simulation::new(
            Config {
                num_agents: 3,
                k: 2,
                ..config()
            },
            SinkType::default(),
        )
        .unwrap();
        let obs = sim.reset();
        assert_eq!(obs.len(), 3);
        assert!(obs.values().all(|o| o.len() == 6));

        let result = sim.step(&actions(&[3, 7, 11])).unwrap();
        assert_eq!(sim.observation_len(), 6);
        assert_eq!(result.reward.len(), 3);
        assert_eq!(result.info.len(), 3);
        let obs = &result.observation[&AgentId(0)];
        assert_eq!(obs.len(), 6);
        assert_eq!((obs[1], obs[3], obs[5]), (3, 7, 11));
        // Every agent sees the same vector.
        assert!(result.observation.values().all(|o| o == obs));
    }

    #[test]
    fn test_zero_memory_observes_zeros() {
        let mut sim = Simulation::new(
            Config {
                k: 0,
                ..config()
            },
            SinkType::default(),
        )
        .unwrap();
        let result = sim.step(&actions(&[1, 2])).unwrap();
        assert_eq!(sim.observation_len(), 2);
        assert!(result.observation.values().all(|o| o == &vec![0, 0]));
    }

    #[test]
    fn test_long_memory_observation_has_full_length() {
        let mut sim = Simulation::new(
            Config {
                k: 9,
                convergence: 2,
                ..config()
            },
            SinkType::default(),
        )
        .unwrap();
        assert!(sim.reset().values().all(|o| o.len() == 18));
    }

    #[test]
    fn test_rewards_follow_demand() {
        let mut sim = Simulation::new(config(), SinkType::default()).unwrap();
        let result = sim.step(&actions(&[0, 14])).unwrap();
        let grid = sim.action_price_space().to_vec();
        assert_eq!(sim.last_prices(), &[grid[0], grid[14]]);

        let model = DemandModel::new(vec![2.0, 2.0], 0.0, 0.25).unwrap();
        let prices = [grid[0], grid[14]];
        assert_abs_diff_eq!(
            result.reward[&AgentId(0)],
            (grid[0] - 1.0) * model.share(&prices, 0),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            result.reward[&AgentId(1)],
            (grid[14] - 1.0) * model.share(&prices, 1),
            epsilon = 1e-12
        );
        // The cheaper firm sells more.
        assert!(model.share(&prices, 0) > model.share(&prices, 1));
    }

    #[test]
    fn test_convergence_ends_episode() {
        let mut sim = Simulation::new(
            Config {
                convergence: 3,
                ..config()
            },
            SinkType::default(),
        )
        .unwrap();
        let mut done = false;
        for _ in 0..3 {
            done = sim.step(&actions(&[4, 9])).unwrap().done.all;
        }
        assert!(done);
        assert!(sim.current_step() < sim.config().max_steps);

        // Breaking the run clears the flag.
        assert!(!sim.step(&actions(&[5, 9])).unwrap().done.all);
    }

    #[test]
    fn test_max_steps_ends_episode() {
        let mut sim = Simulation::new(
            Config {
                convergence: 50,
                max_steps: 10,
                ..config()
            },
            SinkType::default(),
        )
        .unwrap();
        for t in 0..10 {
            let result = sim.step(&actions(&[(t % 2) as Int, 3])).unwrap();
            assert!(!result.done.all);
        }
        assert_eq!(sim.current_step(), 10);
        assert!(sim.step(&actions(&[0, 3])).unwrap().done.all);
        assert_eq!(sim.current_step(), 11);

        sim.reset();
        assert_eq!(sim.current_step(), 0);
    }

    #[test]
    fn test_deviate_down() {
        let mut sim = Simulation::new(config(), SinkType::default()).unwrap();
        sim.step(&actions(&[5, 9])).unwrap();
        let previous = sim.last_prices().to_vec();

        sim.deviate(Deviation::Down).unwrap();
        assert_eq!(sim.last_prices()[0], sim.action_price_space()[0]);
        assert_eq!(sim.last_prices()[1], previous[1]);
        assert_eq!(sim.action_history()[0].last(), Some(&0));
    }

    #[test]
    fn test_deviate_up_many_agents() {
        let mut sim = Simulation::new(
            Config {
                num_agents: 3,
                ..config()
            },
            SinkType::default(),
        )
        .unwrap();
        sim.step(&actions(&[5, 9, 2])).unwrap();
        sim.deviate(Deviation::parse("up").unwrap()).unwrap();
        let grid = sim.action_price_space().to_vec();
        assert_eq!(sim.last_prices(), &[grid[14], grid[9], grid[2]]);
        assert!(Deviation::parse("left").is_err());
    }

    #[test]
    fn test_invalid_action_does_not_mutate() {
        let mut sim = Simulation::new(config(), SinkType::from(MemorySink::default())).unwrap();
        let before = sim.action_history().to_vec();

        for bad in [actions(&[15, 0]), actions(&[-1, 0]), actions(&[0]), actions(&[0, 1, 2])] {
            let err = sim.step(&bad).unwrap_err();
            assert!(matches!(err, MarketError::InvalidAction(_)));
        }
        let mut wrong_agent = actions(&[0]);
        wrong_agent.insert(AgentId(7), 0);
        assert!(matches!(
            sim.step(&wrong_agent),
            Err(MarketError::InvalidAction(_))
        ));

        assert_eq!(sim.action_history(), before.as_slice());
        assert_eq!(sim.current_step(), 0);
        match sim.sink() {
            SinkType::Memory(m) => assert!(m.records.is_empty()),
            _ => panic!("expected a memory sink"),
        }
    }

    #[test]
    fn test_reset_appends_history() {
        let mut sim = Simulation::new(config(), SinkType::default()).unwrap();
        sim.step(&actions(&[1, 1])).unwrap();
        let before = sim.action_history().to_vec();
        sim.reset();
        assert_eq!(history_lens(&sim), vec![8, 8]);
        for (old, new) in before.iter().zip(sim.action_history()) {
            assert_eq!(&new[..old.len()], old.as_slice());
        }
    }

    #[test]
    fn test_sink_receives_actions_in_agent_order() {
        let mut sim = Simulation::new(config(), SinkType::from(MemorySink::default())).unwrap();
        sim.step(&actions(&[2, 13])).unwrap();
        sim.deviate(Deviation::Up).unwrap();
        match sim.sink() {
            SinkType::Memory(m) => assert_eq!(m.records, vec![vec![2, 13], vec![14, 13]]),
            _ => panic!("expected a memory sink"),
        }
    }

    #[test]
    fn test_sink_failure_does_not_abort_step() {
        let dir = std::env::temp_dir().join(format!("bertrand-sim-{}", std::process::id()));
        let sink = JsonLinesSink::new(&dir, "actions").unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        let mut sim = Simulation::new(config(), SinkType::from(sink)).unwrap();
        let result = sim.step(&actions(&[3, 3])).unwrap();
        assert_eq!(result.reward.len(), 2);
        assert_eq!(sim.action_history()[0].last(), Some(&3));
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let a = Simulation::new(config(), SinkType::default()).unwrap();
        let b = Simulation::new(config(), SinkType::default()).unwrap();
        assert_eq!(a.action_history(), b.action_history());
    }

    #[test]
    fn test_render_is_unsupported() {
        let sim = Simulation::new(config(), SinkType::default()).unwrap();
        assert!(matches!(
            sim.render(),
            Err(MarketError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_trajectory() {
        let mut sim = Simulation::new(config(), SinkType::default()).unwrap();
        sim.step(&actions(&[0, 14])).unwrap();
        let full = sim.trajectory(None);
        assert_eq!(full.title, "DQN with 2 agents and k=1 for 2000 Steps");
        assert_eq!(full.series["agent_0"].len(), 7);
        assert_eq!(full.series["agent_1"].last(), Some(&sim.action_price_space()[14]));
        assert_eq!(
            sim.price_history(AgentId(0)).unwrap(),
            full.series["agent_0"]
        );
        assert!(sim.price_history(AgentId(2)).is_none());

        let last = sim.trajectory(Some(3));
        assert_eq!(last.series["agent_0"].len(), 3);
        assert!(last.title.ends_with(", Last Steps3"));
        assert_eq!(
            last.savefile,
            "discrete_DQN_with_2_agents_k_1_for_2000_steps_last_steps_3"
        );
    }

    #[test]
    fn test_single_candidate_sweep_is_rejected() {
        // One candidate price makes Nash and Monopoly coincide.
        let err = Simulation::new(
            Config {
                price_sweep: PriceSweep {
                    start: 1.5,
                    end: 2.5,
                    step: 1.0,
                },
                ..config()
            },
            SinkType::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::Configuration(_)));
    }

    #[test]
    fn test_custom_sweep_anchors_grid() {
        let sim = Simulation::new(
            Config {
                price_sweep: PriceSweep {
                    start: 1.0,
                    end: 2.5,
                    step: 0.05,
                },
                ..config()
            },
            SinkType::default(),
        )
        .unwrap();
        let grid = sim.action_price_space();
        let spread = sim.monopoly_price() - sim.nash_price();
        assert_abs_diff_eq!(grid[0], sim.nash_price() - 0.1 * spread, epsilon = 1e-12);
        assert_abs_diff_eq!(grid[14], sim.monopoly_price() + 0.1 * spread, epsilon = 1e-12);
    }
}
