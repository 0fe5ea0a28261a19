use std::path::PathBuf;

use bertrand::{
    Int, MarketError,
    actions::Deviation,
    agent::AgentId,
    config::Config,
    simulation::{Actions, Simulation},
    sink::{JsonLinesSink, NullSink, SinkType},
};
use itertools::Itertools;
use log::{debug, info};
use rand::{Rng, SeedableRng, rngs::StdRng};
use strum::IntoEnumIterator;

fn main() -> Result<(), MarketError> {
    env_logger::init();
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let sink = match &config.actions_dir {
        Some(dir) => SinkType::from(JsonLinesSink::new(dir, &config.savefile())?),
        None => SinkType::from(NullSink),
    };
    let mut sim = Simulation::new(config.clone(), sink)?;
    info!(
        "Nash: {:.3}, Monopoly: {:.3}, {} prices",
        sim.nash_price(),
        sim.monopoly_price(),
        sim.action_count()
    );

    // Uniformly random play stands in for the training loop.
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(1)),
        None => StdRng::from_os_rng(),
    };
    for epoch in 0..config.epochs {
        sim.reset();
        let mut rewards = vec![];
        loop {
            let actions: Actions = sim
                .players()
                .map(|id| (id, rng.random_range(0..sim.action_count()) as Int))
                .collect();
            let result = sim.step(&actions)?;
            rewards.push(result.reward.values().sum::<f64>());
            if result.done.all {
                break;
            }
        }
        info!(
            "Epoch: {}, Steps: {}, Avg. Joint Profit: {:.4}",
            epoch,
            sim.current_step(),
            rewards.iter().sum::<f64>() / rewards.len() as f64
        );
    }

    for direction in Deviation::iter() {
        let result = sim.deviate(direction)?;
        debug!(
            "Deviation {}: prices {:.3?}, first agent profit {:.4}",
            direction,
            sim.last_prices(),
            result.reward[&AgentId(0)]
        );
    }

    let trajectory = sim.trajectory(None);
    let out_dir = PathBuf::from(config.actions_dir.as_deref().unwrap_or("."));
    let path = out_dir.join(format!("{}.json", trajectory.savefile));
    std::fs::write(&path, serde_json::to_string(&trajectory)?)?;
    info!(
        "Wrote {} price series to {}",
        trajectory.series.keys().join(", "),
        path.display()
    );
    Ok(())
}
