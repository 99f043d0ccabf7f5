use std::{collections::HashMap, hash::Hash};

use rand::{Rng, SeedableRng};
use rand_xorshift::XorShiftRng;
use rewardmachines::reward_machines::{
    environment::Environment, rm_error::RMResult, types::Reward,
};
use tracing::{debug, info};

#[derive(Clone, Copy, Debug)]
pub struct QLearningConfig {
    pub alpha: f32,
    pub epsilon: f32,
    pub gamma: f32,
}

/// Tabular action values, filled lazily with small random values.
pub struct QTable<O: Clone + Eq + Hash> {
    values: HashMap<O, Vec<f32>>,
    num_actions: usize,
    config: QLearningConfig,
    rng: XorShiftRng,
}

impl<O: Clone + Eq + Hash> QTable<O> {
    pub fn new(num_actions: usize, config: QLearningConfig, seed: u64) -> Self {
        Self {
            values: HashMap::new(),
            num_actions,
            config,
            rng: XorShiftRng::seed_from_u64(seed),
        }
    }

    pub fn num_observations(&self) -> usize {
        self.values.len()
    }

    fn row(&mut self, observation: &O) -> &mut Vec<f32> {
        let (num_actions, rng) = (self.num_actions, &mut self.rng);
        self.values
            .entry(observation.clone())
            .or_insert_with(|| (0..num_actions).map(|_| rng.gen::<f32>() * 1e-3).collect())
    }

    fn greedy_action(&mut self, observation: &O) -> u32 {
        self.row(observation)
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (action, &value)| {
                if value > best.1 {
                    (action, value)
                } else {
                    best
                }
            })
            .0 as u32
    }

    pub fn choose_action(&mut self, observation: &O, explore: bool) -> u32 {
        if explore && self.rng.gen::<f32>() < self.config.epsilon {
            self.rng.gen_range(0..self.num_actions as u32)
        } else {
            self.greedy_action(observation)
        }
    }

    pub fn update(&mut self, observation: &O, action: u32, reward: Reward, next: &O, done: bool) {
        let next_value = if done {
            0.0
        } else {
            self.row(next).iter().copied().fold(f32::MIN, f32::max)
        };
        let QLearningConfig { alpha, gamma, .. } = self.config;
        let value = &mut self.row(observation)[action as usize];
        *value += alpha * (reward + gamma * next_value - *value);
    }

    /// Runs one episode and returns its undiscounted return.
    pub fn run_episode<E>(&mut self, env: &mut E, learn: bool) -> RMResult<Reward>
    where
        E: Environment<Observation = O>,
        E::Action: From<u32>,
    {
        let mut observation = env.reset()?;
        let mut total = 0.0;
        loop {
            let action = self.choose_action(&observation, learn);
            let step = env.step(&E::Action::from(action))?;
            total += step.reward;
            if learn {
                self.update(&observation, action, step.reward, &step.observation, step.done);
            }
            observation = step.observation;
            if step.done {
                return Ok(total);
            }
        }
    }

    pub fn train<E>(&mut self, env: &mut E, episodes: usize) -> RMResult<Vec<Reward>>
    where
        E: Environment<Observation = O>,
        E::Action: From<u32>,
    {
        let report_every = (episodes / 10).max(1);
        let mut returns = Vec::with_capacity(episodes);
        for episode in 0..episodes {
            let total = self.run_episode(env, true)?;
            debug!(episode, total, "episode finished");
            returns.push(total);
            if (episode + 1) % report_every == 0 {
                let window = &returns[returns.len().saturating_sub(report_every)..];
                info!(
                    episode = episode + 1,
                    mean_return = window.iter().sum::<f32>() / window.len() as f32,
                    visited = self.num_observations(),
                    "training"
                );
            }
        }
        Ok(returns)
    }

    pub fn evaluate<E>(&mut self, env: &mut E, episodes: usize) -> RMResult<Vec<Reward>>
    where
        E: Environment<Observation = O>,
        E::Action: From<u32>,
    {
        (0..episodes)
            .map(|_| self.run_episode(env, false))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewardmachines::reward_machines::chain::ChainEnvironment;

    #[test]
    fn test_learns_to_walk_right() {
        let config = QLearningConfig {
            alpha: 0.5,
            epsilon: 0.1,
            gamma: 0.9,
        };
        let mut q_table = QTable::new(3, config, 7);
        let mut env = ChainEnvironment::new(3).unwrap();
        q_table.train(&mut env, 200).unwrap();
        let returns = q_table.evaluate(&mut env, 3).unwrap();
        assert!(returns.iter().all(|&r| r == 1.0));
    }
}
