use std::{collections::BTreeMap, fmt::Debug};

use serde::{Deserialize, Serialize};

use super::{rm_error::RMResult, types::Reward};

// environment.rs
pub type Info = BTreeMap<String, String>;

/// Shape of a discrete observation or action set.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Space {
    Discrete(usize),
    MultiDiscrete(Vec<usize>),
}

impl Space {
    /// Per-component sizes.
    pub fn dims(&self) -> Vec<usize> {
        match self {
            Space::Discrete(n) => vec![*n],
            Space::MultiDiscrete(dims) => dims.clone(),
        }
    }

    /// Number of distinct values, `None` on overflow.
    pub fn cardinality(&self) -> Option<usize> {
        self.dims()
            .into_iter()
            .try_fold(1usize, |acc, n| acc.checked_mul(n))
    }

    /// Appends the components of `other`.
    pub fn compose(&self, other: &Space) -> Space {
        let mut dims = self.dims();
        dims.extend(other.dims());
        Space::MultiDiscrete(dims)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Step<O> {
    pub observation: O,
    pub reward: Reward,
    pub done: bool,
    pub info: Info,
}

impl<O> Step<O> {
    pub fn new(observation: O, reward: Reward, done: bool) -> Self {
        Self {
            observation,
            reward,
            done,
            info: Info::new(),
        }
    }

    pub fn map_observation<T, F: FnOnce(O) -> T>(self, f: F) -> Step<T> {
        Step {
            observation: f(self.observation),
            reward: self.reward,
            done: self.done,
            info: self.info,
        }
    }
}

pub trait Environment {
    type Observation: Clone + Debug;
    type Action: Clone + Debug;

    fn reset(&mut self) -> RMResult<Self::Observation>;
    fn step(&mut self, action: &Self::Action) -> RMResult<Step<Self::Observation>>;
    fn observation_space(&self) -> Space;
    fn action_space(&self) -> Space;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_space_composition() {
        let base = Space::Discrete(5);
        let composed = base.compose(&Space::MultiDiscrete(vec![5, 3]));
        assert_eq!(composed, Space::MultiDiscrete(vec![5, 5, 3]));
        assert_eq!(composed.cardinality(), Some(75));
        assert_eq!(
            Space::MultiDiscrete(vec![usize::MAX, 2]).cardinality(),
            None
        );
    }

    #[test]
    fn test_step_keeps_info_when_mapped() {
        let mut step = Step::new(3usize, 1.0, true);
        step.info.insert("cause".to_string(), "goal".to_string());
        let mapped = step.map_observation(|o| (o, vec![0usize]));
        assert_eq!(mapped.observation, (3, vec![0]));
        assert_eq!(mapped.info["cause"], "goal");
        assert!(mapped.done);
    }
}
