use super::{
    environment::{Environment, Space, Step},
    rm_error::{ConstructionError, RMResult},
    types::Reward,
};

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum ChainAction {
    Left,
    Nop,
    Right,
}

impl ChainAction {
    pub const SIZE: u32 = 3;

    fn offset(&self) -> isize {
        match self {
            ChainAction::Left => -1,
            ChainAction::Nop => 0,
            ChainAction::Right => 1,
        }
    }
}

impl From<u32> for ChainAction {
    fn from(value: u32) -> Self {
        if value == 0 {
            ChainAction::Left
        } else if value == 1 {
            ChainAction::Nop
        } else {
            ChainAction::Right
        }
    }
}

impl From<ChainAction> for u32 {
    fn from(val: ChainAction) -> Self {
        match val {
            ChainAction::Left => 0,
            ChainAction::Nop => 1,
            ChainAction::Right => 2,
        }
    }
}

/// A row of cells walked left to right.
///
/// Bumping into either end costs `-1`. Reaching the last cell pays `+1` and ends the episode, which
/// otherwise ends after `10 * n` steps.
#[derive(Clone, Debug)]
pub struct ChainEnvironment {
    n_states: usize,
    max_steps: usize,
    position: usize,
    counter: usize,
    last_action: Option<ChainAction>,
}

impl ChainEnvironment {
    pub fn new(n_states: usize) -> RMResult<Self> {
        if n_states < 2 {
            return Err(ConstructionError::ChainTooShort(n_states).into());
        }
        Ok(Self {
            n_states,
            max_steps: n_states * 10,
            position: 0,
            counter: 0,
            last_action: None,
        })
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn last_action(&self) -> Option<ChainAction> {
        self.last_action
    }
}

impl Environment for ChainEnvironment {
    type Observation = usize;
    type Action = ChainAction;

    fn reset(&mut self) -> RMResult<usize> {
        self.position = 0;
        self.counter = 0;
        self.last_action = None;
        Ok(self.position)
    }

    fn step(&mut self, action: &ChainAction) -> RMResult<Step<usize>> {
        self.counter += 1;
        self.last_action = Some(*action);
        let last_cell = self.n_states - 1;
        let target = self.position as isize + action.offset();
        let mut reward: Reward = 0.0;
        if target < 0 {
            self.position = 0;
            reward = -1.0;
        } else if target as usize > last_cell {
            self.position = last_cell;
            reward = -1.0;
        } else {
            self.position = target as usize;
        }

        let done = if self.position == last_cell {
            reward = 1.0;
            true
        } else {
            self.counter >= self.max_steps
        };
        Ok(Step::new(self.position, reward, done))
    }

    fn observation_space(&self) -> Space {
        Space::Discrete(self.n_states)
    }

    fn action_space(&self) -> Space {
        Space::Discrete(ChainAction::SIZE as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward_machines::rm_error::RMError;

    #[test]
    fn test_too_short_chain() {
        assert!(matches!(
            ChainEnvironment::new(1),
            Err(RMError::Construction(ConstructionError::ChainTooShort(1)))
        ));
    }

    #[test]
    fn test_walk_to_the_end() {
        let mut env = ChainEnvironment::new(3).unwrap();
        assert_eq!(env.reset().unwrap(), 0);
        let step = env.step(&ChainAction::Left).unwrap();
        assert_eq!((step.observation, step.reward, step.done), (0, -1.0, false));
        let step = env.step(&ChainAction::Right).unwrap();
        assert_eq!((step.observation, step.reward, step.done), (1, 0.0, false));
        let step = env.step(&ChainAction::Right).unwrap();
        assert_eq!((step.observation, step.reward, step.done), (2, 1.0, true));
        assert!(step.info.is_empty());
    }

    #[test]
    fn test_step_limit() {
        let mut env = ChainEnvironment::new(2).unwrap();
        env.reset().unwrap();
        let dones = (0..env.max_steps())
            .map(|_| env.step(&ChainAction::Nop).unwrap().done)
            .collect::<Vec<_>>();
        assert_eq!(dones.iter().filter(|&&d| d).count(), 1);
        assert!(dones[dones.len() - 1]);
    }

    #[test]
    fn test_action_codes() {
        for code in 0..ChainAction::SIZE {
            assert_eq!(u32::from(ChainAction::from(code)), code);
        }
        assert_eq!(ChainAction::from(7), ChainAction::Right);
    }
}
