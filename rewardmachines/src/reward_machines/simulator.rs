use tracing::debug;

use super::{
    automaton::Automaton,
    config::{ShapingConfig, ShapingMode},
    guard::display_interpretation,
    potential::shaped_reward,
    reward_machine::RewardMachine,
    rm_error::{RMError, RMResult},
    types::{Interpretation, Reward, State},
};

/// Drives a reward machine one interpretation at a time.
///
/// A simulator starts unstarted: [`RewardMachineSimulator::step`] fails with
/// [`RMError::NotInitialized`] until [`RewardMachineSimulator::reset`] has been called.
pub trait RewardMachineSimulator {
    fn reset(&mut self) -> State;
    /// Advances the automaton and returns the new state and the reward of the transition.
    /// `is_terminal` tells whether this is the last step of the episode.
    fn step(&mut self, symbol: &Interpretation, is_terminal: bool) -> RMResult<(State, Reward)>;
    fn current_state(&self) -> Option<State>;
    fn is_true(&self) -> bool;
    fn is_failed(&self) -> bool;
    /// Number of state ids the simulator can report, excluding the sink.
    fn num_states(&self) -> usize;
    fn reward(&self) -> Reward;
    fn automaton(&self) -> &dyn Automaton;
    /// Name recorded in log events.
    fn set_name(&mut self, name: &str);
}

pub struct RewardAutomatonSimulator<M: RewardMachine> {
    name: String,
    reward_machine: M,
    shaping: ShapingConfig,
    current_state: Option<State>,
}

impl<M: RewardMachine> RewardAutomatonSimulator<M> {
    pub fn new(reward_machine: M) -> Self {
        Self::with_shaping(reward_machine, ShapingConfig::default())
    }

    pub fn with_shaping(reward_machine: M, shaping: ShapingConfig) -> Self {
        Self {
            name: String::from("goal"),
            reward_machine,
            shaping,
            current_state: None,
        }
    }

    pub fn reward_machine(&self) -> &M {
        &self.reward_machine
    }

    pub fn shaping(&self) -> ShapingConfig {
        self.shaping
    }
}

impl<M: RewardMachine> RewardMachineSimulator for RewardAutomatonSimulator<M> {
    fn reset(&mut self) -> State {
        let initial_state = self.reward_machine.initial_state();
        self.current_state = Some(initial_state);
        initial_state
    }

    fn step(&mut self, symbol: &Interpretation, is_terminal: bool) -> RMResult<(State, Reward)> {
        let state = self.current_state.ok_or(RMError::NotInitialized)?;
        let next_state = self.reward_machine.get_successor(state, symbol)?;
        let reward = match self.shaping.mode {
            ShapingMode::Sparse => self.reward_machine.get_reward(state, symbol)?,
            ShapingMode::Potential => {
                let terminal_bonus = if is_terminal && self.reward_machine.is_accepting(next_state)
                {
                    self.reward_machine.reward()
                } else {
                    0.0
                };
                // destination first, only the destination sees the termination flag
                let destination_potential = self.reward_machine.potential(next_state, is_terminal);
                let source_potential = self.reward_machine.potential(state, false);
                shaped_reward(
                    source_potential,
                    destination_potential,
                    terminal_bonus,
                    self.shaping.discount,
                )
            }
        };
        if state != next_state {
            debug!(
                goal = %self.name,
                from = state,
                to = next_state,
                symbol = %display_interpretation(symbol),
                reward,
                "automaton transition"
            );
        }
        self.current_state = Some(next_state);
        Ok((next_state, reward))
    }

    fn current_state(&self) -> Option<State> {
        self.current_state
    }

    fn is_true(&self) -> bool {
        self.current_state
            .is_some_and(|state| self.reward_machine.is_accepting(state))
    }

    fn is_failed(&self) -> bool {
        self.current_state
            .is_some_and(|state| self.reward_machine.is_failure_state(state))
    }

    fn num_states(&self) -> usize {
        self.reward_machine.sink_state()
    }

    fn reward(&self) -> Reward {
        self.reward_machine.reward()
    }

    fn automaton(&self) -> &dyn Automaton {
        &self.reward_machine
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}
