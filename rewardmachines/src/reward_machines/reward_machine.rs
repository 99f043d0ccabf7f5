use std::collections::BTreeSet;

use super::{
    automaton::Automaton,
    potential::{compute_levels, Levels, PotentialFunction},
    rm_error::RMResult,
    types::{Interpretation, Reward, State, Transition},
};

/// An automaton whose acceptance pays a terminal reward.
pub trait RewardMachine: Automaton {
    fn reward(&self) -> Reward;

    /// Potential used for shaping. Zero for terminal evaluations.
    fn potential(&self, state: State, is_terminal_state: bool) -> Reward;

    fn is_failure_state(&self, state: State) -> bool;

    /// The non-shaped reward: `reward` iff the successor is accepting.
    fn get_reward(&self, state: State, symbol: &Interpretation) -> RMResult<Reward> {
        let end_state = self.get_successor(state, symbol)?;
        Ok(if self.is_accepting(end_state) {
            self.reward()
        } else {
            0.0
        })
    }
}

/// A reward machine over a fully known automaton.
///
/// The levels and the potential function are computed once, at construction.
#[derive(Clone, Debug)]
pub struct RewardAutomaton<A: Automaton> {
    automaton: A,
    reward: Reward,
    levels: Levels,
    potential_function: PotentialFunction,
}

impl<A: Automaton> RewardAutomaton<A> {
    pub fn new(automaton: A, reward: Reward) -> Self {
        let levels = compute_levels(&automaton);
        let potential_function =
            PotentialFunction::from_levels(&levels, automaton.initial_state(), reward);
        Self {
            automaton,
            reward,
            levels,
            potential_function,
        }
    }

    pub fn automaton(&self) -> &A {
        &self.automaton
    }

    pub fn levels(&self) -> &Levels {
        &self.levels
    }

    pub fn reachability_levels(&self) -> &std::collections::HashMap<State, usize> {
        &self.levels.reachability_levels
    }

    pub fn max_level(&self) -> usize {
        self.levels.max_level
    }

    pub fn failure_states(&self) -> &BTreeSet<State> {
        &self.levels.failure_states
    }

    pub fn potential_function(&self) -> &PotentialFunction {
        &self.potential_function
    }
}

impl<A: Automaton> Automaton for RewardAutomaton<A> {
    fn states(&self) -> BTreeSet<State> {
        self.automaton.states()
    }

    fn initial_state(&self) -> State {
        self.automaton.initial_state()
    }

    fn accepting_states(&self) -> BTreeSet<State> {
        self.automaton.accepting_states()
    }

    fn get_successor(&self, state: State, symbol: &Interpretation) -> RMResult<State> {
        self.automaton.get_successor(state, symbol)
    }

    fn get_transitions_from(&self, state: State) -> RMResult<Vec<Transition>> {
        self.automaton.get_transitions_from(state)
    }

    fn sink_state(&self) -> State {
        self.automaton.sink_state()
    }

    fn is_accepting(&self, state: State) -> bool {
        self.automaton.is_accepting(state)
    }
}

impl<A: Automaton> RewardMachine for RewardAutomaton<A> {
    fn reward(&self) -> Reward {
        self.reward
    }

    fn potential(&self, state: State, is_terminal_state: bool) -> Reward {
        self.potential_function.potential(state, is_terminal_state)
    }

    fn is_failure_state(&self, state: State) -> bool {
        self.levels.is_failure(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward_machines::{
        automaton::tests::sequence_automaton, interpretation, rm_error::RMError,
    };

    #[test]
    fn test_reward_only_on_acceptance() {
        let rm = RewardAutomaton::new(sequence_automaton(), 10.0);
        assert_eq!(rm.get_reward(2, &interpretation(["s4"])).unwrap(), 10.0);
        assert_eq!(rm.get_reward(2, &interpretation(["s3"])).unwrap(), 0.0);
        assert_eq!(rm.get_reward(3, &interpretation(["s1"])).unwrap(), 10.0);
        assert_eq!(rm.get_reward(0, &interpretation(["s4"])).unwrap(), 0.0);
    }

    #[test]
    fn test_invalid_state() {
        let rm = RewardAutomaton::new(sequence_automaton(), 10.0);
        assert!(matches!(
            rm.get_reward(9, &interpretation(["s4"])),
            Err(RMError::InvalidState { state: 9 })
        ));
    }

    #[test]
    fn test_failure_classification() {
        let rm = RewardAutomaton::new(sequence_automaton(), 10.0);
        assert!(rm.is_failure_state(rm.sink_state()));
        assert_eq!(rm.failure_states(), &BTreeSet::from([4]));
        assert!(!rm.is_failure_state(0));
        assert_eq!(rm.max_level(), 4);
        assert!(rm.potential(4, false) < rm.potential(0, false));
    }
}
