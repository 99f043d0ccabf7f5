use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use tracing::trace;

use super::{
    automaton::Automaton,
    guard::Guard,
    types::{Reward, State},
};

/// Backward distances to acceptance.
#[derive(Clone, Debug, PartialEq)]
pub struct Levels {
    /// Shortest number of transitions to an accepting state. Failure states hold `max_level`.
    pub reachability_levels: HashMap<State, usize>,
    /// One past the last discovered level, zero when nothing is accepting.
    pub max_level: usize,
    /// States from which no accepting state is reachable, the sink included.
    pub failure_states: BTreeSet<State>,
}

impl Levels {
    pub fn level(&self, state: State) -> usize {
        self.reachability_levels
            .get(&state)
            .copied()
            .unwrap_or(self.max_level)
    }

    pub fn is_failure(&self, state: State) -> bool {
        self.failure_states.contains(&state) || !self.reachability_levels.contains_key(&state)
    }
}

/// Multi-source BFS from the accepting states over the reversed transition relation.
pub fn compute_levels<A: Automaton + ?Sized>(automaton: &A) -> Levels {
    let mut states = automaton.states();
    states.insert(automaton.sink_state());

    let mut predecessors: HashMap<State, BTreeSet<State>> = HashMap::new();
    for &state in &states {
        let Ok(transitions) = automaton.get_transitions_from(state) else {
            continue;
        };
        for transition in transitions {
            if transition.guard == Guard::False {
                continue;
            }
            predecessors
                .entry(transition.destination)
                .or_default()
                .insert(transition.source);
        }
    }

    let mut levels: HashMap<State, usize> = HashMap::new();
    let mut queue = VecDeque::new();
    for state in automaton.accepting_states() {
        levels.insert(state, 0);
        queue.push_back(state);
    }
    let mut last_level = None;
    while let Some(state) = queue.pop_front() {
        let level = levels[&state];
        last_level = Some(level);
        let Some(sources) = predecessors.get(&state) else {
            continue;
        };
        for &source in sources {
            if let std::collections::hash_map::Entry::Vacant(entry) = levels.entry(source) {
                entry.insert(level + 1);
                queue.push_back(source);
            }
        }
    }

    let max_level = last_level.map_or(0, |level| level + 1);
    let failure_states = states
        .into_iter()
        .filter(|state| !levels.contains_key(state))
        .collect::<BTreeSet<_>>();
    for &state in &failure_states {
        levels.insert(state, max_level);
    }
    Levels {
        reachability_levels: levels,
        max_level,
        failure_states,
    }
}

/// An immutable snapshot of the potential of every known state.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PotentialFunction {
    potentials: BTreeMap<State, Reward>,
}

impl PotentialFunction {
    pub fn new(potentials: BTreeMap<State, Reward>) -> Self {
        Self { potentials }
    }

    /// `reward * (l0 - level(q)) / l0` where `l0` is the level of the initial state.
    ///
    /// When the initial state is itself accepting the normalisation is skipped and the potential
    /// degenerates to `-level(q) * reward`.
    pub fn from_levels(levels: &Levels, initial_state: State, reward: Reward) -> Self {
        let initial_level = levels.level(initial_state) as Reward;
        let potentials = levels
            .reachability_levels
            .iter()
            .map(|(&state, &level)| {
                let mut p = initial_level - level as Reward;
                if initial_level != 0.0 {
                    p /= initial_level;
                }
                (state, p * reward)
            })
            .collect::<BTreeMap<_, _>>();
        trace!(?potentials, "potential function computed");
        Self { potentials }
    }

    /// Terminal states have zero potential so that shaping telescopes to the terminal bonus.
    pub fn potential(&self, state: State, is_terminal_state: bool) -> Reward {
        if is_terminal_state {
            return 0.0;
        }
        self.potentials.get(&state).copied().unwrap_or(0.0)
    }

    pub fn potentials(&self) -> &BTreeMap<State, Reward> {
        &self.potentials
    }
}

/// `discount * Φ(q') - Φ(q) + bonus`, the destination potential already evaluated with the
/// termination flag.
pub fn shaped_reward(
    source_potential: Reward,
    destination_potential: Reward,
    terminal_bonus: Reward,
    discount: f32,
) -> Reward {
    discount * destination_potential - source_potential + terminal_bonus
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward_machines::automaton::tests::sequence_automaton;
    use crate::reward_machines::automaton::SymbolicDfa;
    use float_cmp::approx_eq;

    #[test]
    fn test_levels_of_sequence() {
        let levels = compute_levels(&sequence_automaton());
        assert_eq!(levels.level(3), 0);
        assert_eq!(levels.level(2), 1);
        assert_eq!(levels.level(1), 2);
        assert_eq!(levels.level(0), 3);
        assert_eq!(levels.max_level, 4);
        assert_eq!(levels.level(4), 4);
        assert_eq!(levels.failure_states, BTreeSet::from([4]));
    }

    #[test]
    fn test_failure_state_is_classified() {
        // 0 -a-> 1 (accepting), 0 -b-> 2, 2 loops forever
        let mut builder = SymbolicDfa::builder();
        let q1 = builder.create_state();
        let q2 = builder.create_state();
        builder
            .add_transition_str(0, "a", q1)
            .unwrap()
            .add_transition_str(0, "b & ~a", q2)
            .unwrap()
            .add_transition(q1, Guard::True, q1)
            .add_transition(q2, Guard::True, q2)
            .set_accepting_state(q1, true);
        let dfa = builder.build().unwrap();
        let levels = compute_levels(&dfa);
        assert!(levels.is_failure(q2));
        assert!(!levels.is_failure(0));
        assert_eq!(levels.max_level, 2);

        let potential = PotentialFunction::from_levels(&levels, 0, 5.0);
        assert!(potential.potential(q2, false) <= 0.0);
        assert!(approx_eq!(f32, potential.potential(q1, false), 5.0));
    }

    #[test]
    fn test_no_accepting_states() {
        let mut builder = SymbolicDfa::builder();
        builder.add_transition(0, Guard::True, 0);
        let levels = compute_levels(&builder.build().unwrap());
        assert_eq!(levels.max_level, 0);
        assert_eq!(levels.failure_states, BTreeSet::from([0, 1]));
        let potential = PotentialFunction::from_levels(&levels, 0, 5.0);
        assert!(approx_eq!(f32, potential.potential(0, false), 0.0));
    }

    #[test]
    fn test_potential_values() {
        let levels = compute_levels(&sequence_automaton());
        let potential = PotentialFunction::from_levels(&levels, 0, 10.0);
        assert!(approx_eq!(f32, potential.potential(0, false), 0.0));
        assert!(approx_eq!(f32, potential.potential(1, false), 10.0 / 3.0, epsilon = 1e-5));
        assert!(approx_eq!(f32, potential.potential(2, false), 20.0 / 3.0, epsilon = 1e-5));
        assert!(approx_eq!(f32, potential.potential(3, false), 10.0));
        assert!(potential.potential(4, false) < 0.0);
        for state in 0..5 {
            assert_eq!(potential.potential(state, true), 0.0);
        }
    }

    #[test]
    fn test_shaping_telescopes() {
        let levels = compute_levels(&sequence_automaton());
        let potential = PotentialFunction::from_levels(&levels, 0, 10.0);
        let trajectory = [0, 0, 1, 1, 2, 2, 2, 3];
        let last = trajectory.len() - 1;
        let total: f32 = trajectory
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let done = i + 1 == last;
                let bonus = if done && pair[1] == 3 { 10.0 } else { 0.0 };
                shaped_reward(
                    potential.potential(pair[0], false),
                    potential.potential(pair[1], done),
                    bonus,
                    1.0,
                )
            })
            .sum();
        assert!(approx_eq!(f32, total, 10.0, epsilon = 1e-4));
    }
}
