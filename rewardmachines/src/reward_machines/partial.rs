use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use tracing::{debug, trace};

use super::{
    automaton::Automaton,
    config::{ExplorationConfig, ShapingMode},
    guard::{display_interpretation, Guard},
    potential::{compute_levels, shaped_reward, PotentialFunction},
    rm_error::{RMError, RMResult},
    simulator::RewardMachineSimulator,
    types::{Interpretation, Reward, State, Symbol, Transition},
};

/// An automaton that can only be explored one configuration at a time, for formulas whose full
/// automaton is too large to build upfront.
pub trait OnTheFlyAutomaton {
    type Configuration: Clone + Eq + Hash + Debug;

    fn alphabet(&self) -> BTreeSet<Symbol>;
    fn initial_configuration(&self) -> Self::Configuration;
    fn successor(
        &self,
        configuration: &Self::Configuration,
        symbol: &Interpretation,
    ) -> RMResult<Self::Configuration>;
    fn is_accepting(&self, configuration: &Self::Configuration) -> bool;
    /// True when the configuration provably can't reach acceptance anymore.
    fn is_failed(&self, configuration: &Self::Configuration) -> bool;
}

/// Explores an explicit automaton lazily.
pub struct DfaUnfolding<A: Automaton> {
    automaton: A,
    alphabet: BTreeSet<Symbol>,
    failure_states: BTreeSet<State>,
}

impl<A: Automaton> DfaUnfolding<A> {
    pub fn new(automaton: A, alphabet: BTreeSet<Symbol>) -> Self {
        let failure_states = compute_levels(&automaton).failure_states;
        Self {
            automaton,
            alphabet,
            failure_states,
        }
    }
}

impl<A: Automaton> OnTheFlyAutomaton for DfaUnfolding<A> {
    type Configuration = State;

    fn alphabet(&self) -> BTreeSet<Symbol> {
        self.alphabet.clone()
    }

    fn initial_configuration(&self) -> State {
        self.automaton.initial_state()
    }

    fn successor(&self, configuration: &State, symbol: &Interpretation) -> RMResult<State> {
        self.automaton.get_successor(*configuration, symbol)
    }

    fn is_accepting(&self, configuration: &State) -> bool {
        self.automaton.is_accepting(*configuration)
    }

    fn is_failed(&self, configuration: &State) -> bool {
        self.failure_states.contains(configuration)
    }
}

/// Outcome of recording one observed transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Discovery {
    pub state: State,
    pub new_state: bool,
    /// Something about the graph changed: a state, a transition or a classification.
    pub changed: bool,
}

/// The part of an on-the-fly automaton seen so far.
///
/// Ids are allocated in discovery order, the initial configuration being `0`. The sink id is the
/// capacity so the observation size never changes while the table grows.
#[derive(Clone, Debug)]
pub struct PartialRewardAutomaton<C: Clone + Eq + Hash> {
    alphabet: BTreeSet<Symbol>,
    capacity: usize,
    configurations: Vec<C>,
    ids: HashMap<C, State>,
    transitions: BTreeMap<State, BTreeMap<Interpretation, State>>,
    accepting_states: BTreeSet<State>,
    failure_states: BTreeSet<State>,
}

impl<C: Clone + Eq + Hash> PartialRewardAutomaton<C> {
    pub fn new(
        initial: C,
        accepting: bool,
        failed: bool,
        alphabet: BTreeSet<Symbol>,
        capacity: usize,
    ) -> Self {
        let mut automaton = Self {
            alphabet,
            capacity: capacity.max(1),
            configurations: vec![initial.clone()],
            ids: HashMap::from([(initial, 0)]),
            transitions: BTreeMap::new(),
            accepting_states: BTreeSet::new(),
            failure_states: BTreeSet::new(),
        };
        if failed {
            automaton.failure_states.insert(0);
        } else if accepting {
            automaton.accepting_states.insert(0);
        }
        automaton
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn num_discovered(&self) -> usize {
        self.configurations.len()
    }

    pub fn configuration(&self, state: State) -> Option<&C> {
        self.configurations.get(state)
    }

    /// States proven unable to reach acceptance.
    pub fn failure_states(&self) -> &BTreeSet<State> {
        &self.failure_states
    }

    /// The interpretation restricted to the alphabet, used as the transition label.
    pub fn label(&self, symbol: &Interpretation) -> Interpretation {
        symbol.intersection(&self.alphabet).cloned().collect()
    }

    pub fn record(
        &mut self,
        source: State,
        label: Interpretation,
        destination: C,
        accepting: bool,
        failed: bool,
    ) -> RMResult<Discovery> {
        let mut new_state = false;
        let state = match self.ids.get(&destination) {
            Some(&id) => id,
            None => {
                if self.configurations.len() >= self.capacity {
                    return Err(RMError::StateCapacityExceeded {
                        capacity: self.capacity,
                    });
                }
                let id = self.configurations.len();
                self.configurations.push(destination.clone());
                self.ids.insert(destination, id);
                new_state = true;
                id
            }
        };
        let mut changed = new_state;
        let row = self.transitions.entry(source).or_default();
        if !row.contains_key(&label) {
            row.insert(label, state);
            changed = true;
        }
        if failed {
            changed |= self.failure_states.insert(state);
        } else if accepting {
            changed |= self.accepting_states.insert(state);
        }
        Ok(Discovery {
            state,
            new_state,
            changed,
        })
    }

    /// Potentials over the known graph.
    ///
    /// States known to reach acceptance get their distance-based potential, proven failures get
    /// zero. Every other state is still being explored and gets the smallest
    /// `Φ(predecessor) + bonus` over the known paths from the initial state, capped at `reward`.
    pub fn compute_potentials(
        &self,
        bonuses: &BTreeMap<State, Reward>,
        reward: Reward,
    ) -> PotentialFunction {
        let initial_state = 0;
        let levels = compute_levels(self);
        let mut potentials = BTreeMap::new();
        if !self.accepting_states.is_empty() {
            let base = PotentialFunction::from_levels(&levels, initial_state, reward);
            for state in self.states() {
                if !levels.is_failure(state) {
                    potentials.insert(state, base.potential(state, false));
                }
            }
        }
        for &state in &self.failure_states {
            potentials.insert(state, 0.0);
        }
        potentials.entry(initial_state).or_insert(0.0);

        let mut visited = BTreeSet::new();
        let mut frontier = vec![initial_state];
        while !frontier.is_empty() {
            let mut next_frontier = Vec::new();
            for state in frontier {
                if !visited.insert(state) {
                    continue;
                }
                let Some(row) = self.transitions.get(&state) else {
                    continue;
                };
                for &destination in row.values() {
                    next_frontier.push(destination);
                    if destination == initial_state
                        || !levels.is_failure(destination)
                        || self.failure_states.contains(&destination)
                    {
                        continue;
                    }
                    let candidate: Reward = if self.accepting_states.contains(&state) {
                        0.0
                    } else {
                        potentials.get(&state).copied().unwrap_or(0.0)
                            + bonuses.get(&destination).copied().unwrap_or(0.0)
                    };
                    let candidate = candidate.min(reward);
                    potentials
                        .entry(destination)
                        .and_modify(|p: &mut Reward| *p = p.min(candidate))
                        .or_insert(candidate);
                }
            }
            frontier = next_frontier;
        }
        trace!(?potentials, "partial potential function recomputed");
        PotentialFunction::new(potentials)
    }
}

impl<C: Clone + Eq + Hash> Automaton for PartialRewardAutomaton<C> {
    fn states(&self) -> BTreeSet<State> {
        (0..self.configurations.len()).collect()
    }

    fn initial_state(&self) -> State {
        0
    }

    fn accepting_states(&self) -> BTreeSet<State> {
        self.accepting_states.clone()
    }

    fn get_successor(&self, state: State, symbol: &Interpretation) -> RMResult<State> {
        let sink = self.sink_state();
        if state == sink {
            return Ok(sink);
        }
        if state >= self.configurations.len() {
            return Err(RMError::InvalidState { state });
        }
        Ok(self
            .transitions
            .get(&state)
            .and_then(|row| row.get(&self.label(symbol)))
            .copied()
            .unwrap_or(sink))
    }

    fn get_transitions_from(&self, state: State) -> RMResult<Vec<Transition>> {
        let sink = self.sink_state();
        if state == sink {
            return Ok(vec![Transition::new(sink, Guard::True, sink)]);
        }
        if state >= self.configurations.len() {
            return Err(RMError::InvalidState { state });
        }
        Ok(self
            .transitions
            .get(&state)
            .map(|row| {
                row.iter()
                    .map(|(label, &destination)| {
                        Transition::new(state, Guard::minterm(label, &self.alphabet), destination)
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    fn sink_state(&self) -> State {
        self.capacity
    }

    fn is_accepting(&self, state: State) -> bool {
        self.accepting_states.contains(&state)
    }
}

/// Simulates an on-the-fly automaton while discovering it.
///
/// Two potential snapshots are kept. `prior` prices the source of a transition and `current`
/// prices its destination; every step starts with `prior := current` and only a step that
/// changed the known graph recomputes `current`. A state is therefore always left with the
/// potential it was entered with.
pub struct PartialAutomatonSimulator<O: OnTheFlyAutomaton> {
    name: String,
    oracle: O,
    automaton: PartialRewardAutomaton<O::Configuration>,
    reward: Reward,
    config: ExplorationConfig,
    configuration: Option<O::Configuration>,
    current_state: Option<State>,
    prior: Arc<PotentialFunction>,
    current: Arc<PotentialFunction>,
    bonuses: BTreeMap<State, Reward>,
    episode: usize,
}

impl<O: OnTheFlyAutomaton> PartialAutomatonSimulator<O> {
    pub fn new(oracle: O, reward: Reward, config: ExplorationConfig) -> Self {
        let initial = oracle.initial_configuration();
        let automaton = PartialRewardAutomaton::new(
            initial.clone(),
            oracle.is_accepting(&initial),
            oracle.is_failed(&initial),
            oracle.alphabet(),
            config.max_states,
        );
        let bonuses = BTreeMap::new();
        let current = Arc::new(automaton.compute_potentials(&bonuses, reward));
        Self {
            name: String::from("goal"),
            oracle,
            automaton,
            reward,
            config,
            configuration: None,
            current_state: None,
            prior: Arc::clone(&current),
            current,
            bonuses,
            episode: 0,
        }
    }

    pub fn partial_automaton(&self) -> &PartialRewardAutomaton<O::Configuration> {
        &self.automaton
    }

    pub fn prior_potentials(&self) -> &PotentialFunction {
        &self.prior
    }

    pub fn current_potentials(&self) -> &PotentialFunction {
        &self.current
    }

    pub fn bonuses(&self) -> &BTreeMap<State, Reward> {
        &self.bonuses
    }

    pub fn episode(&self) -> usize {
        self.episode
    }

    fn decay_bonuses(&mut self) {
        let floor = self.config.threshold * self.reward;
        for bonus in self.bonuses.values_mut() {
            *bonus *= self.config.decay;
            if *bonus < floor {
                *bonus = 0.0;
            }
        }
    }

    fn recompute(&self) -> Arc<PotentialFunction> {
        Arc::new(self.automaton.compute_potentials(&self.bonuses, self.reward))
    }
}

impl<O: OnTheFlyAutomaton> RewardMachineSimulator for PartialAutomatonSimulator<O> {
    fn reset(&mut self) -> State {
        self.decay_bonuses();
        self.current = self.recompute();
        self.prior = Arc::clone(&self.current);
        self.configuration = Some(self.oracle.initial_configuration());
        self.current_state = Some(0);
        self.episode += 1;
        0
    }

    fn step(&mut self, symbol: &Interpretation, is_terminal: bool) -> RMResult<(State, Reward)> {
        let state = self.current_state.ok_or(RMError::NotInitialized)?;
        let configuration = self.configuration.as_ref().ok_or(RMError::NotInitialized)?;
        let next_configuration = self.oracle.successor(configuration, symbol)?;
        let accepting = self.oracle.is_accepting(&next_configuration);
        let failed = self.oracle.is_failed(&next_configuration);
        let label = self.automaton.label(symbol);
        let discovery = self.automaton.record(
            state,
            label,
            next_configuration.clone(),
            accepting,
            failed,
        )?;
        let next_state = discovery.state;
        if discovery.new_state && !accepting && !failed {
            self.bonuses
                .insert(next_state, self.config.initial_bonus * self.reward);
        }

        self.prior = Arc::clone(&self.current);
        if discovery.changed {
            debug!(
                goal = %self.name,
                episode = self.episode,
                from = state,
                to = next_state,
                symbol = %display_interpretation(symbol),
                discovered = self.automaton.num_discovered(),
                "partial automaton extended"
            );
            self.current = self.recompute();
        }

        let reward = match self.config.shaping.mode {
            ShapingMode::Sparse => {
                if self.automaton.is_accepting(next_state) {
                    self.reward
                } else {
                    0.0
                }
            }
            ShapingMode::Potential => {
                let terminal_bonus = if is_terminal && self.automaton.is_accepting(next_state) {
                    self.reward
                } else {
                    0.0
                };
                shaped_reward(
                    self.prior.potential(state, false),
                    self.current.potential(next_state, is_terminal),
                    terminal_bonus,
                    self.config.shaping.discount,
                )
            }
        };
        self.configuration = Some(next_configuration);
        self.current_state = Some(next_state);
        Ok((next_state, reward))
    }

    fn current_state(&self) -> Option<State> {
        self.current_state
    }

    fn is_true(&self) -> bool {
        self.current_state
            .is_some_and(|state| self.automaton.is_accepting(state))
    }

    fn is_failed(&self) -> bool {
        self.current_state
            .is_some_and(|state| self.automaton.failure_states().contains(&state))
    }

    fn num_states(&self) -> usize {
        self.automaton.capacity()
    }

    fn reward(&self) -> Reward {
        self.reward
    }

    fn automaton(&self) -> &dyn Automaton {
        &self.automaton
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward_machines::{
        automaton::{tests::sequence_automaton, SymbolicDfa},
        compare_rewards, interpretation,
    };

    const EPISODE: [&str; 10] = ["s1", "s2", "s3", "s2", "s1", "s0", "s1", "s2", "s3", "s4"];

    fn simulator(config: ExplorationConfig) -> PartialAutomatonSimulator<DfaUnfolding<SymbolicDfa>> {
        let alphabet = interpretation(["s0", "s1", "s2", "s3", "s4"]);
        PartialAutomatonSimulator::new(
            DfaUnfolding::new(sequence_automaton(), alphabet),
            10.0,
            config,
        )
    }

    fn run_episode(
        simulator: &mut PartialAutomatonSimulator<DfaUnfolding<SymbolicDfa>>,
        fluents: &[&str],
    ) -> Vec<Reward> {
        simulator.reset();
        let last = fluents.len() - 1;
        fluents
            .iter()
            .enumerate()
            .map(|(i, fluent)| {
                simulator
                    .step(&interpretation([*fluent]), i == last)
                    .unwrap()
                    .1
            })
            .collect()
    }

    #[test]
    fn test_states_are_discovered_lazily() {
        let mut simulator = simulator(ExplorationConfig::default());
        simulator.reset();
        assert_eq!(simulator.partial_automaton().num_discovered(), 1);
        simulator.step(&interpretation(["s1"]), false).unwrap();
        assert_eq!(simulator.partial_automaton().num_discovered(), 1);
        let (state, _) = simulator.step(&interpretation(["s3"]), false).unwrap();
        assert_eq!(state, 1);
        assert_eq!(simulator.partial_automaton().num_discovered(), 2);
        assert_eq!(simulator.partial_automaton().configuration(1), Some(&1));

        let transitions = simulator.partial_automaton().get_transitions_from(0).unwrap();
        assert_eq!(transitions.len(), 2);
        assert!(transitions.iter().any(|t| t.destination == 1
            && t.guard.is_satisfied_by(&interpretation(["s3"]))
            && !t.guard.is_satisfied_by(&interpretation(["s3", "s1"]))));
        // labels never seen lead to the sink
        let sink = simulator.partial_automaton().sink_state();
        assert_eq!(sink, 64);
        assert_eq!(
            simulator
                .partial_automaton()
                .get_successor(0, &interpretation(["s2"]))
                .unwrap(),
            sink
        );
    }

    #[test]
    fn test_first_episode_telescopes_while_growing() {
        let mut simulator = simulator(ExplorationConfig::default());
        let rewards = run_episode(&mut simulator, &EPISODE);
        assert!(compare_rewards(
            &rewards,
            &[0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]
        ));
        assert!(simulator.is_true());
        assert_eq!(simulator.partial_automaton().num_discovered(), 4);
    }

    #[test]
    fn test_known_graph_gives_distance_potentials() {
        let mut simulator = simulator(ExplorationConfig::default());
        run_episode(&mut simulator, &EPISODE);
        let rewards = run_episode(&mut simulator, &EPISODE);
        let third = 10.0 / 3.0;
        assert!(compare_rewards(
            &rewards,
            &[0.0, 0.0, third, 0.0, 0.0, third, 0.0, 0.0, 0.0, third]
        ));
        // nothing new was seen, so both snapshots agree
        assert_eq!(simulator.prior_potentials(), simulator.current_potentials());
    }

    #[test]
    fn test_snapshots_swap_only_on_changes() {
        let mut simulator = simulator(ExplorationConfig::default());
        simulator.reset();
        simulator.step(&interpretation(["s3"]), false).unwrap();
        assert_ne!(simulator.prior_potentials(), simulator.current_potentials());
        let entered_with = simulator.current_potentials().potential(1, false);
        simulator.step(&interpretation(["s2"]), false).unwrap();
        assert_eq!(simulator.prior_potentials().potential(1, false), entered_with);
    }

    #[test]
    fn test_failure_configuration() {
        let mut simulator = simulator(ExplorationConfig::default());
        simulator.reset();
        let (state, reward) = simulator.step(&interpretation(["s4"]), false).unwrap();
        assert_eq!(state, 1);
        assert!(simulator.is_failed());
        assert_eq!(reward, 0.0);
        assert!(simulator.partial_automaton().failure_states().contains(&1));
        assert!(simulator.bonuses().get(&1).is_none());
    }

    #[test]
    fn test_capacity_is_enforced() {
        let mut simulator = simulator(ExplorationConfig {
            max_states: 2,
            ..ExplorationConfig::default()
        });
        simulator.reset();
        simulator.step(&interpretation(["s3"]), false).unwrap();
        assert!(matches!(
            simulator.step(&interpretation(["s0"]), false),
            Err(RMError::StateCapacityExceeded { capacity: 2 })
        ));
        assert_eq!(simulator.num_states(), 2);
    }

    #[test]
    fn test_bonuses_decay_across_episodes() {
        let mut simulator = simulator(ExplorationConfig {
            decay: 0.5,
            threshold: 0.2,
            ..ExplorationConfig::default()
        });
        simulator.reset();
        simulator.step(&interpretation(["s3"]), false).unwrap();
        assert_eq!(simulator.bonuses()[&1], 10.0);

        simulator.reset();
        assert_eq!(simulator.bonuses()[&1], 5.0);
        assert!(compare_rewards(
            &[simulator.current_potentials().potential(1, false)],
            &[5.0]
        ));
        simulator.reset();
        assert_eq!(simulator.bonuses()[&1], 2.5);
        simulator.reset();
        assert_eq!(simulator.bonuses()[&1], 0.0);
        assert_eq!(simulator.episode(), 4);
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut simulator = simulator(ExplorationConfig::default());
        assert!(matches!(
            simulator.step(&interpretation(["s3"]), false),
            Err(RMError::NotInitialized)
        ));
    }
}
