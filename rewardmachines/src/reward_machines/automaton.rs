use std::collections::BTreeSet;

use itertools::Itertools;
use tracing::debug;

use super::{
    guard::{display_interpretation, Guard},
    rm_error::{ConstructionError, RMError, RMResult},
    types::{Interpretation, State, Symbol, Transition},
};

/// Above this many atoms at a single state the determinism check is skipped.
const MAX_DETERMINISM_ATOMS: usize = 16;

/// A deterministic automaton over interpretations.
///
/// Implementations are allowed to be incomplete. Reading an interpretation that no guard accepts
/// moves to the virtual sink state returned by [`Automaton::sink_state`], which is absorbing and
/// never accepting.
pub trait Automaton {
    fn states(&self) -> BTreeSet<State>;
    fn initial_state(&self) -> State;
    fn accepting_states(&self) -> BTreeSet<State>;
    fn get_successor(&self, state: State, symbol: &Interpretation) -> RMResult<State>;
    fn get_transitions_from(&self, state: State) -> RMResult<Vec<Transition>>;

    /// The id one past the last real state.
    fn sink_state(&self) -> State {
        self.states().last().map_or(0, |last| last + 1)
    }

    fn is_accepting(&self, state: State) -> bool {
        self.accepting_states().contains(&state)
    }

    fn get_transitions(&self) -> BTreeSet<Transition> {
        self.states()
            .into_iter()
            .filter_map(|state| self.get_transitions_from(state).ok())
            .flatten()
            .collect()
    }
}

/// An automaton given as an explicit table of guarded transitions.
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolicDfa {
    num_states: usize,
    initial_state: State,
    accepting_states: BTreeSet<State>,
    transitions: Vec<Vec<(Guard, State)>>,
}

impl SymbolicDfa {
    pub fn new(
        num_states: usize,
        initial_state: State,
        accepting_states: BTreeSet<State>,
        transitions: Vec<Transition>,
    ) -> RMResult<Self> {
        if initial_state >= num_states {
            return Err(ConstructionError::InitialStateOutOfRange {
                state: initial_state,
                num_states,
            }
            .into());
        }
        if let Some(&state) = accepting_states.iter().find(|&&s| s >= num_states) {
            return Err(ConstructionError::AcceptingStateOutOfRange { state, num_states }.into());
        }
        let mut table = vec![Vec::new(); num_states];
        for transition in transitions {
            if transition.source >= num_states || transition.destination >= num_states {
                return Err(ConstructionError::TransitionOutOfRange {
                    source_state: transition.source,
                    destination: transition.destination,
                    num_states,
                }
                .into());
            }
            table[transition.source].push((transition.guard, transition.destination));
        }
        let dfa = Self {
            num_states,
            initial_state,
            accepting_states,
            transitions: table,
        };
        dfa.check_determinism()?;
        Ok(dfa)
    }

    pub fn builder() -> SymbolicDfaBuilder {
        SymbolicDfaBuilder::new()
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    /// Every atom mentioned by some guard.
    pub fn alphabet(&self) -> BTreeSet<Symbol> {
        self.transitions
            .iter()
            .flatten()
            .flat_map(|(guard, _)| guard.atoms())
            .collect()
    }

    /// A copy where unmatched interpretations lead to an explicit sink state.
    ///
    /// Returns an identical automaton when every state is already complete.
    pub fn complete(&self) -> Self {
        let incomplete = (0..self.num_states)
            .filter(|&state| !self.is_complete_at(state))
            .collect::<Vec<_>>();
        if incomplete.is_empty() {
            return self.clone();
        }
        let sink = self.num_states;
        let mut transitions = self.transitions.clone();
        for state in incomplete {
            let covered = Guard::Or(
                self.transitions[state]
                    .iter()
                    .map(|(guard, _)| guard.clone())
                    .collect(),
            );
            let missing = match self.transitions[state].len() {
                0 => Guard::True,
                _ => covered.not(),
            };
            transitions[state].push((missing, sink));
        }
        transitions.push(vec![(Guard::True, sink)]);
        Self {
            num_states: self.num_states + 1,
            initial_state: self.initial_state,
            accepting_states: self.accepting_states.clone(),
            transitions,
        }
    }

    fn local_interpretations(&self, state: State) -> Option<Vec<Interpretation>> {
        let atoms = self.transitions[state]
            .iter()
            .flat_map(|(guard, _)| guard.atoms())
            .collect::<BTreeSet<_>>();
        if atoms.len() > MAX_DETERMINISM_ATOMS {
            return None;
        }
        Some(
            atoms
                .into_iter()
                .powerset()
                .map(|subset| subset.into_iter().collect::<Interpretation>())
                .collect(),
        )
    }

    fn is_complete_at(&self, state: State) -> bool {
        if self.transitions[state]
            .iter()
            .any(|(guard, _)| *guard == Guard::True)
        {
            return true;
        }
        match self.local_interpretations(state) {
            Some(interpretations) => interpretations.iter().all(|interpretation| {
                self.transitions[state]
                    .iter()
                    .any(|(guard, _)| guard.is_satisfied_by(interpretation))
            }),
            None => false,
        }
    }

    fn check_determinism(&self) -> RMResult<()> {
        for state in 0..self.num_states {
            if self.transitions[state].len() < 2 {
                continue;
            }
            let Some(interpretations) = self.local_interpretations(state) else {
                debug!(state, "too many atoms, skipping the determinism check");
                continue;
            };
            for interpretation in interpretations {
                let enabled = self.transitions[state]
                    .iter()
                    .filter(|(guard, _)| guard.is_satisfied_by(&interpretation))
                    .count();
                if enabled > 1 {
                    return Err(ConstructionError::Nondeterministic {
                        state,
                        interpretation: display_interpretation(&interpretation),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }
}

impl Automaton for SymbolicDfa {
    fn states(&self) -> BTreeSet<State> {
        (0..self.num_states).collect()
    }

    fn initial_state(&self) -> State {
        self.initial_state
    }

    fn accepting_states(&self) -> BTreeSet<State> {
        self.accepting_states.clone()
    }

    fn get_successor(&self, state: State, symbol: &Interpretation) -> RMResult<State> {
        let sink = self.sink_state();
        if state == sink {
            return Ok(sink);
        }
        let transitions = self
            .transitions
            .get(state)
            .ok_or(RMError::InvalidState { state })?;
        match transitions
            .iter()
            .find(|(guard, _)| guard.is_satisfied_by(symbol))
        {
            Some((_, destination)) => Ok(*destination),
            None => {
                debug!(
                    state,
                    symbol = %display_interpretation(symbol),
                    "no guard matched, moving to the sink state"
                );
                Ok(sink)
            }
        }
    }

    fn get_transitions_from(&self, state: State) -> RMResult<Vec<Transition>> {
        let sink = self.sink_state();
        if state == sink {
            return Ok(vec![Transition::new(sink, Guard::True, sink)]);
        }
        let transitions = self
            .transitions
            .get(state)
            .ok_or(RMError::InvalidState { state })?;
        Ok(transitions
            .iter()
            .map(|(guard, destination)| Transition::new(state, guard.clone(), *destination))
            .collect())
    }

    fn sink_state(&self) -> State {
        self.num_states
    }

    fn is_accepting(&self, state: State) -> bool {
        self.accepting_states.contains(&state)
    }
}

/// Incremental construction of a [`SymbolicDfa`], validated once in [`SymbolicDfaBuilder::build`].
#[derive(Clone, Debug)]
pub struct SymbolicDfaBuilder {
    num_states: usize,
    initial_state: State,
    accepting_states: BTreeSet<State>,
    transitions: Vec<Transition>,
}

impl SymbolicDfaBuilder {
    /// Starts with a single state `0`, which is the initial state.
    pub fn new() -> Self {
        Self {
            num_states: 1,
            initial_state: 0,
            accepting_states: BTreeSet::new(),
            transitions: Vec::new(),
        }
    }

    pub fn create_state(&mut self) -> State {
        self.num_states += 1;
        self.num_states - 1
    }

    pub fn set_initial_state(&mut self, state: State) -> &mut Self {
        self.initial_state = state;
        self
    }

    pub fn set_accepting_state(&mut self, state: State, accepting: bool) -> &mut Self {
        if accepting {
            self.accepting_states.insert(state);
        } else {
            self.accepting_states.remove(&state);
        }
        self
    }

    pub fn add_transition(&mut self, source: State, guard: Guard, destination: State) -> &mut Self {
        self.transitions
            .push(Transition::new(source, guard, destination));
        self
    }

    /// Same as [`SymbolicDfaBuilder::add_transition`] with the guard given as text.
    pub fn add_transition_str(
        &mut self,
        source: State,
        guard: &str,
        destination: State,
    ) -> RMResult<&mut Self> {
        let guard = guard.parse()?;
        Ok(self.add_transition(source, guard, destination))
    }

    pub fn build(&self) -> RMResult<SymbolicDfa> {
        SymbolicDfa::new(
            self.num_states,
            self.initial_state,
            self.accepting_states.clone(),
            self.transitions.clone(),
        )
    }
}

impl Default for SymbolicDfaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
