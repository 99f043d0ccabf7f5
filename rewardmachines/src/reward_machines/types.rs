use std::collections::BTreeSet;

use super::guard::Guard;

// types.rs
pub type State = usize;
pub type Symbol = String;
pub type Reward = f32;

/// The set of fluents true at a given instant.
pub type Interpretation = BTreeSet<Symbol>;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Transition {
    pub source: State,
    pub guard: Guard,
    pub destination: State,
}

impl Transition {
    pub fn new(source: State, guard: Guard, destination: State) -> Self {
        Self {
            source,
            guard,
            destination,
        }
    }
}

impl From<(State, Guard, State)> for Transition {
    fn from(value: (State, Guard, State)) -> Self {
        Self::new(value.0, value.1, value.2)
    }
}
