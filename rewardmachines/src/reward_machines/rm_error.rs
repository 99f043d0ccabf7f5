use serde_json::Error as SerdeError;
use std::io::Error as IOError;

use super::types::State;

pub type ExtractorError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum ConstructionError {
    #[error("Initial state {state} is not one of the {num_states} states.")]
    InitialStateOutOfRange { state: State, num_states: usize },
    #[error("Accepting state {state} is not one of the {num_states} states.")]
    AcceptingStateOutOfRange { state: State, num_states: usize },
    #[error("Transition {source_state} -> {destination} refers to a state outside of the {num_states} states.")]
    TransitionOutOfRange {
        source_state: State,
        destination: State,
        num_states: usize,
    },
    #[error("State {state} has more than one transition enabled by the interpretation {interpretation}.")]
    Nondeterministic { state: State, interpretation: String },
    #[error("The chain environment needs at least 2 cells but got {0}.")]
    ChainTooShort(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum RMError {
    #[error("Invalid automaton: {0}")]
    Construction(#[from] ConstructionError),
    #[error("State {state} does not belong to the automaton.")]
    InvalidState { state: State },
    #[error("The simulator was stepped before being reset.")]
    NotInitialized,
    #[error("The fluent extractor failed.")]
    Extractor(#[source] ExtractorError),
    #[error("Couldn't parse the guard `{guard}`: {reason}.")]
    GuardParse { guard: String, reason: String },
    #[error("The partial automaton can hold at most {capacity} states.")]
    StateCapacityExceeded { capacity: usize },
    #[error("Couldn't compile the formula `{formula}`: {reason}.")]
    Formula { formula: String, reason: String },
    #[error("IO error")]
    ConfigIO(#[from] IOError),
    #[error("Couldn't (de)serialize the configuration.")]
    ConfigSerialization(#[from] SerdeError),
}

pub type RMResult<T> = std::result::Result<T, RMError>;
