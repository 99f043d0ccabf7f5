use std::{
    collections::BTreeSet,
    fs::File,
    io::{Read, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};

use super::{
    automaton::{Automaton, SymbolicDfa},
    rm_error::{RMError, RMResult},
    types::{State, Transition},
};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShapingMode {
    /// Pay `reward` only when the destination is accepting.
    Sparse,
    /// Potential-based shaping over the distance to acceptance.
    #[default]
    Potential,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct ShapingConfig {
    pub mode: ShapingMode,
    /// Multiplies the destination potential. Episodes only telescope exactly with 1.0.
    pub discount: f32,
}

impl Default for ShapingConfig {
    fn default() -> Self {
        Self {
            mode: ShapingMode::Potential,
            discount: 1.0,
        }
    }
}

impl ShapingConfig {
    pub fn sparse() -> Self {
        Self {
            mode: ShapingMode::Sparse,
            ..Self::default()
        }
    }
}

/// Tunables of the on-the-fly automaton. Only the decaying shape of the bonus matters, the values
/// are empirical.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default)]
pub struct ExplorationConfig {
    pub shaping: ShapingConfig,
    /// Bonus of a newly discovered exploring state, as a fraction of the reward.
    pub initial_bonus: f32,
    /// Per-episode multiplier applied to every bonus.
    pub decay: f32,
    /// Bonuses below `threshold * reward` are dropped to zero.
    pub threshold: f32,
    /// Upper bound on discovered states; also fixes the observation size.
    pub max_states: usize,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            shaping: ShapingConfig::default(),
            initial_bonus: 1.0,
            decay: 0.99,
            threshold: 1e-4,
            max_states: 64,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TransitionConfig {
    pub source: State,
    pub guard: String,
    pub destination: State,
}

/// The on-disk form of a [`SymbolicDfa`]. Guards are kept as text.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AutomatonConfig {
    pub states: usize,
    #[serde(default)]
    pub initial_state: State,
    pub accepting_states: Vec<State>,
    pub transitions: Vec<TransitionConfig>,
}

impl AutomatonConfig {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> RMResult<()> {
        let config_str = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(config_str.as_bytes())?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> RMResult<Self> {
        let mut file = File::open(path)?;
        let mut config_str = String::new();
        file.read_to_string(&mut config_str)?;
        let config: AutomatonConfig = serde_json::from_str(&config_str)?;
        Ok(config)
    }
}

impl TryFrom<AutomatonConfig> for SymbolicDfa {
    type Error = RMError;

    fn try_from(value: AutomatonConfig) -> Result<Self, Self::Error> {
        let transitions = value
            .transitions
            .into_iter()
            .map(|t| Ok(Transition::new(t.source, t.guard.parse()?, t.destination)))
            .collect::<RMResult<Vec<_>>>()?;
        SymbolicDfa::new(
            value.states,
            value.initial_state,
            value.accepting_states.into_iter().collect::<BTreeSet<_>>(),
            transitions,
        )
    }
}

impl From<&SymbolicDfa> for AutomatonConfig {
    fn from(value: &SymbolicDfa) -> Self {
        Self {
            states: value.num_states(),
            initial_state: value.initial_state(),
            accepting_states: value.accepting_states().into_iter().collect(),
            transitions: value
                .get_transitions()
                .into_iter()
                .map(|t| TransitionConfig {
                    source: t.source,
                    guard: t.guard.to_string(),
                    destination: t.destination,
                })
                .collect(),
        }
    }
}

impl SymbolicDfa {
    pub fn load<P: AsRef<Path>>(path: P) -> RMResult<Self> {
        AutomatonConfig::load(path)?.try_into()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> RMResult<()> {
        AutomatonConfig::from(self).save(path)
    }
}
