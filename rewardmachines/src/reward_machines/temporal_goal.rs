use std::collections::BTreeSet;

use tracing::debug;

use super::{
    automaton::{Automaton, SymbolicDfa},
    config::{ExplorationConfig, ShapingConfig},
    environment::Space,
    partial::{OnTheFlyAutomaton, PartialAutomatonSimulator},
    reward_machine::{RewardAutomaton, RewardMachine},
    rm_error::{RMError, RMResult},
    simulator::{RewardAutomatonSimulator, RewardMachineSimulator},
    step_controller::{StatelessStepController, StepController},
    types::{Interpretation, Reward, State, Symbol},
};

/// Turns a temporal formula into an automaton over the given alphabet.
pub trait FormulaCompiler {
    fn compile(&self, formula: &str, alphabet: &BTreeSet<Symbol>) -> RMResult<SymbolicDfa>;
}

/// A reward machine together with the simulator driving it and the gate deciding when it steps.
pub struct TemporalGoal {
    name: String,
    formula: Option<String>,
    simulator: Box<dyn RewardMachineSimulator>,
    step_controller: Box<dyn StepController>,
}

impl TemporalGoal {
    pub fn new<M: RewardMachine + 'static>(reward_machine: M) -> Self {
        Self::with_shaping(reward_machine, ShapingConfig::default())
    }

    pub fn with_shaping<M: RewardMachine + 'static>(
        reward_machine: M,
        shaping: ShapingConfig,
    ) -> Self {
        Self::from_simulator(Box::new(RewardAutomatonSimulator::with_shaping(
            reward_machine,
            shaping,
        )))
    }

    pub fn from_automaton<A: Automaton + 'static>(
        automaton: A,
        reward: Reward,
        shaping: ShapingConfig,
    ) -> Self {
        Self::with_shaping(RewardAutomaton::new(automaton, reward), shaping)
    }

    pub fn from_formula<C: FormulaCompiler + ?Sized>(
        compiler: &C,
        formula: &str,
        alphabet: &BTreeSet<Symbol>,
        reward: Reward,
        shaping: ShapingConfig,
    ) -> RMResult<Self> {
        let automaton = compiler.compile(formula, alphabet)?;
        debug!(
            formula,
            states = automaton.num_states(),
            "formula compiled"
        );
        let mut goal = Self::from_automaton(automaton, reward, shaping);
        goal.formula = Some(formula.to_string());
        Ok(goal.with_name(formula))
    }

    /// A goal whose automaton is discovered while it is simulated.
    pub fn on_the_fly<O: OnTheFlyAutomaton + 'static>(
        oracle: O,
        reward: Reward,
        config: ExplorationConfig,
    ) -> Self {
        Self::from_simulator(Box::new(PartialAutomatonSimulator::new(
            oracle, reward, config,
        )))
    }

    pub fn from_simulator(simulator: Box<dyn RewardMachineSimulator>) -> Self {
        Self {
            name: String::from("goal"),
            formula: None,
            simulator,
            step_controller: Box::new(StatelessStepController::always()),
        }
    }

    pub fn with_step_controller<S: StepController + 'static>(mut self, step_controller: S) -> Self {
        self.step_controller = Box::new(step_controller);
        self
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self.simulator.set_name(&self.name);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn formula(&self) -> Option<&str> {
        self.formula.as_deref()
    }

    pub fn reward(&self) -> Reward {
        self.simulator.reward()
    }

    pub fn automaton(&self) -> &dyn Automaton {
        self.simulator.automaton()
    }

    pub fn simulator(&self) -> &dyn RewardMachineSimulator {
        self.simulator.as_ref()
    }

    pub fn current_state(&self) -> Option<State> {
        self.simulator.current_state()
    }

    pub fn is_true(&self) -> bool {
        self.simulator.is_true()
    }

    pub fn is_failed(&self) -> bool {
        self.simulator.is_failed()
    }

    /// One value per state id, the sink included.
    pub fn observation_space(&self) -> Space {
        Space::Discrete(self.simulator.num_states() + 1)
    }

    pub fn reset(&mut self) -> State {
        self.step_controller.reset();
        self.simulator.reset()
    }

    /// Steps on `fluents` if the step controller lets the goal observe them. A closed gate keeps
    /// the current state and pays nothing.
    pub fn step(
        &mut self,
        fluents: &Interpretation,
        is_terminal: bool,
    ) -> RMResult<(State, Reward)> {
        let state = self.current_state().ok_or(RMError::NotInitialized)?;
        if !self.step_controller.step(fluents)? {
            return Ok((state, 0.0));
        }
        self.simulator.step(fluents, is_terminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward_machines::{automaton::tests::sequence_automaton, interpretation};

    fn goal() -> TemporalGoal {
        TemporalGoal::from_automaton(sequence_automaton(), 10.0, ShapingConfig::default())
    }

    #[test]
    fn test_observation_space_reserves_the_sink() {
        let goal = goal();
        assert_eq!(goal.observation_space(), Space::Discrete(5));
        assert_eq!(goal.reward(), 10.0);
        assert!(goal.formula().is_none());
    }

    #[test]
    fn test_step_before_reset_fails() {
        let mut goal = goal();
        assert!(matches!(
            goal.step(&interpretation(["s3"]), false),
            Err(RMError::NotInitialized)
        ));
    }

    #[test]
    fn test_closed_gate_freezes_progress() {
        let mut goal = goal().with_step_controller(StatelessStepController::new(
            |fluents| !fluents.contains("pause"),
            false,
        ));
        goal.reset();
        assert_eq!(goal.step(&interpretation(["s3", "pause"]), false).unwrap(), (0, 0.0));
        let (state, reward) = goal.step(&interpretation(["s3"]), false).unwrap();
        assert_eq!(state, 1);
        assert!(reward > 0.0);
        assert_eq!(goal.step(&interpretation(["s0", "pause"]), false).unwrap(), (1, 0.0));
        assert_eq!(goal.current_state(), Some(1));
    }

    #[test]
    fn test_reset_restarts_the_controller() {
        let mut goal = goal().with_step_controller(StatelessStepController::new(
            |fluents| fluents.contains("go"),
            false,
        ));
        goal.reset();
        goal.step(&interpretation(["go"]), false).unwrap();
        let (state, _) = goal.step(&interpretation(["s3", "go"]), false).unwrap();
        assert_eq!(state, 1);

        assert_eq!(goal.reset(), 0);
        // the gate must be triggered again after a reset
        assert_eq!(goal.step(&interpretation(["s3"]), false).unwrap(), (0, 0.0));
    }
}
