use std::fmt::Debug;

use itertools::Itertools;
use tracing::{debug, trace};

use super::{
    environment::{Environment, Space, Step},
    rm_error::{ExtractorError, RMError, RMResult},
    temporal_goal::TemporalGoal,
    types::{Interpretation, State},
};

pub type FluentExtractor<O, A> =
    Box<dyn FnMut(&O, Option<&A>) -> Result<Interpretation, ExtractorError>>;
pub type ObservationCombiner<O, T> = Box<dyn Fn(O, &[State]) -> T>;

/// Runs temporal goals alongside an environment.
///
/// Every tick the fluents are extracted once per goal, each goal steps on them and the goal
/// rewards are added to the reward of the environment. The observation is combined with the
/// automaton states of the goals. `done` and `info` are those of the wrapped environment.
pub struct TemporalGoalWrapper<E: Environment, T = (<E as Environment>::Observation, Vec<State>)> {
    env: E,
    temporal_goals: Vec<TemporalGoal>,
    extractor: FluentExtractor<E::Observation, E::Action>,
    combiner: ObservationCombiner<E::Observation, T>,
    observe_reset: bool,
}

impl<E: Environment> TemporalGoalWrapper<E> {
    pub fn new<F>(env: E, temporal_goals: Vec<TemporalGoal>, extractor: F) -> Self
    where
        F: FnMut(&E::Observation, Option<&E::Action>) -> Result<Interpretation, ExtractorError>
            + 'static,
    {
        Self {
            env,
            temporal_goals,
            extractor: Box::new(extractor),
            combiner: Box::new(|observation, states| (observation, states.to_vec())),
            observe_reset: false,
        }
    }
}

impl<E: Environment, T> TemporalGoalWrapper<E, T> {
    pub fn with_combiner<U, C>(self, combiner: C) -> TemporalGoalWrapper<E, U>
    where
        C: Fn(E::Observation, &[State]) -> U + 'static,
    {
        TemporalGoalWrapper {
            env: self.env,
            temporal_goals: self.temporal_goals,
            extractor: self.extractor,
            combiner: Box::new(combiner),
            observe_reset: self.observe_reset,
        }
    }

    /// Lets every goal also step on the fluents of the initial observation. The reward of that
    /// step is dropped.
    pub fn with_observe_reset(mut self, observe_reset: bool) -> Self {
        self.observe_reset = observe_reset;
        self
    }

    pub fn temporal_goals(&self) -> &[TemporalGoal] {
        &self.temporal_goals
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn into_inner(self) -> E {
        self.env
    }

    pub fn all_goals_true(&self) -> bool {
        self.temporal_goals.iter().all(TemporalGoal::is_true)
    }

    pub fn any_goal_failed(&self) -> bool {
        self.temporal_goals.iter().any(TemporalGoal::is_failed)
    }

    fn goal_states(&self) -> RMResult<Vec<State>> {
        self.temporal_goals
            .iter()
            .map(|goal| goal.current_state().ok_or(RMError::NotInitialized))
            .collect()
    }
}

impl<E: Environment, T: Clone + Debug> Environment for TemporalGoalWrapper<E, T> {
    type Observation = T;
    type Action = E::Action;

    fn reset(&mut self) -> RMResult<T> {
        let observation = self.env.reset()?;
        for goal in self.temporal_goals.iter_mut() {
            goal.reset();
        }
        if self.observe_reset {
            for goal in self.temporal_goals.iter_mut() {
                let fluents = (self.extractor)(&observation, None).map_err(RMError::Extractor)?;
                goal.step(&fluents, false)?;
            }
        }
        let states = self.goal_states()?;
        Ok((self.combiner)(observation, &states))
    }

    fn step(&mut self, action: &E::Action) -> RMResult<Step<T>> {
        let Step {
            observation,
            reward,
            done,
            info,
        } = self.env.step(action)?;

        let mut goal_reward = 0.0;
        let mut states = Vec::with_capacity(self.temporal_goals.len());
        for goal in self.temporal_goals.iter_mut() {
            let fluents =
                (self.extractor)(&observation, Some(action)).map_err(RMError::Extractor)?;
            let was_true = goal.is_true();
            let (state, reward) = goal.step(&fluents, done)?;
            if goal.is_true() && !was_true {
                debug!(goal = goal.name(), state, "temporal goal satisfied");
            }
            goal_reward += reward;
            states.push(state);
        }
        trace!(
            base_reward = reward,
            goal_reward,
            states = %states.iter().join(","),
            done,
            "wrapped step"
        );
        Ok(Step {
            observation: (self.combiner)(observation, &states),
            reward: reward + goal_reward,
            done,
            info,
        })
    }

    fn observation_space(&self) -> Space {
        let goal_dims = self
            .temporal_goals
            .iter()
            .flat_map(|goal| goal.observation_space().dims())
            .collect();
        self.env
            .observation_space()
            .compose(&Space::MultiDiscrete(goal_dims))
    }

    fn action_space(&self) -> Space {
        self.env.action_space()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward_machines::{
        automaton::SymbolicDfa,
        chain::{ChainAction, ChainEnvironment},
        config::ShapingConfig,
        interpretation,
    };

    /// Accepts as soon as `s0` holds.
    fn at_start_goal() -> TemporalGoal {
        let mut builder = SymbolicDfa::builder();
        let q1 = builder.create_state();
        builder
            .add_transition_str(0, "s0", q1)
            .unwrap()
            .add_transition_str(0, "~s0", 0)
            .unwrap()
            .add_transition_str(q1, "true", q1)
            .unwrap()
            .set_accepting_state(q1, true);
        TemporalGoal::from_automaton(builder.build().unwrap(), 1.0, ShapingConfig::sparse())
    }

    fn wrapper(observe_reset: bool) -> TemporalGoalWrapper<ChainEnvironment> {
        TemporalGoalWrapper::new(
            ChainEnvironment::new(3).unwrap(),
            vec![at_start_goal()],
            |position: &usize, _: Option<&ChainAction>| {
                Ok(interpretation([format!("s{position}")]))
            },
        )
        .with_observe_reset(observe_reset)
    }

    #[test]
    fn test_reset_composes_initial_states() {
        let mut wrapper = wrapper(false);
        assert_eq!(wrapper.reset().unwrap(), (0, vec![0]));
        assert!(!wrapper.all_goals_true());
    }

    #[test]
    fn test_observe_reset_consumes_initial_fluents() {
        let mut wrapper = wrapper(true);
        assert_eq!(wrapper.reset().unwrap(), (0, vec![1]));
        assert!(wrapper.all_goals_true());
        assert!(!wrapper.any_goal_failed());
    }

    #[test]
    fn test_custom_combiner() {
        let mut wrapper = wrapper(false)
            .with_combiner(|position, states: &[State]| position * 10 + states[0]);
        assert_eq!(wrapper.reset().unwrap(), 0);
        let step = wrapper.step(&ChainAction::Nop).unwrap();
        // sparse goal pays once the destination is accepting
        assert_eq!(step.observation, 1);
        assert_eq!(step.reward, 1.0);
        let step = wrapper.step(&ChainAction::Right).unwrap();
        assert_eq!(step.observation, 11);
    }

    #[test]
    fn test_spaces() {
        let wrapper = wrapper(false);
        assert_eq!(
            wrapper.observation_space(),
            Space::MultiDiscrete(vec![3, 3])
        );
        assert_eq!(wrapper.action_space(), Space::Discrete(3));
    }
}
