use tracing::warn;

use super::{
    automaton::Automaton,
    rm_error::RMResult,
    types::{Interpretation, State},
};

/// Decides, tick by tick, whether a temporal goal observes the current fluents.
pub trait StepController {
    /// Consumes the fluents of one tick and tells whether the goal may step on them.
    fn step(&mut self, fluents: &Interpretation) -> RMResult<bool>;
    fn reset(&mut self);
}

pub type StepPredicate = Box<dyn FnMut(&Interpretation) -> bool + Send>;

/// Gates with a predicate over the fluents of the current tick.
///
/// Until the gate opened once, the predicate decides whether the goal starts. With `allow_first`
/// the first tick of an episode always opens it.
pub struct StatelessStepController {
    predicate: StepPredicate,
    allow_first: bool,
    started: bool,
    closed_ticks: usize,
}

impl StatelessStepController {
    pub fn new<F>(predicate: F, allow_first: bool) -> Self
    where
        F: FnMut(&Interpretation) -> bool + Send + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            allow_first,
            started: false,
            closed_ticks: 0,
        }
    }

    /// Never closes.
    pub fn always() -> Self {
        Self::new(|_| true, true)
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn allow_first(&self) -> bool {
        self.allow_first
    }
}

impl Default for StatelessStepController {
    fn default() -> Self {
        Self::always()
    }
}

impl StepController for StatelessStepController {
    fn step(&mut self, fluents: &Interpretation) -> RMResult<bool> {
        let open = if !self.started && self.allow_first {
            self.started = true;
            true
        } else if !self.started {
            self.started = (self.predicate)(fluents);
            self.started
        } else {
            (self.predicate)(fluents)
        };
        if !self.started {
            self.closed_ticks += 1;
        }
        Ok(open)
    }

    fn reset(&mut self) {
        if !self.started && self.closed_ticks > 0 {
            warn!(
                ticks = self.closed_ticks,
                "step controller never opened during the episode"
            );
        }
        self.started = false;
        self.closed_ticks = 0;
    }
}

/// Gates with an engagement automaton: open exactly while it sits in an accepting state.
pub struct StatefulStepController<A: Automaton> {
    acceptor: A,
    current_state: State,
}

impl<A: Automaton> StatefulStepController<A> {
    pub fn new(acceptor: A) -> Self {
        let current_state = acceptor.initial_state();
        Self {
            acceptor,
            current_state,
        }
    }

    pub fn current_state(&self) -> State {
        self.current_state
    }

    pub fn acceptor(&self) -> &A {
        &self.acceptor
    }
}

impl<A: Automaton> StepController for StatefulStepController<A> {
    fn step(&mut self, fluents: &Interpretation) -> RMResult<bool> {
        self.current_state = self.acceptor.get_successor(self.current_state, fluents)?;
        Ok(self.acceptor.is_accepting(self.current_state))
    }

    fn reset(&mut self) {
        self.current_state = self.acceptor.initial_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward_machines::{automaton::SymbolicDfa, interpretation};

    #[test]
    fn test_allow_first_opens_the_first_tick() {
        let mut controller = StatelessStepController::new(|fluents| fluents.contains("go"), true);
        assert!(controller.step(&interpretation::<_, &str>([])).unwrap());
        assert!(controller.started());
        assert!(!controller.step(&interpretation::<_, &str>([])).unwrap());
        assert!(controller.step(&interpretation(["go"])).unwrap());
    }

    #[test]
    fn test_closed_until_triggered() {
        let mut controller =
            StatelessStepController::new(|fluents| !fluents.is_empty(), false);
        assert!(!controller.step(&interpretation::<_, &str>([])).unwrap());
        assert!(!controller.started());
        assert!(controller.step(&interpretation(["a"])).unwrap());
        assert!(controller.started());

        controller.reset();
        assert!(!controller.started());
        assert!(!controller.step(&interpretation::<_, &str>([])).unwrap());
    }

    #[test]
    fn test_stateful_controller() {
        let mut builder = SymbolicDfa::builder();
        let q1 = builder.create_state();
        builder
            .add_transition_str(0, "a", q1)
            .unwrap()
            .add_transition_str(0, "~a", 0)
            .unwrap()
            .add_transition_str(q1, "true", q1)
            .unwrap()
            .set_accepting_state(q1, true);
        let mut controller = StatefulStepController::new(builder.build().unwrap());

        assert!(!controller.step(&interpretation::<_, &str>([])).unwrap());
        assert!(controller.step(&interpretation(["a"])).unwrap());
        assert!(controller.step(&interpretation::<_, &str>([])).unwrap());

        controller.reset();
        assert_eq!(controller.current_state(), 0);
        assert!(!controller.step(&interpretation::<_, &str>([])).unwrap());
    }
}
