mod goal;
mod q_table;

use std::path::Path;

use q_table::{QLearningConfig, QTable};
use rewardmachines::reward_machines::{
    automaton::{Automaton, SymbolicDfa},
    chain::{ChainAction, ChainEnvironment},
    config::{ExplorationConfig, ShapingConfig},
    environment::Environment,
    partial::DfaUnfolding,
    reward_machine::{RewardAutomaton, RewardMachine},
    rm_error::RMResult,
    temporal_goal::TemporalGoal,
    wrapper::TemporalGoalWrapper,
};
use tracing::info;

use crate::{ChainwalkArgs, ChainwalkMode, TrainingArgs};

pub fn run(args: ChainwalkArgs) -> RMResult<()> {
    match args.mode {
        ChainwalkMode::Train { training_args } => train(training_args),
        ChainwalkMode::Inspect { file, reward } => inspect(&file, reward),
        ChainwalkMode::Export { file, states } => {
            goal::visiting_sequence(states)?.save(&file)?;
            info!(file = %file.display(), states, "goal automaton written");
            Ok(())
        }
    }
}

fn temporal_goal(args: &TrainingArgs) -> RMResult<TemporalGoal> {
    let automaton = match &args.automaton {
        Some(path) => SymbolicDfa::load(path)?,
        None => goal::visiting_sequence(args.states)?,
    };
    let shaping = if args.sparse {
        ShapingConfig::sparse()
    } else {
        ShapingConfig::default()
    };
    let temporal_goal = if args.on_the_fly {
        let alphabet = (0..args.states).map(goal::cell_fluent).collect();
        TemporalGoal::on_the_fly(
            DfaUnfolding::new(automaton, alphabet),
            args.reward,
            ExplorationConfig {
                shaping,
                ..ExplorationConfig::default()
            },
        )
    } else {
        TemporalGoal::from_automaton(automaton, args.reward, shaping)
    };
    Ok(temporal_goal.with_name("visiting sequence"))
}

fn train(args: TrainingArgs) -> RMResult<()> {
    let env = ChainEnvironment::new(args.states)?;
    let mut wrapper = TemporalGoalWrapper::new(
        env,
        vec![temporal_goal(&args)?],
        |position: &usize, _: Option<&ChainAction>| Ok(goal::position_fluents(*position)),
    );
    info!(
        observation_space = ?wrapper.observation_space(),
        episodes = args.episodes,
        "training on the chain"
    );

    let config = QLearningConfig {
        alpha: args.alpha,
        epsilon: args.epsilon,
        gamma: args.gamma,
    };
    let mut q_table = QTable::new(ChainAction::SIZE as usize, config, args.seed);
    q_table.train(&mut wrapper, args.episodes)?;

    let returns = q_table.evaluate(&mut wrapper, args.eval_episodes)?;
    let mean_return = returns.iter().sum::<f32>() / returns.len().max(1) as f32;
    info!(
        mean_return,
        goal_satisfied = wrapper.all_goals_true(),
        "greedy evaluation"
    );
    Ok(())
}

fn inspect(file: &Path, reward: f32) -> RMResult<()> {
    let reward_machine = RewardAutomaton::new(SymbolicDfa::load(file)?, reward);
    let sink = reward_machine.sink_state();
    println!(
        "{} states, initial {}, sink {}, max level {}",
        reward_machine.states().len(),
        reward_machine.initial_state(),
        sink,
        reward_machine.max_level()
    );
    for state in reward_machine.states().into_iter().chain([sink]) {
        let mut flags = Vec::new();
        if reward_machine.is_accepting(state) {
            flags.push("accepting");
        }
        if reward_machine.is_failure_state(state) {
            flags.push("failure");
        }
        println!(
            "  {state}: level {}, potential {:.3} {}",
            reward_machine.levels().level(state),
            reward_machine.potential(state, false),
            flags.join(" ")
        );
    }
    for transition in reward_machine.get_transitions() {
        println!(
            "  {} --[{}]--> {}",
            transition.source, transition.guard, transition.destination
        );
    }
    Ok(())
}
