mod chainwalk;

use std::path::PathBuf;

use clap::{command, Parser, Subcommand};
use rewardmachines::reward_machines::rm_error::RMResult;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about)]
pub struct ChainwalkArgs {
    #[command(subcommand)]
    mode: ChainwalkMode,
}

#[derive(Subcommand)]
pub enum ChainwalkMode {
    /// Train a tabular Q-learning agent on the chain with a temporal goal
    Train {
        #[command(flatten)]
        training_args: TrainingArgs,
    },
    /// Print the levels and potentials of an automaton file
    Inspect {
        file: PathBuf,
        #[arg(long, default_value_t = 10.0)]
        reward: f32,
    },
    /// Write the default goal automaton of a chain to a file
    Export {
        file: PathBuf,
        #[arg(long, default_value_t = 5)]
        states: usize,
    },
}

#[derive(Parser, Debug)]
pub struct TrainingArgs {
    /// Number of cells of the chain
    #[arg(long, default_value_t = 5)]
    pub states: usize,

    /// Number of training episodes
    #[arg(long, default_value_t = 500)]
    pub episodes: usize,

    /// Learning rate
    #[arg(long, default_value_t = 0.1)]
    pub alpha: f32,

    /// Exploration rate (epsilon)
    #[arg(long, default_value_t = 0.1)]
    pub epsilon: f32,

    /// Discount factor (gamma)
    #[arg(long, default_value_t = 0.9)]
    pub gamma: f32,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Reward paid by the temporal goal
    #[arg(long, default_value_t = 10.0)]
    pub reward: f32,

    /// Goal automaton, the default visiting sequence otherwise
    #[arg(long)]
    pub automaton: Option<PathBuf>,

    /// Pay the goal reward only on acceptance
    #[arg(long)]
    pub sparse: bool,

    /// Discover the goal automaton while training
    #[arg(long)]
    pub on_the_fly: bool,

    /// Number of greedy evaluation episodes
    #[arg(long, default_value_t = 10)]
    pub eval_episodes: usize,
}

fn main() -> RMResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let args = ChainwalkArgs::parse();
    chainwalk::run(args)
}
