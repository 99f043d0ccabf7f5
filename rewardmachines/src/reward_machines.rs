// reward_machines.rs
pub mod automaton;
pub mod chain;
pub mod config;
pub mod environment;
pub mod guard;
pub mod partial;
pub mod potential;
pub mod reward_machine;
pub mod rm_error;
pub mod simulator;
pub mod step_controller;
pub mod temporal_goal;
pub mod types;
pub mod wrapper;


use std::collections::BTreeSet;

use types::Interpretation;

/// Builds an interpretation from anything that yields symbol names.
pub fn interpretation<I, S>(symbols: I) -> Interpretation
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    symbols.into_iter().map(Into::into).collect::<BTreeSet<_>>()
}

#[cfg(test)]
fn compare_rewards(a: &[f32], b: &[f32]) -> bool {
    use float_cmp::{ApproxEq, F32Margin};

    if a.len() != b.len() {
        return false;
    }
    let lax_margin = F32Margin {
        epsilon: 1e-3, // thirds of the reward never divide evenly
        ulps: 50,
    };
    for (&a, &b) in a.iter().zip(b) {
        if !a.approx_eq(b, lax_margin) {
            return false;
        }
    }
    true
}
