use rewardmachines::reward_machines::{
    automaton::SymbolicDfa, interpretation, rm_error::RMResult, types::Interpretation,
};

pub fn cell_fluent(position: usize) -> String {
    format!("s{position}")
}

/// The single fluent true on a cell.
pub fn position_fluents(position: usize) -> Interpretation {
    interpretation([cell_fluent(position)])
}

/// Visit the cell before the last, then the first cell, then the last one. Reaching the last
/// cell early fails the goal.
pub fn visiting_sequence(n_states: usize) -> RMResult<SymbolicDfa> {
    let checkpoint = cell_fluent(n_states.saturating_sub(2));
    let start = cell_fluent(0);
    let end = cell_fluent(n_states.saturating_sub(1));

    let mut builder = SymbolicDfa::builder();
    let at_checkpoint = builder.create_state();
    let back_at_start = builder.create_state();
    let done = builder.create_state();
    builder
        .add_transition_str(0, &format!("~{checkpoint} & ~{end}"), 0)?
        .add_transition_str(0, &checkpoint, at_checkpoint)?
        .add_transition_str(at_checkpoint, &format!("~{start} & ~{end}"), at_checkpoint)?
        .add_transition_str(at_checkpoint, &start, back_at_start)?
        .add_transition_str(back_at_start, &format!("~{end}"), back_at_start)?
        .add_transition_str(back_at_start, &end, done)?
        .add_transition_str(done, "true", done)?
        .set_accepting_state(done, true);
    builder.build()
}
