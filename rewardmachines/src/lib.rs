pub mod reward_machines;
