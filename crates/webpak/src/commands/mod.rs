//! CLI command implementations

pub mod check_env;
pub mod completions;
pub mod extract;
pub mod load;
pub mod save;
pub mod save_existing;
