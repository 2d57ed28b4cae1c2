pub mod cli;
pub mod elastic;
pub mod load_config;
pub mod logging;
pub mod store;

pub use cli::{run, Cli, Commands, RunOutcome};
