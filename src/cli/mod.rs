mod commands;

pub use commands::{execute, Args, Commands};
