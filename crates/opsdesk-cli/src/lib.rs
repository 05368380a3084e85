pub mod config;
pub mod output;
pub mod players;
pub mod tracing_setup;
pub mod watch;

pub use config::CliConfig;
pub use watch::{run_watch, WatchCommand};
