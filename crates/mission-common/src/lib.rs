pub mod config;
pub mod logging;
pub mod path_guard;
pub mod validate;

pub const APP_NAME: &str = "Mission Control";

pub use config::{ConfigError, ConsoleConfig, MissionConfig, PollConfig, RelayConfig};
