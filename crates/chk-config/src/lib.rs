pub mod args;
pub mod config;
pub mod logging;
pub mod types;
pub mod validate;

pub use args::{Args, Ui};
pub use config::ChecklistConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use types::HumanDuration;
