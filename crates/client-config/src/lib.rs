//! Configuration, paths and logging bootstrap for the profile client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{env_value_to_bool, ClientConfig, DEFAULT_AUTHORITY, DEFAULT_CLIENT_ID};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
