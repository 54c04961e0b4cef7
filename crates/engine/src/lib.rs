//! Plexus node runtime
//!
//! Brings one container and one assembler up as a `Node`:
//! - `NodeConfig` from `plexus.toml`
//! - lease reaping and renewal of owned sessions
//! - automatic repair of sessions whose elements fail
//! - `init_logging` for hosts without their own subscriber

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod logging;
pub mod node;

pub use config::{NodeConfig, ReaperConfig, RepairConfig, CONFIG_FILE_NAME};
pub use logging::init_logging;
pub use node::Node;
