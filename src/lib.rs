//! Marketplace Realtime - Main Library
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, runners)
//! - **marketplace**: Realtime client logic (re-exported from workspace)
//! - **hypersockets**: Channel library (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use marketplace_realtime::bin_common::{load_config_from_env, ConfigType};
//! use marketplace_realtime::marketplace::RealtimeSession;
//! ```

// Re-export workspace libraries for convenience
pub use hypersockets;
pub use marketplace;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use runner::{wait_for_shutdown, BinaryRunner, RunConfig};
}
