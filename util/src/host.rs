//! Host platform utility functions

use std::env;
use std::path::PathBuf;

/// Name of the environment variable pointing at the root of the software tree.
pub const SW_ROOT_ENV_VAR: &str = "TELEOP_SW_ROOT";

/// Get the root directory of the software tree.
///
/// The root holds the `params` and `sessions` directories.
pub fn get_teleop_sw_root() -> Result<PathBuf, env::VarError> {
    env::var(SW_ROOT_ENV_VAR).map(PathBuf::from)
}

/// A short description of the host, used in the start of execution log.
pub fn get_host_info() -> String {
    format!("{} ({})", env::consts::OS, env::consts::ARCH)
}
