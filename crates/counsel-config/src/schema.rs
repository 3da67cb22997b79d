//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Global service settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Auto-complete sweep settings
    #[serde(default)]
    pub sweeper: RawSweeperConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path
    pub socket_path: Option<PathBuf>,

    /// Data directory for the session database
    pub data_dir: Option<PathBuf>,
}

/// Auto-complete sweep settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSweeperConfig {
    /// Seconds between sweeps
    pub interval_seconds: Option<u64>,

    /// Minutes after entry before an unextended session is closed
    pub threshold_minutes: Option<u32>,

    /// Minutes after entry before an extended session is closed
    pub extended_threshold_minutes: Option<u32>,

    /// Text appended to the notes of auto-completed sessions
    pub audit_banner: Option<String>,
}
