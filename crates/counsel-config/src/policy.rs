//! Validated policy structures

use crate::schema::{RawConfig, RawServiceConfig, RawSweeperConfig};
use std::path::PathBuf;
use std::time::Duration;

/// Minutes after entry before an unextended session is auto-completed
pub const DEFAULT_THRESHOLD_MINUTES: u32 = 60;

/// Minutes after entry before an extended session is auto-completed
pub const DEFAULT_EXTENDED_THRESHOLD_MINUTES: u32 = 75;

/// Seconds between sweeps
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Appended to the detailed notes of every auto-completed session
pub const DEFAULT_AUDIT_BANNER: &str =
    "[System] This session was closed automatically after exceeding its time limit without a manual exit.";

/// Validated policy ready for use by the service
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub service: ServiceConfig,
    pub sweeper: SweeperPolicy,
}

impl Policy {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig::from_raw(raw.service),
            sweeper: SweeperPolicy::from_raw(raw.sweeper),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
}

impl ServiceConfig {
    fn from_raw(raw: RawServiceConfig) -> Self {
        Self {
            socket_path: raw
                .socket_path
                .unwrap_or_else(counsel_util::socket_path_without_env),
            data_dir: raw
                .data_dir
                .unwrap_or_else(counsel_util::data_dir_without_env),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_raw(RawServiceConfig::default())
    }
}

/// Auto-complete policy applied by the sweeper
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweeperPolicy {
    pub interval: Duration,
    pub threshold_minutes: u32,
    pub extended_threshold_minutes: u32,
    pub audit_banner: String,
}

impl SweeperPolicy {
    fn from_raw(raw: RawSweeperConfig) -> Self {
        Self {
            interval: Duration::from_secs(
                raw.interval_seconds.unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            ),
            threshold_minutes: raw.threshold_minutes.unwrap_or(DEFAULT_THRESHOLD_MINUTES),
            extended_threshold_minutes: raw
                .extended_threshold_minutes
                .unwrap_or(DEFAULT_EXTENDED_THRESHOLD_MINUTES),
            audit_banner: raw
                .audit_banner
                .unwrap_or_else(|| DEFAULT_AUDIT_BANNER.to_string()),
        }
    }

    /// Threshold in minutes for a session with or without an extension
    pub fn threshold_for(&self, extension_granted: bool) -> u32 {
        if extension_granted {
            self.extended_threshold_minutes
        } else {
            self.threshold_minutes
        }
    }
}

impl Default for SweeperPolicy {
    fn default() -> Self {
        Self::from_raw(RawSweeperConfig::default())
    }
}
