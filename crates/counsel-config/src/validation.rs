//! Configuration validation

use crate::schema::{RawConfig, RawSweeperConfig};
use crate::policy::{DEFAULT_EXTENDED_THRESHOLD_MINUTES, DEFAULT_THRESHOLD_MINUTES};
use thiserror::Error;

/// Validation error
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    #[error("sweeper.{field}: {message}")]
    SweeperError { field: &'static str, message: String },

    #[error("Extended threshold {extended} min is shorter than base threshold {base} min")]
    ExtendedThresholdTooShort { base: u32, extended: u32 },

    #[error("service.{field}: {message}")]
    ServiceError { field: &'static str, message: String },
}

/// Validate a raw configuration, collecting every problem
pub fn validate_config(config: &RawConfig) -> Vec<ValidationError> {
    let mut errors = validate_sweeper(&config.sweeper);

    if let Some(path) = &config.service.socket_path
        && path.as_os_str().is_empty()
    {
        errors.push(ValidationError::ServiceError {
            field: "socket_path",
            message: "cannot be empty".into(),
        });
    }

    if let Some(path) = &config.service.data_dir
        && path.as_os_str().is_empty()
    {
        errors.push(ValidationError::ServiceError {
            field: "data_dir",
            message: "cannot be empty".into(),
        });
    }

    errors
}

fn validate_sweeper(sweeper: &RawSweeperConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if sweeper.interval_seconds == Some(0) {
        errors.push(ValidationError::SweeperError {
            field: "interval_seconds",
            message: "must be greater than zero".into(),
        });
    }

    if sweeper.threshold_minutes == Some(0) {
        errors.push(ValidationError::SweeperError {
            field: "threshold_minutes",
            message: "must be greater than zero".into(),
        });
    }

    if sweeper.extended_threshold_minutes == Some(0) {
        errors.push(ValidationError::SweeperError {
            field: "extended_threshold_minutes",
            message: "must be greater than zero".into(),
        });
    }

    let base = sweeper.threshold_minutes.unwrap_or(DEFAULT_THRESHOLD_MINUTES);
    let extended = sweeper
        .extended_threshold_minutes
        .unwrap_or(DEFAULT_EXTENDED_THRESHOLD_MINUTES);
    if base > 0 && extended > 0 && extended < base {
        errors.push(ValidationError::ExtendedThresholdTooShort { base, extended });
    }

    if let Some(banner) = &sweeper.audit_banner
        && banner.trim().is_empty()
    {
        errors.push(ValidationError::SweeperError {
            field: "audit_banner",
            message: "cannot be blank".into(),
        });
    }

    errors
}
