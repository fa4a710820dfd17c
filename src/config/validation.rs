//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject an empty backend pool
//! - Validate backend addresses and weights
//! - Validate listener addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LbConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::LbConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("backend pool is empty")]
    EmptyPool,

    #[error("backend {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("backend {address}: unsupported scheme {scheme} (only http is supported)")]
    UnsupportedScheme { address: String, scheme: String },

    #[error("backend {address}: weight must be positive")]
    ZeroWeight { address: String },

    #[error("limits.max_response_body_bytes must be positive")]
    ZeroBodyLimit,

    #[error("{field}: invalid socket address {value}")]
    InvalidBindAddress { field: &'static str, value: String },
}

/// Parse a backend address into its base URL.
///
/// Accepts `scheme://host[:port]` or a bare `host:port`, which is taken as
/// plain HTTP.
pub fn parse_backend_address(address: &str) -> Result<Url, ValidationError> {
    let candidate = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    let url = Url::parse(&candidate).map_err(|e| ValidationError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })?;

    if url.scheme() != "http" {
        return Err(ValidationError::UnsupportedScheme {
            address: address.to_string(),
            scheme: url.scheme().to_string(),
        });
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidAddress {
            address: address.to_string(),
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

/// Validate a loaded configuration.
pub fn validate_config(config: &LbConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::EmptyPool);
    }

    for backend in &config.backends {
        if let Err(e) = parse_backend_address(&backend.address) {
            errors.push(e);
        }
        if backend.weight == 0 {
            errors.push(ValidationError::ZeroWeight {
                address: backend.address.clone(),
            });
        }
    }

    if config.limits.max_response_body_bytes == 0 {
        errors.push(ValidationError::ZeroBodyLimit);
    }

    check_socket_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.admin.enabled {
        check_socket_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
    }
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress {
            field,
            value: value.to_string(),
        });
    }
}
