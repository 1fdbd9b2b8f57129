//! Error types for the Scaleway client.

use crate::backend::{BackendError, ProviderError};
use crate::config::ConfigError;
use scaleway_rs::ScalewayError;
use serde::Deserialize;
use thiserror::Error;

const UNAUTHORIZED_TYPES: [&str; 3] = [
    "denied_authentication",
    "permissions_denied",
    "authentication_error",
];
const NOT_FOUND_TYPES: [&str; 2] = ["unknown_resource", "not_found"];

/// Error body returned by the Instances API.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(rename = "type", default)]
    pub(crate) etype: String,
    #[serde(default)]
    pub(crate) message: String,
    #[serde(default)]
    pub(crate) resource: Option<String>,
}

impl ApiErrorBody {
    /// `true` when the API rejected the requested commercial type.
    pub(crate) fn names_commercial_type(&self) -> bool {
        self.resource.as_deref() == Some("commercial_type")
            || (self.etype == "invalid_arguments"
                && self.message.to_ascii_lowercase().contains("commercial_type"))
    }
}

/// Errors raised by the Scaleway client.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ScalewayClientError {
    /// Raised when the high-level configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error("invalid instance request: {0}")]
    Validation(String),
    /// Raised when more than one instance is requested.
    #[error("the Scaleway client provisions exactly one instance per request, got {count}")]
    UnsupportedCount {
        /// Requested instance count.
        count: u32,
    },
    /// Raised when the requested image label cannot be resolved.
    #[error("image '{label}' (arch {arch}) not found in zone {zone}")]
    ImageNotFound {
        /// Image label passed by the caller.
        label: String,
        /// Architecture requested by the caller.
        arch: String,
        /// Zone used for the lookup.
        zone: String,
    },
    /// Raised when the server type is not available in the selected zone.
    #[error("instance type '{instance_type}' not available in zone {zone}")]
    InstanceTypeUnavailable {
        /// Requested commercial type.
        instance_type: String,
        /// Target zone.
        zone: String,
    },
    /// Raised when the server no longer exists.
    #[error("instance {instance_id} not found")]
    NotFound {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Raised when the server is in a state that cannot be torn down.
    #[error("instance {instance_id} in state {state} cannot be terminated")]
    TerminateNotAllowed {
        /// Provider instance identifier.
        instance_id: String,
        /// Current state reported by the provider.
        state: String,
    },
    /// Raised when a server is still listed after teardown was issued.
    #[error("instance {instance_id} still present after teardown")]
    ResidualResource {
        /// Provider instance identifier.
        instance_id: String,
    },
    /// Structured error body returned by the Scaleway API.
    #[error("{etype}: {message}")]
    Api {
        /// HTTP status, when the response was read directly.
        status: Option<u16>,
        /// Scaleway error type, for example `permissions_denied`.
        etype: String,
        /// Human readable message.
        message: String,
    },
    /// Wrapper for other provider level failures.
    #[error("provider error: {message}")]
    Provider {
        /// Message returned by the provider SDK or HTTP client.
        message: String,
    },
}

impl ScalewayClientError {
    /// Builds an error from an unsuccessful HTTP response body.
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        serde_json::from_slice::<ApiErrorBody>(body).map_or_else(
            |_| Self::Api {
                status: Some(status),
                etype: String::from("http_error"),
                message: String::from_utf8_lossy(body).into_owned(),
            },
            |api_err| Self::Api {
                status: Some(status),
                etype: api_err.etype,
                message: api_err.message,
            },
        )
    }
}

impl ProviderError for ScalewayClientError {
    fn is_unauthorized(&self) -> bool {
        match self {
            Self::Api { status, etype, .. } => {
                matches!(status, Some(401 | 403)) || UNAUTHORIZED_TYPES.contains(&etype.as_str())
            }
            _ => false,
        }
    }

    fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Api { status, etype, .. } => {
                *status == Some(404) || NOT_FOUND_TYPES.contains(&etype.as_str())
            }
            _ => false,
        }
    }
}

impl From<ScalewayError> for ScalewayClientError {
    fn from(value: ScalewayError) -> Self {
        match value {
            ScalewayError::Api(api_err) => Self::Api {
                status: None,
                etype: api_err.etype,
                message: api_err.message,
            },
            other => Self::Provider {
                message: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ScalewayClientError {
    fn from(value: reqwest::Error) -> Self {
        Self::Provider {
            message: value.to_string(),
        }
    }
}

impl From<BackendError> for ScalewayClientError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
        }
    }
}

impl From<ConfigError> for ScalewayClientError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
