//! Cloud resource client contract for provisioning probe instances.
//!
//! The verifier only ever needs three provider primitives: create an
//! instance, ask for its status, and terminate it. Everything provider
//! specific lives behind [`CloudResourceClient`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::bootstrap::BootstrapPayload;

/// Parameters required to create a probe instance inside the target subnet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequest {
    /// Machine image identifier or label. The client resolves labels to a
    /// provider specific image identifier.
    pub image: String,
    /// Machine size or commercial type (for example `DEV1-S`).
    pub machine_size: String,
    /// Number of instances to request. Must be at least one.
    pub count: u32,
    /// Subnet the instance's network interface is bound to.
    pub subnet_id: String,
    /// Security group applied to the instance's network interface.
    pub security_group_id: String,
    /// Script executed by the provider once the instance boots.
    pub bootstrap: BootstrapPayload,
}

impl InstanceRequest {
    /// Starts a builder for an [`InstanceRequest`].
    #[must_use]
    pub fn builder() -> InstanceRequestBuilder {
        InstanceRequestBuilder::new()
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any string field is empty or
    /// `count` is zero.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.image.is_empty() {
            return Err(BackendError::Validation("image".to_owned()));
        }
        if self.machine_size.is_empty() {
            return Err(BackendError::Validation("machine_size".to_owned()));
        }
        if self.count == 0 {
            return Err(BackendError::Validation("count".to_owned()));
        }
        if self.subnet_id.is_empty() {
            return Err(BackendError::Validation("subnet_id".to_owned()));
        }
        if self.security_group_id.is_empty() {
            return Err(BackendError::Validation("security_group_id".to_owned()));
        }
        if self.bootstrap.script().trim().is_empty() {
            return Err(BackendError::Validation("bootstrap".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`InstanceRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequestBuilder {
    image: String,
    machine_size: String,
    count: u32,
    subnet_id: String,
    security_group_id: String,
    bootstrap: Option<BootstrapPayload>,
}

impl Default for InstanceRequestBuilder {
    fn default() -> Self {
        Self {
            image: String::new(),
            machine_size: String::new(),
            count: 1,
            subnet_id: String::new(),
            security_group_id: String::new(),
            bootstrap: None,
        }
    }
}

impl InstanceRequestBuilder {
    /// Creates an empty builder requesting a single instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the machine image.
    #[must_use]
    pub fn image(mut self, value: impl Into<String>) -> Self {
        self.image = value.into();
        self
    }

    /// Sets the machine size.
    #[must_use]
    pub fn machine_size(mut self, value: impl Into<String>) -> Self {
        self.machine_size = value.into();
        self
    }

    /// Sets the number of instances to request.
    #[must_use]
    pub const fn count(mut self, value: u32) -> Self {
        self.count = value;
        self
    }

    /// Sets the subnet identifier.
    #[must_use]
    pub fn subnet_id(mut self, value: impl Into<String>) -> Self {
        self.subnet_id = value.into();
        self
    }

    /// Sets the security group identifier.
    #[must_use]
    pub fn security_group_id(mut self, value: impl Into<String>) -> Self {
        self.security_group_id = value.into();
        self
    }

    /// Sets the bootstrap payload.
    #[must_use]
    pub fn bootstrap(mut self, value: BootstrapPayload) -> Self {
        self.bootstrap = Some(value);
        self
    }

    /// Builds and validates the [`InstanceRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<InstanceRequest, BackendError> {
        let bootstrap = self
            .bootstrap
            .ok_or_else(|| BackendError::Validation("bootstrap".to_owned()))?;
        let request = InstanceRequest {
            image: self.image.trim().to_owned(),
            machine_size: self.machine_size.trim().to_owned(),
            count: self.count,
            subnet_id: self.subnet_id.trim().to_owned(),
            security_group_id: self.security_group_id.trim().to_owned(),
            bootstrap,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Handle returned by a client once an instance has been created.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceHandle {
    /// Provider specific identifier for the instance.
    pub id: String,
}

/// Lifecycle state of a probe instance as reported by the provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum InstanceState {
    /// Booting; not yet running.
    Pending,
    /// Running; the bootstrap payload is executing.
    Running,
    /// Termination in progress.
    ShuttingDown,
    /// Gone.
    Terminated,
    /// Stop in progress.
    Stopping,
    /// Stopped but still allocated.
    Stopped,
    /// The status query was denied for lack of permissions.
    Unauthorized,
    /// Any code the verifier does not recognise, or an unexplained query
    /// failure.
    Unknown,
}

impl InstanceState {
    /// Decodes a canonical instance status code.
    ///
    /// The codes follow the widely used compute status numbering: `0`
    /// pending, `16` running, `32` shutting down, `48` terminated, `64`
    /// stopping, `80` stopped, and `401` for an authorization failure.
    #[must_use]
    pub const fn from_status_code(code: u16) -> Self {
        match code {
            0 => Self::Pending,
            16 => Self::Running,
            32 => Self::ShuttingDown,
            48 => Self::Terminated,
            64 => Self::Stopping,
            80 => Self::Stopped,
            401 => Self::Unauthorized,
            _ => Self::Unknown,
        }
    }

    /// Returns the canonical status code, or `None` for [`Self::Unknown`].
    #[must_use]
    pub const fn code(self) -> Option<u16> {
        match self {
            Self::Pending => Some(0),
            Self::Running => Some(16),
            Self::ShuttingDown => Some(32),
            Self::Terminated => Some(48),
            Self::Stopping => Some(64),
            Self::Stopped => Some(80),
            Self::Unauthorized => Some(401),
            Self::Unknown => None,
        }
    }

    /// Returns the lowercase name used in log and report lines.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::ShuttingDown => "shutting-down",
            Self::Terminated => "terminated",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Unauthorized => "unauthorized",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by provider independent request handling.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Classification every provider error must expose to the verifier.
pub trait ProviderError: std::error::Error + Send + Sync + 'static {
    /// Returns `true` when the provider denied the call for lack of
    /// permissions. Such failures cannot resolve themselves.
    fn is_unauthorized(&self) -> bool;

    /// Returns `true` when the addressed resource no longer exists.
    fn is_not_found(&self) -> bool;
}

/// Future returned by client operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud resource clients.
pub trait CloudResourceClient {
    /// Provider specific error type returned by the client.
    type Error: ProviderError;

    /// Creates a new instance and returns a handle used for subsequent calls.
    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceHandle, Self::Error>;

    /// Queries the instance status once.
    ///
    /// Returns `Ok(None)` when the provider does not report the instance yet,
    /// which happens shortly after creation.
    fn describe_instance_status<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, Option<InstanceState>, Self::Error>;

    /// Terminates the instance and releases its resources.
    fn terminate_instance<'a>(
        &'a self,
        handle: &'a InstanceHandle,
    ) -> BackendFuture<'a, (), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_decode_to_states() {
        assert_eq!(InstanceState::from_status_code(0), InstanceState::Pending);
        assert_eq!(InstanceState::from_status_code(16), InstanceState::Running);
        assert_eq!(
            InstanceState::from_status_code(401),
            InstanceState::Unauthorized
        );
        assert_eq!(InstanceState::from_status_code(7), InstanceState::Unknown);
    }

    #[test]
    fn known_states_round_trip_their_code() {
        for state in [
            InstanceState::Pending,
            InstanceState::Running,
            InstanceState::ShuttingDown,
            InstanceState::Terminated,
            InstanceState::Stopping,
            InstanceState::Stopped,
            InstanceState::Unauthorized,
        ] {
            let code = state.code().unwrap_or_else(|| panic!("{state} has a code"));
            assert_eq!(InstanceState::from_status_code(code), state);
        }
        assert_eq!(InstanceState::Unknown.code(), None);
    }
}
