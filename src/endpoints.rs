//! Declarative endpoint list loaded from YAML.
//!
//! The document has a single recognised top-level key:
//!
//! ```yaml
//! endpoints:
//!   - host: registry.example.com
//!     ports: [443]
//!   - host: api.example.com
//!     ports: [80, 443]
//! ```

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A host plus the ports on it that must be reachable.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub struct Endpoint {
    /// Hostname or IP address.
    pub host: String,
    /// Ports probed in declaration order.
    pub ports: Vec<u16>,
}

/// Ordered list of endpoints the probe instance must reach.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, PartialEq)]
pub struct EndpointConfig {
    /// Endpoints in declaration order.
    pub endpoints: Vec<Endpoint>,
}

/// Invariant violations in an otherwise well-formed document.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum EndpointError {
    /// An entry has an empty host.
    #[error("endpoint #{index} has an empty host")]
    EmptyHost {
        /// Zero-based position of the entry.
        index: usize,
    },
    /// An entry lists no ports.
    #[error("endpoint {host} lists no ports")]
    NoPorts {
        /// Host of the offending entry.
        host: String,
    },
    /// An entry lists port zero.
    #[error("endpoint {host} lists port 0")]
    InvalidPort {
        /// Host of the offending entry.
        host: String,
    },
}

/// Errors raised while loading endpoint configuration.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigLoadError {
    /// Raised when the file cannot be read.
    #[error("unable to read config file `{path}`: {message}")]
    Read {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the document is not valid YAML for this schema.
    #[error("unable to parse config file `{path}`: {message}")]
    Parse {
        /// Path, or `<inline>` for string input.
        path: String,
        /// Parser error message.
        message: String,
    },
    /// Raised when an entry violates an endpoint invariant.
    #[error("invalid endpoint configuration: {0}")]
    Invalid(#[from] EndpointError),
}

impl EndpointConfig {
    /// Loads and validates the endpoint list from a YAML file. A leading
    /// `~/` is expanded to the user's home directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError`] when the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigLoadError> {
        let expanded = expand_tilde(path.as_str());
        let content =
            read_to_string_ambient(&expanded).map_err(|message| ConfigLoadError::Read {
                path: expanded.clone(),
                message,
            })?;
        Self::parse(&content, &expanded)
    }

    /// Parses and validates the endpoint list from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError`] when parsing or validation fails.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigLoadError> {
        Self::parse(yaml, "<inline>")
    }

    fn parse(yaml: &str, origin: &str) -> Result<Self, ConfigLoadError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|err| ConfigLoadError::Parse {
            path: origin.to_owned(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every host is non-empty and lists at least one non-zero
    /// port.
    ///
    /// # Errors
    ///
    /// Returns the first [`EndpointError`] encountered.
    pub fn validate(&self) -> Result<(), EndpointError> {
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.host.trim().is_empty() {
                return Err(EndpointError::EmptyHost { index });
            }
            if endpoint.ports.is_empty() {
                return Err(EndpointError::NoPorts {
                    host: endpoint.host.clone(),
                });
            }
            if endpoint.ports.contains(&0) {
                return Err(EndpointError::InvalidPort {
                    host: endpoint.host.clone(),
                });
            }
        }
        Ok(())
    }

    /// Iterates `(host, port)` pairs in declaration order, ports inner.
    pub fn targets(&self) -> impl Iterator<Item = (&str, u16)> + '_ {
        self.endpoints.iter().flat_map(|endpoint| {
            endpoint
                .ports
                .iter()
                .map(move |port| (endpoint.host.as_str(), *port))
        })
    }

    /// Number of `(host, port)` pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.iter().map(|endpoint| endpoint.ports.len()).sum()
    }

    /// Returns `true` when no pairs are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialises the list back to YAML for embedding in a bootstrap
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigLoadError::Parse`] if serialisation fails.
    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        serde_yaml::to_string(self).map_err(|err| ConfigLoadError::Parse {
            path: "<serialise>".to_owned(),
            message: err.to_string(),
        })
    }
}

/// Expands a leading `~/` prefix to the user's home directory.
///
/// If `HOME` is not set the input is returned unchanged.
///
/// # Examples
///
/// ```
/// # use egress_verifier::endpoints::expand_tilde;
/// assert_eq!(expand_tilde("/absolute/path"), "/absolute/path");
/// ```
#[must_use]
pub fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return format!("{}/{rest}", home.to_string_lossy());
    }
    path.to_owned()
}

/// Reads a file through an ambient directory handle. The path is
/// canonicalised first so `..` components and symlinks resolve against the
/// real filesystem rather than the handle's sandbox.
fn read_to_string_ambient(path: &str) -> Result<String, String> {
    let resolved = Utf8Path::new(path)
        .canonicalize_utf8()
        .map_err(|err| err.to_string())?;
    let parent = resolved
        .parent()
        .ok_or_else(|| format!("path has no parent directory: {resolved}"))?;
    let file_name = resolved
        .file_name()
        .ok_or_else(|| format!("path has no file name: {resolved}"))?;

    let dir = Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| err.to_string())?;
    dir.read_to_string(file_name).map_err(|err| err.to_string())
}
