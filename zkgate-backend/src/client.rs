//! The backend client trait and URL-based construction.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;

use crate::consul::ConsulClient;
use crate::error::BackendResult;
use crate::etcd::EtcdClient;
use crate::memory::MemoryClient;

/// A value node read back from a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// The node's path (forward-slash form).
    pub path: String,
    /// The stored bytes.
    pub value: Vec<u8>,
    /// Backend index of the write that created the node.
    pub created_index: u64,
    /// Backend index of the write that last modified the node.
    pub modified_index: u64,
}

/// The six operations every backend supports.
///
/// Paths are absolute forward-slash strings (`/a/b`); adapters translate
/// them to their store's key syntax. A `version` of `-1` means
/// unconditional; any other value is compared against the node's
/// modified index.
#[async_trait]
pub trait KvClient: Send + Sync {
    /// Stores a value at a path that must not already hold one.
    ///
    /// # Errors
    /// `KeyExists` if the path already holds a value, `Unreachable` on
    /// network failure.
    async fn create(&self, path: &str, data: &[u8]) -> BackendResult<()>;

    /// Deletes a path, optionally only at an expected version.
    ///
    /// # Errors
    /// `KeyNotFound` if absent, `BadVersion` on a version mismatch.
    async fn delete(&self, path: &str, version: i32) -> BackendResult<()>;

    /// Checks that a path holds a value.
    ///
    /// # Errors
    /// `KeyNotFound` if absent.
    async fn exists(&self, path: &str) -> BackendResult<()>;

    /// Reads a path's value and indices.
    ///
    /// # Errors
    /// `KeyNotFound` if absent or if the path denotes a directory-only
    /// node.
    async fn get_data(&self, path: &str) -> BackendResult<Node>;

    /// Replaces a path's value, optionally only at an expected version.
    ///
    /// # Errors
    /// `KeyNotFound` if absent, `BadVersion` on a version mismatch.
    async fn set_data(&self, path: &str, data: &[u8], version: i32) -> BackendResult<()>;

    /// Lists a path's immediate child names: last segment only, no
    /// trailing slash, de-duplicated.
    ///
    /// # Errors
    /// Backend-dependent; see the adapters.
    async fn get_children(&self, path: &str) -> BackendResult<Vec<String>>;
}

/// Errors constructing a backend client from a URL.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The URL did not parse.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The URL parsed but carries no usable host.
    #[error("backend URL has no host: {0}")]
    MissingHost(String),

    /// The scheme names no known backend.
    #[error("unsupported backend scheme: {0}")]
    UnsupportedScheme(String),
}

/// Appends `default_port` when the authority has none.
fn normalize_address(url: &Url, default_port: u16) -> Result<String, ConfigError> {
    let host = url
        .host_str()
        .ok_or_else(|| ConfigError::MissingHost(url.to_string()))?;
    let port = url.port().unwrap_or(default_port);
    Ok(format!("{host}:{port}"))
}

/// Builds the backend selected by a scheme-prefixed URL.
///
/// Recognized schemes: `etcd` (default port 4001), `consul` (default
/// port 8500), `memory` (an in-process store, mainly for tests).
///
/// # Errors
/// Returns a [`ConfigError`] for unparseable URLs or unknown schemes.
pub fn new_client(backend_url: &str) -> Result<Arc<dyn KvClient>, ConfigError> {
    let url = Url::parse(backend_url)?;

    match url.scheme().to_ascii_lowercase().as_str() {
        "etcd" => {
            let addr = normalize_address(&url, 4001)?;
            Ok(Arc::new(EtcdClient::new(&addr)))
        }
        "consul" => {
            let addr = normalize_address(&url, 8500)?;
            Ok(Arc::new(ConsulClient::new(&addr)))
        }
        "memory" => Ok(Arc::new(MemoryClient::new())),
        other => Err(ConfigError::UnsupportedScheme(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_appended() {
        let url = Url::parse("etcd://10.0.0.7").unwrap();
        assert_eq!(normalize_address(&url, 4001).unwrap(), "10.0.0.7:4001");
    }

    #[test]
    fn test_explicit_port_kept() {
        let url = Url::parse("consul://kv.internal:9500").unwrap();
        assert_eq!(normalize_address(&url, 8500).unwrap(), "kv.internal:9500");
    }

    #[test]
    fn test_known_schemes_construct() {
        assert!(new_client("etcd://127.0.0.1:4001").is_ok());
        assert!(new_client("consul://127.0.0.1").is_ok());
        assert!(new_client("memory://local").is_ok());
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        assert!(new_client("ETCD://127.0.0.1").is_ok());
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let err = match new_client("redis://127.0.0.1") {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, ConfigError::UnsupportedScheme(s) if s == "redis"));
    }

    #[test]
    fn test_garbage_url_rejected() {
        assert!(matches!(
            new_client("not a url"),
            Err(ConfigError::InvalidUrl(_))
        ));
    }
}
