//! etcd backend over the v2 keys HTTP API.
//!
//! Conditional writes use etcd's `prevExist` / `prevIndex` query
//! parameters; the store's `errorCode` taxonomy is collapsed into
//! [`ErrorKind`] by [`map_error_code`].

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::warn;

use crate::client::{KvClient, Node};
use crate::error::{BackendError, BackendResult, ErrorKind};

/// etcd v2 client for a single endpoint.
#[derive(Debug)]
pub struct EtcdClient {
    base: String,
    http: reqwest::Client,
}

/// Successful v2 keys response envelope.
#[derive(Debug, Deserialize)]
struct EtcdResponse {
    node: EtcdNode,
}

#[derive(Debug, Deserialize)]
struct EtcdNode {
    key: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    dir: bool,
    #[serde(default, rename = "createdIndex")]
    created_index: u64,
    #[serde(default, rename = "modifiedIndex")]
    modified_index: u64,
    #[serde(default)]
    nodes: Vec<EtcdNode>,
}

/// v2 error envelope.
#[derive(Debug, Deserialize)]
struct EtcdErrorBody {
    #[serde(default, rename = "errorCode")]
    error_code: i64,
    #[serde(default)]
    message: String,
}

/// Collapses an etcd v2 `errorCode` into the normalized taxonomy.
fn map_error_code(code: i64, message: &str) -> BackendError {
    let kind = match code {
        // EcodeKeyNotFound, EcodeNotFile, EcodeRootROnly.
        100 | 102 | 107 => ErrorKind::KeyNotFound,
        // EcodeTestFailed.
        101 => ErrorKind::BadVersion,
        // EcodeNodeExist.
        105 => ErrorKind::KeyExists,
        _ => {
            warn!(code, message, "unhandled etcd error code");
            ErrorKind::Unknown
        }
    };
    BackendError::new(kind, message.to_owned())
}

impl EtcdClient {
    /// Creates a client for `addr` (a `host:port` pair).
    #[must_use]
    pub fn new(addr: &str) -> Self {
        Self {
            base: format!("http://{addr}/v2/keys"),
            http: reqwest::Client::new(),
        }
    }

    fn key_url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// Executes a request, returning the decoded node on 200/201 and a
    /// mapped error otherwise.
    async fn call(&self, req: reqwest::RequestBuilder) -> BackendResult<EtcdNode> {
        let resp = req.send().await.map_err(BackendError::unreachable)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(BackendError::unreachable)?;

        if status != StatusCode::OK && status != StatusCode::CREATED {
            let err: EtcdErrorBody = serde_json::from_slice(&body).unwrap_or_else(|_| {
                EtcdErrorBody {
                    error_code: 0,
                    message: format!("etcd returned HTTP {status}"),
                }
            });
            return Err(map_error_code(err.error_code, &err.message));
        }

        let parsed: EtcdResponse = serde_json::from_slice(&body)
            .map_err(|e| BackendError::new(ErrorKind::Unknown, e.to_string()))?;
        Ok(parsed.node)
    }
}

#[async_trait]
impl KvClient for EtcdClient {
    async fn create(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let value = String::from_utf8_lossy(data).into_owned();
        self.call(
            self.http
                .put(self.key_url(path))
                .query(&[("prevExist", "false")])
                .form(&[("value", value)]),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, path: &str, version: i32) -> BackendResult<()> {
        let req = if version == -1 {
            self.http.delete(self.key_url(path))
        } else {
            self.http
                .delete(self.key_url(path))
                .query(&[("prevIndex", version.to_string())])
        };
        self.call(req).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> BackendResult<()> {
        self.call(self.http.get(self.key_url(path))).await?;
        Ok(())
    }

    async fn get_data(&self, path: &str) -> BackendResult<Node> {
        let node = self.call(self.http.get(self.key_url(path))).await?;
        if node.dir {
            // A directory has no data of its own.
            return Err(BackendError::from_kind(ErrorKind::KeyNotFound));
        }

        Ok(Node {
            path: node.key,
            value: node.value.unwrap_or_default().into_bytes(),
            created_index: node.created_index,
            modified_index: node.modified_index,
        })
    }

    async fn set_data(&self, path: &str, data: &[u8], version: i32) -> BackendResult<()> {
        let value = String::from_utf8_lossy(data).into_owned();
        let req = self.http.put(self.key_url(path)).form(&[("value", value)]);
        let req = if version == -1 {
            req.query(&[("prevExist", "true")])
        } else {
            req.query(&[("prevIndex", version.to_string())])
        };
        self.call(req).await?;
        Ok(())
    }

    async fn get_children(&self, path: &str) -> BackendResult<Vec<String>> {
        let node = self.call(self.http.get(self.key_url(path))).await?;

        let mut names: Vec<String> = node
            .nodes
            .iter()
            .filter_map(|child| child_name(&child.key))
            .collect();
        names.sort_unstable();
        names.dedup();
        Ok(names)
    }
}

/// Extracts the last path segment of an etcd key.
fn child_name(key: &str) -> Option<String> {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(map_error_code(100, "").kind(), ErrorKind::KeyNotFound);
        assert_eq!(map_error_code(101, "").kind(), ErrorKind::BadVersion);
        assert_eq!(map_error_code(102, "").kind(), ErrorKind::KeyNotFound);
        assert_eq!(map_error_code(105, "").kind(), ErrorKind::KeyExists);
        assert_eq!(map_error_code(107, "").kind(), ErrorKind::KeyNotFound);
        assert_eq!(map_error_code(999, "").kind(), ErrorKind::Unknown);
    }

    #[test]
    fn test_child_name_is_last_segment() {
        assert_eq!(child_name("/a/b"), Some("b".to_owned()));
        assert_eq!(child_name("/a/b/"), Some("b".to_owned()));
        assert_eq!(child_name("/top"), Some("top".to_owned()));
        assert_eq!(child_name("/"), None);
    }

    #[test]
    fn test_success_envelope_parses() {
        let body = r#"{
            "action": "get",
            "node": {
                "key": "/a",
                "value": "hi",
                "createdIndex": 5,
                "modifiedIndex": 7
            }
        }"#;
        let parsed: EtcdResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.node.key, "/a");
        assert_eq!(parsed.node.value.as_deref(), Some("hi"));
        assert_eq!(parsed.node.created_index, 5);
        assert_eq!(parsed.node.modified_index, 7);
        assert!(!parsed.node.dir);
    }

    #[test]
    fn test_directory_envelope_parses() {
        let body = r#"{
            "action": "get",
            "node": {
                "key": "/a",
                "dir": true,
                "nodes": [
                    {"key": "/a/x", "value": "1", "createdIndex": 1, "modifiedIndex": 1},
                    {"key": "/a/y", "dir": true}
                ]
            }
        }"#;
        let parsed: EtcdResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.node.dir);
        assert_eq!(parsed.node.nodes.len(), 2);
    }

    #[test]
    fn test_error_envelope_parses() {
        let body = r#"{"errorCode":100,"message":"Key not found","cause":"/a","index":6}"#;
        let parsed: EtcdErrorBody = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.error_code, 100);
        assert_eq!(parsed.message, "Key not found");
    }
}
