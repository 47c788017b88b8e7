//! Consul backend over the KV HTTP API.
//!
//! Consul keys have no leading slash, values come back base64-encoded,
//! and conditional writes use the `cas` query parameter, which returns a
//! bare `true`/`false` body instead of an error status. A failed CAS maps
//! to `KeyExists` on the create path and `BadVersion` on update/delete
//! paths, independent of Consul's `cas=0` convention.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::client::{KvClient, Node};
use crate::error::{BackendError, BackendResult, ErrorKind};

/// Consul KV client for a single agent.
#[derive(Debug)]
pub struct ConsulClient {
    base: String,
    http: reqwest::Client,
}

/// One entry of a KV read response.
#[derive(Debug, Deserialize)]
struct ConsulKv {
    #[serde(rename = "Key")]
    key: String,
    #[serde(default, rename = "Value")]
    value: Option<String>,
    #[serde(default, rename = "CreateIndex")]
    create_index: u64,
    #[serde(default, rename = "ModifyIndex")]
    modify_index: u64,
}

/// Strips the leading slash: `/a/b` is the Consul key `a/b`.
fn key_from_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

impl ConsulClient {
    /// Creates a client for `addr` (a `host:port` pair).
    #[must_use]
    pub fn new(addr: &str) -> Self {
        Self {
            base: format!("http://{addr}/v1/kv"),
            http: reqwest::Client::new(),
        }
    }

    fn kv_url(&self, key: &str) -> String {
        format!("{}/{key}", self.base)
    }

    /// Reads one KV entry.
    async fn get(&self, path: &str) -> BackendResult<ConsulKv> {
        let resp = self
            .http
            .get(self.kv_url(key_from_path(path)))
            .send()
            .await
            .map_err(BackendError::unreachable)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::from_kind(ErrorKind::KeyNotFound));
        }
        if !resp.status().is_success() {
            return Err(BackendError::new(
                ErrorKind::Unknown,
                format!("consul returned HTTP {}", resp.status()),
            ));
        }

        let mut entries: Vec<ConsulKv> = resp.json().await.map_err(BackendError::unreachable)?;
        if entries.is_empty() {
            return Err(BackendError::from_kind(ErrorKind::KeyNotFound));
        }
        Ok(entries.remove(0))
    }

    /// Check-and-set PUT. `modify_index` 0 is Consul's "must not exist".
    /// Returns whether the store accepted the write.
    async fn cas(&self, path: &str, data: &[u8], modify_index: u64) -> BackendResult<bool> {
        let resp = self
            .http
            .put(self.kv_url(key_from_path(path)))
            .query(&[("cas", modify_index.to_string())])
            .body(data.to_vec())
            .send()
            .await
            .map_err(BackendError::unreachable)?;

        if !resp.status().is_success() {
            return Err(BackendError::new(
                ErrorKind::Unknown,
                format!("consul returned HTTP {}", resp.status()),
            ));
        }

        let body = resp.text().await.map_err(BackendError::unreachable)?;
        Ok(body.trim() == "true")
    }
}

#[async_trait]
impl KvClient for ConsulClient {
    async fn create(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        if self.cas(path, data, 0).await? {
            Ok(())
        } else {
            // cas=0 refused: something already holds the key.
            Err(BackendError::from_kind(ErrorKind::KeyExists))
        }
    }

    async fn delete(&self, path: &str, version: i32) -> BackendResult<()> {
        let url = self.kv_url(key_from_path(path));
        let req = if version == -1 {
            // Consul's DELETE answers 200 for keys that never existed;
            // read first so an absent znode still fails KeyNotFound.
            self.get(path).await?;
            self.http.delete(url)
        } else {
            self.http
                .delete(url)
                .query(&[("cas", version.to_string())])
        };

        let resp = req.send().await.map_err(BackendError::unreachable)?;
        if !resp.status().is_success() {
            return Err(BackendError::new(
                ErrorKind::Unknown,
                format!("consul returned HTTP {}", resp.status()),
            ));
        }

        let body = resp.text().await.map_err(BackendError::unreachable)?;
        if version != -1 && body.trim() != "true" {
            return Err(BackendError::from_kind(ErrorKind::BadVersion));
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> BackendResult<()> {
        self.get(path).await?;
        Ok(())
    }

    async fn get_data(&self, path: &str) -> BackendResult<Node> {
        let kv = self.get(path).await?;
        let value = match kv.value {
            Some(encoded) => BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| BackendError::new(ErrorKind::Unknown, e.to_string()))?,
            None => Vec::new(),
        };

        Ok(Node {
            path: format!("/{}", kv.key),
            value,
            created_index: kv.create_index,
            modified_index: kv.modify_index,
        })
    }

    async fn set_data(&self, path: &str, data: &[u8], version: i32) -> BackendResult<()> {
        // Unconditional writes reuse the node's current index so the CAS
        // still detects a concurrent delete.
        let modify_index = if version == -1 {
            self.get(path).await?.modify_index
        } else {
            u64::try_from(version)
                .map_err(|_| BackendError::from_kind(ErrorKind::BadVersion))?
        };

        if self.cas(path, data, modify_index).await? {
            Ok(())
        } else {
            Err(BackendError::from_kind(ErrorKind::BadVersion))
        }
    }

    async fn get_children(&self, path: &str) -> BackendResult<Vec<String>> {
        let key = key_from_path(path);
        let prefix = if key.is_empty() {
            String::new()
        } else {
            format!("{key}/")
        };

        let resp = self
            .http
            .get(format!("{}/{prefix}", self.base))
            .query(&[("keys", ""), ("separator", "/")])
            .send()
            .await
            .map_err(BackendError::unreachable)?;

        // No keys under the prefix: an empty listing, not an error.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !resp.status().is_success() {
            return Err(BackendError::new(
                ErrorKind::Unknown,
                format!("consul returned HTTP {}", resp.status()),
            ));
        }

        let keys: Vec<String> = resp.json().await.map_err(BackendError::unreachable)?;
        Ok(clean_child_keys(&prefix, &keys))
    }
}

/// Strips the listing prefix and directory markers, de-duplicating names
/// that appear both as a value (`sub`) and a directory (`sub/`).
fn clean_child_keys(prefix: &str, keys: &[String]) -> Vec<String> {
    let mut names: Vec<String> = keys
        .iter()
        .filter_map(|key| key.strip_prefix(prefix))
        .map(|rest| rest.trim_end_matches('/'))
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_from_path() {
        assert_eq!(key_from_path("/a/b"), "a/b");
        assert_eq!(key_from_path("/"), "");
    }

    #[test]
    fn test_clean_child_keys_deduplicates() {
        let keys = vec![
            "a/sub".to_owned(),
            "a/sub/".to_owned(),
            "a/leaf".to_owned(),
            "a/".to_owned(),
        ];
        assert_eq!(
            clean_child_keys("a/", &keys),
            vec!["leaf".to_owned(), "sub".to_owned()]
        );
    }

    #[test]
    fn test_clean_child_keys_at_root() {
        let keys = vec!["a".to_owned(), "b/".to_owned()];
        assert_eq!(
            clean_child_keys("", &keys),
            vec!["a".to_owned(), "b".to_owned()]
        );
    }

    #[test]
    fn test_kv_entry_parses_with_base64_value() {
        let body = r#"[{
            "Key": "a",
            "Value": "aGk=",
            "CreateIndex": 5,
            "ModifyIndex": 7,
            "Flags": 0,
            "LockIndex": 0
        }]"#;
        let entries: Vec<ConsulKv> = serde_json::from_str(body).unwrap();
        assert_eq!(entries[0].key, "a");
        assert_eq!(
            BASE64.decode(entries[0].value.as_deref().unwrap()).unwrap(),
            b"hi"
        );
        assert_eq!(entries[0].create_index, 5);
        assert_eq!(entries[0].modify_index, 7);
    }

    #[test]
    fn test_null_value_parses() {
        let body = r#"[{"Key": "dir/", "Value": null, "CreateIndex": 1, "ModifyIndex": 1}]"#;
        let entries: Vec<ConsulKv> = serde_json::from_str(body).unwrap();
        assert!(entries[0].value.is_none());
    }
}
