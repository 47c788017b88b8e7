//! In-process backend.
//!
//! A hierarchical store over a `Mutex<HashMap>` with a monotonically
//! increasing write index standing in for etcd's createdIndex /
//! modifiedIndex pair. Used by the test suites and reachable via
//! `memory://`; it implements the same conditional-write semantics as
//! the real adapters.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{KvClient, Node};
use crate::error::{BackendError, BackendResult, ErrorKind};

#[derive(Debug, Clone)]
struct MemoryNode {
    value: Vec<u8>,
    created_index: u64,
    modified_index: u64,
}

#[derive(Debug, Default)]
struct Store {
    nodes: HashMap<String, MemoryNode>,
    index: u64,
}

impl Store {
    fn next_index(&mut self) -> u64 {
        self.index += 1;
        self.index
    }
}

/// An in-process [`KvClient`].
#[derive(Debug, Default)]
pub struct MemoryClient {
    store: Mutex<Store>,
}

impl MemoryClient {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        // A poisoned lock means a panic inside another accessor; the
        // store itself is a plain map and stays usable.
        self.store.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Matches a wire version against a node's modified index. `-1` matches
/// anything; any other value must equal the index exactly.
fn version_matches(version: i32, modified_index: u64) -> bool {
    if version == -1 {
        return true;
    }
    u64::try_from(version).is_ok_and(|v| v == modified_index)
}

#[async_trait]
impl KvClient for MemoryClient {
    async fn create(&self, path: &str, data: &[u8]) -> BackendResult<()> {
        let mut store = self.lock();
        if store.nodes.contains_key(path) {
            return Err(BackendError::from_kind(ErrorKind::KeyExists));
        }

        let index = store.next_index();
        store.nodes.insert(
            path.to_owned(),
            MemoryNode {
                value: data.to_vec(),
                created_index: index,
                modified_index: index,
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str, version: i32) -> BackendResult<()> {
        let mut store = self.lock();
        let node = store
            .nodes
            .get(path)
            .ok_or_else(|| BackendError::from_kind(ErrorKind::KeyNotFound))?;

        if !version_matches(version, node.modified_index) {
            return Err(BackendError::from_kind(ErrorKind::BadVersion));
        }

        store.nodes.remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> BackendResult<()> {
        let store = self.lock();
        if store.nodes.contains_key(path) {
            Ok(())
        } else {
            Err(BackendError::from_kind(ErrorKind::KeyNotFound))
        }
    }

    async fn get_data(&self, path: &str) -> BackendResult<Node> {
        let store = self.lock();
        let node = store
            .nodes
            .get(path)
            .ok_or_else(|| BackendError::from_kind(ErrorKind::KeyNotFound))?;

        Ok(Node {
            path: path.to_owned(),
            value: node.value.clone(),
            created_index: node.created_index,
            modified_index: node.modified_index,
        })
    }

    async fn set_data(&self, path: &str, data: &[u8], version: i32) -> BackendResult<()> {
        let mut store = self.lock();
        let modified_index = match store.nodes.get(path) {
            Some(node) => node.modified_index,
            None => return Err(BackendError::from_kind(ErrorKind::KeyNotFound)),
        };

        if !version_matches(version, modified_index) {
            return Err(BackendError::from_kind(ErrorKind::BadVersion));
        }

        let index = store.next_index();
        if let Some(node) = store.nodes.get_mut(path) {
            node.value = data.to_vec();
            node.modified_index = index;
        }
        Ok(())
    }

    async fn get_children(&self, path: &str) -> BackendResult<Vec<String>> {
        let store = self.lock();
        let prefix = if path == "/" {
            "/".to_owned()
        } else {
            format!("{path}/")
        };

        let mut names = BTreeSet::new();
        for key in store.nodes.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if let Some(name) = rest.split('/').next() {
                    if !name.is_empty() {
                        names.insert(name.to_owned());
                    }
                }
            }
        }

        Ok(names.into_iter().collect())
    }
}
