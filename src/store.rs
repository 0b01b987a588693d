// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! The backing store adapter: a keyed blob store the trie engine treats as
//! an oracle for materializing and persisting nodes. The trait is the
//! contract; [`MemoryStore`] is the one implementation this crate ships —
//! the vehicle for every test in this crate, not a production database.

use crate::hash::NodeHash;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::trace;

/// One write inside a [`Store::batch`] call, which commits atomically.
#[derive(Clone, Debug)]
pub enum BatchOp {
    Put(NodeHash, Vec<u8>),
    Delete(NodeHash),
}

/// The keyed blob store the trie engine is built against. Every method is
/// async because every store interaction is a suspension point, even for
/// an in-memory implementation like [`MemoryStore`] that never actually
/// awaits anything.
///
/// `__root__` is a reserved logical slot (exposed here as `get_root` /
/// `set_root` rather than a magic key in the same namespace as node blobs)
/// holding the current root hash, or absent for an empty trie.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, hash: &NodeHash) -> anyhow::Result<Option<Vec<u8>>>;
    async fn put(&self, hash: NodeHash, bytes: Vec<u8>) -> anyhow::Result<()>;
    async fn del(&self, hash: &NodeHash) -> anyhow::Result<()>;

    async fn exists(&self, hash: &NodeHash) -> anyhow::Result<bool> {
        Ok(self.get(hash).await?.is_some())
    }

    /// Applies a group of writes atomically.
    async fn batch(&self, ops: Vec<BatchOp>) -> anyhow::Result<()>;

    async fn get_root(&self) -> anyhow::Result<Option<NodeHash>>;
    async fn set_root(&self, root: Option<NodeHash>) -> anyhow::Result<()>;
}

/// An in-memory [`Store`], guarded by a [`parking_lot::RwLock`] around a
/// `HashMap`. Not persistent across process restarts; a legitimate backing
/// store for callers who don't need disk durability, and the store every
/// test in this crate runs against.
#[derive(Default)]
pub struct MemoryStore {
    nodes: RwLock<HashMap<NodeHash, Vec<u8>>>,
    root: RwLock<Option<NodeHash>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, hash: &NodeHash) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.nodes.read().get(hash).cloned())
    }

    async fn put(&self, hash: NodeHash, bytes: Vec<u8>) -> anyhow::Result<()> {
        trace!(%hash, len = bytes.len(), "store: put node");
        self.nodes.write().insert(hash, bytes);
        Ok(())
    }

    async fn del(&self, hash: &NodeHash) -> anyhow::Result<()> {
        self.nodes.write().remove(hash);
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> anyhow::Result<()> {
        let mut guard = self.nodes.write();
        for op in ops {
            match op {
                BatchOp::Put(hash, bytes) => {
                    guard.insert(hash, bytes);
                }
                BatchOp::Delete(hash) => {
                    guard.remove(&hash);
                }
            }
        }
        Ok(())
    }

    async fn get_root(&self) -> anyhow::Result<Option<NodeHash>> {
        Ok(*self.root.read())
    }

    async fn set_root(&self, root: Option<NodeHash>) -> anyhow::Result<()> {
        *self.root.write() = root;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryStore::new();
        let hash = hash_bytes(b"payload");
        store.put(hash, b"payload".to_vec()).await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), Some(b"payload".to_vec()));
        assert!(store.exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let store = MemoryStore::new();
        let hash = hash_bytes(b"absent");
        assert_eq!(store.get(&hash).await.unwrap(), None);
        assert!(!store.exists(&hash).await.unwrap());
    }

    #[tokio::test]
    async fn root_pointer_defaults_to_none() {
        let store = MemoryStore::new();
        assert_eq!(store.get_root().await.unwrap(), None);
        let hash = hash_bytes(b"root");
        store.set_root(Some(hash)).await.unwrap();
        assert_eq!(store.get_root().await.unwrap(), Some(hash));
    }

    #[tokio::test]
    async fn batch_applies_atomically() {
        let store = MemoryStore::new();
        let a = hash_bytes(b"a");
        let b = hash_bytes(b"b");
        store
            .batch(vec![
                BatchOp::Put(a, b"a".to_vec()),
                BatchOp::Put(b, b"b".to_vec()),
            ])
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
        store.batch(vec![BatchOp::Delete(a)]).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get(&a).await.unwrap().is_none());
    }
}
