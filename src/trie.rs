// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! The trie engine: `get`/`insert`/`delete`/`child_at` as recursive
//! transformations over the node model, plus the paging operations
//! (`fetch_children`, `save`, `load`) that move nodes between memory and
//! the backing store. Each branch consumes a variable-length `prefix`
//! instead of exactly one nibble per level of descent.

use crate::error::TrieError;
use crate::hash::{self, NodeHash};
use crate::nibble::{self, NibblePath, PATH_NIBBLES};
use crate::node::{BranchNode, ChildSlot, LeafNode, Node};
use crate::proof::{self, Proof};
use crate::store::Store;
use parking_lot::RwLock;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Wraps a raw call into the backing store, turning any error the store
/// itself raises into `TrieError::StoreUnavailable` — the kind callers
/// match on to know the in-memory root may be inconsistent and a reload is
/// warranted. Does not touch `Ok` results, so a legitimate `Ok(None)` (key
/// not present in the store) still flows through untouched.
fn store_call<T>(result: anyhow::Result<T>) -> anyhow::Result<T> {
    result.map_err(|source| TrieError::StoreUnavailable { source }.into())
}

/// Tunable bound on paging eagerness. Not a file/env config layer — the
/// core has no process lifecycle of its own, just a constructor argument.
#[derive(Clone, Debug)]
pub struct TrieConfig {
    /// Upper bound `fetch_children` honors regardless of the caller's
    /// requested depth; defaults to the full path length, i.e. no bound.
    pub max_fetch_depth: usize,
}

impl Default for TrieConfig {
    fn default() -> Self {
        TrieConfig {
            max_fetch_depth: PATH_NIBBLES,
        }
    }
}

/// A handle onto one authenticated trie backed by `S`.
/// Cheaply shared via `Arc` across async tasks; at most one mutation
/// (`insert`/`delete`/`save`) may be in flight at a time, enforced by
/// `mutating` rather than by borrow-checking, since callers are expected to
/// hold the same `Arc<Trie<S>>` from more than one task.
pub struct Trie<S: Store> {
    root: RwLock<Node>,
    store: Arc<S>,
    mutating: AtomicBool,
    config: TrieConfig,
}

impl<S: Store> Trie<S> {
    /// A fresh, empty trie (root = Empty).
    pub fn new(store: Arc<S>) -> Self {
        Self::new_with_config(store, TrieConfig::default())
    }

    pub fn new_with_config(store: Arc<S>, config: TrieConfig) -> Self {
        Trie {
            root: RwLock::new(Node::Empty),
            store,
            mutating: AtomicBool::new(false),
            config,
        }
    }

    /// Loads a trie from the store's reserved root-pointer slot. An absent
    /// root pointer yields an empty trie.
    pub async fn load(store: Arc<S>) -> anyhow::Result<Self> {
        Self::load_with_config(store, TrieConfig::default()).await
    }

    pub async fn load_with_config(store: Arc<S>, config: TrieConfig) -> anyhow::Result<Self> {
        let root = match store_call(store.get_root().await)? {
            Some(hash) => {
                let slot = ChildSlot::Ref { hash, size: None };
                materialize(&slot, 0, &*store).await?
            }
            None => Node::Empty,
        };
        debug!(root = %root.hash(), "trie: loaded");
        Ok(Trie {
            root: RwLock::new(root),
            store,
            mutating: AtomicBool::new(false),
            config,
        })
    }

    /// The current root hash; 32 zero bytes for an empty trie.
    pub fn root_hash(&self) -> NodeHash {
        self.root.read().hash()
    }

    fn begin_mutation(&self) -> Result<(), TrieError> {
        self.mutating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| TrieError::ConcurrentMutation)
    }

    fn end_mutation(&self) {
        self.mutating.store(false, Ordering::Release);
    }

    /// Descends via `path = H(key)`, consuming branch prefixes and
    /// selecting nibbles, materializing `Ref` children as encountered.
    pub async fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        let path = hash::path_of_key(key);
        let remaining = NibblePath::from_hash(&path);
        let root = self.root.read().clone();
        get_rec(&root, &remaining, key, &*self.store).await
    }

    /// Inserts or overwrites `key`. At most one mutation may be in flight
    /// per handle.
    pub async fn insert(&self, key: Vec<u8>, value: Vec<u8>) -> anyhow::Result<()> {
        self.begin_mutation()?;
        let result = self.insert_inner(&key, &value).await;
        self.end_mutation();
        result
    }

    async fn insert_inner(&self, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
        let path = hash::path_of_key(key);
        let remaining = NibblePath::from_hash(&path);
        let root = self.root.read().clone();
        let new_root = insert_rec(root, &remaining, key, value, &*self.store).await?;
        trace!(key_path = %path, "trie: insert complete");
        *self.root.write() = new_root;
        Ok(())
    }

    /// Deletes `key`. A no-op, not an error, if the key is absent.
    pub async fn delete(&self, key: &[u8]) -> anyhow::Result<()> {
        self.begin_mutation()?;
        let result = self.delete_inner(key).await;
        self.end_mutation();
        result
    }

    async fn delete_inner(&self, key: &[u8]) -> anyhow::Result<()> {
        let path = hash::path_of_key(key);
        let remaining = NibblePath::from_hash(&path);
        let root = self.root.read().clone();
        let new_root = delete_rec(root, &remaining, key, &*self.store).await?;
        trace!(key_path = %path, "trie: delete complete");
        *self.root.write() = new_root;
        Ok(())
    }

    /// Follows a nibble-path prefix from the root, respecting branch
    /// prefixes, returning a cloned snapshot of whatever node occupies that
    /// position.
    pub async fn child_at(&self, path_prefix: &NibblePath) -> anyhow::Result<Option<Node>> {
        let mut current = self.root.read().clone();
        let mut remaining = path_prefix.clone();
        loop {
            if remaining.is_empty() {
                return Ok(Some(current));
            }
            match current {
                Node::Empty => return Ok(None),
                Node::Leaf(l) => {
                    let matches = remaining.len() <= l.suffix.len()
                        && l.suffix.slice(0, remaining.len()) == remaining;
                    return Ok(if matches { Some(Node::Leaf(l)) } else { None });
                }
                Node::Branch(b) => {
                    let q = b.prefix.common_prefix_len(&remaining);
                    if q == remaining.len() {
                        return Ok(Some(Node::Branch(b)));
                    }
                    if q < b.prefix.len() {
                        return Ok(None);
                    }
                    let n = remaining.get(q);
                    if b.children[n as usize].is_empty() {
                        return Ok(None);
                    }
                    let child_remaining = remaining.suffix_from(q + 1);
                    let depth = PATH_NIBBLES - child_remaining.len();
                    current = materialize(&b.children[n as usize], depth, &*self.store).await?;
                    remaining = child_remaining;
                }
            }
        }
    }

    /// Materializes every `Ref` within `depth` levels of the root, bounded
    /// by [`TrieConfig::max_fetch_depth`].
    pub async fn fetch_children(&self, depth: usize) -> anyhow::Result<()> {
        let depth = depth.min(self.config.max_fetch_depth);
        if depth == 0 {
            return Ok(());
        }
        let root = self.root.read().clone();
        let new_root = fetch_children_rec(root, depth, 0, &*self.store).await?;
        *self.root.write() = new_root;
        Ok(())
    }

    /// Post-order traversal writing every not-yet-stored `Inline` node,
    /// replacing it with a `Ref` in its parent; the root is written last
    /// under the reserved root-pointer slot. Idempotent: a second call with
    /// no intervening mutation writes nothing new.
    pub async fn save(&self) -> anyhow::Result<()> {
        self.begin_mutation()?;
        let result = self.save_inner().await;
        self.end_mutation();
        result
    }

    async fn save_inner(&self) -> anyhow::Result<()> {
        let root = self.root.read().clone();
        let (new_root, count) = save_node(root, &*self.store).await?;
        let root_hash = new_root.hash();
        store_call(
            self.store
                .set_root(if new_root.is_empty() {
                    None
                } else {
                    Some(root_hash)
                })
                .await,
        )?;
        debug!(root = %root_hash, items = count, "trie: saved");
        *self.root.write() = new_root;
        Ok(())
    }

    /// Builds a dual inclusion/exclusion proof for `key` against the
    /// current root.
    pub async fn prove(&self, key: &[u8]) -> anyhow::Result<Proof> {
        let root = self.root.read().clone();
        let (built, _outcome) = proof::prove(&root, &*self.store, key).await?;
        Ok(built)
    }
}

/// Materializes a child slot: `Empty` stays empty, `Inline` is cloned
/// as-is, `Ref` is fetched, decoded, and hash-checked. A decoded `Leaf`'s
/// `suffix` is recomputed from its own key and `depth` (the number of path
/// nibbles consumed to reach this position) rather than trusted from the
/// wire, since the canonical encoding does not carry it.
pub(crate) async fn materialize<S: Store>(
    slot: &ChildSlot,
    depth: usize,
    store: &S,
) -> anyhow::Result<Node> {
    match slot {
        ChildSlot::Empty => Ok(Node::Empty),
        ChildSlot::Inline(node) => Ok((**node).clone()),
        ChildSlot::Ref { hash, .. } => {
            let bytes = store_call(store.get(hash).await)?
                .ok_or_else(|| TrieError::corrupt(*hash, "missing from store"))?;
            let mut node = Node::decode(&bytes)
                .map_err(|e| TrieError::corrupt(*hash, format!("decode failed: {e}")))?;
            if let Node::Leaf(ref mut leaf) = node {
                let full_path = NibblePath::from_hash(&hash::path_of_key(&leaf.key));
                leaf.suffix = full_path.suffix_from(depth);
            }
            if node.hash() != *hash {
                return Err(TrieError::corrupt(*hash, "decoded content hash mismatch").into());
            }
            trace!(%hash, "trie: materialized node");
            Ok(node)
        }
    }
}

/// As [`materialize`], for callers that only inspect a node's key/value or
/// prefix/children — never its `suffix` — and so don't need a real `depth`
/// (the proof engine, which reconstructs hashes directly from stored key
/// paths, not from suffix bookkeeping).
pub(crate) async fn materialize_readonly<S: Store>(
    slot: &ChildSlot,
    store: &S,
) -> anyhow::Result<Node> {
    materialize(slot, 0, store).await
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

fn get_rec<'a, S: Store>(
    node: &'a Node,
    remaining: &'a NibblePath,
    key: &'a [u8],
    store: &'a S,
) -> BoxFuture<'a, anyhow::Result<Option<Vec<u8>>>> {
    Box::pin(async move {
        match node {
            Node::Empty => Ok(None),
            Node::Leaf(l) => Ok((l.key == key).then(|| l.value.clone())),
            Node::Branch(b) => {
                let q = b.prefix.common_prefix_len(remaining);
                if q < b.prefix.len() {
                    return Ok(None);
                }
                let n = remaining.get(q);
                if b.children[n as usize].is_empty() {
                    return Ok(None);
                }
                let child_remaining = remaining.suffix_from(q + 1);
                let child = materialize(&b.children[n as usize], 0, store).await?;
                get_rec(&child, &child_remaining, key, store).await
            }
        }
    })
}

fn insert_rec<'a, S: Store>(
    node: Node,
    remaining: &'a NibblePath,
    key: &'a [u8],
    value: &'a [u8],
    store: &'a S,
) -> BoxFuture<'a, anyhow::Result<Node>> {
    Box::pin(async move {
        match node {
            Node::Empty => Ok(Node::Leaf(LeafNode::new(
                key.to_vec(),
                value.to_vec(),
                remaining.clone(),
            ))),
            Node::Leaf(l) if l.key == key => Ok(Node::Leaf(LeafNode::new(
                key.to_vec(),
                value.to_vec(),
                l.suffix,
            ))),
            Node::Leaf(l) => {
                let p = l.suffix.common_prefix_len(remaining);
                let existing_nibble = l.suffix.get(p);
                let incoming_nibble = remaining.get(p);
                let existing_leaf =
                    LeafNode::new(l.key, l.value, l.suffix.suffix_from(p + 1));
                let incoming_leaf = LeafNode::new(
                    key.to_vec(),
                    value.to_vec(),
                    remaining.suffix_from(p + 1),
                );
                let mut children: [ChildSlot; 16] = std::array::from_fn(|_| ChildSlot::Empty);
                children[existing_nibble as usize] =
                    ChildSlot::Inline(Box::new(Node::Leaf(existing_leaf)));
                children[incoming_nibble as usize] =
                    ChildSlot::Inline(Box::new(Node::Leaf(incoming_leaf)));
                crate::node::ensure_branch_invariant(&children)?;
                Ok(Node::Branch(BranchNode::new(remaining.slice(0, p), children)))
            }
            Node::Branch(b) => {
                let q = b.prefix.common_prefix_len(remaining);
                if q == b.prefix.len() {
                    let n = remaining.get(q);
                    let child_remaining = remaining.suffix_from(q + 1);
                    let depth = PATH_NIBBLES - child_remaining.len();
                    let child = materialize(&b.children[n as usize], depth, store).await?;
                    let new_child = insert_rec(child, &child_remaining, key, value, store).await?;
                    let mut children = b.children;
                    children[n as usize] = ChildSlot::Inline(Box::new(new_child));
                    Ok(Node::Branch(BranchNode::new(b.prefix, children)))
                } else {
                    let existing_nibble = b.prefix.get(q);
                    let demoted = BranchNode::new(b.prefix.suffix_from(q + 1), b.children);
                    let incoming_nibble = remaining.get(q);
                    let incoming_leaf = LeafNode::new(
                        key.to_vec(),
                        value.to_vec(),
                        remaining.suffix_from(q + 1),
                    );
                    let mut children: [ChildSlot; 16] = std::array::from_fn(|_| ChildSlot::Empty);
                    children[existing_nibble as usize] =
                        ChildSlot::Inline(Box::new(Node::Branch(demoted)));
                    children[incoming_nibble as usize] =
                        ChildSlot::Inline(Box::new(Node::Leaf(incoming_leaf)));
                    crate::node::ensure_branch_invariant(&children)?;
                    Ok(Node::Branch(BranchNode::new(remaining.slice(0, q), children)))
                }
            }
        }
    })
}

fn delete_rec<'a, S: Store>(
    node: Node,
    remaining: &'a NibblePath,
    key: &'a [u8],
    store: &'a S,
) -> BoxFuture<'a, anyhow::Result<Node>> {
    Box::pin(async move {
        match node {
            Node::Empty => Ok(Node::Empty),
            Node::Leaf(l) => {
                if l.key == key {
                    Ok(Node::Empty)
                } else {
                    Ok(Node::Leaf(l))
                }
            }
            Node::Branch(b) => {
                let q = b.prefix.common_prefix_len(remaining);
                if q < b.prefix.len() {
                    return Ok(Node::Branch(b));
                }
                let n = remaining.get(q) as usize;
                if b.children[n].is_empty() {
                    return Ok(Node::Branch(b));
                }
                let child_remaining = remaining.suffix_from(q + 1);
                let depth = PATH_NIBBLES - child_remaining.len();
                let child = materialize(&b.children[n], depth, store).await?;
                let new_child = delete_rec(child, &child_remaining, key, store).await?;

                if !new_child.is_empty() {
                    let mut children = b.children;
                    children[n] = ChildSlot::Inline(Box::new(new_child));
                    return Ok(Node::Branch(BranchNode::new(b.prefix, children)));
                }

                let mut children = b.children;
                children[n] = ChildSlot::Empty;
                let live: Vec<u8> = (0u8..16)
                    .filter(|&i| !children[i as usize].is_empty())
                    .collect();

                match live.len() {
                    0 => {
                        warn!("trie: branch emptied by delete, collapsing to Empty");
                        Ok(Node::Empty)
                    }
                    1 => {
                        let other_nibble = live[0];
                        // `other_nibble` is a sibling of the removed child at
                        // the same tree depth, so the same `depth` applies.
                        let other = materialize(&children[other_nibble as usize], depth, store)
                            .await?;
                        trace!(nibble = other_nibble, "trie: collapsing branch into sole child");
                        match other {
                            Node::Branch(ob) => Ok(Node::Branch(BranchNode::new(
                                nibble::concat3(&b.prefix, other_nibble, &ob.prefix),
                                ob.children,
                            ))),
                            Node::Leaf(ol) => Ok(Node::Leaf(LeafNode::new(
                                ol.key,
                                ol.value,
                                nibble::concat3(&b.prefix, other_nibble, &ol.suffix),
                            ))),
                            Node::Empty => Err(TrieError::invariant(
                                "branch's sole other child materialized to Empty",
                            )
                            .into()),
                        }
                    }
                    _ => Ok(Node::Branch(BranchNode::new(b.prefix, children))),
                }
            }
        }
    })
}

fn fetch_children_rec<'a, S: Store>(
    node: Node,
    depth_remaining: usize,
    struct_depth: usize,
    store: &'a S,
) -> BoxFuture<'a, anyhow::Result<Node>> {
    Box::pin(async move {
        let Node::Branch(b) = node else {
            return Ok(node);
        };
        if depth_remaining == 0 {
            return Ok(Node::Branch(b));
        }
        let mut children = b.children;
        let child_depth = struct_depth + b.prefix.len() + 1;
        for i in 0..16 {
            if children[i].is_empty() {
                continue;
            }
            let materialized = materialize(&children[i], child_depth, store).await?;
            let recursed =
                fetch_children_rec(materialized, depth_remaining - 1, child_depth, store).await?;
            children[i] = ChildSlot::Inline(Box::new(recursed));
        }
        Ok(Node::Branch(BranchNode::new(b.prefix, children)))
    })
}

/// Persists `node`, recursing into `Inline` children first (post-order),
/// returning the node with every child now a `Ref` and the count of
/// leaves below it. Already-`Ref` children are left untouched — the source
/// of `save`'s idempotency.
fn save_node<S: Store>(node: Node, store: &S) -> BoxFuture<'_, anyhow::Result<(Node, u64)>> {
    Box::pin(async move {
        match node {
            Node::Empty => Ok((Node::Empty, 0)),
            Node::Leaf(l) => {
                let hash = l.hash();
                if !store_call(store.exists(&hash).await)? {
                    store_call(store.put(hash, Node::Leaf(l.clone()).encode()).await)?;
                }
                Ok((Node::Leaf(l), 1))
            }
            Node::Branch(b) => {
                let mut children = b.children;
                let mut total = 0u64;
                for i in 0..16 {
                    let inlined = match &children[i] {
                        ChildSlot::Empty => None,
                        ChildSlot::Ref { size, .. } => {
                            total += size.unwrap_or(0);
                            None
                        }
                        ChildSlot::Inline(child) => Some((**child).clone()),
                    };
                    if let Some(child) = inlined {
                        let (saved, count) = save_node(child, store).await?;
                        total += count;
                        children[i] = ChildSlot::Ref {
                            hash: saved.hash(),
                            size: Some(count),
                        };
                    }
                }
                let branch = BranchNode::new(b.prefix, children);
                let hash = branch.hash();
                if !store_call(store.exists(&hash).await)? {
                    store_call(store.put(hash, Node::Branch(branch.clone()).encode()).await)?;
                }
                Ok((Node::Branch(branch), total))
            }
        }
    })
}
