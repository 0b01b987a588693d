// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! The proof engine: walks the same path `get` would, recording
//! at each branch the Merkle neighbors needed to fold a single leaf back up
//! to the branch's root, and the "sole extant sibling" structure at the
//! point where the walk diverges from the queried key. A `Proof` witnesses
//! both inclusion (verified against the root *with* the key) and exclusion
//! (verified against the root *without* it) from the same step list.

use crate::error::TrieError;
use crate::hash::{self, NodeHash};
use crate::nibble::{self, NibblePath};
use crate::node::{ChildSlot, Node};
use crate::store::Store;
use crate::trie::materialize_readonly;
use serde::{Deserialize, Serialize};

/// A single step of a proof, ordered shallowest (nearest the root) first.
/// Every variant carries `skip`, the number of path nibbles consumed by the
/// branch's `prefix` before the nibble that selects deeper into the trie.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProofStep {
    /// An ordinary branch on the path: `neighbors` are the 4 sibling hashes
    /// (one per level of the Merkle-of-16) needed to fold the child-on-path
    /// hash back up to this branch's own children-root.
    Branch {
        skip: u8,
        neighbors: [NodeHash; 4],
    },
    /// The walk diverged inside a branch's prefix: the key, if inserted,
    /// would split the branch. `neighbor` describes the branch as it
    /// currently stands (used as-is in exclusion mode) together with enough
    /// of its shape to recompute its hash *demoted* under a shortened
    /// prefix (used in inclusion mode, where the split has happened).
    Fork { skip: u8, neighbor: ForkNeighbor },
    /// The branch on the path has exactly two children, one of them the
    /// queried (existing) leaf: `neighbor` is the other, surviving branch
    /// that `delete` would collapse this node into. Inverse of `Fork`: used
    /// as-is in inclusion mode (the branch, unmerged, is the real current
    /// state), recomputed *merged* with this branch's prefix in exclusion
    /// mode (the collapsed shape `delete` would produce).
    Collapse {
        skip: u8,
        neighbor: CollapseNeighbor,
    },
    /// The walk ended at an existing leaf whose key differs from the one
    /// queried. Also covers the branch-collapses-into-a-leaf case: a leaf's
    /// hash never depends on its position, so collapsing changes nothing
    /// a verifier needs to recompute.
    Leaf { skip: u8, neighbor: LeafNeighbor },
}

impl ProofStep {
    fn skip(&self) -> u8 {
        match self {
            ProofStep::Branch { skip, .. } => *skip,
            ProofStep::Fork { skip, .. } => *skip,
            ProofStep::Collapse { skip, .. } => *skip,
            ProofStep::Leaf { skip, .. } => *skip,
        }
    }
}

/// The single extant subtree a [`ProofStep::Fork`] step witnesses. `prefix`
/// and `children_root` describe the neighbor with its prefix-dependence
/// factored out (`hash = H(pack(prefix) ‖ children_root)`), which is what
/// lets the verifier recompute the neighbor's hash under a *different*
/// (demoted) prefix in inclusion mode, while `hash` is the neighbor's real,
/// currently-stored hash, used directly in exclusion mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ForkNeighbor {
    pub nibble: u8,
    pub prefix: NibblePath,
    pub children_root: NodeHash,
    pub hash: NodeHash,
}

/// The surviving sibling branch a [`ProofStep::Collapse`] step witnesses,
/// in its own current, unmerged shape. `own_prefix` and `children_root`
/// let the verifier recompute this branch's hash *merged* with the parent
/// branch's prefix and selecting nibble (`nibble::concat3`) for exclusion
/// mode; `hash` is its real, currently-stored hash, used directly (paired
/// with the target leaf) in inclusion mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CollapseNeighbor {
    pub nibble: u8,
    pub own_prefix: NibblePath,
    pub children_root: NodeHash,
    pub hash: NodeHash,
}

/// The existing, differently-keyed leaf a [`ProofStep::Leaf`] step
/// witnesses. A leaf's hash never depends on its position in the trie, so
/// no analogue of `ForkNeighbor::children_root` is needed here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeafNeighbor {
    pub key_path: NodeHash,
    pub value_hash: NodeHash,
}

/// An inclusion-or-exclusion proof for one key. Self-contained: verifying
/// it needs only the claimed root hash and, for inclusion, the value.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Proof {
    pub steps: Vec<ProofStep>,
}

impl Proof {
    /// A compact binary form isn't provided; this crate ships the JSON
    /// rewrap as a trivial higher-level encoding instead.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| TrieError::malformed(format!("invalid proof JSON: {e}")).into())
    }

    /// Reconstructs the implied root hash by folding the steps from the
    /// deepest back to the root. Total: an ill-formed `(key, value,
    /// including_item)` combination just yields a hash that will not match
    /// any real root, never an error.
    pub fn verify(&self, key: &[u8], value: Option<&[u8]>, including_item: bool) -> NodeHash {
        debug_assert!(
            !including_item || value.is_some(),
            "inclusion verification requires a value"
        );
        let path = hash::path_of_key(key);

        if self.steps.is_empty() {
            // Empty trie, or a trie holding exactly this one key at the
            // root with no branch wrapper at all.
            return if including_item {
                hash::leaf_hash(path, value.unwrap_or(&[]))
            } else {
                NodeHash::ZERO
            };
        }

        let mut consumed_before = vec![0u32; self.steps.len()];
        for i in 0..self.steps.len() - 1 {
            consumed_before[i + 1] = consumed_before[i] + self.steps[i].skip() as u32 + 1;
        }

        let target_hash = if including_item {
            hash::leaf_hash(path, value.unwrap_or(&[]))
        } else {
            NodeHash::ZERO
        };

        let last = self.steps.len() - 1;
        let mut current = match &self.steps[last] {
            ProofStep::Branch { skip, neighbors } => {
                let n = path.nibble_at(consumed_before[last] as usize + *skip as usize);
                let children_root = hash::fold_merkle16(n, neighbors, target_hash);
                let prefix = path_slice(path, consumed_before[last], *skip);
                branch_hash_of(&prefix, children_root)
            }
            ProofStep::Fork { skip, neighbor } => {
                fold_fork(path, consumed_before[last], *skip, neighbor, target_hash, including_item)
            }
            ProofStep::Collapse { skip, neighbor } => fold_collapse(
                path,
                consumed_before[last],
                *skip,
                neighbor,
                target_hash,
                including_item,
            ),
            ProofStep::Leaf { skip, neighbor } => {
                fold_leaf(path, consumed_before[last], *skip, neighbor, target_hash, including_item)
            }
        };

        // `current` is already a full node hash at this point — the deepest
        // frame above wraps its own children-root with its own prefix
        // regardless of which step variant it was. Everything shallower
        // than it is necessarily an ordinary `Branch` step (the walk that
        // produces a proof stops as soon as it diverges from the queried
        // key, so `Fork`/`Collapse`/`Leaf` are only ever the deepest step).
        for i in (0..last).rev() {
            let skip = self.steps[i].skip();
            let prefix = path_slice(path, consumed_before[i], skip);
            match &self.steps[i] {
                ProofStep::Branch { neighbors, .. } => {
                    let n = path.nibble_at(consumed_before[i] as usize + skip as usize);
                    let children_root = hash::fold_merkle16(n, neighbors, current);
                    current = branch_hash_of(&prefix, children_root);
                }
                // Fork/Collapse/Leaf steps are only ever the deepest (last)
                // step: the walk that produces a proof stops as soon as it
                // diverges from the queried key.
                _ => unreachable!(
                    "Fork/Collapse/Leaf step found above the deepest proof frame"
                ),
            }
        }
        current
    }
}

fn path_slice(path: NodeHash, start: u32, len: u8) -> NibblePath {
    let nibbles = (0..len as u32).map(|i| path.nibble_at((start + i) as usize)).collect();
    NibblePath::new(nibbles)
}

fn branch_hash_of(prefix: &NibblePath, children_root: NodeHash) -> NodeHash {
    let mut preimage = prefix.pack();
    preimage.extend_from_slice(children_root.as_bytes());
    hash::hash_bytes(&preimage)
}

#[allow(clippy::too_many_arguments)]
fn fold_fork(
    path: NodeHash,
    consumed_before: u32,
    skip: u8,
    neighbor: &ForkNeighbor,
    target_hash: NodeHash,
    including_item: bool,
) -> NodeHash {
    if !including_item {
        return neighbor.hash;
    }
    let demoted_hash = branch_hash_of(&neighbor.prefix, neighbor.children_root);
    let target_nibble = path.nibble_at(consumed_before as usize + skip as usize);
    let children_root =
        hash::merkle16_root_of_pair(neighbor.nibble, demoted_hash, target_nibble, target_hash);
    let matched = path_slice(path, consumed_before, skip);
    branch_hash_of(&matched, children_root)
}

#[allow(clippy::too_many_arguments)]
fn fold_collapse(
    path: NodeHash,
    consumed_before: u32,
    skip: u8,
    neighbor: &CollapseNeighbor,
    target_hash: NodeHash,
    including_item: bool,
) -> NodeHash {
    let matched = path_slice(path, consumed_before, skip);
    if including_item {
        // The branch as it currently stands: the queried leaf and the
        // neighbor coexist, neither merged nor demoted.
        let target_nibble = path.nibble_at(consumed_before as usize + skip as usize);
        let children_root = hash::merkle16_root_of_pair(
            neighbor.nibble,
            neighbor.hash,
            target_nibble,
            target_hash,
        );
        branch_hash_of(&matched, children_root)
    } else {
        // Collapsed: the parent's prefix and selecting nibble prepend onto
        // the neighbor's own prefix, mirroring a delete-time collapse.
        let merged_prefix = nibble::concat3(&matched, neighbor.nibble, &neighbor.own_prefix);
        branch_hash_of(&merged_prefix, neighbor.children_root)
    }
}

#[allow(clippy::too_many_arguments)]
fn fold_leaf(
    path: NodeHash,
    consumed_before: u32,
    skip: u8,
    neighbor: &LeafNeighbor,
    target_hash: NodeHash,
    including_item: bool,
) -> NodeHash {
    let existing_hash = hash::leaf_hash_from_value_hash(neighbor.key_path, neighbor.value_hash);
    if !including_item {
        return existing_hash;
    }
    let depth = consumed_before as usize + skip as usize;
    let existing_nibble = neighbor.key_path.nibble_at(depth);
    let target_nibble = path.nibble_at(depth);
    let children_root =
        hash::merkle16_root_of_pair(existing_nibble, existing_hash, target_nibble, target_hash);
    let matched = path_slice(path, consumed_before, skip);
    branch_hash_of(&matched, children_root)
}

/// Whether the walk that produced a proof found the queried key.
#[derive(Debug, Eq, PartialEq)]
pub enum ProveOutcome {
    Found,
    Absent,
}

/// Walks from `root` towards `key`, recording proof steps along the way.
pub(crate) async fn prove<S: Store>(
    root: &Node,
    store: &S,
    key: &[u8],
) -> anyhow::Result<(Proof, ProveOutcome)> {
    let path = hash::path_of_key(key);
    let remaining = NibblePath::from_hash(&path);
    let mut steps = Vec::new();
    let outcome = walk(root, &remaining, key, store, &mut steps).await?;
    Ok((Proof { steps }, outcome))
}

fn walk<'a, S: Store>(
    node: &'a Node,
    remaining: &'a NibblePath,
    key: &'a [u8],
    store: &'a S,
    steps: &'a mut Vec<ProofStep>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<ProveOutcome>> + Send + 'a>>
{
    Box::pin(async move {
        match node {
            Node::Empty => Ok(ProveOutcome::Absent),
            Node::Leaf(l) => {
                if l.key == key {
                    Ok(ProveOutcome::Found)
                } else {
                    let skip = l.suffix.common_prefix_len(remaining);
                    steps.push(ProofStep::Leaf {
                        skip: skip as u8,
                        neighbor: LeafNeighbor {
                            key_path: hash::path_of_key(&l.key),
                            value_hash: hash::hash_bytes(&l.value),
                        },
                    });
                    Ok(ProveOutcome::Absent)
                }
            }
            Node::Branch(b) => {
                let q = b.prefix.common_prefix_len(remaining);
                if q < b.prefix.len() {
                    steps.push(ProofStep::Fork {
                        skip: q as u8,
                        neighbor: ForkNeighbor {
                            nibble: b.prefix.get(q),
                            prefix: b.prefix.suffix_from(q + 1),
                            children_root: hash::merkle16_root(&b.child_hashes()),
                            hash: b.hash(),
                        },
                    });
                    return Ok(ProveOutcome::Absent);
                }

                let n = remaining.get(q);
                let child_remaining = remaining.suffix_from(q + 1);
                match &b.children[n as usize] {
                    ChildSlot::Empty => {
                        steps.push(ProofStep::Branch {
                            skip: q as u8,
                            neighbors: hash::merkle16_neighbors(&b.child_hashes(), n),
                        });
                        Ok(ProveOutcome::Absent)
                    }
                    slot => {
                        let child = materialize_readonly(slot, store).await?;
                        match child {
                            Node::Branch(_) => {
                                steps.push(ProofStep::Branch {
                                    skip: q as u8,
                                    neighbors: hash::merkle16_neighbors(&b.child_hashes(), n),
                                });
                                walk(&child, &child_remaining, key, store, steps).await
                            }
                            Node::Leaf(ref l) if l.key == key.to_vec() => {
                                if b.child_count() == 2 {
                                    push_collapse_neighbor(steps, b, n, store).await?;
                                } else {
                                    steps.push(ProofStep::Branch {
                                        skip: q as u8,
                                        neighbors: hash::merkle16_neighbors(&b.child_hashes(), n),
                                    });
                                }
                                Ok(ProveOutcome::Found)
                            }
                            Node::Leaf(ref l) => {
                                steps.push(ProofStep::Branch {
                                    skip: q as u8,
                                    neighbors: hash::merkle16_neighbors(&b.child_hashes(), n),
                                });
                                let skip = l.suffix.common_prefix_len(&child_remaining);
                                steps.push(ProofStep::Leaf {
                                    skip: skip as u8,
                                    neighbor: LeafNeighbor {
                                        key_path: hash::path_of_key(&l.key),
                                        value_hash: hash::hash_bytes(&l.value),
                                    },
                                });
                                Ok(ProveOutcome::Absent)
                            }
                            Node::Empty => Err(crate::error::TrieError::invariant(
                                "non-empty child slot materialized to Empty",
                            )
                            .into()),
                        }
                    }
                }
            }
        }
    })
}

async fn push_collapse_neighbor<S: Store>(
    steps: &mut Vec<ProofStep>,
    b: &crate::node::BranchNode,
    occupied_nibble: u8,
    store: &S,
) -> anyhow::Result<()> {
    let other_nibble = (0u8..16)
        .find(|&i| i != occupied_nibble && !b.children[i as usize].is_empty())
        .expect("branch invariant guarantees a second live child");
    let other = materialize_readonly(&b.children[other_nibble as usize], store).await?;
    match other {
        Node::Branch(ob) => steps.push(ProofStep::Collapse {
            skip: b.prefix.len() as u8,
            neighbor: CollapseNeighbor {
                nibble: other_nibble,
                own_prefix: ob.prefix.clone(),
                children_root: hash::merkle16_root(&ob.child_hashes()),
                hash: ob.hash(),
            },
        }),
        Node::Leaf(ol) => steps.push(ProofStep::Leaf {
            skip: b.prefix.len() as u8,
            neighbor: LeafNeighbor {
                key_path: hash::path_of_key(&ol.key),
                value_hash: hash::hash_bytes(&ol.value),
            },
        }),
        Node::Empty => {
            return Err(
                crate::error::TrieError::invariant("branch's sole other child is Empty").into(),
            );
        }
    }
    Ok(())
}
