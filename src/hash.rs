// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hash primitives for the trie: the blake2b-256 oracle, the leaf/branch
//! domain-separated combinators, and the fixed 4-level "Merkle-of-16"
//! reduction used inside every branch node.
//!
//! The overall shape mirrors [`crate::node`]'s predecessor in the Jellyfish
//! Merkle Tree family: a cached 32-byte digest type plus a couple of small
//! `SparseMerkle*` combinators. Unlike that design this reduction never
//! special-cases a subtree with a single live leaf — every level always
//! hashes a real pair, with empty slots contributing the all-zero sentinel,
//! exactly as specified.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of every digest produced by this module.
pub const HASH_LEN: usize = 32;

/// The all-zero sentinel. Never produced by `H`; denotes an empty
/// (sub-)trie or an empty slot inside a branch's 16 children.
pub const EMPTY_HASH: NodeHash = NodeHash([0u8; HASH_LEN]);

/// A 32-byte blake2b-256 digest, used uniformly for node hashes, key paths,
/// and value commitments.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeHash(#[serde(with = "hex_bytes")] pub [u8; HASH_LEN]);

impl NodeHash {
    pub const ZERO: NodeHash = EMPTY_HASH;

    pub fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        NodeHash(bytes)
    }

    /// Parses a digest out of a byte slice, failing if the length is wrong.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != HASH_LEN {
            return None;
        }
        let mut out = [0u8; HASH_LEN];
        out.copy_from_slice(bytes);
        Some(NodeHash(out))
    }

    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; HASH_LEN]
    }

    /// Reads the `i`-th nibble (4-bit group, most-significant-first within
    /// each byte) of this digest when it is treated as a 64-nibble path.
    pub fn nibble_at(&self, i: usize) -> u8 {
        let byte = self.0[i / 2];
        if i % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0f
        }
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

mod hex_bytes {
    use super::HASH_LEN;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; HASH_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; HASH_LEN], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)?;
        <[u8; HASH_LEN]>::try_from(bytes.as_slice())
            .map_err(|_| serde::de::Error::custom("expected 32 bytes"))
    }
}

/// The hash oracle `H`: blake2b with a 32-byte digest.
pub fn hash_bytes(data: &[u8]) -> NodeHash {
    let digest = blake2b_simd::Params::new()
        .hash_length(HASH_LEN)
        .to_state()
        .update(data)
        .finalize();
    NodeHash::from_slice(digest.as_bytes()).expect("blake2b-256 always yields 32 bytes")
}

fn hash_two(a: &NodeHash, b: &NodeHash) -> NodeHash {
    let mut buf = Vec::with_capacity(HASH_LEN * 2);
    buf.extend_from_slice(&a.0);
    buf.extend_from_slice(&b.0);
    hash_bytes(&buf)
}

/// The path of a key: `H(key)`, read as 64 hex nibbles, most-significant
/// nibble first.
pub fn path_of_key(key: &[u8]) -> NodeHash {
    hash_bytes(key)
}

/// `leaf_hash(path, value) = H(path ‖ H(value))`.
pub fn leaf_hash(path: NodeHash, value: &[u8]) -> NodeHash {
    let value_hash = hash_bytes(value);
    let mut buf = Vec::with_capacity(HASH_LEN * 2);
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(value_hash.as_bytes());
    hash_bytes(&buf)
}

/// `leaf_hash` when the value's hash has already been computed (used by the
/// proof engine, which only ever carries around `H(value)` for neighbors).
pub fn leaf_hash_from_value_hash(path: NodeHash, value_hash: NodeHash) -> NodeHash {
    let mut buf = Vec::with_capacity(HASH_LEN * 2);
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(value_hash.as_bytes());
    hash_bytes(&buf)
}

/// Reduces 16 child-slot hashes to a single root via a fixed 4-level binary
/// Merkle tree, pairing adjacent slots with `H(a ‖ b)`. This is always a
/// real hash at every level — an empty pair of empty slots still produces
/// `H(ZERO ‖ ZERO)`, never a short-circuited placeholder — which keeps the
/// 4-neighbor proof step a fixed 128 bytes regardless of how sparse the
/// branch is.
pub fn merkle16_root(children: &[NodeHash; 16]) -> NodeHash {
    let mut level = children.to_vec();
    while level.len() > 1 {
        level = level
            .chunks_exact(2)
            .map(|pair| hash_two(&pair[0], &pair[1]))
            .collect();
    }
    level[0]
}

/// Returns, for the given nibble (0..16) among 16 children, the 4 sibling
/// hashes — one per level of the binary reduction, ordered from the level
/// nearest the leaves (index 0) to the level nearest the root (index 3) —
/// that a verifier needs to fold the nibble's own hash back up to
/// [`merkle16_root`]'s output.
pub fn merkle16_neighbors(children: &[NodeHash; 16], nibble: u8) -> [NodeHash; 4] {
    let mut levels: Vec<Vec<NodeHash>> = Vec::with_capacity(5);
    levels.push(children.to_vec());
    let mut cur = children.to_vec();
    while cur.len() > 1 {
        let next: Vec<NodeHash> = cur
            .chunks_exact(2)
            .map(|pair| hash_two(&pair[0], &pair[1]))
            .collect();
        levels.push(next.clone());
        cur = next;
    }
    let mut neighbors = [NodeHash::ZERO; 4];
    let mut idx = nibble as usize;
    for (level, neighbor) in neighbors.iter_mut().enumerate() {
        let sibling_idx = idx ^ 1;
        *neighbor = levels[level][sibling_idx];
        idx /= 2;
    }
    neighbors
}

/// The inverse operation used during proof verification: folds a leaf's own
/// hash back up through 4 levels using the recorded neighbors and the
/// nibble that selected it, reproducing [`merkle16_root`]'s output without
/// needing the other 15 children.
pub fn fold_merkle16(nibble: u8, neighbors: &[NodeHash; 4], leaf_value: NodeHash) -> NodeHash {
    let mut cur = leaf_value;
    for (level, neighbor) in neighbors.iter().enumerate() {
        let bit = (nibble >> level) & 1;
        cur = if bit == 0 {
            hash_two(&cur, neighbor)
        } else {
            hash_two(neighbor, &cur)
        };
    }
    cur
}

/// Builds a 16-slot merkle16 root directly from two known non-empty slots,
/// used when reconstructing the brand-new virtual branch that an `insert`
/// would create at a `Fork`/`Leaf` proof step. Equivalent to calling
/// [`merkle16_root`] on an array that is `ZERO` everywhere except
/// `nibble_a` and `nibble_b`, but avoids allocating one.
pub fn merkle16_root_of_pair(
    nibble_a: u8,
    hash_a: NodeHash,
    nibble_b: u8,
    hash_b: NodeHash,
) -> NodeHash {
    debug_assert_ne!(nibble_a, nibble_b);
    let mut children = [NodeHash::ZERO; 16];
    children[nibble_a as usize] = hash_a;
    children[nibble_b as usize] = hash_b;
    merkle16_root(&children)
}
