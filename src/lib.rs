// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! An authenticated key/value store backed by a radix-16 Patricia trie over
//! blake2b-256. Branch nodes are "Merkle-of-16" internal nodes generalized
//! to carry a variable-length nibble prefix rather than consuming exactly
//! one nibble per level, and proofs are Merkle Patricia Forestry-style
//! dual-purpose witnesses: the same step list verifies inclusion after an
//! insert and exclusion before it.
//!
//! - [`trie::Trie`] is the entry point: `get`/`insert`/`delete`/`child_at`,
//!   plus the paging operations `fetch_children`/`save`/`load` that move
//!   nodes between memory and the backing [`store::Store`].
//! - [`proof::Proof`] is the portable, serde-encodable witness produced by
//!   `Trie::prove` and checked standalone by [`proof::Proof::verify`], which
//!   needs no store and never errors.
//! - [`node`] and [`hash`] define the node model and hash oracle the rest of
//!   the crate is built on; [`nibble`] is the routing-address arithmetic
//!   both lean on.

pub mod error;
pub mod hash;
pub mod nibble;
pub mod node;
pub mod proof;
pub mod store;
pub mod trie;

pub use error::TrieError;
pub use hash::NodeHash;
pub use nibble::NibblePath;
pub use node::{BranchNode, ChildSlot, LeafNode, Node};
pub use proof::{Proof, ProofStep, ProveOutcome};
pub use store::{BatchOp, MemoryStore, Store};
pub use trie::{Trie, TrieConfig};
