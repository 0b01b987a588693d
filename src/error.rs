// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error kinds for the trie. Fallible public APIs return `anyhow::Result`;
//! `TrieError` is the typed core that call sites match on when they need to
//! distinguish "reload and retry" from "this is a bug".

use crate::hash::NodeHash;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrieError {
    /// The backing store failed an operation. The caller should reload the
    /// trie from the store rather than trust in-memory state.
    #[error("backing store is unavailable: {source}")]
    StoreUnavailable {
        #[source]
        source: anyhow::Error,
    },

    /// A second mutation (`insert`/`delete`/`save`) was attempted on this
    /// handle while one was already in flight. Fatal for the handle.
    #[error("a mutation is already in flight on this trie handle")]
    ConcurrentMutation,

    /// A fetched blob failed to decode, or its decoded content does not
    /// hash to the key under which it was stored.
    #[error("corrupt node at {hash}: {reason}")]
    CorruptNode { hash: NodeHash, reason: String },

    /// A branch with fewer than two live children was observed, or two
    /// distinct keys hashed to the same 64-nibble path.
    #[error("invariant violation: {detail}")]
    InvariantViolation { detail: String },

    /// A proof's wire encoding could not be parsed into a well-formed step
    /// list (non-inclusion proofs that merely fail to match a root are not
    /// an error — see [`crate::proof::Proof::verify`]).
    #[error("malformed proof: {detail}")]
    ProofMalformed { detail: String },
}

impl TrieError {
    pub fn invariant(detail: impl Into<String>) -> Self {
        TrieError::InvariantViolation {
            detail: detail.into(),
        }
    }

    pub fn corrupt(hash: NodeHash, reason: impl Into<String>) -> Self {
        TrieError::CorruptNode {
            hash,
            reason: reason.into(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        TrieError::ProofMalformed {
            detail: detail.into(),
        }
    }
}
