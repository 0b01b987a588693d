// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Nibble paths: the 64-nibble routing address derived from `H(key)`, and
//! the variable-length prefixes branches carry. Stored unpacked (one nibble
//! per `u8`) in memory for easy slicing; packed to the canonical
//! length-prefixed form only at hash-preimage and on-disk-encoding time.

use crate::hash::NodeHash;
use byteorder::WriteBytesExt;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of nibbles in a full path (64 nibbles = 32 bytes = 256
/// bits, per [`crate::hash::HASH_LEN`]).
pub const PATH_NIBBLES: usize = 64;

/// An owned sequence of nibbles (each in `0..16`), most-significant first.
#[derive(Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct NibblePath(Vec<u8>);

impl NibblePath {
    pub fn new(nibbles: Vec<u8>) -> Self {
        debug_assert!(nibbles.iter().all(|&n| n < 16));
        NibblePath(nibbles)
    }

    pub fn empty() -> Self {
        NibblePath(Vec::new())
    }

    /// The full 64-nibble path of a hashed key.
    pub fn from_hash(hash: &NodeHash) -> Self {
        let mut nibbles = Vec::with_capacity(PATH_NIBBLES);
        for i in 0..PATH_NIBBLES {
            nibbles.push(hash.nibble_at(i));
        }
        NibblePath(nibbles)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> u8 {
        self.0[i]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// The sub-path `self[from..]`.
    pub fn suffix_from(&self, from: usize) -> NibblePath {
        NibblePath(self.0[from..].to_vec())
    }

    /// The sub-path `self[from..to]`.
    pub fn slice(&self, from: usize, to: usize) -> NibblePath {
        NibblePath(self.0[from..to].to_vec())
    }

    /// Length of the longest common prefix between `self` and `other`.
    pub fn common_prefix_len(&self, other: &NibblePath) -> usize {
        self.0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count()
    }

    /// Packs this nibble sequence into the canonical length-prefixed form
    /// used both as a hash preimage and in the on-disk branch encoding: one
    /// length byte followed by `ceil(len / 2)` bytes, each packing two
    /// nibbles high-nibble-first; an odd final nibble is left-justified
    /// with a trailing zero nibble.
    pub fn pack(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.0.len().div_ceil(2));
        out.write_u8(self.0.len() as u8).expect("infallible");
        for pair in self.0.chunks(2) {
            let hi = pair[0];
            let lo = pair.get(1).copied().unwrap_or(0);
            out.push((hi << 4) | lo);
        }
        out
    }

    /// Inverse of [`NibblePath::pack`]. Returns the parsed path and the
    /// number of bytes consumed from `data`.
    pub fn unpack(data: &[u8]) -> anyhow::Result<(NibblePath, usize)> {
        anyhow::ensure!(!data.is_empty(), "nibble path: missing length byte");
        let count = data[0] as usize;
        let packed_len = count.div_ceil(2);
        anyhow::ensure!(
            data.len() >= 1 + packed_len,
            "nibble path: expected {} packed bytes, got {}",
            packed_len,
            data.len() - 1
        );
        let mut nibbles = Vec::with_capacity(count);
        for byte in data[1..1 + packed_len].iter() {
            nibbles.push(byte >> 4);
            nibbles.push(byte & 0x0f);
        }
        nibbles.truncate(count);
        Ok((NibblePath(nibbles), 1 + packed_len))
    }
}

/// `a ‖ [nibble] ‖ b`, used to rebuild a merged path when a branch collapses
/// into its sole surviving child on `delete`, prepending the parent's
/// prefix and selecting nibble onto the child's own prefix/suffix.
pub fn concat3(a: &NibblePath, nibble: u8, b: &NibblePath) -> NibblePath {
    debug_assert!(nibble < 16);
    let mut out = Vec::with_capacity(a.len() + 1 + b.len());
    out.extend_from_slice(&a.0);
    out.push(nibble);
    out.extend_from_slice(&b.0);
    NibblePath(out)
}

impl From<NibblePath> for String {
    fn from(path: NibblePath) -> String {
        path.to_string()
    }
}

impl TryFrom<String> for NibblePath {
    type Error = anyhow::Error;

    fn try_from(s: String) -> anyhow::Result<Self> {
        let mut nibbles = Vec::with_capacity(s.len());
        for c in s.chars() {
            let n = c
                .to_digit(16)
                .ok_or_else(|| anyhow::anyhow!("invalid nibble character: {c:?}"))?;
            nibbles.push(n as u8);
        }
        Ok(NibblePath(nibbles))
    }
}

impl fmt::Debug for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for n in &self.0 {
            write!(f, "{n:x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for NibblePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
