// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! Larger, seeded-random scenarios: insert many keys, then confirm every
//! one is retrievable and its inclusion proof verifies against the live
//! root. Complements the small, literal-value scenarios with coverage
//! across a much wider key space.

use authenticated_trie::{MemoryStore, Trie};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;

fn seeded_rng(seed: &[u8]) -> StdRng {
    assert!(seed.len() <= 32);
    let mut actual_seed = [0u8; 32];
    actual_seed[..seed.len()].copy_from_slice(seed);
    StdRng::from_seed(actual_seed)
}

fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
}

async fn many_keys_get_and_verify(seed: &[u8], num_keys: usize) {
    let mut rng = seeded_rng(seed);
    let trie = Trie::new(Arc::new(MemoryStore::new()));

    let mut kvs = Vec::with_capacity(num_keys);
    for _ in 0..num_keys {
        let key = random_bytes(&mut rng, 20);
        let value = random_bytes(&mut rng, 32);
        kvs.push((key, value));
    }

    for (k, v) in &kvs {
        trie.insert(k.clone(), v.clone()).await.unwrap();
    }

    let root = trie.root_hash();
    for (k, v) in &kvs {
        assert_eq!(trie.get(k).await.unwrap().as_ref(), Some(v));
        let proof = trie.prove(k).await.unwrap();
        assert_eq!(proof.verify(k, Some(v), true), root);
    }
}

#[tokio::test]
async fn one_thousand_random_keys_round_trip_and_prove() {
    many_keys_get_and_verify(&[1, 2, 3, 4], 1000).await;
}

/// A second seed exercises a different random shape of the trie (different
/// prefix-collision pattern), guarding against an implementation that only
/// happens to work for one particular key distribution.
#[tokio::test]
async fn another_seed_also_round_trips() {
    many_keys_get_and_verify(&[9, 9, 1, 7], 500).await;
}

/// Deleting half of a large random set, in a different random order than
/// insertion, must still leave every remaining key retrievable and every
/// deleted key absent.
#[tokio::test]
async fn random_interleaved_delete_preserves_remaining_keys() {
    let mut rng = seeded_rng(&[5, 5, 5]);
    let trie = Trie::new(Arc::new(MemoryStore::new()));

    let mut kvs = Vec::with_capacity(400);
    for _ in 0..400 {
        let key = random_bytes(&mut rng, 16);
        let value = random_bytes(&mut rng, 16);
        kvs.push((key, value));
    }
    for (k, v) in &kvs {
        trie.insert(k.clone(), v.clone()).await.unwrap();
    }

    let mut to_delete: Vec<usize> = (0..kvs.len()).step_by(2).collect();
    // Shuffle deletion order independent of insertion order.
    for i in (1..to_delete.len()).rev() {
        let j = rng.gen_range(0..=i);
        to_delete.swap(i, j);
    }
    for &idx in &to_delete {
        trie.delete(&kvs[idx].0).await.unwrap();
    }

    for (idx, (k, v)) in kvs.iter().enumerate() {
        if to_delete.contains(&idx) {
            assert_eq!(trie.get(k).await.unwrap(), None);
        } else {
            assert_eq!(trie.get(k).await.unwrap().as_ref(), Some(v));
        }
    }
}
