// Copyright (c) Authenticated Trie Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios driven entirely through the public API against a
//! fresh `MemoryStore` per test.

use authenticated_trie::{MemoryStore, NodeHash, Trie};
use std::sync::Arc;

fn v(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

fn six_fruit_pairs() -> Vec<(Vec<u8>, Vec<u8>)> {
    vec![
        (v("apple"), v("🍎")),
        (v("blueberry"), v("🫐")),
        (v("cherries"), v("🍒")),
        (v("grapes"), v("🍇")),
        (v("tangerine"), v("🍊")),
        (v("tomato"), v("🍅")),
    ]
}

/// The root hash is a pure function of the set of pairs inserted,
/// independent of insertion order. The literal value below is pinned as a
/// regression anchor for this exact six-item set, on top of the
/// order-independence check.
#[tokio::test]
async fn six_item_root_is_order_independent() {
    let pairs = six_fruit_pairs();

    let forward = Trie::new(Arc::new(MemoryStore::new()));
    for (k, val) in pairs.clone() {
        forward.insert(k, val).await.unwrap();
    }

    assert_eq!(
        forward.root_hash().to_string(),
        "86d2fe377c9a93750b0140b5320b0b57bde06e19115ab8ba4116503e6a6c8562"
    );

    let mut shuffled = pairs.clone();
    shuffled.rotate_left(2);
    let rotated = Trie::new(Arc::new(MemoryStore::new()));
    for (k, val) in shuffled {
        rotated.insert(k, val).await.unwrap();
    }

    assert_eq!(forward.root_hash(), rotated.root_hash());
    assert_ne!(forward.root_hash(), NodeHash::ZERO);
}

#[tokio::test]
async fn get_hits_and_misses() {
    let trie = Trie::new(Arc::new(MemoryStore::new()));
    for (k, val) in six_fruit_pairs() {
        trie.insert(k, val).await.unwrap();
    }

    assert_eq!(trie.get(b"cherries").await.unwrap(), Some(v("🍒")));
    assert_eq!(trie.get(b"banana").await.unwrap(), None);
}

/// The dual inclusion/exclusion semantics of a single proof across an
/// insert: the same proof verifies the root before the key existed and the
/// root after it was inserted with a given value.
#[tokio::test]
async fn proof_witnesses_both_sides_of_an_insert() {
    let trie = Trie::new(Arc::new(MemoryStore::new()));
    for (k, val) in six_fruit_pairs() {
        trie.insert(k, val).await.unwrap();
    }
    let root_before = trie.root_hash();

    let tangerine_proof = trie.prove(b"tangerine").await.unwrap();
    assert_eq!(
        tangerine_proof.verify(b"tangerine", Some(&v("🍊")), true),
        root_before
    );

    trie.insert(v("banana"), v("🍌")).await.unwrap();
    let root_after = trie.root_hash();

    let banana_proof = trie.prove(b"banana").await.unwrap();
    assert_eq!(banana_proof.verify(b"banana", None, false), root_before);
    assert_eq!(
        banana_proof.verify(b"banana", Some(&v("🍌")), true),
        root_after
    );
}

#[tokio::test]
async fn insert_then_delete_returns_to_empty_root() {
    let trie = Trie::new(Arc::new(MemoryStore::new()));
    assert_eq!(trie.root_hash(), NodeHash::ZERO);
    trie.insert(v("apple"), v("🍎")).await.unwrap();
    trie.delete(b"apple").await.unwrap();
    assert_eq!(trie.root_hash(), NodeHash::ZERO);
}

#[tokio::test]
async fn save_load_round_trip() {
    let store = Arc::new(MemoryStore::new());
    let trie = Trie::new(store.clone());
    for (k, val) in six_fruit_pairs() {
        trie.insert(k, val).await.unwrap();
    }
    let root_before = trie.root_hash();
    trie.save().await.unwrap();
    drop(trie);

    let loaded = Trie::load(store).await.unwrap();
    assert_eq!(loaded.root_hash(), root_before);
    assert_eq!(loaded.get(b"grapes").await.unwrap(), Some(v("🍇")));
}

/// `fetch_children` then `save` is a no-op on the root hash, and every
/// internal node lands in the store exactly once.
#[tokio::test]
async fn fetch_children_then_save_preserves_root_and_dedupes() {
    let store = Arc::new(MemoryStore::new());
    let trie = Trie::new(store.clone());
    for (k, val) in six_fruit_pairs() {
        trie.insert(k, val).await.unwrap();
    }
    let root_before = trie.root_hash();

    trie.fetch_children(usize::MAX).await.unwrap();
    assert_eq!(trie.root_hash(), root_before);

    trie.save().await.unwrap();
    assert_eq!(trie.root_hash(), root_before);
    let count_after_first_save = store.len();

    trie.save().await.unwrap();
    assert_eq!(store.len(), count_after_first_save);
}

/// No branch has fewer than two live children after any delete, exercised
/// across a sequence rather than a single call.
#[tokio::test]
async fn every_delete_preserves_branch_invariant() {
    let trie = Trie::new(Arc::new(MemoryStore::new()));
    let pairs = six_fruit_pairs();
    for (k, val) in pairs.clone() {
        trie.insert(k, val).await.unwrap();
    }
    for (k, _) in pairs {
        trie.delete(&k).await.unwrap();
    }
    assert_eq!(trie.root_hash(), NodeHash::ZERO);
}

/// Exclusion proof for a key that was never present in the trie at all
/// (not merely deleted).
#[tokio::test]
async fn absence_proof_for_a_never_inserted_key() {
    let trie = Trie::new(Arc::new(MemoryStore::new()));
    for (k, val) in six_fruit_pairs() {
        trie.insert(k, val).await.unwrap();
    }
    let proof = trie.prove(b"zucchini").await.unwrap();
    assert_eq!(proof.verify(b"zucchini", None, false), trie.root_hash());
}
