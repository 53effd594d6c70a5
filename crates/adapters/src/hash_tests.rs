// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn hashes_match_known_sha256_of_empty_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.svs");
    tokio::fs::write(&path, b"").await.unwrap();

    let hash = Sha256Hasher.hash_file(&path).await.unwrap();
    assert_eq!(
        hash.to_hex(),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85"
    );
}

#[tokio::test]
async fn hash_is_deterministic_across_repeated_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slide.svs");
    tokio::fs::write(&path, vec![7u8; 5 * 1024 * 1024]).await.unwrap();

    let a = Sha256Hasher.hash_file(&path).await.unwrap();
    let b = Sha256Hasher.hash_file(&path).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn missing_file_is_a_read_error() {
    let err = Sha256Hasher.hash_file(std::path::Path::new("/nonexistent/slide.svs")).await;
    assert!(matches!(err, Err(HashError::Read { .. })));
}

#[tokio::test]
async fn fake_hasher_returns_seeded_value() {
    let fake = FakeHasher::new();
    let seeded: Sha256Hex =
        "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff".parse().unwrap();
    fake.seed("/data/slide.svs", seeded.clone());
    let got = fake.hash_file(std::path::Path::new("/data/slide.svs")).await.unwrap();
    assert_eq!(got, seeded);
}
