// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

const HEX: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b85";

#[test]
fn roundtrips_through_hex() {
    let h: Sha256Hex = HEX.parse().unwrap();
    assert_eq!(h.to_hex(), HEX);
}

#[test]
fn equality_is_case_insensitive() {
    let lower: Sha256Hex = HEX.parse().unwrap();
    let upper: Sha256Hex = HEX.to_uppercase().parse().unwrap();
    assert_eq!(lower, upper);
}

#[test]
fn rejects_wrong_length() {
    assert!("deadbeef".parse::<Sha256Hex>().is_err());
}

#[test]
fn rejects_non_hex_characters() {
    let bad = "g".repeat(64);
    assert!(bad.parse::<Sha256Hex>().is_err());
}

#[test]
fn serde_roundtrip_is_lowercase() {
    let h: Sha256Hex = HEX.to_uppercase().parse().unwrap();
    let json = serde_json::to_string(&h).unwrap();
    assert_eq!(json, format!("\"{HEX}\""));
}
