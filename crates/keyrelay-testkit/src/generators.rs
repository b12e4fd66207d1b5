//! Proptest generators for property-based testing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use keyrelay_cdm::{KeyContainer, KeyType};
use keyrelay_core::{KeyEntry, Passkey, Privileges};
use proptest::prelude::*;

/// Any flag pair.
pub fn privileges() -> impl Strategy<Value = Privileges> {
    (any::<bool>(), any::<bool>()).prop_map(|(super_user, sudoer)| Privileges::new(super_user, sudoer))
}

/// A non-empty URL-safe passkey.
pub fn passkey() -> impl Strategy<Value = Passkey> {
    "[A-Za-z0-9_-]{8,43}".prop_map(Passkey::new)
}

/// Base64 of 1 to 256 arbitrary bytes.
pub fn pssh() -> impl Strategy<Value = String> {
    prop::collection::vec(any::<u8>(), 1..=256).prop_map(|bytes| STANDARD.encode(bytes))
}

pub fn key_type() -> impl Strategy<Value = KeyType> {
    prop_oneof![
        Just(KeyType::Signing),
        Just(KeyType::Content),
        Just(KeyType::KeyControl),
        Just(KeyType::OperatorSession),
        Just(KeyType::Entitlement),
    ]
}

pub fn key_container() -> impl Strategy<Value = KeyContainer> {
    (
        key_type(),
        prop::collection::vec(any::<u8>(), 1..=16),
        prop::collection::vec(any::<u8>(), 1..=32),
    )
        .prop_map(|(kind, kid, key)| KeyContainer::new(kind, kid, key))
}

/// Between 1 and 8 containers, at least one of them a content key.
pub fn license_keys() -> impl Strategy<Value = Vec<KeyContainer>> {
    (
        prop::collection::vec(key_container(), 0..8),
        prop::collection::vec(any::<u8>(), 1..=16),
        prop::collection::vec(any::<u8>(), 1..=32),
    )
        .prop_map(|(mut containers, kid, key)| {
            containers.push(KeyContainer::content(kid, key));
            containers
        })
}

/// A hex key entry as it appears in the escrow.
pub fn key_entry() -> impl Strategy<Value = KeyEntry> {
    (
        prop::collection::vec(any::<u8>(), 1..=16),
        prop::collection::vec(any::<u8>(), 1..=32),
    )
        .prop_map(|(kid, key)| KeyEntry::from_raw(&kid, &key))
}
