//! Key containers returned by a license decryption.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The role a key plays inside a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyType {
    Signing,
    Content,
    KeyControl,
    OperatorSession,
    Entitlement,
}

impl KeyType {
    pub fn is_content(self) -> bool {
        self == KeyType::Content
    }
}

/// One key from a decrypted license.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyContainer {
    pub kid: Bytes,
    pub key: Bytes,
    pub kind: KeyType,
}

impl KeyContainer {
    pub fn new(kind: KeyType, kid: impl Into<Bytes>, key: impl Into<Bytes>) -> Self {
        Self {
            kid: kid.into(),
            key: key.into(),
            kind,
        }
    }

    pub fn content(kid: impl Into<Bytes>, key: impl Into<Bytes>) -> Self {
        Self::new(KeyType::Content, kid, key)
    }
}

// Key material stays out of logs.
impl fmt::Debug for KeyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyContainer")
            .field("kind", &self.kind)
            .field("kid_len", &self.kid.len())
            .field("key_len", &self.key.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_type_wire_names() {
        let kinds: Vec<KeyType> =
            serde_json::from_str(r#"["SIGNING","CONTENT","KEY_CONTROL","OPERATOR_SESSION","ENTITLEMENT"]"#)
                .unwrap();
        assert_eq!(
            kinds,
            vec![
                KeyType::Signing,
                KeyType::Content,
                KeyType::KeyControl,
                KeyType::OperatorSession,
                KeyType::Entitlement,
            ]
        );
        assert!(KeyType::Content.is_content());
        assert!(!KeyType::Signing.is_content());
    }

    #[test]
    fn test_debug_hides_key() {
        let container = KeyContainer::content(vec![1u8; 16], vec![0xAB; 16]);
        let shown = format!("{:?}", container);
        assert!(shown.contains("Content"));
        assert!(!shown.contains("\\xab"));
    }
}
