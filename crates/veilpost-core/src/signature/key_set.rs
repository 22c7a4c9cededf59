//! Published verification key sets
//!
//! A key set is the JSON document `{"keys": [{kid, kty, crv, x, alg, use}]}`
//! a sender publishes at a URI. Only Ed25519 OKP entries are usable here.

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use veilpost_crypto::encoding;

use super::error::SignatureError;

/// Key set document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetDocument {
    /// Published keys.
    pub keys: Vec<JsonWebKey>,
}

/// One key set entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key identifier.
    pub kid: String,
    /// Key type, `OKP` for Ed25519.
    pub kty: String,
    /// Curve, `Ed25519`.
    pub crv: String,
    /// Public key, base64url.
    pub x: String,
    /// Intended algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Intended use, `sig` when present.
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
}

impl JsonWebKey {
    /// Entry for an Ed25519 verifying key.
    pub fn from_ed25519(kid: impl Into<String>, key: &VerifyingKey) -> Self {
        Self {
            kid: kid.into(),
            kty: "OKP".to_string(),
            crv: "Ed25519".to_string(),
            x: encoding::encode(key.as_bytes()),
            alg: Some("EdDSA".to_string()),
            key_use: Some("sig".to_string()),
        }
    }

    /// Decode this entry as an Ed25519 verifying key.
    ///
    /// # Errors
    ///
    /// - `SignatureError::InvalidKey` if the type, curve, or use is wrong, or
    ///   `x` is not a valid 32-byte point
    pub fn to_verifying_key(&self) -> Result<VerifyingKey, SignatureError> {
        let invalid = |reason: &str| SignatureError::InvalidKey {
            key_id: self.kid.clone(),
            reason: reason.to_string(),
        };

        if self.kty != "OKP" {
            return Err(invalid(&format!("unsupported kty {}", self.kty)));
        }
        if self.crv != "Ed25519" {
            return Err(invalid(&format!("unsupported crv {}", self.crv)));
        }
        if self.key_use.as_deref().is_some_and(|u| u != "sig") {
            return Err(invalid("key not intended for signatures"));
        }

        let bytes = encoding::decode_key(&self.x).map_err(|err| invalid(&err.to_string()))?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| invalid("not a valid Ed25519 point"))
    }
}

impl KeySetDocument {
    /// Entry with the given `kid`.
    pub fn find(&self, key_id: &str) -> Option<&JsonWebKey> {
        self.keys.iter().find(|key| key.kid == key_id)
    }

    /// Verifying key for `key_id`.
    ///
    /// # Errors
    ///
    /// - `SignatureError::KeyNotFound` if no entry has this `kid`
    /// - `SignatureError::InvalidKey` if the entry is not a usable Ed25519 key
    pub fn verifying_key(&self, key_id: &str) -> Result<VerifyingKey, SignatureError> {
        self.find(key_id)
            .ok_or_else(|| SignatureError::KeyNotFound { key_id: key_id.to_string() })?
            .to_verifying_key()
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;

    #[test]
    fn parses_published_document() {
        let key = SigningKey::from_bytes(&[3u8; 32]).verifying_key();
        let json = format!(
            r#"{{"keys":[{{"kid":"k1","kty":"OKP","crv":"Ed25519","x":"{}","alg":"EdDSA","use":"sig"}}]}}"#,
            encoding::encode(key.as_bytes())
        );

        let doc: KeySetDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.verifying_key("k1").unwrap(), key);
        assert_eq!(
            doc.verifying_key("k2"),
            Err(SignatureError::KeyNotFound { key_id: "k2".to_string() })
        );
    }

    #[test]
    fn rejects_wrong_key_type() {
        let key = SigningKey::from_bytes(&[3u8; 32]).verifying_key();
        let mut entry = JsonWebKey::from_ed25519("k1", &key);
        entry.kty = "EC".to_string();
        assert!(matches!(entry.to_verifying_key(), Err(SignatureError::InvalidKey { .. })));

        let mut entry = JsonWebKey::from_ed25519("k1", &key);
        entry.crv = "X25519".to_string();
        assert!(matches!(entry.to_verifying_key(), Err(SignatureError::InvalidKey { .. })));

        let mut entry = JsonWebKey::from_ed25519("k1", &key);
        entry.key_use = Some("enc".to_string());
        assert!(matches!(entry.to_verifying_key(), Err(SignatureError::InvalidKey { .. })));

        let mut entry = JsonWebKey::from_ed25519("k1", &key);
        entry.x = encoding::encode(&[1u8; 31]);
        assert!(matches!(entry.to_verifying_key(), Err(SignatureError::InvalidKey { .. })));
    }

    #[test]
    fn serialized_entry_uses_wire_names() {
        let key = SigningKey::from_bytes(&[3u8; 32]).verifying_key();
        let value = serde_json::to_value(JsonWebKey::from_ed25519("k1", &key)).unwrap();

        assert_eq!(value["use"], "sig");
        assert_eq!(value["kty"], "OKP");
        assert!(value.get("key_use").is_none());
    }
}
