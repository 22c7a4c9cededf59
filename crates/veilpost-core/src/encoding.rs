//! Serde adapters for base64url-encoded binary fields.
//!
//! Used as `#[serde(with = "...")]` on wire types so the in-memory
//! representation stays as fixed-size byte arrays.

/// `Vec<u8>` as unpadded base64url.
pub mod b64 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use veilpost_crypto::encoding;

    /// Serialize bytes.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encoding::encode(bytes))
    }

    /// Deserialize bytes.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        encoding::decode(&text).map_err(D::Error::custom)
    }
}

/// `[u8; N]` as unpadded base64url.
pub mod b64_array {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};
    use veilpost_crypto::encoding;

    /// Serialize a fixed-size array.
    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encoding::encode(bytes))
    }

    /// Deserialize a fixed-size array, rejecting any other length.
    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let text = String::deserialize(deserializer)?;
        encoding::decode_array::<N>(&text).map_err(D::Error::custom)
    }
}

/// `Vec<[u8; 32]>` as a list of base64url strings.
pub mod b64_keys {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::SerializeSeq};
    use veilpost_crypto::{KEY_SIZE, encoding};

    /// Serialize a key list.
    pub fn serialize<S: Serializer>(
        keys: &[[u8; KEY_SIZE]],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(&encoding::encode(key))?;
        }
        seq.end()
    }

    /// Deserialize a key list.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<[u8; KEY_SIZE]>, D::Error> {
        let texts = Vec::<String>::deserialize(deserializer)?;
        texts.iter().map(|text| encoding::decode_key(text).map_err(D::Error::custom)).collect()
    }
}

/// `Vec<Option<[u8; 32]>>` as a list of base64url strings or nulls.
pub mod b64_optional_keys {
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _, ser::SerializeSeq};
    use veilpost_crypto::{KEY_SIZE, encoding};

    /// Serialize a list of optional keys.
    pub fn serialize<S: Serializer>(
        keys: &[Option<[u8; KEY_SIZE]>],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(&key.as_ref().map(|k| encoding::encode(k)))?;
        }
        seq.end()
    }

    /// Deserialize a list of optional keys.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Option<[u8; KEY_SIZE]>>, D::Error> {
        let texts = Vec::<Option<String>>::deserialize(deserializer)?;
        texts
            .iter()
            .map(|text| {
                text.as_deref()
                    .map(|t| encoding::decode_key(t).map_err(D::Error::custom))
                    .transpose()
            })
            .collect()
    }
}
