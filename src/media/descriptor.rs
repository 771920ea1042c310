//! Attachment descriptors: the fields a message carries about its media.

use serde::{Deserialize, Serialize};

use super::MediaKind;

/// Read access to the attachment fields of a message.
pub trait MediaProvider {
    fn media_kind(&self) -> MediaKind;
    fn media_url(&self) -> Option<&str>;
    fn media_direct_path(&self) -> Option<&str>;
    fn media_key(&self) -> Option<&[u8]>;
    fn media_key_timestamp(&self) -> Option<i64>;
    /// SHA-256 of the plaintext.
    fn media_sha256(&self) -> Option<&[u8]>;
    /// SHA-256 of `ciphertext || mac`.
    fn media_enc_sha256(&self) -> Option<&[u8]>;
    fn media_size(&self) -> Option<u64>;

    /// HKDF info string used for the media key.
    fn media_key_name(&self) -> Option<&str> {
        self.media_kind().key_name()
    }

    fn is_inflatable(&self) -> bool {
        self.media_kind().is_inflatable()
    }
}

/// Write access, used to fill a descriptor after an upload.
pub trait MediaProviderMut: MediaProvider {
    fn set_media_url(&mut self, url: Option<String>);
    fn set_media_direct_path(&mut self, direct_path: Option<String>);
    fn set_media_key(&mut self, key: Option<Vec<u8>>);
    fn set_media_key_timestamp(&mut self, timestamp: Option<i64>);
    fn set_media_sha256(&mut self, digest: Option<Vec<u8>>);
    fn set_media_enc_sha256(&mut self, digest: Option<Vec<u8>>);
    fn set_media_size(&mut self, size: Option<u64>);
}

/// Plain attachment descriptor. Byte fields serialize as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_path: Option<String>,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub media_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_key_timestamp: Option<i64>,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub file_sha256: Option<Vec<u8>>,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub file_enc_sha256: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_length: Option<u64>,
}

impl MediaDescriptor {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            kind,
            url: None,
            direct_path: None,
            media_key: None,
            media_key_timestamp: None,
            file_sha256: None,
            file_enc_sha256: None,
            file_length: None,
        }
    }

    pub fn with_media_key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.media_key = Some(key.into());
        self
    }

    pub fn with_file_sha256(mut self, digest: impl Into<Vec<u8>>) -> Self {
        self.file_sha256 = Some(digest.into());
        self
    }

    pub fn with_file_enc_sha256(mut self, digest: impl Into<Vec<u8>>) -> Self {
        self.file_enc_sha256 = Some(digest.into());
        self
    }

    pub fn with_direct_path(mut self, direct_path: impl Into<String>) -> Self {
        self.direct_path = Some(direct_path.into());
        self
    }
}

impl MediaProvider for MediaDescriptor {
    fn media_kind(&self) -> MediaKind {
        self.kind
    }

    fn media_url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn media_direct_path(&self) -> Option<&str> {
        self.direct_path.as_deref()
    }

    fn media_key(&self) -> Option<&[u8]> {
        self.media_key.as_deref()
    }

    fn media_key_timestamp(&self) -> Option<i64> {
        self.media_key_timestamp
    }

    fn media_sha256(&self) -> Option<&[u8]> {
        self.file_sha256.as_deref()
    }

    fn media_enc_sha256(&self) -> Option<&[u8]> {
        self.file_enc_sha256.as_deref()
    }

    fn media_size(&self) -> Option<u64> {
        self.file_length
    }
}

impl MediaProviderMut for MediaDescriptor {
    fn set_media_url(&mut self, url: Option<String>) {
        self.url = url;
    }

    fn set_media_direct_path(&mut self, direct_path: Option<String>) {
        self.direct_path = direct_path;
    }

    fn set_media_key(&mut self, key: Option<Vec<u8>>) {
        self.media_key = key;
    }

    fn set_media_key_timestamp(&mut self, timestamp: Option<i64>) {
        self.media_key_timestamp = timestamp;
    }

    fn set_media_sha256(&mut self, digest: Option<Vec<u8>>) {
        self.file_sha256 = digest;
    }

    fn set_media_enc_sha256(&mut self, digest: Option<Vec<u8>>) {
        self.file_enc_sha256 = digest;
    }

    fn set_media_size(&mut self, size: Option<u64>) {
        self.file_length = size;
    }
}

pub(crate) mod base64_opt {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| STANDARD.decode(text).map_err(serde::de::Error::custom))
            .transpose()
    }
}

pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_uses_base64() {
        let descriptor = MediaDescriptor::new(MediaKind::Image)
            .with_media_key(vec![0u8; 32])
            .with_direct_path("/v/t62.7118-24/abc");
        let json = serde_json::to_string(&descriptor).unwrap();
        assert!(json.contains("\"kind\":\"image\""));
        assert!(json.contains("\"media_key\":\"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=\""));
        assert!(!json.contains("file_sha256"));

        let parsed: MediaDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn test_provider_defaults_follow_kind() {
        let descriptor = MediaDescriptor::new(MediaKind::History);
        assert_eq!(descriptor.media_key_name(), Some("WhatsApp History Keys"));
        assert!(descriptor.is_inflatable());
        assert_eq!(descriptor.media_key(), None);
    }
}
