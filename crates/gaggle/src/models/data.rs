use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

use crate::errors::{GenerateError, GenerateResult};

/// Binary payload of an image or file part: either inline bytes or a reference.
///
/// Serializes as a single string, base64 for inline bytes and the URL text for
/// references, so messages stay plain JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataContent {
    Bytes(Vec<u8>),
    Url(Url),
}

impl DataContent {
    /// Interpret text as either a URL or base64 encoded bytes.
    ///
    /// `data:` URLs are decoded into inline bytes.
    pub fn parse(text: &str) -> GenerateResult<Self> {
        if let Ok(url) = Url::parse(text) {
            if url.scheme() == "data" {
                return Self::from_data_url(text);
            }
            return Ok(DataContent::Url(url));
        }
        Self::from_base64(text)
    }

    pub fn from_base64(text: &str) -> GenerateResult<Self> {
        STANDARD
            .decode(text)
            .map(DataContent::Bytes)
            .map_err(|e| GenerateError::InvalidDataContent {
                message: format!("expected a URL or base64 encoded data: {}", e),
            })
    }

    fn from_data_url(text: &str) -> GenerateResult<Self> {
        let (header, payload) = text.split_once(',').ok_or_else(|| {
            GenerateError::InvalidDataContent {
                message: "data URL has no payload".to_string(),
            }
        })?;
        if !header.ends_with(";base64") {
            return Err(GenerateError::InvalidDataContent {
                message: "only base64 data URLs are supported".to_string(),
            });
        }
        Self::from_base64(payload)
    }

    pub fn to_base64(&self) -> Option<String> {
        match self {
            DataContent::Bytes(bytes) => Some(STANDARD.encode(bytes)),
            DataContent::Url(_) => None,
        }
    }

    pub fn as_url(&self) -> Option<&Url> {
        match self {
            DataContent::Url(url) => Some(url),
            DataContent::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DataContent::Bytes(bytes) => Some(bytes),
            DataContent::Url(_) => None,
        }
    }
}

impl From<Vec<u8>> for DataContent {
    fn from(bytes: Vec<u8>) -> Self {
        DataContent::Bytes(bytes)
    }
}

impl From<Url> for DataContent {
    fn from(url: Url) -> Self {
        DataContent::Url(url)
    }
}

impl Serialize for DataContent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DataContent::Bytes(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
            DataContent::Url(url) => serializer.serialize_str(url.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for DataContent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        DataContent::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_url_and_base64() {
        let url = DataContent::parse("https://example.com/cat.png").unwrap();
        assert_eq!(
            url.as_url().map(Url::as_str),
            Some("https://example.com/cat.png")
        );

        let bytes = DataContent::parse("aGVsbG8=").unwrap();
        assert_eq!(bytes.as_bytes(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_data_url_is_inlined() {
        let content = DataContent::parse("data:text/plain;base64,aGVsbG8=").unwrap();
        assert_eq!(content, DataContent::Bytes(b"hello".to_vec()));
    }

    #[test]
    fn test_invalid_content_is_rejected() {
        let err = DataContent::parse("not base64!").unwrap_err();
        assert!(matches!(err, GenerateError::InvalidDataContent { .. }));
    }

    #[test]
    fn test_serializes_as_string() {
        let content = DataContent::Bytes(vec![1, 2, 3]);
        let json = serde_json::to_string(&content).unwrap();
        assert_eq!(json, "\"AQID\"");
        let back: DataContent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, content);
    }
}
