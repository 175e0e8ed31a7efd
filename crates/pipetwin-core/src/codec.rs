//! # Record Codec
//!
//! Records are stored as postcard bytes. postcard is not self-describing, so
//! it cannot carry free-form JSON (`serde_json::Value`, property maps, or
//! internally tagged GeoJSON). Fields of that shape go through [`json_text`],
//! which keeps them as plain JSON for human-readable formats and embeds them
//! as a JSON string everywhere else.

use crate::TwinError;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Encode a record for storage.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TwinError> {
    postcard::to_allocvec(value).map_err(|e| TwinError::Serialization(e.to_string()))
}

/// Decode a stored record.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TwinError> {
    postcard::from_bytes(bytes).map_err(|e| TwinError::Serialization(e.to_string()))
}

/// `#[serde(with = "crate::codec::json_text")]` adapter for JSON-shaped fields.
pub mod json_text {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        if serializer.is_human_readable() {
            value.serialize(serializer)
        } else {
            let text = serde_json::to_string(value).map_err(S::Error::custom)?;
            serializer.serialize_str(&text)
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            T::deserialize(deserializer)
        } else {
            let text = String::deserialize(deserializer)?;
            serde_json::from_str(&text).map_err(D::Error::custom)
        }
    }
}
