//! Serde helper encoding byte blobs as base64 strings.
//!
//! Used with `#[serde(with = "crate::bytes")]` on state fields so that a
//! JSON transport carries the Terraform state as text.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&STANDARD.encode(bytes))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(serde::de::Error::custom)
}
