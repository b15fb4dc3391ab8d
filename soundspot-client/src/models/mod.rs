//! Entities received from the API, and the normalization applied before anything sees them.
//!
//! Every payload goes through [normalize_ids] and is then deserialized into a model with stable,
//! defaulted field types. Nothing past this module deals with raw JSON shapes.

mod audio_item;
mod billing;
mod favorite;
mod soundspot;

pub use audio_item::*;
pub use billing::*;
pub use favorite::*;
pub use soundspot::*;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{ClientError, ClientResult};

/// Anything that lives in a mirrored list
pub trait Identified {
    fn id(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub(crate) fn pending() -> Self {
        Self::Pending
    }

    pub(crate) fn approved() -> Self {
        Self::Approved
    }
}

/// Rewrites storage-native identifiers to a canonical string `id`, recursively.
///
/// `_id` becomes `id` when no `id` exists, and is dropped otherwise. Numeric ids and
/// `{"$oid": ...}` wrappers become plain strings. Applying this twice changes nothing.
pub fn normalize_ids(value: &mut Value) {
    match value {
        Value::Array(items) => items.iter_mut().for_each(normalize_ids),
        Value::Object(map) => {
            if let Some(raw) = map.remove("_id") {
                if !map.contains_key("id") {
                    if let Some(id) = id_to_string(&raw) {
                        map.insert("id".to_string(), Value::String(id));
                    }
                }
            }

            let canonical = match map.get("id") {
                Some(Value::String(_)) | None => None,
                Some(other) => Some(id_to_string(other)),
            };

            match canonical {
                Some(Some(id)) => {
                    map.insert("id".to_string(), Value::String(id));
                }
                Some(None) => {
                    map.remove("id");
                }
                None => {}
            }

            map.values_mut().for_each(normalize_ids);
        }
        _ => {}
    }
}

fn id_to_string(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("$oid")
            .or_else(|| map.get("id"))
            .or_else(|| map.get("_id"))
            .and_then(id_to_string),
        _ => None,
    }
}

/// Normalizes and deserializes a payload
pub fn decode<T>(mut value: Value) -> ClientResult<T>
where
    T: DeserializeOwned,
{
    normalize_ids(&mut value);
    serde_json::from_value(value).map_err(|e| ClientError::Parse(e.to_string()))
}

/// Decodes a collection that may arrive as a bare array, `{ "data": [...] }`, or `{ key: [...] }`
pub fn decode_list<T>(value: Value, key: &str) -> ClientResult<Vec<T>>
where
    T: DeserializeOwned,
{
    match value {
        Value::Array(_) => decode(value),
        Value::Null => Ok(vec![]),
        Value::Object(mut map) => {
            let list = map
                .remove(key)
                .filter(Value::is_array)
                .or_else(|| map.remove("data").filter(Value::is_array))
                .or_else(|| map.remove("items").filter(Value::is_array));

            match list {
                Some(list) => decode(list),
                None => Err(ClientError::Parse(format!("expected a list of {}", key))),
            }
        }
        _ => Err(ClientError::Parse(format!("expected a list of {}", key))),
    }
}

/// Decodes a single entity that may be wrapped as `{ key: {...} }` or `{ "data": {...} }`
pub fn decode_item<T>(value: Value, key: &str) -> ClientResult<T>
where
    T: DeserializeOwned,
{
    match value {
        Value::Object(mut map) => {
            let wrapped = map
                .remove(key)
                .filter(Value::is_object)
                .or_else(|| map.remove("data").filter(Value::is_object));

            match wrapped {
                Some(item) => decode(item),
                None => decode(Value::Object(map)),
            }
        }
        other => decode(other),
    }
}

/// Accepts a bare id or a populated object, always yielding the id
pub(crate) fn reference<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(id_to_string))
}

/// Like [reference], for fields that must be present
pub(crate) fn required_reference<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    reference(deserializer)?.ok_or_else(|| serde::de::Error::custom("missing reference id"))
}

/// Timestamps that fail to parse are treated as absent rather than failing the entity
pub(crate) fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&chrono::Utc)))
}

/// Text that may be missing or null becomes an empty string
pub(crate) fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    })
}

/// Numbers that may arrive as strings, null, or not at all
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    Ok(match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
        _ => 0.,
    })
}

pub(crate) fn lenient_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_f64(deserializer).map(|n| n.max(0.) as u32)
}
