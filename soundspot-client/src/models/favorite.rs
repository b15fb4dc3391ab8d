use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient_timestamp, reference, required_reference, Identified};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    #[serde(rename = "soundspot")]
    Soundspot,
    #[serde(rename = "audioItem")]
    AudioItem,
}

impl Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemType::Soundspot => f.write_str("soundspot"),
            ItemType::AudioItem => f.write_str("audioItem"),
        }
    }
}

/// A saved soundspot or audio item, unique per `(item_id, item_type)`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub id: String,
    #[serde(deserialize_with = "required_reference")]
    pub item_id: String,
    pub item_type: ItemType,
    #[serde(default, deserialize_with = "reference")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Favorite {
    pub fn matches(&self, item_id: &str, item_type: ItemType) -> bool {
        self.item_id == item_id && self.item_type == item_type
    }
}

impl Identified for Favorite {
    fn id(&self) -> &str {
        &self.id
    }
}
