use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{
    lenient_f64, lenient_string, lenient_timestamp, lenient_u32, reference, ApprovalStatus,
    Identified,
};
use crate::FileUpload;

/// A piece of audio attached to a soundspot
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioItem {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: String,
    #[serde(default, alias = "audio_url", deserialize_with = "lenient_string")]
    pub audio_url: String,
    #[serde(default, deserialize_with = "optional_seconds")]
    pub duration: Option<f32>,
    #[serde(default, deserialize_with = "reference")]
    pub soundspot: Option<String>,
    #[serde(default, deserialize_with = "reference")]
    pub creator: Option<String>,
    #[serde(default = "ApprovalStatus::approved")]
    pub status: ApprovalStatus,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub play_count: u32,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub average_rating: f64,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub total_reviews: u32,
    #[serde(default, deserialize_with = "rating_distribution")]
    pub rating_distribution: [u32; 5],
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Identified for AudioItem {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A rating left on an audio item
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    #[serde(default, deserialize_with = "reference")]
    pub audio_item: Option<String>,
    #[serde(default, deserialize_with = "reference")]
    pub user: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub rating: u32,
    #[serde(default, deserialize_with = "lenient_string")]
    pub comment: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub helpful_count: u32,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identified for Review {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Fields for a new audio item
#[derive(Debug, Clone, PartialEq)]
pub struct AudioItemDraft {
    pub title: String,
    pub description: String,
    pub category: String,
    pub soundspot: String,
    pub duration: Option<f32>,
    pub audio: FileUpload,
}

/// Fields to change on an existing audio item. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

fn optional_seconds<'de, D>(deserializer: D) -> Result<Option<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;

    let seconds = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    Ok(seconds.filter(|s| s.is_finite() && *s > 0.).map(|s| s as f32))
}

/// Accepts `[n1, n2, n3, n4, n5]` or `{ "1": n1, ..., "5": n5 }`
fn rating_distribution<'de, D>(deserializer: D) -> Result<[u32; 5], D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let mut result = [0; 5];

    let count = |v: &Value| v.as_f64().map(|n| n.max(0.) as u32).unwrap_or_default();

    match value {
        Some(Value::Array(counts)) => {
            for (slot, value) in result.iter_mut().zip(counts.iter()) {
                *slot = count(value);
            }
        }
        Some(Value::Object(map)) => {
            for (star, slot) in result.iter_mut().enumerate() {
                if let Some(value) = map.get(&(star + 1).to_string()) {
                    *slot = count(value);
                }
            }
        }
        _ => {}
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::decode;

    #[test]
    fn test_populated_references_and_defaults() {
        let item: AudioItem = decode(json!({
            "_id": "i1",
            "title": "Bells",
            "audioUrl": "https://cdn.example/bells.mp3",
            "soundspot": { "_id": "s1", "name": "Tower" },
            "creator": "u1",
            "ratingDistribution": { "5": 2, "1": 1 }
        }))
        .unwrap();

        assert_eq!(item.soundspot.as_deref(), Some("s1"));
        assert_eq!(item.creator.as_deref(), Some("u1"));
        assert_eq!(item.status, ApprovalStatus::Approved);
        assert_eq!(item.play_count, 0);
        assert_eq!(item.rating_distribution, [1, 0, 0, 0, 2]);
        assert_eq!(item.duration, None);
    }

    #[test]
    fn test_distribution_as_array() {
        let item: AudioItem = decode(json!({
            "_id": "i2",
            "duration": "93.5",
            "ratingDistribution": [0, 1, 2, 3, 4, 5]
        }))
        .unwrap();

        assert_eq!(item.rating_distribution, [0, 1, 2, 3, 4]);
        assert_eq!(item.duration, Some(93.5));
    }

    #[test]
    fn test_review_decodes_with_populated_user() {
        let review: Review = decode(json!({
            "_id": "r1",
            "audioItem": "i1",
            "user": { "_id": "u2", "name": "Grace" },
            "rating": 4,
            "helpfulCount": 2
        }))
        .unwrap();

        assert_eq!(review.user.as_deref(), Some("u2"));
        assert_eq!(review.rating, 4);
        assert_eq!(review.comment, "");
    }
}
