use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{
    lenient_f64, lenient_string, lenient_timestamp, lenient_u32, reference, ApprovalStatus,
    Identified,
};
use crate::FileUpload;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn is_valid(&self) -> bool {
        (-90. ..=90.).contains(&self.latitude) && (-180. ..=180.).contains(&self.longitude)
    }
}

/// A geolocated point of interest with its own narration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawSoundspot")]
pub struct Soundspot {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub script: String,
    pub description: String,
    pub audio_url: Option<String>,
    pub creator: Option<String>,
    pub status: ApprovalStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub terms_accepted: bool,
    pub audio_item_count: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Soundspot {
    pub fn is_public(&self) -> bool {
        self.status == ApprovalStatus::Approved
    }
}

impl Identified for Soundspot {
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Error)]
pub enum SoundspotShapeError {
    #[error("soundspot has no id")]
    MissingId,
    #[error("soundspot {0} has no valid coordinates")]
    MissingLocation(String),
}

/// The wire shape, before coordinates are settled
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSoundspot {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    name: String,
    #[serde(default)]
    location: Option<Value>,
    #[serde(default)]
    latitude: Option<Value>,
    #[serde(default)]
    longitude: Option<Value>,
    #[serde(default, deserialize_with = "lenient_string")]
    script: String,
    #[serde(default, deserialize_with = "lenient_string")]
    description: String,
    #[serde(default, alias = "audio_url")]
    audio_url: Option<String>,
    #[serde(default, deserialize_with = "reference")]
    creator: Option<String>,
    #[serde(default = "ApprovalStatus::pending")]
    status: ApprovalStatus,
    #[serde(default, deserialize_with = "reference")]
    reviewed_by: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    reviewed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    review_notes: Option<String>,
    #[serde(default)]
    terms_accepted: bool,
    #[serde(default, deserialize_with = "lenient_u32")]
    audio_item_count: u32,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

fn coordinate(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl RawSoundspot {
    fn location(&self) -> Option<Location> {
        let from_location = self.location.as_ref().and_then(|location| {
            // GeoJSON points are [longitude, latitude]
            if let Some(Value::Array(coordinates)) = location.get("coordinates") {
                return Some(Location {
                    latitude: coordinate(coordinates.get(1))?,
                    longitude: coordinate(coordinates.first())?,
                });
            }

            Some(Location {
                latitude: coordinate(location.get("latitude"))?,
                longitude: coordinate(location.get("longitude"))?,
            })
        });

        let flat = || {
            Some(Location {
                latitude: coordinate(self.latitude.as_ref())?,
                longitude: coordinate(self.longitude.as_ref())?,
            })
        };

        from_location.or_else(flat).filter(Location::is_valid)
    }
}

impl TryFrom<RawSoundspot> for Soundspot {
    type Error = SoundspotShapeError;

    fn try_from(raw: RawSoundspot) -> Result<Self, Self::Error> {
        let id = raw
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or(SoundspotShapeError::MissingId)?;

        let location = raw
            .location()
            .ok_or_else(|| SoundspotShapeError::MissingLocation(id.clone()))?;

        Ok(Self {
            id,
            name: raw.name,
            location,
            script: raw.script,
            description: raw.description,
            audio_url: raw.audio_url.filter(|u| !u.is_empty()),
            creator: raw.creator,
            status: raw.status,
            reviewed_by: raw.reviewed_by,
            reviewed_at: raw.reviewed_at,
            review_notes: raw.review_notes,
            terms_accepted: raw.terms_accepted,
            audio_item_count: raw.audio_item_count,
            created_at: raw.created_at,
            updated_at: raw.updated_at,
        })
    }
}

/// Everything needed to submit a new soundspot
#[derive(Debug, Clone, PartialEq)]
pub struct SoundspotDraft {
    pub name: String,
    pub location: Location,
    pub script: String,
    pub description: String,
    pub terms_accepted: bool,
    pub audio: Option<FileUpload>,
}

/// Lenient decoding used by the repository so one malformed spot does not fail the whole list
pub(crate) fn decode_soundspots(value: Value) -> crate::ClientResult<Vec<Soundspot>> {
    let rows: Vec<Value> = super::decode_list(value, "soundspots")?;

    let spots = rows
        .into_iter()
        .filter_map(|row| match super::decode::<Soundspot>(row) {
            Ok(spot) => Some(spot),
            Err(e) => {
                log::warn!("Skipping malformed soundspot: {}", e);
                None
            }
        })
        .collect();

    Ok(spots)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::decode;

    #[test]
    fn test_geojson_and_flat_coordinates_agree() {
        let geo: Soundspot = decode(json!({
            "_id": "s1",
            "name": "Old Harbor",
            "location": { "type": "Point", "coordinates": [4.89, 52.37] },
            "status": "approved",
            "creator": { "_id": "u1", "name": "Ada" }
        }))
        .unwrap();

        let flat: Soundspot = decode(json!({
            "_id": "s1",
            "name": "Old Harbor",
            "latitude": "52.37",
            "longitude": 4.89,
            "status": "approved",
            "creator": "u1"
        }))
        .unwrap();

        assert_eq!(geo.location, flat.location);
        assert_eq!(geo.creator.as_deref(), Some("u1"));
        assert_eq!(flat.creator.as_deref(), Some("u1"));
        assert!(geo.is_public());
    }

    #[test]
    fn test_defaults_and_lenient_fields() {
        let spot: Soundspot = decode(json!({
            "_id": "s2",
            "latitude": 10,
            "longitude": 20,
            "script": null,
            "audioItemCount": "3",
            "createdAt": "not a date"
        }))
        .unwrap();

        assert_eq!(spot.status, ApprovalStatus::Pending);
        assert_eq!(spot.script, "");
        assert_eq!(spot.audio_item_count, 3);
        assert_eq!(spot.created_at, None);
    }

    #[test]
    fn test_spot_without_coordinates_is_rejected() {
        assert!(decode::<Soundspot>(json!({ "_id": "s3", "name": "Nowhere" })).is_err());
        assert!(
            decode::<Soundspot>(json!({ "_id": "s4", "latitude": 95, "longitude": 0 })).is_err()
        );
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let spots = decode_soundspots(json!({
            "soundspots": [
                { "_id": "a", "latitude": 1, "longitude": 2 },
                { "_id": "b" }
            ]
        }))
        .unwrap();

        assert_eq!(spots.len(), 1);
        assert_eq!(spots[0].id, "a");
    }
}
