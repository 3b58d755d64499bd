use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Display text recorded for items whose location could not be determined.
pub const NO_LOCATION_FOUND: &str = "no location found";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub published_at: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub video_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub playlist_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    /// Upstream marks the video private or deleted.
    #[serde(default, skip_serializing_if = "is_false")]
    pub unavailable: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Transcript {
    Available { text: String },
    Unavailable,
    Error { message: String },
}

impl Transcript {
    /// Transcript text when present and non-blank.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Available { text } if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementaryEntry {
    pub description: String,
    pub transcript: Transcript,
    pub fetched_at: String,
}

pub type SupplementaryMap = BTreeMap<String, SupplementaryEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundReason {
    Unavailable,
    TranscriptError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Location {
    Found { text: String },
    NotFound { reason: NotFoundReason },
}

impl Location {
    pub fn found(text: impl Into<String>) -> Self {
        Self::Found { text: text.into() }
    }

    pub fn display_text(&self) -> &str {
        match self {
            Self::Found { text } => text,
            Self::NotFound { .. } => NO_LOCATION_FOUND,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedItem {
    #[serde(flatten)]
    pub item: RawItem,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// The location text submitted verbatim.
    Exact,
    /// Normalized text with this many leading components dropped.
    Relaxed(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodeResult {
    pub query: String,
    pub tier: SourceTier,
    /// GeoJSON FeatureCollection as returned by the geocoding service.
    pub response: serde_json::Value,
}

impl GeocodeResult {
    /// First feature's point in service order, `[longitude, latitude]`.
    pub fn first_point(&self) -> Option<[f64; 2]> {
        first_point(&self.response)
    }

    pub fn is_valid(&self) -> bool {
        self.first_point().is_some()
    }

    /// First point in published order, `[latitude, longitude]`.
    pub fn lat_lng(&self) -> Option<[f64; 2]> {
        self.first_point().map(|[lng, lat]| [lat, lng])
    }
}

pub fn first_point(response: &serde_json::Value) -> Option<[f64; 2]> {
    let features = response.get("features")?.as_array()?;
    features.iter().find_map(|feature| {
        let coords = feature.pointer("/geometry/coordinates")?.as_array()?;
        if coords.len() < 2 {
            return None;
        }
        let lng = coords[0].as_f64()?;
        let lat = coords[1].as_f64()?;
        (lng.is_finite() && lat.is_finite()).then_some([lng, lat])
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeocodedItem {
    #[serde(flatten)]
    pub located: LocatedItem,
    pub geocode: Option<GeocodeResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedRecord {
    pub title: String,
    pub video_id: String,
    pub location: String,
    pub geocode: Option<[f64; 2]>,
    pub playlist: String,
    #[serde(default)]
    pub marked: bool,
}
