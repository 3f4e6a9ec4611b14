use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod validation;

pub use validation::{validate, ValidationError};

/// CommonItem is the normalized, provider-independent record emitted by a
/// connector's listing pass.
///
/// Items are built once from a single provider record and never mutated
/// after being placed on the output channel. Fields that do not apply to the
/// item's class stay `None`; zero is a valid measurement and never stands in
/// for "unknown".
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommonItem {
    /// Stable identifier, unique within the source. Never empty.
    pub id: String,

    /// Authoritative creation/occurrence time.
    pub timestamp: DateTime<Utc>,

    /// Free-text description or content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_body: Option<String>,

    /// Coarse category used downstream to choose a storage strategy.
    pub class: ItemClass,

    /// Best-effort attribution.
    pub owner: Person,

    /// Other people attached to the item (e.g. event attendees).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<Person>,

    pub metadata: Metadata,

    /// Real coordinates only. Free-text places live in `metadata.place`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,

    /// Lazy pointer to out-of-band binary content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<FileRef>,
}

impl CommonItem {
    /// Checks the item invariants (non-empty id, plausible coordinates).
    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemClass {
    Event,
    Image,
    Video,
    Location,
}

/// A person attributed to an item. Either field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Person {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none()
    }
}

/// Provider facts about an item. Everything is optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-text place description as supplied by the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aperture_f_number: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iso_equivalent: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// What kind of binary a [`FileRef`] points at. Selects the download variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Still,
    Motion,
    Document,
}

/// Pointer to out-of-band binary content, resolved lazily.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub url: String,
    pub kind: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<Vec<u8>>,
    /// Server-side processing status, when the provider reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_status: Option<String>,
}

impl FileRef {
    /// True unless the provider reported a processing status other than `READY`.
    pub fn is_ready(&self) -> bool {
        match &self.processing_status {
            Some(status) => status.eq_ignore_ascii_case("READY"),
            None => true,
        }
    }
}

/// Time bounds for a listing pass. Day-level precision is acceptable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl ListingWindow {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// True when neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// The effective lower bound: `start`, or `now` when unset.
    pub fn start_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.start.unwrap_or(now)
    }
}
