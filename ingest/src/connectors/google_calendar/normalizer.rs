//! Maps a raw calendar record onto the CommonItem contract.
//!
//! Absent provider fields stay absent. Present-but-malformed fields fail the
//! whole record, so no item is ever emitted half-populated.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use timeline::item::{FileRef, ItemClass, Location, MediaKind, Metadata, Person};
use timeline::CommonItem;

use super::api::{EventAttendee, EventDateTime, EventPerson, EventRecord, MediaMetadata};
use crate::error::NormalizationError;

type Result<T> = std::result::Result<T, NormalizationError>;

/// Decode one raw page entry, then normalize it.
///
/// A record whose fields have the wrong JSON types fails on its own as
/// [`NormalizationError::Malformed`].
pub fn normalize_value(raw: &Value) -> Result<CommonItem> {
    let record = EventRecord::deserialize(raw).map_err(|e| NormalizationError::Malformed {
        id: raw_id(raw).to_string(),
        reason: e.to_string(),
    })?;
    normalize(&record)
}

/// The record id as sent, or "" when missing or not a string.
pub fn raw_id(raw: &Value) -> &str {
    raw.get("id").and_then(Value::as_str).unwrap_or("")
}

/// Normalize one raw record into a validated CommonItem.
pub fn normalize(record: &EventRecord) -> Result<CommonItem> {
    let id = record.id.trim();
    if id.is_empty() {
        return Err(NormalizationError::MissingId);
    }

    let item = CommonItem {
        id: id.to_string(),
        timestamp: resolve_timestamp(record)?,
        text_body: non_empty(&record.description).or_else(|| non_empty(&record.summary)),
        class: resolve_class(record),
        owner: resolve_owner(record),
        participants: participants(&record.attendees),
        metadata: metadata(record)?,
        location: resolve_location(record.media_metadata.as_ref()),
        file_ref: resolve_file_ref(record),
    };

    item.validate()?;
    Ok(item)
}

/// Candidates in priority order. The first one present decides.
fn resolve_timestamp(record: &EventRecord) -> Result<DateTime<Utc>> {
    if let Some(start) = &record.start {
        if let Some(ts) = parse_event_time("start", start)? {
            return Ok(ts);
        }
    }
    if let Some(creation) = record
        .media_metadata
        .as_ref()
        .and_then(|m| non_empty(&m.creation_time))
    {
        return parse_rfc3339("mediaMetadata.creationTime", &creation);
    }
    if let Some(created) = non_empty(&record.created) {
        return parse_rfc3339("created", &created);
    }
    Err(NormalizationError::MissingTimestamp {
        id: record.id.clone(),
    })
}

/// `dateTime` wins over `date`. Returns `None` when neither is set.
fn parse_event_time(field: &'static str, value: &EventDateTime) -> Result<Option<DateTime<Utc>>> {
    if let Some(date_time) = non_empty(&value.date_time) {
        return parse_zoned(field, &date_time, value.time_zone.as_deref()).map(Some);
    }
    if let Some(date) = non_empty(&value.date) {
        return parse_date(field, &date).map(Some);
    }
    Ok(None)
}

pub fn parse_rfc3339(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| NormalizationError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

/// RFC3339 first. A local time without offset needs an IANA `zone`.
fn parse_zoned(field: &'static str, value: &str, zone: Option<&str>) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let invalid = || NormalizationError::InvalidTimestamp {
        field,
        value: value.to_string(),
    };
    let Some(zone) = zone.map(str::trim).filter(|z| !z.is_empty()) else {
        return Err(invalid());
    };
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").map_err(|_| invalid())?;
    let tz: Tz = zone.parse().map_err(|_| NormalizationError::UnknownTimeZone {
        field,
        value: zone.to_string(),
    })?;

    // Ambiguous local times (DST fold) take the earlier instant; skipped ones fail.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(invalid)
}

/// All-day dates resolve to midnight UTC.
pub fn parse_date(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| NormalizationError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

fn resolve_class(record: &EventRecord) -> ItemClass {
    match &record.media_metadata {
        Some(media) if media.photo.is_some() => ItemClass::Image,
        Some(media) if media.video.is_some() => ItemClass::Video,
        _ => ItemClass::Event,
    }
}

/// Organizer first, then creator, then whichever attendee is flagged organizer.
///
/// The provider's profile id is account-scoped and often missing; the id is
/// left empty rather than substituted with an email.
fn resolve_owner(record: &EventRecord) -> Person {
    let candidates = [
        record.organizer.as_ref().map(person_from),
        record.creator.as_ref().map(person_from),
        record
            .attendees
            .iter()
            .find(|a| a.organizer)
            .map(attendee_person),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|p| !p.is_empty())
        .unwrap_or_default()
}

fn person_from(p: &EventPerson) -> Person {
    Person {
        id: non_empty(&p.id),
        name: non_empty(&p.display_name).or_else(|| non_empty(&p.email)),
    }
}

fn attendee_person(a: &EventAttendee) -> Person {
    Person {
        id: non_empty(&a.id),
        name: non_empty(&a.display_name).or_else(|| non_empty(&a.email)),
    }
}

/// People attending, excluding rooms/resources and declined invitations.
fn participants(attendees: &[EventAttendee]) -> Vec<Person> {
    attendees
        .iter()
        .filter(|a| !a.resource)
        .filter(|a| a.response_status.as_deref() != Some("declined"))
        .map(attendee_person)
        .filter(|p| !p.is_empty())
        .collect()
}

fn metadata(record: &EventRecord) -> Result<Metadata> {
    let end = match &record.end {
        Some(end) => parse_event_time("end", end)?,
        None => None,
    };

    let mut meta = Metadata {
        title: non_empty(&record.summary),
        place: non_empty(&record.location),
        end,
        status: non_empty(&record.status),
        link: non_empty(&record.html_link),
        ..Default::default()
    };

    let Some(media) = &record.media_metadata else {
        return Ok(meta);
    };

    meta.width = parse_count("mediaMetadata.width", media.width.as_deref())?;
    meta.height = parse_count("mediaMetadata.height", media.height.as_deref())?;

    if let Some(photo) = &media.photo {
        meta.camera_make = non_empty(&photo.camera_make);
        meta.camera_model = non_empty(&photo.camera_model);
        meta.focal_length = photo.focal_length;
        meta.aperture_f_number = photo.aperture_f_number;
        meta.iso_equivalent = photo.iso_equivalent;
        if let Some(exposure) = non_empty(&photo.exposure_time) {
            meta.exposure_time = Some(parse_duration_text(&exposure).ok_or_else(|| {
                NormalizationError::InvalidDuration {
                    field: "photo.exposureTime",
                    value: exposure.clone(),
                }
            })?);
        }
    } else if let Some(video) = &media.video {
        meta.camera_make = non_empty(&video.camera_make);
        meta.camera_model = non_empty(&video.camera_model);
        meta.fps = video.fps;
    }

    Ok(meta)
}

/// Parses decimal text. Absent or blank text is `None`; "0" is `Some(0)`.
fn parse_count(field: &'static str, value: Option<&str>) -> Result<Option<u32>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text
            .parse::<u32>()
            .map(Some)
            .map_err(|_| NormalizationError::InvalidNumber {
                field,
                value: text.to_string(),
            }),
    }
}

/// Parses duration text like "0.008s", "250ms" or "1m30s".
pub fn parse_duration_text(value: &str) -> Option<Duration> {
    let mut rest = value.trim();
    if rest.is_empty() {
        return None;
    }
    if rest == "0" {
        return Some(Duration::ZERO);
    }

    let mut seconds = 0.0_f64;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_end == 0 {
            return None;
        }
        let number: f64 = rest[..number_end].parse().ok()?;
        rest = &rest[number_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "h" => 3600.0,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            "ns" => 1e-9,
            _ => return None,
        };
        seconds += number * scale;
        rest = &rest[unit_end..];
    }

    Some(Duration::from_nanos((seconds * 1e9).round() as u64))
}

/// Real coordinates only. Free-text locations never become a Location.
fn resolve_location(media: Option<&MediaMetadata>) -> Option<Location> {
    media.and_then(|m| m.location).map(|point| Location {
        latitude: point.latitude,
        longitude: point.longitude,
    })
}

fn resolve_file_ref(record: &EventRecord) -> Option<FileRef> {
    if let Some(base_url) = non_empty(&record.base_url) {
        let video = record.media_metadata.as_ref().and_then(|m| m.video.as_ref());
        return Some(FileRef {
            url: base_url,
            kind: if video.is_some() {
                MediaKind::Motion
            } else {
                MediaKind::Still
            },
            file_name: None,
            mime_type: non_empty(&record.mime_type),
            hash: None,
            processing_status: video.and_then(|v| non_empty(&v.status)),
        });
    }

    record
        .attachments
        .iter()
        .find(|a| !a.file_url.trim().is_empty())
        .map(|a| FileRef {
            url: a.file_url.clone(),
            kind: MediaKind::Document,
            file_name: non_empty(&a.title),
            mime_type: non_empty(&a.mime_type),
            hash: None,
            processing_status: None,
        })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
