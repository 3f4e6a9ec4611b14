use super::CommonItem;
use std::fmt;

/// Validation errors for CommonItem
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingId,
    InvalidLatitude(f64),
    InvalidLongitude(f64),
    EmptyFileUrl,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingId => write!(f, "id is required"),
            ValidationError::InvalidLatitude(lat) => {
                write!(f, "latitude must be within [-90, 90], got {}", lat)
            }
            ValidationError::InvalidLongitude(lon) => {
                write!(f, "longitude must be within [-180, 180], got {}", lon)
            }
            ValidationError::EmptyFileUrl => write!(f, "file reference has an empty url"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a CommonItem before it is emitted.
///
/// Validation rules:
/// - Id: non-empty after trimming
/// - Location: finite coordinates within WGS84 bounds
/// - FileRef: non-empty url
///
/// The timestamp is a typed `DateTime<Utc>`, so it is valid by construction.
pub fn validate(item: &CommonItem) -> Result<(), ValidationError> {
    if item.id.trim().is_empty() {
        return Err(ValidationError::MissingId);
    }

    if let Some(location) = &item.location {
        if !location.latitude.is_finite() || !(-90.0..=90.0).contains(&location.latitude) {
            return Err(ValidationError::InvalidLatitude(location.latitude));
        }
        if !location.longitude.is_finite() || !(-180.0..=180.0).contains(&location.longitude) {
            return Err(ValidationError::InvalidLongitude(location.longitude));
        }
    }

    if let Some(file_ref) = &item.file_ref {
        if file_ref.url.trim().is_empty() {
            return Err(ValidationError::EmptyFileUrl);
        }
    }

    Ok(())
}
