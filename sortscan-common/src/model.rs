//! Scan data model
//!
//! Stored records ([`Scan`], [`StreamEntry`], [`Photo`]) serialize with the
//! camelCase field names of the persisted collection document. Drafts and
//! patches are the unvalidated shapes callers hand to the repository; the
//! normalization helpers here turn them into stored records.

use crate::id::new_id;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Preset waste stream labels, in display order
pub const PRESET_STREAMS: [&str; 11] = [
    "Cardboard",
    "Paper",
    "Plastics (hard)",
    "Plastics (film)",
    "Metal",
    "Glass",
    "Bio/Food",
    "Wood",
    "Textiles",
    "E-waste",
    "Other",
];

/// Whether `name` is one of the preset stream labels (exact match)
pub fn is_preset(name: &str) -> bool {
    PRESET_STREAMS.contains(&name)
}

/// Embedded photo, kept as an opaque encoded payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Photo {
    /// Self-describing encoded image, normally a `data:` URI
    pub data_url: String,
    /// Media type, e.g. `image/jpeg`
    pub mime: String,
}

impl Photo {
    pub fn new(data_url: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            data_url: data_url.into(),
            mime: mime.into(),
        }
    }

    /// True when the payload is inline (`data:` URI) and needs no fetch to display
    pub fn is_inline(&self) -> bool {
        self.data_url.starts_with("data:")
    }
}

/// One identified waste fraction with its weight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEntry {
    pub id: String,
    pub name: String,
    pub weight_kg: f64,
}

/// One waste-assessment record as stored in the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub location: Option<String>,
    pub notes: Option<String>,
    pub photo: Option<Photo>,
    pub total_residual_kg: f64,
    pub streams: Vec<StreamEntry>,
}

impl Scan {
    /// Copy of this record as an editable draft (ids retained)
    pub fn to_draft(&self) -> ScanDraft {
        ScanDraft {
            location: self.location.clone(),
            notes: self.notes.clone(),
            photo: self.photo.clone(),
            total_residual_kg: self.total_residual_kg,
            streams: self.streams.iter().map(StreamDraft::from).collect(),
        }
    }

    /// A scan with no total weight cannot be saved as final or exported
    pub fn is_complete(&self) -> bool {
        self.total_residual_kg > 0.0
    }
}

/// Stream row as entered by a caller; every field may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
}

impl StreamDraft {
    pub fn new(name: impl Into<String>, weight_kg: f64) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            weight_kg: Some(weight_kg),
        }
    }

    /// Weight as counted by metrics: missing or invalid values count as zero
    pub fn effective_weight(&self) -> f64 {
        coerce_weight(self.weight_kg.unwrap_or(0.0))
    }
}

impl From<&StreamEntry> for StreamDraft {
    fn from(entry: &StreamEntry) -> Self {
        Self {
            id: Some(entry.id.clone()),
            name: Some(entry.name.clone()),
            weight_kg: Some(entry.weight_kg),
        }
    }
}

/// A scan that has not been persisted yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanDraft {
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photo: Option<Photo>,
    #[serde(default)]
    pub total_residual_kg: f64,
    #[serde(default)]
    pub streams: Vec<StreamDraft>,
}

/// Shallow update: `None` retains a field, `Some(..)` overwrites it
///
/// Nullable fields use `Some(None)` to clear the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanPatch {
    pub location: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub photo: Option<Option<Photo>>,
    pub total_residual_kg: Option<f64>,
    pub streams: Option<Vec<StreamDraft>>,
}

impl ScanPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn location(mut self, location: Option<String>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn notes(mut self, notes: Option<String>) -> Self {
        self.notes = Some(notes);
        self
    }

    pub fn photo(mut self, photo: Option<Photo>) -> Self {
        self.photo = Some(photo);
        self
    }

    pub fn total_residual_kg(mut self, total: f64) -> Self {
        self.total_residual_kg = Some(total);
        self
    }

    pub fn streams(mut self, streams: Vec<StreamDraft>) -> Self {
        self.streams = Some(streams);
        self
    }

    /// True when no field is provided
    pub fn is_empty(&self) -> bool {
        self.location.is_none()
            && self.notes.is_none()
            && self.photo.is_none()
            && self.total_residual_kg.is_none()
            && self.streams.is_none()
    }
}

/// Clamp a weight to the stored domain: negative or non-finite becomes 0
pub fn coerce_weight(value: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Parse user-entered weight text
///
/// Reads the longest leading decimal number (so `"12abc"` is 12) and applies
/// [`coerce_weight`]. Text with no leading number yields 0.
pub fn parse_weight(input: &str) -> f64 {
    let prefix = numeric_prefix(input.trim_start());
    prefix.parse::<f64>().map(coerce_weight).unwrap_or(0.0)
}

/// Longest prefix of `s` shaped like `[+-]digits[.digits][e[+-]digits]`
fn numeric_prefix(s: &str) -> &str {
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }

    if digits == 0 {
        return "";
    }

    // Exponent only counts when followed by at least one digit
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    &s[..end]
}

/// Map blank optional free text to `None`; other text is kept verbatim
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Turn draft rows into stored stream entries
///
/// Rows with an empty name are dropped, weights are coerced, and missing ids
/// are assigned. An id already present in `reserved` (or repeated within the
/// list) is replaced with a fresh one so ids stay unique across the store.
pub fn normalize_streams(drafts: Vec<StreamDraft>, reserved: &HashSet<String>) -> Vec<StreamEntry> {
    let mut seen: HashSet<String> = HashSet::new();

    drafts
        .into_iter()
        .filter_map(|draft| {
            let weight_kg = draft.effective_weight();
            let name = draft.name.as_deref().map(str::trim).unwrap_or("");
            if name.is_empty() {
                return None;
            }

            let id = match draft.id {
                Some(id) if !id.is_empty() && !reserved.contains(&id) && !seen.contains(&id) => id,
                _ => new_id(),
            };
            seen.insert(id.clone());

            Some(StreamEntry {
                id,
                name: name.to_string(),
                weight_kg,
            })
        })
        .collect()
}

/// Reject scans that are still in the incomplete state
pub fn validate_finalizable(total_residual_kg: f64) -> Result<()> {
    if coerce_weight(total_residual_kg) > 0.0 {
        Ok(())
    } else {
        Err(Error::Validation(
            "Total residual weight must be greater than 0 kg".to_string(),
        ))
    }
}
