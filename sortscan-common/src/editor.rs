//! Editor session
//!
//! Holds the record currently being edited and its unsaved draft. Nothing
//! reaches the repository until [`EditorSession::save`].

use crate::analysis::StreamSuggestion;
use crate::id::new_id;
use crate::metrics::{self, Weighed};
use crate::model::{
    coerce_weight, parse_weight, validate_finalizable, Photo, Scan, ScanDraft, ScanPatch,
    StreamDraft,
};
use crate::repository::{Mutation, ScanRepository};
use crate::store::KeyValueStore;
use crate::{Error, Result};
use serde::Serialize;
use tracing::debug;

/// Live numbers for the editor summary panel
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
    pub total_residual_kg: f64,
    pub extracted_kg: f64,
    pub remaining_kg: f64,
    pub separation_percent: f64,
    pub over_extracted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EditorSession {
    editing_id: Option<String>,
    draft: ScanDraft,
}

impl EditorSession {
    /// Session for a new scan
    pub fn new() -> Self {
        Self::default()
    }

    /// Session editing an existing scan
    pub fn edit(scan: &Scan) -> Self {
        Self {
            editing_id: Some(scan.id.clone()),
            draft: scan.to_draft(),
        }
    }

    pub fn editing_id(&self) -> Option<&str> {
        self.editing_id.as_deref()
    }

    pub fn draft(&self) -> &ScanDraft {
        &self.draft
    }

    pub fn set_location(&mut self, location: Option<String>) {
        self.draft.location = location;
    }

    pub fn set_notes(&mut self, notes: Option<String>) {
        self.draft.notes = notes;
    }

    pub fn set_photo(&mut self, photo: Option<Photo>) {
        self.draft.photo = photo;
    }

    /// Set the total from user-entered text
    pub fn set_total_input(&mut self, input: &str) {
        self.draft.total_residual_kg = parse_weight(input);
    }

    /// Append a stream row and return its id
    pub fn add_stream(&mut self, name: impl Into<String>) -> String {
        let id = new_id();
        self.draft.streams.push(StreamDraft {
            id: Some(id.clone()),
            name: Some(name.into()),
            weight_kg: Some(0.0),
        });
        id
    }

    /// Remove a stream row; false if no row has `id`
    pub fn remove_stream(&mut self, id: &str) -> bool {
        let before = self.draft.streams.len();
        self.draft.streams.retain(|s| s.id.as_deref() != Some(id));
        self.draft.streams.len() != before
    }

    /// Set a stream row's weight from user-entered text; false if no row has `id`
    pub fn set_stream_weight_input(&mut self, id: &str, input: &str) -> bool {
        match self
            .draft
            .streams
            .iter_mut()
            .find(|s| s.id.as_deref() == Some(id))
        {
            Some(stream) => {
                stream.weight_kg = Some(parse_weight(input));
                true
            }
            None => false,
        }
    }

    /// Replace the draft's streams and total with an analysis suggestion
    pub fn apply_suggestion(&mut self, suggestion: &StreamSuggestion) {
        self.draft.streams = suggestion
            .to_stream_drafts()
            .into_iter()
            .map(|mut draft| {
                draft.id = Some(new_id());
                draft
            })
            .collect();
        self.draft.total_residual_kg = coerce_weight(suggestion.total_estimate_kg);
        debug!(
            streams = self.draft.streams.len(),
            "Applied analysis suggestion to draft"
        );
    }

    pub fn summary(&self) -> DraftSummary {
        DraftSummary {
            total_residual_kg: self.draft.total_residual_kg(),
            extracted_kg: metrics::extracted(&self.draft),
            remaining_kg: metrics::remaining(&self.draft),
            separation_percent: metrics::separation_percent(&self.draft),
            over_extracted: metrics::is_over_extracted(&self.draft),
        }
    }

    /// Validate and write the draft
    ///
    /// Creates a new scan or replaces every field of the edited one. On
    /// success the session switches to editing the saved record.
    pub fn save<S: KeyValueStore>(&mut self, repo: &mut ScanRepository<S>) -> Result<Mutation<Scan>> {
        validate_finalizable(self.draft.total_residual_kg)?;

        let mutation = match &self.editing_id {
            None => repo.create(self.draft.clone()),
            Some(id) => {
                let patch = ScanPatch::new()
                    .location(self.draft.location.clone())
                    .notes(self.draft.notes.clone())
                    .photo(self.draft.photo.clone())
                    .total_residual_kg(self.draft.total_residual_kg)
                    .streams(self.draft.streams.clone());
                repo.update(id, patch)
                    .ok_or_else(|| Error::NotFound(format!("scan {}", id)))?
            }
        };

        *self = Self::edit(&mutation.value);
        Ok(mutation)
    }
}
