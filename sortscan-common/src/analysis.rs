//! Photo analysis collaborator interface
//!
//! The classification service itself lives outside this crate. Front ends
//! implement [`StreamClassifier`] over whatever client they use and feed the
//! raw response through [`parse_stream_suggestion`]. A suggestion is applied
//! to a draft by replacing its streams and total, never merging.

use crate::model::{coerce_weight, parse_weight, Photo, StreamDraft};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// What the service is asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Identify waste streams and estimate their weights
    Streams,
    /// Free-text handling advice for the container at a location
    Advisory,
}

/// Validated input for one classification call
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    mode: AnalysisMode,
    photo: Photo,
    location: Option<String>,
}

impl AnalysisRequest {
    /// Build a request, checking the inputs the mode needs
    ///
    /// Both modes need a photo; [`AnalysisMode::Advisory`] also needs a location.
    pub fn new(mode: AnalysisMode, photo: Option<Photo>, location: Option<String>) -> Result<Self> {
        let photo = photo.ok_or_else(|| {
            Error::Validation("A photo is required for analysis".to_string())
        })?;
        let location = location.filter(|l| !l.trim().is_empty());
        if mode == AnalysisMode::Advisory && location.is_none() {
            return Err(Error::Validation(
                "A location is required for the advisory analysis".to_string(),
            ));
        }
        Ok(Self {
            mode,
            photo,
            location,
        })
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    pub fn photo(&self) -> &Photo {
        &self.photo
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }
}

/// One stream proposed by the service
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedStream {
    pub name: String,
    pub weight_kg: f64,
}

/// Parsed stream-classification response
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSuggestion {
    pub streams: Vec<SuggestedStream>,
    pub total_estimate_kg: f64,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
}

impl StreamSuggestion {
    /// Draft rows for the editor: empty names dropped, weights coerced
    pub fn to_stream_drafts(&self) -> Vec<StreamDraft> {
        self.streams
            .iter()
            .filter(|s| !s.name.trim().is_empty())
            .map(|s| StreamDraft::new(s.name.trim(), coerce_weight(s.weight_kg)))
            .collect()
    }
}

/// Result of one classification call
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Streams(StreamSuggestion),
    Advisory(String),
}

/// External photo classification service
pub trait StreamClassifier {
    /// Run one analysis; failures are reported as [`Error::ExternalService`]
    fn classify(&self, request: &AnalysisRequest) -> Result<AnalysisResult>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuggestion {
    streams: Vec<RawStream>,
    #[serde(default)]
    total_estimate_kg: Option<Value>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStream {
    #[serde(default)]
    name: Option<String>,
    weight_kg: Value,
}

/// Parse a raw stream-classification response
///
/// Accepts the JSON bare or wrapped in a Markdown code fence. The document
/// must carry a `streams` array whose weights are numbers or numeric
/// strings. A missing `totalEstimateKg` falls back to the sum of the
/// stream weights.
pub fn parse_stream_suggestion(raw: &str) -> Result<StreamSuggestion> {
    let body = strip_code_fence(raw);
    let parsed: RawSuggestion = serde_json::from_str(body)
        .map_err(|e| Error::ExternalService(format!("unexpected analysis response: {}", e)))?;

    let mut streams = Vec::with_capacity(parsed.streams.len());
    for (index, raw_stream) in parsed.streams.into_iter().enumerate() {
        let weight_kg = numeric_weight(&raw_stream.weight_kg).ok_or_else(|| {
            Error::ExternalService(format!(
                "stream {} has a non-numeric weight: {}",
                index, raw_stream.weight_kg
            ))
        })?;
        streams.push(SuggestedStream {
            name: raw_stream.name.unwrap_or_default(),
            weight_kg,
        });
    }

    let total_estimate_kg = match parsed.total_estimate_kg {
        None | Some(Value::Null) => streams.iter().map(|s| s.weight_kg).sum(),
        Some(value) => numeric_weight(&value).ok_or_else(|| {
            Error::ExternalService(format!("non-numeric totalEstimateKg: {}", value))
        })?,
    };

    debug!(
        streams = streams.len(),
        total_estimate_kg, "Parsed stream suggestion"
    );

    Ok(StreamSuggestion {
        streams,
        total_estimate_kg: coerce_weight(total_estimate_kg),
        confidence: parsed.confidence,
        notes: parsed.notes.filter(|n| !n.trim().is_empty()),
    })
}

fn numeric_weight(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().map(coerce_weight),
        Value::String(s) if !s.trim().is_empty() => {
            let trimmed = s.trim();
            let starts_numeric = trimmed
                .trim_start_matches(['+', '-'])
                .starts_with(|c: char| c.is_ascii_digit() || c == '.');
            starts_numeric.then(|| parse_weight(trimmed))
        }
        _ => None,
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening fence line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo() -> Option<Photo> {
        Some(Photo::new("data:image/jpeg;base64,AAAA", "image/jpeg"))
    }

    #[test]
    fn test_request_requires_photo() {
        let err = AnalysisRequest::new(AnalysisMode::Streams, None, None).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_advisory_requires_location() {
        assert!(AnalysisRequest::new(AnalysisMode::Advisory, photo(), Some("  ".into())).is_err());
        let request =
            AnalysisRequest::new(AnalysisMode::Advisory, photo(), Some("Dock 2".into())).unwrap();
        assert_eq!(request.location(), Some("Dock 2"));
        assert!(AnalysisRequest::new(AnalysisMode::Streams, photo(), None).is_ok());
    }

    #[test]
    fn test_parse_plain_json() {
        let raw = r#"{"streams":[{"name":"Cardboard","weightKg":12.5},{"name":"Metal","weightKg":"3"}],
                      "totalEstimateKg":40,"confidence":0.8,"notes":"mixed load"}"#;
        let suggestion = parse_stream_suggestion(raw).unwrap();
        assert_eq!(suggestion.streams.len(), 2);
        assert_eq!(suggestion.streams[1].weight_kg, 3.0);
        assert_eq!(suggestion.total_estimate_kg, 40.0);
        assert_eq!(suggestion.confidence, Some(0.8));
        assert_eq!(suggestion.notes.as_deref(), Some("mixed load"));
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"streams\":[{\"name\":\"Glass\",\"weightKg\":2}]}\n```";
        let suggestion = parse_stream_suggestion(raw).unwrap();
        assert_eq!(suggestion.streams[0].name, "Glass");
        // Total falls back to the stream sum
        assert_eq!(suggestion.total_estimate_kg, 2.0);
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        for raw in [
            "not json",
            r#"{"total":3}"#,
            r#"{"streams":{"name":"x"}}"#,
            r#"{"streams":[{"name":"Glass","weightKg":"heavy"}]}"#,
            r#"{"streams":[{"name":"Glass","weightKg":true}]}"#,
        ] {
            let err = parse_stream_suggestion(raw).unwrap_err();
            assert!(matches!(err, Error::ExternalService(_)), "accepted {}", raw);
        }
    }

    #[test]
    fn test_negative_weights_coerced() {
        let suggestion =
            parse_stream_suggestion(r#"{"streams":[{"name":"Wood","weightKg":-4}],"totalEstimateKg":-1}"#)
                .unwrap();
        assert_eq!(suggestion.streams[0].weight_kg, 0.0);
        assert_eq!(suggestion.total_estimate_kg, 0.0);
    }

    #[test]
    fn test_stream_drafts_drop_empty_names() {
        let suggestion = StreamSuggestion {
            streams: vec![
                SuggestedStream { name: "Paper".into(), weight_kg: 1.0 },
                SuggestedStream { name: " ".into(), weight_kg: 2.0 },
            ],
            total_estimate_kg: 3.0,
            confidence: None,
            notes: None,
        };
        let drafts = suggestion.to_stream_drafts();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].name.as_deref(), Some("Paper"));
    }
}
