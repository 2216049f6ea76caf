//! Separation metrics
//!
//! Every view (list rows, editor summary, report) computes its numbers through
//! these functions and renders them with [`format_kg`] / [`format_percent`], so
//! all consumers show identical values. Stored values keep full precision;
//! only presentation rounds to one decimal place.

use crate::model::{coerce_weight, Scan, ScanDraft, StreamDraft, StreamEntry};
use serde::Serialize;

/// Anything with a total residual weight and a list of stream weights
pub trait Weighed {
    /// Total residual weight of the batch before separation
    fn total_residual_kg(&self) -> f64;

    /// Weight of each identified stream, in display order
    fn stream_weights(&self) -> impl Iterator<Item = f64> + '_;
}

impl Weighed for Scan {
    fn total_residual_kg(&self) -> f64 {
        self.total_residual_kg
    }

    fn stream_weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.streams.iter().map(|s| s.weight_kg)
    }
}

impl Weighed for ScanDraft {
    fn total_residual_kg(&self) -> f64 {
        coerce_weight(self.total_residual_kg)
    }

    fn stream_weights(&self) -> impl Iterator<Item = f64> + '_ {
        self.streams.iter().map(StreamDraft::effective_weight)
    }
}

/// Sum of all stream weights
pub fn extracted<W: Weighed + ?Sized>(batch: &W) -> f64 {
    batch.stream_weights().sum()
}

/// Residual weight not yet assigned to a stream; never negative
pub fn remaining<W: Weighed + ?Sized>(batch: &W) -> f64 {
    (batch.total_residual_kg() - extracted(batch)).max(0.0)
}

/// Share of the total that has been separated into streams, 0 when total is unset
pub fn separation_percent<W: Weighed + ?Sized>(batch: &W) -> f64 {
    share_of_total(batch.total_residual_kg(), extracted(batch))
}

/// Share of the total held by one stream, 0 when total is unset
pub fn stream_share_percent<W: Weighed + ?Sized>(batch: &W, stream_weight_kg: f64) -> f64 {
    share_of_total(batch.total_residual_kg(), stream_weight_kg)
}

/// More weight assigned to streams than the batch weighed
pub fn is_over_extracted<W: Weighed + ?Sized>(batch: &W) -> bool {
    let total = batch.total_residual_kg();
    total > 0.0 && extracted(batch) > total
}

fn share_of_total(total: f64, part: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Display a weight: one decimal place plus unit, e.g. `12.5 kg`
pub fn format_kg(value: f64) -> String {
    format!("{} kg", format_one_decimal(value))
}

/// Display a percentage: one decimal place plus sign, e.g. `50.0%`
pub fn format_percent(value: f64) -> String {
    format!("{}%", format_one_decimal(value))
}

fn format_one_decimal(value: f64) -> String {
    let rounded = format!("{:.1}", value);
    // Avoid rendering "-0.0" for tiny negative rounding noise
    if rounded == "-0.0" {
        "0.0".to_string()
    } else {
        rounded
    }
}

/// Per-stream line of a [`ScanSummary`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamShare {
    pub id: String,
    pub name: String,
    pub weight_kg: f64,
    pub share_percent: f64,
}

/// All derived values for one scan, computed once
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub total_residual_kg: f64,
    pub extracted_kg: f64,
    pub remaining_kg: f64,
    pub separation_percent: f64,
    pub over_extracted: bool,
    pub streams: Vec<StreamShare>,
}

impl ScanSummary {
    pub fn for_scan(scan: &Scan) -> Self {
        Self {
            total_residual_kg: scan.total_residual_kg,
            extracted_kg: extracted(scan),
            remaining_kg: remaining(scan),
            separation_percent: separation_percent(scan),
            over_extracted: is_over_extracted(scan),
            streams: scan
                .streams
                .iter()
                .map(|s: &StreamEntry| StreamShare {
                    id: s.id.clone(),
                    name: s.name.clone(),
                    weight_kg: s.weight_kg,
                    share_percent: stream_share_percent(scan, s.weight_kg),
                })
                .collect(),
        }
    }

    /// One-line rendering used by list views
    pub fn headline(&self) -> String {
        format!(
            "{} total, {} extracted ({}), {} remaining",
            format_kg(self.total_residual_kg),
            format_kg(self.extracted_kg),
            format_percent(self.separation_percent),
            format_kg(self.remaining_kg)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn scan(total: f64, streams: &[(&str, f64)]) -> Scan {
        let now = Utc::now();
        Scan {
            id: "scan".into(),
            created_at: now,
            updated_at: now,
            location: None,
            notes: None,
            photo: None,
            total_residual_kg: total,
            streams: streams
                .iter()
                .enumerate()
                .map(|(i, (name, w))| StreamEntry {
                    id: format!("s{}", i),
                    name: name.to_string(),
                    weight_kg: *w,
                })
                .collect(),
        }
    }

    #[test]
    fn test_half_separated_scenario() {
        let s = scan(100.0, &[("Cardboard", 30.0), ("Metal", 20.0)]);
        assert_eq!(extracted(&s), 50.0);
        assert_eq!(remaining(&s), 50.0);
        assert_eq!(separation_percent(&s), 50.0);
        assert!(!is_over_extracted(&s));
        assert_eq!(format_percent(separation_percent(&s)), "50.0%");
    }

    #[test]
    fn test_over_extracted_scenario() {
        let s = scan(100.0, &[("Cardboard", 30.0), ("Metal", 20.0), ("Glass", 60.0)]);
        assert_eq!(extracted(&s), 110.0);
        assert_eq!(remaining(&s), 0.0);
        assert!(is_over_extracted(&s));
        assert!((separation_percent(&s) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_total_never_divides() {
        let s = scan(0.0, &[("Paper", 5.0), ("Wood", 0.0)]);
        assert_eq!(separation_percent(&s), 0.0);
        for stream in &s.streams {
            assert_eq!(stream_share_percent(&s, stream.weight_kg), 0.0);
        }
        // Zero total means incomplete, not over-extracted
        assert!(!is_over_extracted(&s));
        assert_eq!(remaining(&s), 0.0);
    }

    #[test]
    fn test_remaining_never_negative() {
        for total in [0.0, 0.5, 10.0, 99.9] {
            for extra in [0.0, 1.0, 50.0, 1000.0] {
                let s = scan(total, &[("Other", extra)]);
                assert!(remaining(&s) >= 0.0);
            }
        }
    }

    #[test]
    fn test_stream_share() {
        let s = scan(40.0, &[("Glass", 10.0)]);
        assert_eq!(stream_share_percent(&s, 10.0), 25.0);
    }

    #[test]
    fn test_exactly_equal_is_not_over_extracted() {
        let s = scan(50.0, &[("Metal", 50.0)]);
        assert!(!is_over_extracted(&s));
        assert_eq!(remaining(&s), 0.0);
    }

    #[test]
    fn test_draft_metrics_coerce_missing_weights() {
        let draft = ScanDraft {
            total_residual_kg: -3.0,
            streams: vec![
                StreamDraft { id: None, name: Some("Paper".into()), weight_kg: None },
                StreamDraft::new("Metal", -2.0),
            ],
            ..Default::default()
        };
        assert_eq!(draft.total_residual_kg(), 0.0);
        assert_eq!(extracted(&draft), 0.0);
        assert_eq!(separation_percent(&draft), 0.0);
    }

    #[test]
    fn test_format_rounding() {
        assert_eq!(format_kg(12.345), "12.3 kg");
        assert_eq!(format_kg(0.0), "0.0 kg");
        assert_eq!(format_percent(33.333_333), "33.3%");
        assert_eq!(format_percent(66.666_666), "66.7%");
        assert_eq!(format_percent(-0.01), "0.0%");
    }

    #[test]
    fn test_summary_matches_free_functions() {
        let s = scan(80.0, &[("Cardboard", 30.0), ("Bio/Food", 10.0)]);
        let summary = ScanSummary::for_scan(&s);

        assert_eq!(summary.extracted_kg, extracted(&s));
        assert_eq!(summary.remaining_kg, remaining(&s));
        assert_eq!(summary.separation_percent, 50.0);
        assert_eq!(summary.streams[0].share_percent, 37.5);
        assert_eq!(summary.streams[1].share_percent, 12.5);
        assert_eq!(
            summary.headline(),
            "80.0 kg total, 40.0 kg extracted (50.0%), 40.0 kg remaining"
        );
    }
}
