//! Report generation and formatting
//!
//! [`render`] turns one scan into a standalone HTML document: inline CSS, no
//! scripts, no external references, photo embedded as a `data:` URI. Every
//! number on the page comes from [`ScanSummary`] so the report agrees with
//! list rows and the editor summary.
//!
//! [`TextFormatter`] gives the same numbers for terminal output.

use crate::metrics::{format_kg, format_percent, ScanSummary};
use crate::model::{validate_finalizable, Scan};
use crate::{time, Result};
use serde::Serialize;

const STYLE: &str = "\
body{font-family:system-ui,-apple-system,'Segoe UI',sans-serif;color:#1f2933;margin:2rem auto;max-width:48rem;padding:0 1rem;}\
h1{font-size:1.6rem;margin-bottom:.25rem;}\
.meta{color:#52606d;font-size:.9rem;margin-bottom:1.5rem;}\
.photo{max-width:100%;border-radius:6px;margin-bottom:1.5rem;}\
.cards{display:flex;flex-wrap:wrap;gap:.75rem;margin-bottom:1.5rem;}\
.card{flex:1 1 9rem;border:1px solid #d9e2ec;border-radius:6px;padding:.75rem;}\
.card .label{font-size:.8rem;color:#52606d;}\
.card .value{font-size:1.3rem;font-weight:600;}\
.warning{background:#fff3c4;border:1px solid #f0b429;border-radius:6px;padding:.75rem;margin-bottom:1.5rem;}\
table{width:100%;border-collapse:collapse;margin-bottom:1.5rem;}\
th,td{text-align:left;padding:.4rem .5rem;border-bottom:1px solid #d9e2ec;}\
td.num,th.num{text-align:right;}\
.empty{color:#7b8794;font-style:italic;}\
.notes{white-space:pre-wrap;border-left:3px solid #d9e2ec;padding-left:.75rem;}\
@media print{body{margin:0;}}";

/// Rendered report ready to be written to disk or printed
#[derive(Debug, Clone, PartialEq)]
pub struct ReportDocument {
    pub title: String,
    /// Suggested file name, e.g. `waste-scan-20250301-1430-3f2a9c1b.html`
    pub file_name: String,
    pub html: String,
}

/// Render a scan as a self-contained HTML document
///
/// Pure: no I/O and no clock reads; the same scan always renders the same bytes.
pub fn render(scan: &Scan) -> ReportDocument {
    let summary = ScanSummary::for_scan(scan);
    let title = report_title(scan);

    let mut body = String::new();

    body.push_str(&format!("<h1>{}</h1>\n", escape_html(&title)));
    body.push_str(&format!(
        "<div class=\"meta\">Scan {} &middot; created {} &middot; updated {}</div>\n",
        escape_html(&scan.id),
        escape_html(&time::display(&scan.created_at)),
        escape_html(&time::display(&scan.updated_at))
    ));

    if let Some(photo) = scan.photo.as_ref().filter(|p| p.is_inline()) {
        body.push_str(&format!(
            "<img class=\"photo\" src=\"{}\" alt=\"Waste container photo\">\n",
            escape_html(&photo.data_url)
        ));
    }

    if summary.over_extracted {
        body.push_str(&format!(
            "<div class=\"warning\"><strong>Warning:</strong> streams add up to {}, \
             which is more than the measured total of {}. Check the weights.</div>\n",
            format_kg(summary.extracted_kg),
            format_kg(summary.total_residual_kg)
        ));
    }

    body.push_str("<div class=\"cards\">\n");
    for (label, value) in [
        ("Total residual", format_kg(summary.total_residual_kg)),
        ("Extracted", format_kg(summary.extracted_kg)),
        ("Remaining", format_kg(summary.remaining_kg)),
        ("Separation", format_percent(summary.separation_percent)),
    ] {
        body.push_str(&format!(
            "<div class=\"card\"><div class=\"label\">{}</div><div class=\"value\">{}</div></div>\n",
            label, value
        ));
    }
    body.push_str("</div>\n");

    body.push_str("<h2>Streams</h2>\n");
    if summary.streams.is_empty() {
        body.push_str("<p class=\"empty\">No streams recorded</p>\n");
    } else {
        body.push_str(
            "<table>\n<thead><tr><th>Stream</th><th class=\"num\">Weight</th><th class=\"num\">Share</th></tr></thead>\n<tbody>\n",
        );
        for stream in &summary.streams {
            body.push_str(&format!(
                "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td></tr>\n",
                escape_html(&stream.name),
                format_kg(stream.weight_kg),
                format_percent(stream.share_percent)
            ));
        }
        body.push_str("</tbody>\n</table>\n");
    }

    if let Some(notes) = scan.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        body.push_str(&format!(
            "<h2>Notes</h2>\n<div class=\"notes\">{}</div>\n",
            escape_html(notes)
        ));
    }

    let html = format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <title>{}</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(&title),
        STYLE,
        body
    );

    ReportDocument {
        title,
        file_name: report_file_name(scan),
        html,
    }
}

/// Render after checking the scan is complete enough to share
pub fn export(scan: &Scan) -> Result<ReportDocument> {
    validate_finalizable(scan.total_residual_kg)?;
    Ok(render(scan))
}

/// Machine-readable counterpart of the HTML report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportJson<'a> {
    id: &'a str,
    location: Option<&'a str>,
    created_at: String,
    updated_at: String,
    summary: ScanSummary,
}

/// Export the scan's summary as pretty JSON
pub fn export_json(scan: &Scan) -> Result<String> {
    validate_finalizable(scan.total_residual_kg)?;
    let report = ReportJson {
        id: &scan.id,
        location: scan.location.as_deref(),
        created_at: time::to_rfc3339(&scan.created_at),
        updated_at: time::to_rfc3339(&scan.updated_at),
        summary: ScanSummary::for_scan(scan),
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

fn report_title(scan: &Scan) -> String {
    match scan.location.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        Some(location) => format!("Waste Scan Report: {}", location),
        None => "Waste Scan Report".to_string(),
    }
}

fn report_file_name(scan: &Scan) -> String {
    let short_id: String = scan
        .id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect();
    let stamp = scan.created_at.format("%Y%m%d-%H%M");
    if short_id.is_empty() {
        format!("waste-scan-{}.html", stamp)
    } else {
        format!("waste-scan-{}-{}.html", stamp, short_id)
    }
}

/// Escape text for safe inclusion in HTML content and attribute values
pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Terminal formatter for scans
pub struct TextFormatter;

impl TextFormatter {
    /// Single list row
    ///
    /// Example: `3f2a9c1b  2025-03-01 14:30 UTC  Yard 4  80.0 kg total, 40.0 kg extracted (50.0%), 40.0 kg remaining`
    pub fn format_list_row(scan: &Scan) -> String {
        let summary = ScanSummary::for_scan(scan);
        let mut row = format!(
            "{}  {}  {}  {}",
            scan.id,
            time::display(&scan.updated_at),
            scan.location.as_deref().unwrap_or("(no location)"),
            summary.headline()
        );
        if !scan.is_complete() {
            row.push_str("  [incomplete]");
        } else if summary.over_extracted {
            row.push_str("  [over-extracted]");
        }
        row
    }

    /// Detailed multi-line view of one scan
    pub fn format_scan(scan: &Scan) -> String {
        let summary = ScanSummary::for_scan(scan);
        let mut output = String::new();

        output.push_str(&format!("Scan {}\n", scan.id));
        output.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
        output.push_str(&format!(
            "Location:  {}\n",
            scan.location.as_deref().unwrap_or("-")
        ));
        output.push_str(&format!("Created:   {}\n", time::display(&scan.created_at)));
        output.push_str(&format!("Updated:   {}\n", time::display(&scan.updated_at)));
        output.push_str(&format!(
            "Photo:     {}\n",
            match &scan.photo {
                Some(photo) => photo.mime.as_str(),
                None => "none",
            }
        ));
        output.push('\n');
        output.push_str(&format!("Total residual: {}\n", format_kg(summary.total_residual_kg)));
        output.push_str(&format!("Extracted:      {}\n", format_kg(summary.extracted_kg)));
        output.push_str(&format!("Remaining:      {}\n", format_kg(summary.remaining_kg)));
        output.push_str(&format!(
            "Separation:     {}\n",
            format_percent(summary.separation_percent)
        ));

        if summary.over_extracted {
            output.push_str("\n⚠ Streams add up to more than the measured total\n");
        }

        output.push_str("\nStreams:\n");
        if summary.streams.is_empty() {
            output.push_str("  No streams recorded\n");
        }
        for stream in &summary.streams {
            output.push_str(&format!(
                "  {:<20} {:>10} {:>7}\n",
                stream.name,
                format_kg(stream.weight_kg),
                format_percent(stream.share_percent)
            ));
        }

        if let Some(notes) = scan.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            output.push_str(&format!("\nNotes:\n{}\n", notes));
        }

        output
    }
}
