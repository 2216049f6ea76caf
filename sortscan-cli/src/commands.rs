//! Subcommand implementations
//!
//! Each command opens the repository or settings store over a [`FileStore`]
//! in the data folder, performs one operation and prints the result.
//! Persistence failures are reported as warnings; the in-memory result is
//! still printed and the command succeeds.

use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use sortscan_common::analysis::parse_stream_suggestion;
use sortscan_common::config::{resolve_api_key, TomlConfig};
use sortscan_common::editor::EditorSession;
use sortscan_common::model::{parse_weight, validate_finalizable, PRESET_STREAMS};
use sortscan_common::report::{self, TextFormatter};
use sortscan_common::repository::LoadOutcome;
use sortscan_common::{
    FileStore, Mutation, ScanDraft, ScanPatch, ScanRepository, SettingsStore, StreamDraft,
};
use tracing::warn;

use crate::photo::load_photo;
use crate::{Command, ScanFields, SettingsAction};

/// Parse a `NAME=KG` stream argument
///
/// Splits at the last `=` so names may contain `=`. The weight follows the
/// same lenient parsing as interactive input.
pub fn parse_stream_arg(value: &str) -> std::result::Result<(String, f64), String> {
    let (name, weight) = value
        .rsplit_once('=')
        .ok_or_else(|| format!("expected NAME=KG, got {:?}", value))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("stream name missing in {:?}", value));
    }
    Ok((name.to_string(), parse_weight(weight)))
}

pub fn run<W: Write>(
    command: Command,
    data_folder: &Path,
    toml_config: &TomlConfig,
    out: &mut W,
) -> Result<()> {
    let store = FileStore::new(data_folder);

    match command {
        Command::List => list(&open_repository(store)?, out),
        Command::Show { id, json } => show(&open_repository(store)?, &id, json, out),
        Command::Create { fields } => create(&mut open_repository(store)?, fields, out),
        Command::Update {
            id,
            fields,
            clear_streams,
            clear_photo,
        } => update(
            &mut open_repository(store)?,
            &id,
            fields,
            clear_streams,
            clear_photo,
            out,
        ),
        Command::Delete { id } => delete(&mut open_repository(store)?, &id, out),
        Command::Report {
            id,
            out: out_path,
            json,
        } => write_report(&open_repository(store)?, &id, out_path.as_deref(), json, out),
        Command::ApplyAnalysis { id, input } => {
            apply_analysis(&mut open_repository(store)?, &id, &input, out)
        }
        Command::Settings { action } => settings(SettingsStore::new(store), action, toml_config, out),
        Command::Presets => {
            for name in PRESET_STREAMS {
                writeln!(out, "{}", name)?;
            }
            Ok(())
        }
    }
}

fn open_repository(store: FileStore) -> Result<ScanRepository<FileStore>> {
    let dir = store.dir().to_path_buf();
    let repo = ScanRepository::open(store)
        .with_context(|| format!("Failed to open scans in {}", dir.display()))?;

    match repo.load_outcome() {
        LoadOutcome::Recovered { reason } => {
            eprintln!("warning: stored scans could not be read ({}); starting empty", reason)
        }
        LoadOutcome::NewerSchema { version } => eprintln!(
            "warning: scans were written by a newer version (schema v{}); changes will not be saved",
            version
        ),
        LoadOutcome::Migrated {
            persisted: false, ..
        }
        | LoadOutcome::Repaired { persisted: false } => {
            eprintln!("warning: upgraded scan data could not be written back")
        }
        _ => {}
    }
    Ok(repo)
}

fn find(repo: &ScanRepository<FileStore>, id: &str) -> Result<sortscan_common::Scan> {
    repo.get(id).ok_or_else(|| anyhow!("No scan with id {}", id))
}

/// Print a warning when a mutation was not persisted
fn warn_if_not_durable<T>(mutation: &Mutation<T>) {
    if let Some(e) = mutation.persist_error() {
        warn!("Mutation not persisted: {}", e);
        eprintln!("warning: change was not saved: {}", e);
    }
}

fn stream_drafts(streams: Vec<(String, f64)>) -> Vec<StreamDraft> {
    streams
        .into_iter()
        .map(|(name, weight)| StreamDraft::new(name, weight))
        .collect()
}

fn list<W: Write>(repo: &ScanRepository<FileStore>, out: &mut W) -> Result<()> {
    let scans = repo.list();
    if scans.is_empty() {
        writeln!(out, "No scans recorded")?;
    }
    for scan in &scans {
        writeln!(out, "{}", TextFormatter::format_list_row(scan))?;
    }
    Ok(())
}

fn show<W: Write>(repo: &ScanRepository<FileStore>, id: &str, json: bool, out: &mut W) -> Result<()> {
    let scan = find(repo, id)?;
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&scan)?)?;
    } else {
        write!(out, "{}", TextFormatter::format_scan(&scan))?;
    }
    Ok(())
}

fn create<W: Write>(repo: &mut ScanRepository<FileStore>, fields: ScanFields, out: &mut W) -> Result<()> {
    let total_residual_kg = fields.total.as_deref().map(parse_weight).unwrap_or(0.0);
    validate_finalizable(total_residual_kg).context("Scan not saved")?;

    let photo = fields.photo.as_deref().map(load_photo).transpose()?;
    let draft = ScanDraft {
        location: fields.location,
        notes: fields.notes,
        photo,
        total_residual_kg,
        streams: stream_drafts(fields.streams),
    };

    let mutation = repo.create(draft);
    warn_if_not_durable(&mutation);
    writeln!(out, "{}", mutation.value.id)?;
    Ok(())
}

fn update<W: Write>(
    repo: &mut ScanRepository<FileStore>,
    id: &str,
    fields: ScanFields,
    clear_streams: bool,
    clear_photo: bool,
    out: &mut W,
) -> Result<()> {
    let current = find(repo, id)?;
    let total = fields.total.as_deref().map(parse_weight);
    validate_finalizable(total.unwrap_or(current.total_residual_kg)).context("Scan not saved")?;

    let mut patch = ScanPatch::new();
    if let Some(location) = fields.location {
        patch = patch.location(Some(location));
    }
    if let Some(notes) = fields.notes {
        patch = patch.notes(Some(notes));
    }
    if let Some(path) = fields.photo.as_deref() {
        patch = patch.photo(Some(load_photo(path)?));
    } else if clear_photo {
        patch = patch.photo(None);
    }
    if let Some(total) = total {
        patch = patch.total_residual_kg(total);
    }
    if !fields.streams.is_empty() {
        patch = patch.streams(stream_drafts(fields.streams));
    } else if clear_streams {
        patch = patch.streams(Vec::new());
    }

    let mutation = repo
        .update(id, patch)
        .ok_or_else(|| anyhow!("No scan with id {}", id))?;
    warn_if_not_durable(&mutation);

    write!(out, "{}", TextFormatter::format_scan(&mutation.value))?;
    Ok(())
}

fn delete<W: Write>(repo: &mut ScanRepository<FileStore>, id: &str, out: &mut W) -> Result<()> {
    let mutation = repo.delete(id);
    warn_if_not_durable(&mutation);
    if !mutation.value {
        bail!("No scan with id {}", id);
    }
    writeln!(out, "Deleted {}", id)?;
    Ok(())
}

fn write_report<W: Write>(
    repo: &ScanRepository<FileStore>,
    id: &str,
    out_path: Option<&Path>,
    json: bool,
    out: &mut W,
) -> Result<()> {
    let scan = find(repo, id)?;

    let (content, default_name) = if json {
        let content = report::export_json(&scan).context("Cannot export scan")?;
        (content, format!("waste-scan-{}.json", scan.id))
    } else {
        let document = report::export(&scan).context("Cannot export scan")?;
        (document.html, document.file_name)
    };

    let path = out_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(&default_name).to_path_buf());
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write report to {}", path.display()))?;

    writeln!(out, "{}", path.display())?;
    Ok(())
}

fn apply_analysis<W: Write>(
    repo: &mut ScanRepository<FileStore>,
    id: &str,
    input: &Path,
    out: &mut W,
) -> Result<()> {
    let scan = find(repo, id)?;
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read analysis response {}", input.display()))?;
    let suggestion = parse_stream_suggestion(&raw).context("Analysis response rejected")?;

    let mut session = EditorSession::edit(&scan);
    session.apply_suggestion(&suggestion);
    let mutation = session.save(repo).context("Cannot save analysis result")?;
    warn_if_not_durable(&mutation);

    if let Some(notes) = &suggestion.notes {
        writeln!(out, "Analysis notes: {}", notes)?;
    }
    if let Some(confidence) = suggestion.confidence {
        writeln!(out, "Confidence: {:.0}%", confidence * 100.0)?;
    }
    write!(out, "{}", TextFormatter::format_scan(&mutation.value))?;
    Ok(())
}

fn settings<W: Write>(
    settings: SettingsStore<FileStore>,
    action: SettingsAction,
    toml_config: &TomlConfig,
    out: &mut W,
) -> Result<()> {
    match action {
        SettingsAction::Get => match settings.get()? {
            Some(key) => writeln!(out, "{}", key)?,
            None => writeln!(out, "No API key stored")?,
        },
        SettingsAction::Set { key } => {
            if key.trim().is_empty() {
                bail!("API key must not be blank; use `settings clear` to remove it");
            }
            settings.set(Some(key)).context("Failed to store API key")?;
            writeln!(out, "API key stored")?;
        }
        SettingsAction::Clear => {
            settings.set(None).context("Failed to clear API key")?;
            writeln!(out, "API key cleared")?;
        }
        SettingsAction::Status => {
            let stored = settings.exists()?;
            writeln!(
                out,
                "Stored key: {}",
                if stored { "present" } else { "absent" }
            )?;
            match resolve_api_key(&settings, toml_config) {
                Ok(_) => writeln!(out, "Analysis: configured")?,
                Err(e) => writeln!(out, "Analysis: not configured\n{}", e)?,
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_capture(command: Command, dir: &Path) -> Result<String> {
        let mut out = Vec::new();
        run(command, dir, &TomlConfig::default(), &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    fn fields(total: &str, streams: &[(&str, f64)]) -> ScanFields {
        ScanFields {
            total: Some(total.to_string()),
            location: Some("Yard 4".to_string()),
            streams: streams.iter().map(|(n, w)| (n.to_string(), *w)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_stream_arg() {
        assert_eq!(parse_stream_arg("Metal=12.5").unwrap(), ("Metal".to_string(), 12.5));
        assert_eq!(parse_stream_arg("a=b=3").unwrap(), ("a=b".to_string(), 3.0));
        assert_eq!(parse_stream_arg("Glass=-1").unwrap(), ("Glass".to_string(), 0.0));
        assert!(parse_stream_arg("Metal").is_err());
        assert!(parse_stream_arg(" =3").is_err());
    }

    #[test]
    fn test_create_list_show_delete() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        let id = run_capture(
            Command::Create {
                fields: fields("100", &[("Cardboard", 30.0), ("Metal", 20.0)]),
            },
            dir,
        )
        .unwrap()
        .trim()
        .to_string();

        let listing = run_capture(Command::List, dir).unwrap();
        assert!(listing.contains(&id));
        assert!(listing.contains("(50.0%)"));

        let shown = run_capture(Command::Show { id: id.clone(), json: true }, dir).unwrap();
        let value: serde_json::Value = serde_json::from_str(&shown).unwrap();
        assert_eq!(value["totalResidualKg"], 100.0);

        run_capture(Command::Delete { id: id.clone() }, dir).unwrap();
        assert!(run_capture(Command::Delete { id }, dir).is_err());
        assert_eq!(run_capture(Command::List, dir).unwrap(), "No scans recorded\n");
    }

    #[test]
    fn test_update_clears_streams() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let id = run_capture(Command::Create { fields: fields("10", &[("Paper", 2.0)]) }, dir)
            .unwrap()
            .trim()
            .to_string();

        let output = run_capture(
            Command::Update {
                id,
                fields: ScanFields::default(),
                clear_streams: true,
                clear_photo: false,
            },
            dir,
        )
        .unwrap();
        assert!(output.contains("No streams recorded"));
    }

    #[test]
    fn test_create_rejects_zero_total_without_writing() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();

        for total in ["0", "-5", "abc"] {
            let err = run_capture(Command::Create { fields: fields(total, &[("Paper", 1.0)]) }, dir)
                .unwrap_err();
            assert!(err.chain().any(|e| e.to_string().contains("Validation")));
        }
        assert!(!dir.join("scans.json").exists());
    }

    #[test]
    fn test_update_rejects_zero_total_without_writing() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let id = run_capture(Command::Create { fields: fields("10", &[]) }, dir)
            .unwrap()
            .trim()
            .to_string();
        let before = std::fs::read_to_string(dir.join("scans.json")).unwrap();

        let zeroed = ScanFields {
            total: Some("0".to_string()),
            ..Default::default()
        };
        assert!(run_capture(
            Command::Update { id: id.clone(), fields: zeroed, clear_streams: false, clear_photo: false },
            dir
        )
        .is_err());
        assert_eq!(std::fs::read_to_string(dir.join("scans.json")).unwrap(), before);

        // Updates that leave the total alone still go through
        let renamed = ScanFields {
            location: Some("Dock 2".to_string()),
            ..Default::default()
        };
        let output = run_capture(
            Command::Update { id, fields: renamed, clear_streams: false, clear_photo: false },
            dir,
        )
        .unwrap();
        assert!(output.contains("Dock 2"));
    }

    #[test]
    fn test_report_requires_total() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        // Incomplete scans can only come from other front ends
        let id = ScanRepository::open(FileStore::new(dir))
            .unwrap()
            .create(ScanDraft::default())
            .into_value()
            .id;

        let out = dir.join("report.html");
        assert!(run_capture(
            Command::Report { id, out: Some(out.clone()), json: false },
            dir
        )
        .is_err());
        assert!(!out.exists());
    }

    #[test]
    fn test_report_written() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let id = run_capture(Command::Create { fields: fields("80", &[("Glass", 20.0)]) }, dir)
            .unwrap()
            .trim()
            .to_string();

        let out = dir.join("report.html");
        run_capture(Command::Report { id, out: Some(out.clone()), json: false }, dir).unwrap();
        let html = std::fs::read_to_string(out).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("25.0%"));
    }

    #[test]
    fn test_apply_analysis_replaces_streams() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        let id = run_capture(Command::Create { fields: fields("5", &[("Wood", 1.0)]) }, dir)
            .unwrap()
            .trim()
            .to_string();

        let input = dir.join("response.json");
        std::fs::write(
            &input,
            r#"{"streams":[{"name":"Cardboard","weightKg":12},{"name":"","weightKg":3}],"totalEstimateKg":24,"confidence":0.75}"#,
        )
        .unwrap();

        let output = run_capture(Command::ApplyAnalysis { id, input }, dir).unwrap();
        assert!(output.contains("Confidence: 75%"));
        assert!(output.contains("Cardboard"));
        assert!(!output.contains("Wood"));
        assert!(output.contains("Separation:     50.0%"));
    }

    #[test]
    fn test_settings_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path();
        run_capture(
            Command::Settings {
                action: SettingsAction::Set { key: "abc".into() },
            },
            dir,
        )
        .unwrap();
        let got = run_capture(Command::Settings { action: SettingsAction::Get }, dir).unwrap();
        assert_eq!(got, "abc\n");

        run_capture(Command::Settings { action: SettingsAction::Clear }, dir).unwrap();
        let got = run_capture(Command::Settings { action: SettingsAction::Get }, dir).unwrap();
        assert_eq!(got, "No API key stored\n");
    }
}
