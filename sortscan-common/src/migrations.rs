//! Stored collection schema migrations
//!
//! The scans document carries a `schemaVersion` tag. Older documents are
//! upgraded by an ordered chain of pure `Value -> Value` steps, one per
//! version, applied strictly in order until [`CURRENT_SCHEMA_VERSION`].
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing steps** - documents written by old releases must keep upgrading the same way
//! 2. **Always add new steps** - bump [`CURRENT_SCHEMA_VERSION`] and append to [`MIGRATIONS`]
//! 3. **Steps are pure** - no clock, no randomness, no I/O; the repository persists the result
//! 4. **Each step sets `schemaVersion`** to its target version
//!
//! # Versions
//!
//! - v0: unversioned legacy payload, either a bare array of scans or an object without `schemaVersion`
//! - v1: `{ "schemaVersion": 1, "scans": [...] }` with fields as written by the first release
//! - v2: every scan has `updatedAt`, explicit `location`/`notes`/`photo` keys and numeric,
//!   non-negative weights

use crate::model::{coerce_weight, parse_weight};
use crate::{Error, Result};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// A step upgrading a whole document by exactly one version
pub type MigrationStep = fn(Value) -> Result<Value>;

/// Ordered migration chain: `(from_version, step)` upgrades `from_version` to `from_version + 1`
pub const MIGRATIONS: &[(u32, MigrationStep)] = &[(0, migrate_v1), (1, migrate_v2)];

/// Placeholder creation time for legacy scans that carry no timestamp at all
const LEGACY_EPOCH: &str = "1970-01-01T00:00:00Z";

/// Result of running the chain over one document
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub document: Value,
    pub from_version: u32,
    pub to_version: u32,
}

impl MigrationOutcome {
    /// Whether any step ran
    pub fn migrated(&self) -> bool {
        self.to_version != self.from_version
    }
}

/// Schema version of a stored document
///
/// A bare array, or an object without `schemaVersion`, is version 0.
pub fn detect_version(document: &Value) -> Result<u32> {
    match document {
        Value::Array(_) => Ok(0),
        Value::Object(map) => match map.get("schemaVersion") {
            None | Some(Value::Null) => Ok(0),
            Some(v) => v
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| {
                    Error::MalformedStoredData(format!("invalid schemaVersion: {}", v))
                }),
        },
        other => Err(Error::MalformedStoredData(format!(
            "expected object or array at document root, found {}",
            json_kind(other)
        ))),
    }
}

/// Upgrade `document` to [`CURRENT_SCHEMA_VERSION`]
///
/// Documents already at the current version pass through unchanged. Documents
/// from a newer release are returned untouched (logged as a warning) so they
/// are never downgraded.
pub fn run_migrations(document: Value) -> Result<MigrationOutcome> {
    let from_version = detect_version(&document)?;

    if from_version == CURRENT_SCHEMA_VERSION {
        return Ok(MigrationOutcome {
            document,
            from_version,
            to_version: from_version,
        });
    }

    if from_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Stored schema version ({}) is newer than code version ({})",
            from_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Loading without migration.");
        return Ok(MigrationOutcome {
            document,
            from_version,
            to_version: from_version,
        });
    }

    info!(
        "Running scan collection migrations: v{} -> v{}",
        from_version, CURRENT_SCHEMA_VERSION
    );

    let mut document = document;
    let mut version = from_version;
    for (step_from, step) in MIGRATIONS {
        if *step_from < version {
            continue;
        }
        if *step_from != version {
            return Err(Error::MalformedStoredData(format!(
                "no migration step from v{}",
                version
            )));
        }

        document = step(document)?;
        let reached = detect_version(&document)?;
        if reached != version + 1 {
            return Err(Error::MalformedStoredData(format!(
                "migration from v{} produced v{}",
                version, reached
            )));
        }
        version = reached;
        info!("✓ Migration v{} completed", version);
    }

    if version != CURRENT_SCHEMA_VERSION {
        return Err(Error::MalformedStoredData(format!(
            "migration chain stopped at v{}",
            version
        )));
    }

    Ok(MigrationOutcome {
        document,
        from_version,
        to_version: version,
    })
}

/// Migration v1: wrap the legacy payload in a versioned envelope
fn migrate_v1(document: Value) -> Result<Value> {
    let scans = match document {
        Value::Array(scans) => scans,
        Value::Object(mut map) => match map.remove("scans") {
            Some(Value::Array(scans)) => scans,
            None | Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(Error::MalformedStoredData(format!(
                    "legacy scans field is {}, expected array",
                    json_kind(&other)
                )))
            }
        },
        other => {
            return Err(Error::MalformedStoredData(format!(
                "legacy document is {}",
                json_kind(&other)
            )))
        }
    };

    Ok(json!({ "schemaVersion": 1, "scans": scans }))
}

/// Migration v2: backfill timestamps and nullable keys, coerce weights to numbers
fn migrate_v2(document: Value) -> Result<Value> {
    let Value::Object(mut root) = document else {
        return Err(Error::MalformedStoredData("v1 document is not an object".to_string()));
    };

    let scans = match root.remove("scans") {
        Some(Value::Array(scans)) => scans,
        None | Some(Value::Null) => Vec::new(),
        Some(other) => {
            return Err(Error::MalformedStoredData(format!(
                "scans field is {}, expected array",
                json_kind(&other)
            )))
        }
    };

    let upgraded: Vec<Value> = scans
        .into_iter()
        .filter_map(|scan| match scan {
            Value::Object(map) => Some(Value::Object(upgrade_scan_v2(map))),
            other => {
                warn!("Dropping non-object scan entry ({}) during v2 migration", json_kind(&other));
                None
            }
        })
        .collect();

    root.insert("schemaVersion".to_string(), json!(2));
    root.insert("scans".to_string(), Value::Array(upgraded));
    Ok(Value::Object(root))
}

fn upgrade_scan_v2(mut scan: Map<String, Value>) -> Map<String, Value> {
    if !scan.get("id").is_some_and(Value::is_string) {
        scan.insert("id".to_string(), json!(""));
    }

    let created = non_empty_string(scan.get("createdAt"))
        .or_else(|| non_empty_string(scan.get("updatedAt")))
        .unwrap_or_else(|| LEGACY_EPOCH.to_string());
    let updated = non_empty_string(scan.get("updatedAt")).unwrap_or_else(|| created.clone());
    scan.insert("createdAt".to_string(), json!(created));
    scan.insert("updatedAt".to_string(), json!(updated));

    for key in ["location", "notes", "photo"] {
        scan.entry(key.to_string()).or_insert(Value::Null);
    }

    let total = json_weight(scan.get("totalResidualKg"));
    scan.insert("totalResidualKg".to_string(), json!(total));

    let streams = match scan.remove("streams") {
        Some(Value::Array(streams)) => streams
            .into_iter()
            .filter_map(|s| match s {
                Value::Object(mut stream) => {
                    if !stream.get("id").is_some_and(Value::is_string) {
                        stream.insert("id".to_string(), json!(""));
                    }
                    if !stream.get("name").is_some_and(Value::is_string) {
                        stream.insert("name".to_string(), json!(""));
                    }
                    let weight = json_weight(stream.get("weightKg"));
                    stream.insert("weightKg".to_string(), json!(weight));
                    Some(Value::Object(stream))
                }
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    scan.insert("streams".to_string(), Value::Array(streams));

    scan
}

/// Weight from a stored value: numbers and numeric strings, everything else 0
fn json_weight(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => coerce_weight(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => parse_weight(s),
        _ => 0.0,
    }
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
