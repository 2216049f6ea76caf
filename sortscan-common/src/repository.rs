//! Scan repository
//!
//! Owns the in-memory scan collection and mirrors it to a [`KeyValueStore`]
//! under [`SCANS_KEY`] as `{ "schemaVersion": N, "scans": [...] }`.
//!
//! Every mutation rewrites the whole collection. A failed write is not fatal:
//! the in-memory state stays authoritative, the caller is told through
//! [`Durability::NotPersisted`], and the next mutation writes the latest
//! state again.
//!
//! Mutating methods take `&mut self`, so load -> mutate -> persist sequences
//! cannot interleave within one process. Use [`SharedRepository`] to hand one
//! repository to several threads.

use crate::id::new_id;
use crate::migrations::{run_migrations, CURRENT_SCHEMA_VERSION};
use crate::model::{coerce_weight, normalize_streams, normalize_text, Scan, ScanDraft, ScanPatch};
use crate::store::{KeyValueStore, SCANS_KEY};
use crate::{time, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Repository shared across threads; the mutex serializes mutations
pub type SharedRepository<S> = Arc<Mutex<ScanRepository<S>>>;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CollectionRef<'a> {
    schema_version: u32,
    scans: &'a [Scan],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionDocument {
    schema_version: u32,
    #[serde(default)]
    scans: Vec<Scan>,
}

/// How the collection was obtained when the repository was opened
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Nothing stored yet; started empty at the current schema version
    Fresh,
    /// Stored collection was already current
    Loaded,
    /// Stored collection was upgraded (and, if `persisted`, written back)
    Migrated { from_version: u32, persisted: bool },
    /// Stored collection needed repairs (ids, names, weights) and was written back if `persisted`
    Repaired { persisted: bool },
    /// Stored collection comes from a newer release; writes are refused
    NewerSchema { version: u32 },
    /// Stored document could not be parsed; started empty, corrupt bytes left in place
    Recovered { reason: String },
}

/// Whether a mutation reached durable storage
#[derive(Debug)]
pub enum Durability {
    /// The full collection was written
    Persisted,
    /// Nothing changed, nothing was written
    Unchanged,
    /// The in-memory change stands but the write failed
    NotPersisted(Error),
}

/// Value produced by a mutation plus its durability
#[derive(Debug)]
pub struct Mutation<T> {
    pub value: T,
    pub durability: Durability,
}

impl<T> Mutation<T> {
    /// False only when a write was attempted and failed
    pub fn is_durable(&self) -> bool {
        !matches!(self.durability, Durability::NotPersisted(_))
    }

    pub fn persist_error(&self) -> Option<&Error> {
        match &self.durability {
            Durability::NotPersisted(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

/// Durable collection of scans
pub struct ScanRepository<S: KeyValueStore> {
    store: S,
    scans: Vec<Scan>,
    load_outcome: LoadOutcome,
}

impl<S: KeyValueStore> ScanRepository<S> {
    /// Load the collection from `store`, migrating and repairing it as needed
    ///
    /// Only a failed read is an error. Missing data yields an empty
    /// collection; unparsable data (including bytes that are not UTF-8)
    /// yields an empty collection and leaves the stored bytes untouched until
    /// the next mutation. Unreadable data from a newer schema opens empty and
    /// read-only.
    pub fn open(store: S) -> Result<Self> {
        let raw = match store.read(SCANS_KEY) {
            Ok(raw) => raw,
            Err(Error::MalformedStoredData(reason)) => {
                warn!("Stored scan collection is unreadable, starting empty: {}", reason);
                return Ok(Self {
                    store,
                    scans: Vec::new(),
                    load_outcome: LoadOutcome::Recovered { reason },
                });
            }
            Err(e) => return Err(e),
        };

        let Some(raw) = raw else {
            info!("No stored scans; starting with an empty collection (schema v{})", CURRENT_SCHEMA_VERSION);
            return Ok(Self {
                store,
                scans: Vec::new(),
                load_outcome: LoadOutcome::Fresh,
            });
        };

        let mut repo = match decode_collection(&raw) {
            Ok((scans, outcome)) => Self {
                store,
                scans,
                load_outcome: outcome,
            },
            Err(e) => {
                warn!("Stored scan collection is unreadable, starting empty: {}", e);
                return Ok(Self {
                    store,
                    scans: Vec::new(),
                    load_outcome: LoadOutcome::Recovered {
                        reason: e.to_string(),
                    },
                });
            }
        };

        let repaired = repair_loaded(&mut repo.scans);

        match repo.load_outcome.clone() {
            LoadOutcome::Migrated { from_version, .. } => {
                let persisted = repo.write_back("migrated");
                repo.load_outcome = LoadOutcome::Migrated {
                    from_version,
                    persisted,
                };
            }
            LoadOutcome::Loaded if repaired => {
                let persisted = repo.write_back("repaired");
                repo.load_outcome = LoadOutcome::Repaired { persisted };
            }
            _ => {}
        }

        info!(
            "Loaded {} scan(s) from storage ({:?})",
            repo.scans.len(),
            repo.load_outcome
        );
        Ok(repo)
    }

    /// Open and wrap in a mutex for use from several threads
    pub fn open_shared(store: S) -> Result<SharedRepository<S>> {
        Ok(Arc::new(Mutex::new(Self::open(store)?)))
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.scans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scans.is_empty()
    }

    /// All scans, most recently touched first; ties keep insertion order
    pub fn list(&self) -> Vec<Scan> {
        let mut out = self.scans.clone();
        // sort_by is stable
        out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        out
    }

    pub fn get(&self, id: &str) -> Option<Scan> {
        self.scans.iter().find(|s| s.id == id).cloned()
    }

    /// Persist a draft as a new scan
    ///
    /// Assigns the id and both timestamps, coerces weights, drops unnamed
    /// stream rows and assigns missing stream ids.
    pub fn create(&mut self, draft: ScanDraft) -> Mutation<Scan> {
        let now = time::now();
        let reserved = self.stream_ids_except(None);

        let scan = Scan {
            id: self.fresh_scan_id(),
            created_at: now,
            updated_at: now,
            location: normalize_text(draft.location),
            notes: normalize_text(draft.notes),
            photo: draft.photo,
            total_residual_kg: coerce_weight(draft.total_residual_kg),
            streams: normalize_streams(draft.streams, &reserved),
        };

        self.scans.push(scan.clone());
        info!(scan_id = %scan.id, streams = scan.streams.len(), "Created scan");

        Mutation {
            value: scan,
            durability: self.persist(),
        }
    }

    /// Merge `patch` into an existing scan and refresh `updatedAt`
    ///
    /// Returns `None`, without side effects, when `id` is unknown.
    pub fn update(&mut self, id: &str, patch: ScanPatch) -> Option<Mutation<Scan>> {
        let index = self.scans.iter().position(|s| s.id == id)?;
        let reserved = self.stream_ids_except(Some(id));

        let scan = &mut self.scans[index];
        if let Some(location) = patch.location {
            scan.location = normalize_text(location);
        }
        if let Some(notes) = patch.notes {
            scan.notes = normalize_text(notes);
        }
        if let Some(photo) = patch.photo {
            scan.photo = photo;
        }
        if let Some(total) = patch.total_residual_kg {
            scan.total_residual_kg = coerce_weight(total);
        }
        if let Some(streams) = patch.streams {
            scan.streams = normalize_streams(streams, &reserved);
        }
        scan.updated_at = time::now_at_least(scan.updated_at);

        let updated = scan.clone();
        debug!(scan_id = %updated.id, "Updated scan");

        Some(Mutation {
            value: updated,
            durability: self.persist(),
        })
    }

    /// Hard-delete a scan; the value is whether it existed
    pub fn delete(&mut self, id: &str) -> Mutation<bool> {
        let Some(index) = self.scans.iter().position(|s| s.id == id) else {
            debug!(scan_id = %id, "Delete of unknown scan ignored");
            return Mutation {
                value: false,
                durability: Durability::Unchanged,
            };
        };

        self.scans.remove(index);
        info!(scan_id = %id, "Deleted scan");

        Mutation {
            value: true,
            durability: self.persist(),
        }
    }

    fn fresh_scan_id(&self) -> String {
        loop {
            let id = new_id();
            if !self.scans.iter().any(|s| s.id == id) {
                return id;
            }
        }
    }

    /// Stream ids in use by every scan other than `except`
    fn stream_ids_except(&self, except: Option<&str>) -> HashSet<String> {
        self.scans
            .iter()
            .filter(|s| Some(s.id.as_str()) != except)
            .flat_map(|s| s.streams.iter().map(|e| e.id.clone()))
            .collect()
    }

    fn persist(&self) -> Durability {
        if let LoadOutcome::NewerSchema { version } = self.load_outcome {
            let err = Error::Persistence(format!(
                "stored collection uses schema v{} (newer than v{}); refusing to overwrite",
                version, CURRENT_SCHEMA_VERSION
            ));
            warn!("Change kept in memory only: {}", err);
            return Durability::NotPersisted(err);
        }

        let document = CollectionRef {
            schema_version: CURRENT_SCHEMA_VERSION,
            scans: &self.scans,
        };

        let result = serde_json::to_string(&document)
            .map_err(Error::from)
            .and_then(|json| self.store.write(SCANS_KEY, &json));

        match result {
            Ok(()) => Durability::Persisted,
            Err(e) => {
                warn!("Change kept in memory only, scans not saved: {}", e);
                Durability::NotPersisted(e)
            }
        }
    }

    fn write_back(&self, why: &str) -> bool {
        match self.persist() {
            Durability::NotPersisted(_) => false,
            _ => {
                info!("Stored scan collection {} and written back", why);
                true
            }
        }
    }
}

/// Parse, migrate and deserialize a stored collection
fn decode_collection(raw: &str) -> Result<(Vec<Scan>, LoadOutcome)> {
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| Error::MalformedStoredData(format!("invalid JSON: {}", e)))?;

    let migration = run_migrations(value)?;

    let outcome = if migration.from_version > CURRENT_SCHEMA_VERSION {
        LoadOutcome::NewerSchema {
            version: migration.from_version,
        }
    } else if migration.migrated() {
        LoadOutcome::Migrated {
            from_version: migration.from_version,
            persisted: false,
        }
    } else {
        LoadOutcome::Loaded
    };

    let document: CollectionDocument = match serde_json::from_value(migration.document) {
        Ok(document) => document,
        // A newer release may have changed the scan shape; stay read-only
        Err(e) if matches!(outcome, LoadOutcome::NewerSchema { .. }) => {
            warn!("Scans from schema v{} cannot be read by this version: {}", migration.from_version, e);
            return Ok((Vec::new(), outcome));
        }
        Err(e) => {
            return Err(Error::MalformedStoredData(format!(
                "invalid scan collection: {}",
                e
            )))
        }
    };
    debug!("Decoded scan collection at schema v{}", document.schema_version);

    Ok((document.scans, outcome))
}

/// Restore invariants on loaded data; returns whether anything changed
///
/// Assigns missing or duplicate scan and stream ids, drops unnamed streams,
/// coerces weights and keeps `updatedAt >= createdAt`.
fn repair_loaded(scans: &mut [Scan]) -> bool {
    let mut changed = false;
    let mut scan_ids: HashSet<String> = HashSet::new();
    let mut stream_ids: HashSet<String> = HashSet::new();

    for scan in scans.iter_mut() {
        if scan.id.is_empty() || scan_ids.contains(&scan.id) {
            scan.id = new_id();
            changed = true;
        }
        scan_ids.insert(scan.id.clone());

        let total = coerce_weight(scan.total_residual_kg);
        if total != scan.total_residual_kg {
            scan.total_residual_kg = total;
            changed = true;
        }

        if scan.updated_at < scan.created_at {
            scan.updated_at = scan.created_at;
            changed = true;
        }

        let before = scan.streams.len();
        scan.streams.retain(|s| !s.name.trim().is_empty());
        changed |= scan.streams.len() != before;

        for stream in scan.streams.iter_mut() {
            if stream.id.is_empty() || stream_ids.contains(&stream.id) {
                stream.id = new_id();
                changed = true;
            }
            stream_ids.insert(stream.id.clone());

            let weight = coerce_weight(stream.weight_kg);
            if weight != stream.weight_kg {
                stream.weight_kg = weight;
                changed = true;
            }
        }
    }

    changed
}
