//! # SortScan Common Library
//!
//! Core of the waste-separation scanner shared by every front end:
//! - Scan data model and numeric coercion rules
//! - Separation metrics (extracted, remaining, percentages)
//! - Key-value persistence delegate and schema migrations
//! - Scan repository and settings store
//! - Self-contained report rendering
//! - Analysis collaborator interface and editor session
//! - Configuration loading

pub mod analysis;
pub mod config;
pub mod editor;
pub mod error;
pub mod id;
pub mod metrics;
pub mod migrations;
pub mod model;
pub mod report;
pub mod repository;
pub mod settings;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use model::{Photo, Scan, ScanDraft, ScanPatch, StreamDraft, StreamEntry};
pub use repository::{Durability, Mutation, ScanRepository};
pub use settings::SettingsStore;
pub use store::{FileStore, InMemoryStore, KeyValueStore};
