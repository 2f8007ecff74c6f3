//! `dataex-export`
//!
//! The structured exporter: receives one run's document stream in arrival
//! order and builds a Data-Exchange container: run metadata, a growable
//! image array with dark/white reference frames, a baseline position
//! snapshot, and a rotation-angle series aligned to the image timestamps.
//!
//! ```no_run
//! use dataex_export::{export, ExportConfig};
//! use dataex_storage::MultiFileManager;
//! # fn docs() -> Vec<dataex_core::Document> { Vec::new() }
//!
//! # fn main() -> dataex_core::Result<()> {
//! let artifacts = export(docs(), MultiFileManager::new("out"), ExportConfig::default())?;
//! # let _ = artifacts; Ok(())
//! # }
//! ```

pub mod align;
pub mod classify;
pub mod config;
pub mod exporter;

pub use align::resample_linear;
pub use classify::{StreamClassifier, StreamRole};
pub use config::{BaselineFields, ExportConfig};
pub use exporter::{export, Exporter};
