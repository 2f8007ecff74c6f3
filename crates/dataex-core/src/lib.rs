//! `dataex-core`
//!
//! Shared building blocks for the Data-Exchange document pipeline: the
//! document model (a closed tagged union over the experiment document kinds),
//! the [`DocumentSink`] routing contract, owned detector [`Frame`]s, and the
//! run-fatal [`ExportError`] type.
//!
//! Processing is single-threaded and single-pass by contract: producers hand
//! over one document at a time, in arrival order, with non-decreasing
//! per-stream timestamps.

pub mod document;
pub mod error;
pub mod frame;
pub mod router;

pub use document::{
    CellValue, Column, DataKey, DatumPageDoc, DescriptorDoc, Document, EventDoc, EventPageDoc,
    ResourceDoc, StartDoc, StopDoc,
};
pub use error::{ExportError, Result};
pub use frame::Frame;
pub use router::DocumentSink;
