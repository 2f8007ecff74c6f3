//! `dataex-storage`
//!
//! Storage side of the Data-Exchange pipeline: the [`Manager`] boundary that
//! turns logical opens into files or buffers, the [`StructuredFile`]
//! container one run writes into, and the [`ArraySink`] policy layer that
//! enforces append-only growth with a single finalize-time trim.

pub mod container;
pub mod manager;
pub mod sink;

pub use container::{frames_of, read_container, Dataset, ScalarValue, StructuredFile};
pub use manager::{Artifact, Artifacts, Manager, MemoryManager, MultiFileManager, OpenMode, SinkHandle};
pub use sink::ArraySink;
