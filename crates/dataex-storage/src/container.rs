//! Structured container file.
//!
//! One run produces one container: a tree of named datasets keyed by
//! `/`-separated paths (`/exchange/data`, `x_ini`, ...). The container lives
//! in memory while the run is open and is serialized through the manager
//! handle exactly once, as self-describing JSON, when the run finalizes.

use std::collections::BTreeMap;
use std::io::Write;

use dataex_core::{ExportError, Frame, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::manager::SinkHandle;

/// A scalar dataset value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScalarValue {
    /// A string.
    Str(String),
    /// A signed integer.
    I64(i64),
    /// A floating-point number.
    F64(f64),
}

impl From<&str> for ScalarValue {
    fn from(v: &str) -> Self {
        ScalarValue::Str(v.to_string())
    }
}

impl From<i64> for ScalarValue {
    fn from(v: i64) -> Self {
        ScalarValue::I64(v)
    }
}

impl From<f64> for ScalarValue {
    fn from(v: f64) -> Self {
        ScalarValue::F64(v)
    }
}

/// One dataset within the container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Dataset {
    /// A single value.
    Scalar {
        /// The value.
        value: ScalarValue,
    },
    /// A 1-D float array.
    Array1 {
        /// The values.
        data: Vec<f64>,
    },
    /// A 3-D float array (frame x height x width), growable along the
    /// leading axis. `chunk` records the per-write growth hint.
    Array3 {
        /// Frame height.
        height: usize,
        /// Frame width.
        width: usize,
        /// Chunking hint (frames per batch).
        chunk: usize,
        /// Row-major pixel data, `frames * height * width` long.
        data: Vec<f64>,
    },
}

impl Dataset {
    /// Leading-axis length of a 3-D dataset, in frames.
    pub fn frames(&self) -> Option<usize> {
        match self {
            Dataset::Array3 {
                height,
                width,
                data,
                ..
            } => {
                let per_frame = height * width;
                if per_frame == 0 {
                    None
                } else {
                    Some(data.len() / per_frame)
                }
            }
            _ => None,
        }
    }
}

/// In-memory structured file, flushed through its handle at close.
#[derive(Debug)]
pub struct StructuredFile {
    handle: SinkHandle,
    datasets: BTreeMap<String, Dataset>,
}

impl StructuredFile {
    /// Wrap a manager handle in an empty container.
    pub fn new(handle: SinkHandle) -> Self {
        Self {
            handle,
            datasets: BTreeMap::new(),
        }
    }

    /// Insert or overwrite a dataset at `path`.
    pub fn put(&mut self, path: &str, dataset: Dataset) {
        self.datasets.insert(path.to_string(), dataset);
    }

    /// Dataset at `path`, if any.
    pub fn get(&self, path: &str) -> Option<&Dataset> {
        self.datasets.get(path)
    }

    /// Mutable dataset at `path`, if any.
    pub fn get_mut(&mut self, path: &str) -> Option<&mut Dataset> {
        self.datasets.get_mut(path)
    }

    /// Whether a dataset exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.datasets.contains_key(path)
    }

    /// Serialize the container through the handle and release it.
    ///
    /// Called exactly once, at run finalization.
    pub fn close(mut self) -> Result<()> {
        let payload = serde_json::to_vec(&self.datasets)
            .map_err(|e| ExportError::Storage(std::io::Error::other(e)))?;
        self.handle.write_all(&payload)?;
        self.handle.flush()?;
        debug!(
            datasets = self.datasets.len(),
            bytes = payload.len(),
            "structured file serialized"
        );
        Ok(())
    }
}

/// Deserialize a container image previously written by [`StructuredFile::close`].
///
/// Readers (tests, downstream consumers) get the same path-keyed dataset view
/// the writer had.
pub fn read_container(bytes: &[u8]) -> Result<BTreeMap<String, Dataset>> {
    serde_json::from_slice(bytes).map_err(|e| ExportError::Storage(std::io::Error::other(e)))
}

/// Frames stored at `path`, reconstructed from a container image.
pub fn frames_of(datasets: &BTreeMap<String, Dataset>, path: &str) -> Option<Vec<Frame>> {
    match datasets.get(path)? {
        Dataset::Array3 {
            height,
            width,
            data,
            ..
        } => {
            let per_frame = height * width;
            if per_frame == 0 || data.len() % per_frame != 0 {
                return None;
            }
            data.chunks(per_frame)
                .map(|px| Frame::new(*height, *width, px.to_vec()))
                .collect()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{Manager, MemoryManager, OpenMode};

    #[test]
    fn container_round_trips_through_a_buffer() {
        let mut manager = MemoryManager::new();
        let handle = manager
            .open("stream_data", "run.json", OpenMode::Create)
            .unwrap();
        let mut file = StructuredFile::new(handle);
        file.put("uid", Dataset::Scalar { value: "r1".into() });
        file.put(
            "/exchange/theta",
            Dataset::Array1 {
                data: vec![0.0, 0.5, 1.0],
            },
        );
        file.put(
            "/exchange/data",
            Dataset::Array3 {
                height: 1,
                width: 2,
                chunk: 1,
                data: vec![1.0, 2.0, 3.0, 4.0],
            },
        );
        file.close().unwrap();

        let bytes = manager.artifacts()["stream_data"][0].bytes().unwrap();
        let datasets = read_container(&bytes).unwrap();
        assert_eq!(
            datasets.get("uid"),
            Some(&Dataset::Scalar { value: "r1".into() }),
        );
        assert_eq!(datasets["/exchange/data"].frames(), Some(2));
        let frames = frames_of(&datasets, "/exchange/data").unwrap();
        assert_eq!(frames[1].data(), &[3.0, 4.0]);
    }

    #[test]
    fn scalar_value_kinds_survive_serde() {
        let values = vec![
            ScalarValue::Str("note".to_string()),
            ScalarValue::I64(42),
            ScalarValue::F64(8.5),
        ];
        let json = serde_json::to_string(&values).unwrap();
        let back: Vec<ScalarValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
