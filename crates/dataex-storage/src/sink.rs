//! Array sink: append-only growth with a single finalize-time trim.
//!
//! The sink owns the run's [`StructuredFile`] and enforces the array
//! discipline the exporter relies on: the main 3-D array only grows while
//! the run is open, by exactly the frames appended, and is shrunk exactly
//! once, at finalization, to drop trailing reference frames. Auxiliary
//! single-frame arrays (`data_dark`, `data_white`) are overwritten in place.

use std::collections::HashSet;

use dataex_core::{ExportError, Frame, Result};
use tracing::debug;

use crate::container::{Dataset, ScalarValue, StructuredFile};

/// Policy layer over a [`StructuredFile`].
#[derive(Debug)]
pub struct ArraySink {
    file: StructuredFile,
    trimmed: HashSet<String>,
}

impl ArraySink {
    /// Take exclusive ownership of the run's structured file.
    pub fn new(file: StructuredFile) -> Self {
        Self {
            file,
            trimmed: HashSet::new(),
        }
    }

    /// Write (or overwrite) a scalar dataset.
    pub fn write_scalar(&mut self, path: &str, value: impl Into<ScalarValue>) {
        self.file.put(path, Dataset::Scalar {
            value: value.into(),
        });
    }

    /// Write (or overwrite) a 1-D float dataset.
    pub fn write_array1(&mut self, path: &str, data: Vec<f64>) {
        self.file.put(path, Dataset::Array1 { data });
    }

    /// Allocate the growable main array with zero frames.
    pub fn create_main(&mut self, path: &str, height: usize, width: usize, chunk: usize) -> Result<()> {
        if self.file.contains(path) {
            return Err(ExportError::sequencing(format!(
                "main array '{path}' allocated twice"
            )));
        }
        self.file.put(
            path,
            Dataset::Array3 {
                height,
                width,
                chunk,
                data: Vec::new(),
            },
        );
        debug!(path, height, width, chunk, "allocated main array");
        Ok(())
    }

    /// Allocate a single-frame auxiliary array, zero-filled.
    pub fn create_aux(&mut self, path: &str, height: usize, width: usize) {
        self.file.put(
            path,
            Dataset::Array3 {
                height,
                width,
                chunk: 1,
                data: vec![0.0; height * width],
            },
        );
    }

    /// Overwrite a single-frame auxiliary array with `frame`.
    pub fn write_frame(&mut self, path: &str, frame: &Frame) -> Result<()> {
        match self.file.get_mut(path) {
            Some(Dataset::Array3 {
                height,
                width,
                data,
                ..
            }) if *height == frame.rows() && *width == frame.cols() => {
                *data = frame.data().to_vec();
                Ok(())
            }
            Some(_) => Err(ExportError::sequencing(format!(
                "dataset '{path}' has a different shape than the written frame"
            ))),
            None => Err(ExportError::sequencing(format!(
                "dataset '{path}' written before allocation"
            ))),
        }
    }

    /// Append frames to the main array, growing the leading axis by exactly
    /// the number of frames given.
    pub fn append_frames(&mut self, path: &str, frames: &[Frame]) -> Result<()> {
        if self.trimmed.contains(path) {
            return Err(ExportError::sequencing(format!(
                "append to '{path}' after finalize-time trim"
            )));
        }
        match self.file.get_mut(path) {
            Some(Dataset::Array3 {
                height,
                width,
                data,
                ..
            }) => {
                for frame in frames {
                    if frame.rows() != *height || frame.cols() != *width {
                        return Err(ExportError::sequencing(format!(
                            "frame shape {}x{} does not match dataset '{path}' ({height}x{width})",
                            frame.rows(),
                            frame.cols(),
                        )));
                    }
                    data.extend_from_slice(frame.data());
                }
                Ok(())
            }
            Some(_) => Err(ExportError::sequencing(format!(
                "dataset '{path}' is not a frame array"
            ))),
            None => Err(ExportError::sequencing(format!(
                "append to '{path}' before allocation"
            ))),
        }
    }

    /// Leading-axis length of the array at `path`, in frames.
    pub fn frame_count(&self, path: &str) -> usize {
        self.file.get(path).and_then(Dataset::frames).unwrap_or(0)
    }

    /// The final `chunk` frames of the array at `path` (all frames when the
    /// array is shorter than one chunk). The white-reference extraction.
    pub fn last_chunk(&self, path: &str) -> Result<Vec<Frame>> {
        match self.file.get(path) {
            Some(Dataset::Array3 {
                height,
                width,
                chunk,
                data,
            }) => {
                let per_frame = height * width;
                if per_frame == 0 {
                    return Ok(Vec::new());
                }
                let total = data.len() / per_frame;
                let take = total.min(*chunk);
                let tail = &data[(total - take) * per_frame..];
                let frames = tail
                    .chunks(per_frame)
                    .map(|px| Frame::new(*height, *width, px.to_vec()))
                    .collect::<Option<Vec<_>>>()
                    .unwrap_or_default();
                Ok(frames)
            }
            _ => Err(ExportError::sequencing(format!(
                "last-chunk read of missing array '{path}'"
            ))),
        }
    }

    /// Shrink the array's leading axis by `n_frames` from the tail.
    ///
    /// Performed exactly once per dataset, at finalization; a second trim or
    /// a trim larger than the array is a sequencing fault.
    pub fn trim_tail(&mut self, path: &str, n_frames: usize) -> Result<()> {
        if !self.trimmed.insert(path.to_string()) {
            return Err(ExportError::sequencing(format!(
                "array '{path}' trimmed twice"
            )));
        }
        match self.file.get_mut(path) {
            Some(Dataset::Array3 {
                height,
                width,
                data,
                ..
            }) => {
                let per_frame = *height * *width;
                let total = if per_frame == 0 { 0 } else { data.len() / per_frame };
                if n_frames > total {
                    return Err(ExportError::sequencing(format!(
                        "trim of {n_frames} frames exceeds '{path}' length {total}"
                    )));
                }
                data.truncate((total - n_frames) * per_frame);
                debug!(path, trimmed = n_frames, remaining = total - n_frames, "trimmed array tail");
                Ok(())
            }
            _ => Err(ExportError::sequencing(format!(
                "trim of missing array '{path}'"
            ))),
        }
    }

    /// Finalize: serialize the container and release the handle.
    pub fn close(self) -> Result<()> {
        self.file.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::{Manager, MemoryManager, OpenMode};

    fn sink() -> (MemoryManager, ArraySink) {
        let mut manager = MemoryManager::new();
        let handle = manager
            .open("stream_data", "run.json", OpenMode::Create)
            .unwrap();
        let sink = ArraySink::new(StructuredFile::new(handle));
        (manager, sink)
    }

    #[test]
    fn appends_grow_by_exactly_the_frames_given() {
        let (_m, mut sink) = sink();
        sink.create_main("/exchange/data", 2, 2, 5).unwrap();
        sink.append_frames("/exchange/data", &vec![Frame::zeros(2, 2); 3])
            .unwrap();
        assert_eq!(sink.frame_count("/exchange/data"), 3);
        sink.append_frames("/exchange/data", &[Frame::zeros(2, 2)])
            .unwrap();
        assert_eq!(sink.frame_count("/exchange/data"), 4);
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let (_m, mut sink) = sink();
        sink.create_main("/exchange/data", 2, 2, 5).unwrap();
        let err = sink
            .append_frames("/exchange/data", &[Frame::zeros(3, 2)])
            .unwrap_err();
        assert!(err.to_string().contains("/exchange/data"));
    }

    #[test]
    fn last_chunk_takes_at_most_chunk_frames() {
        let (_m, mut sink) = sink();
        sink.create_main("/exchange/data", 1, 1, 2).unwrap();
        let frames: Vec<Frame> = (0..5)
            .map(|i| Frame::filled(1, 1, f64::from(i)))
            .collect();
        sink.append_frames("/exchange/data", &frames).unwrap();

        let tail = sink.last_chunk("/exchange/data").unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].data(), &[3.0]);
        assert_eq!(tail[1].data(), &[4.0]);
    }

    #[test]
    fn trim_happens_exactly_once() {
        let (_m, mut sink) = sink();
        sink.create_main("/exchange/data", 1, 1, 2).unwrap();
        sink.append_frames("/exchange/data", &vec![Frame::zeros(1, 1); 4])
            .unwrap();
        sink.trim_tail("/exchange/data", 2).unwrap();
        assert_eq!(sink.frame_count("/exchange/data"), 2);
        assert!(sink.trim_tail("/exchange/data", 1).is_err());
        assert!(sink.append_frames("/exchange/data", &[Frame::zeros(1, 1)]).is_err());
    }

    #[test]
    fn oversized_trim_is_rejected() {
        let (_m, mut sink) = sink();
        sink.create_main("/exchange/data", 1, 1, 2).unwrap();
        sink.append_frames("/exchange/data", &[Frame::zeros(1, 1)])
            .unwrap();
        assert!(sink.trim_tail("/exchange/data", 2).is_err());
    }

    #[test]
    fn aux_frames_overwrite_in_place() {
        let (_m, mut sink) = sink();
        sink.create_aux("/exchange/data_dark", 2, 2);
        sink.write_frame("/exchange/data_dark", &Frame::filled(2, 2, 7.0))
            .unwrap();
        sink.write_frame("/exchange/data_dark", &Frame::filled(2, 2, 9.0))
            .unwrap();
        assert!(sink
            .write_frame("/exchange/data_dark", &Frame::zeros(3, 3))
            .is_err());
    }

    #[test]
    fn double_allocation_is_a_fault() {
        let (_m, mut sink) = sink();
        sink.create_main("/exchange/data", 1, 1, 1).unwrap();
        assert!(sink.create_main("/exchange/data", 1, 1, 1).is_err());
    }
}
