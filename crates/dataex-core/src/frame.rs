//! Owned 2-D image frames.
//!
//! Detector frames travel through event pages and are averaged to produce the
//! dark and white reference frames. Pixels are kept as `f64` because every
//! consumer downstream of the exporter (averaging, interpolation) works in
//! floating point.

use serde::{Deserialize, Serialize};

/// A single detector frame: row-major `rows x cols` grid of `f64` pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Frame {
    /// Build a frame from row-major pixel data.
    ///
    /// Returns `None` when `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Option<Self> {
        if data.len() != rows * cols {
            return None;
        }
        Some(Self { rows, cols, data })
    }

    /// An all-zero frame of the given shape.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// A frame with every pixel set to `value`. Test helper mostly.
    pub fn filled(rows: usize, cols: usize, value: f64) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows * cols],
        }
    }

    /// Number of rows (height).
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns (width).
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major pixel data.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Consume the frame, returning its pixel vector.
    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Whether `other` has the same shape.
    pub fn same_shape(&self, other: &Frame) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }

    /// Unweighted arithmetic mean over the leading axis of a frame batch.
    ///
    /// All frames must share one shape; the result preserves that shape.
    /// Returns `None` for an empty batch or mismatched shapes.
    pub fn mean(frames: &[Frame]) -> Option<Frame> {
        let first = frames.first()?;
        if !frames.iter().all(|f| f.same_shape(first)) {
            return None;
        }
        let mut acc = vec![0.0; first.data.len()];
        for frame in frames {
            for (a, px) in acc.iter_mut().zip(&frame.data) {
                *a += px;
            }
        }
        let n = frames.len() as f64;
        for a in &mut acc {
            *a /= n;
        }
        Some(Frame {
            rows: first.rows,
            cols: first.cols,
            data: acc,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_bad_length() {
        assert!(Frame::new(2, 2, vec![0.0; 3]).is_none());
        assert!(Frame::new(2, 2, vec![0.0; 4]).is_some());
    }

    #[test]
    fn mean_preserves_shape() {
        let frames = vec![Frame::filled(2, 3, 1.0), Frame::filled(2, 3, 3.0)];
        let avg = Frame::mean(&frames).unwrap();
        assert_eq!(avg.rows(), 2);
        assert_eq!(avg.cols(), 3);
        assert!(avg.data().iter().all(|&px| px == 2.0));
    }

    #[test]
    fn mean_of_empty_or_mismatched_is_none() {
        assert!(Frame::mean(&[]).is_none());
        let frames = vec![Frame::zeros(2, 2), Frame::zeros(3, 2)];
        assert!(Frame::mean(&frames).is_none());
    }

    #[test]
    fn mean_of_single_frame_is_identity() {
        let f = Frame::new(1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(Frame::mean(std::slice::from_ref(&f)).unwrap(), f);
    }
}
