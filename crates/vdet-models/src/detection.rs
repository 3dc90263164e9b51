//! Per-frame detections and the aggregated result collection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A bounding box in pixel coordinates (top-left x1,y1 to bottom-right x2,y2).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    /// Check that the box has positive area and non-negative origin.
    pub fn is_valid(&self) -> bool {
        self.x1 >= 0.0 && self.y1 >= 0.0 && self.x2 > self.x1 && self.y2 > self.y1
    }
}

/// A single detection on one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class label reported by the engine
    pub label: String,
    /// Confidence score in [0, 1]
    pub confidence: f32,
    /// Bounding box in pixel coordinates
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// All detections for one decoded frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameDetections {
    /// Zero-based frame index
    pub frame_index: u64,
    /// Frame timestamp in seconds, derived from the frame rate
    pub timestamp_seconds: f64,
    /// Detections on this frame (empty is a valid outcome)
    pub detections: Vec<Detection>,
}

impl FrameDetections {
    pub fn new(frame_index: u64, timestamp_seconds: f64, detections: Vec<Detection>) -> Self {
        Self {
            frame_index,
            timestamp_seconds,
            detections,
        }
    }
}

/// Errors from building a detection result.
#[derive(Debug, Error)]
pub enum DetectionResultError {
    #[error("frame index {found} does not follow {previous}: indices must be strictly increasing")]
    NonMonotonicFrame { previous: u64, found: u64 },
}

/// Ordered per-frame detection sets for one job.
///
/// Append-only while the job is processing; frame indices are strictly
/// increasing. Sealing happens through the registry's terminal write, after
/// which the collection is only ever read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionResult {
    /// Per-frame detection sets, ordered by frame index
    pub frames: Vec<FrameDetections>,
}

impl DetectionResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append detections for the next frame.
    ///
    /// Rejects indices that do not strictly increase.
    pub fn push(&mut self, frame: FrameDetections) -> Result<(), DetectionResultError> {
        if let Some(last) = self.frames.last() {
            if frame.frame_index <= last.frame_index {
                return Err(DetectionResultError::NonMonotonicFrame {
                    previous: last.frame_index,
                    found: frame.frame_index,
                });
            }
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Number of frames covered by this result.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Total detections across all frames.
    pub fn total_detections(&self) -> u64 {
        self.frames.iter().map(|f| f.detections.len() as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(1.0, 2.0, 10.0, 12.0))
    }

    #[test]
    fn test_bbox_validity() {
        assert!(BoundingBox::new(0.0, 0.0, 5.0, 5.0).is_valid());
        assert!(!BoundingBox::new(5.0, 0.0, 5.0, 5.0).is_valid());
        assert!(!BoundingBox::new(-1.0, 0.0, 5.0, 5.0).is_valid());
    }

    #[test]
    fn test_push_enforces_ordering() {
        let mut result = DetectionResult::new();
        result
            .push(FrameDetections::new(0, 0.0, vec![det("car")]))
            .unwrap();
        result.push(FrameDetections::new(1, 0.04, vec![])).unwrap();

        let err = result
            .push(FrameDetections::new(1, 0.04, vec![]))
            .unwrap_err();
        assert!(matches!(
            err,
            DetectionResultError::NonMonotonicFrame {
                previous: 1,
                found: 1
            }
        ));
    }

    #[test]
    fn test_totals() {
        let mut result = DetectionResult::new();
        result
            .push(FrameDetections::new(0, 0.0, vec![det("a"), det("b")]))
            .unwrap();
        result.push(FrameDetections::new(3, 0.12, vec![])).unwrap();

        assert_eq!(result.frame_count(), 2);
        assert_eq!(result.total_detections(), 2);
    }

    #[test]
    fn test_empty_result_is_valid() {
        let result = DetectionResult::new();
        assert!(result.is_empty());
        assert_eq!(result.total_detections(), 0);
    }
}
