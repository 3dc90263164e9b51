//! Bounding-box annotation on raw frames.

use vdet_models::Detection;

use crate::frame::Frame;

/// Fixed six-color palette (RGB). Classes map onto it deterministically.
const CLASS_PALETTE: [(u8, u8, u8); 6] = [
    (0, 255, 0),   // green
    (0, 0, 255),   // blue
    (255, 0, 0),   // red
    (255, 255, 0), // yellow
    (255, 0, 255), // magenta
    (0, 255, 255), // cyan
];

/// Height of the filled strip drawn above each box.
const LABEL_STRIP_HEIGHT: u32 = 14;

/// Deterministic palette color for a class label.
pub fn color_for_label(label: &str) -> (u8, u8, u8) {
    let sum: u32 = label.bytes().map(u32::from).sum();
    CLASS_PALETTE[(sum as usize) % CLASS_PALETTE.len()]
}

/// Box stroke width scaled to the frame resolution, minimum 2px.
pub fn stroke_thickness(width: u32, height: u32) -> u32 {
    ((0.002 * (width + height) as f64).round() as u32).max(2)
}

/// Draw all detections for one frame in place.
///
/// Coordinates are clamped to the frame; an empty detection list leaves the
/// frame untouched.
pub fn draw_detections(frame: &mut Frame, detections: &[Detection]) {
    let thickness = stroke_thickness(frame.width, frame.height);

    for det in detections {
        if !det.bbox.is_valid() {
            continue;
        }
        let color = color_for_label(&det.label);

        let x1 = det.bbox.x1.max(0.0) as u32;
        let y1 = det.bbox.y1.max(0.0) as u32;
        let x2 = (det.bbox.x2 as u32).min(frame.width.saturating_sub(1));
        let y2 = (det.bbox.y2 as u32).min(frame.height.saturating_sub(1));
        if x2 <= x1 || y2 <= y1 {
            continue;
        }

        draw_rect_stroke(frame, x1, y1, x2, y2, thickness, color);

        // Filled strip above the box where the label text would sit.
        let strip_top = y1.saturating_sub(LABEL_STRIP_HEIGHT);
        let strip_width = (x2 - x1).min(6 + 8 * det.label.len() as u32);
        fill_rect(frame, x1, strip_top, x1 + strip_width, y1, color);
    }
}

fn draw_rect_stroke(
    frame: &mut Frame,
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    thickness: u32,
    color: (u8, u8, u8),
) {
    for t in 0..thickness {
        // Horizontal edges.
        for x in x1..=x2 {
            frame.set_pixel(x, y1 + t, color);
            frame.set_pixel(x, y2.saturating_sub(t), color);
        }
        // Vertical edges.
        for y in y1..=y2 {
            frame.set_pixel(x1 + t, y, color);
            frame.set_pixel(x2.saturating_sub(t), y, color);
        }
    }
}

fn fill_rect(frame: &mut Frame, x1: u32, y1: u32, x2: u32, y2: u32, color: (u8, u8, u8)) {
    for y in y1..y2 {
        for x in x1..x2 {
            frame.set_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdet_models::BoundingBox;

    fn det(label: &str, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(label, 0.9, BoundingBox::new(x1, y1, x2, y2))
    }

    #[test]
    fn test_color_is_deterministic_per_label() {
        assert_eq!(color_for_label("person"), color_for_label("person"));
        let colors: Vec<_> = ["person", "car", "dog"]
            .iter()
            .map(|l| color_for_label(l))
            .collect();
        assert!(colors.iter().all(|c| CLASS_PALETTE.contains(c)));
    }

    #[test]
    fn test_stroke_thickness_scales_with_resolution() {
        assert_eq!(stroke_thickness(100, 100), 2);
        assert_eq!(stroke_thickness(1920, 1080), 6);
    }

    #[test]
    fn test_empty_detections_leave_frame_untouched() {
        let mut frame = Frame::black(0, 32, 32);
        draw_detections(&mut frame, &[]);
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_box_stroke_is_painted() {
        let mut frame = Frame::black(0, 64, 64);
        let d = det("car", 40.0, 40.0, 60.0, 60.0);
        draw_detections(&mut frame, std::slice::from_ref(&d));

        let color = color_for_label("car");
        // Top edge of the box.
        assert_eq!(frame.pixel(50, 40), Some(color));
        // Interior stays black.
        assert_eq!(frame.pixel(50, 50), Some((0, 0, 0)));
    }

    #[test]
    fn test_out_of_frame_boxes_are_clamped() {
        let mut frame = Frame::black(0, 16, 16);
        draw_detections(&mut frame, &[det("dog", 8.0, 8.0, 500.0, 500.0)]);
        // No panic, and the visible part of the stroke got painted.
        assert_eq!(frame.pixel(10, 8), Some(color_for_label("dog")));
    }

    #[test]
    fn test_invalid_boxes_are_skipped() {
        let mut frame = Frame::black(0, 16, 16);
        draw_detections(&mut frame, &[det("cat", 10.0, 10.0, 5.0, 5.0)]);
        assert!(frame.data.iter().all(|&b| b == 0));
    }
}
