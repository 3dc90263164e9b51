//! Decoded frame buffer.

/// One decoded frame: packed RGB, 3 bytes per pixel, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Zero-based index within the source video
    pub index: u64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Packed rgb24 pixel data, `width * height * 3` bytes
    pub data: Vec<u8>,
}

impl Frame {
    /// Create a black frame.
    pub fn black(index: u64, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            data: vec![0; (width * height * 3) as usize],
        }
    }

    /// Expected byte length for the frame dimensions.
    pub fn byte_len(width: u32, height: u32) -> usize {
        (width * height * 3) as usize
    }

    /// Read one pixel; `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y * self.width + x) * 3) as usize;
        Some((self.data[i], self.data[i + 1], self.data[i + 2]))
    }

    /// Write one pixel; out-of-bounds writes are ignored.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgb: (u8, u8, u8)) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = ((y * self.width + x) * 3) as usize;
        self.data[i] = rgb.0;
        self.data[i + 1] = rgb.1;
        self.data[i + 2] = rgb.2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_roundtrip() {
        let mut frame = Frame::black(0, 4, 4);
        frame.set_pixel(2, 3, (10, 20, 30));
        assert_eq!(frame.pixel(2, 3), Some((10, 20, 30)));
        assert_eq!(frame.pixel(0, 0), Some((0, 0, 0)));
        assert_eq!(frame.pixel(4, 0), None);
    }

    #[test]
    fn test_out_of_bounds_write_is_ignored() {
        let mut frame = Frame::black(0, 2, 2);
        frame.set_pixel(5, 5, (255, 255, 255));
        assert!(frame.data.iter().all(|&b| b == 0));
    }
}
