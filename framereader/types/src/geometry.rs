/*!
    Crop rectangles and output resolutions.
*/

use serde::{Deserialize, Serialize};

/**
    Pixel offsets trimmed from each edge of a picture.

    All zero means no crop.
*/
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(default)]
pub struct Crop {
    /// Offset in pixels from the top of the frame.
    pub top: u32,
    /// Offset in pixels from the bottom of the frame.
    pub bottom: u32,
    /// Offset in pixels from the left of the frame.
    pub left: u32,
    /// Offset in pixels from the right of the frame.
    pub right: u32,
}

impl Crop {
    pub const fn new(top: u32, bottom: u32, left: u32, right: u32) -> Self {
        Self {
            top,
            bottom,
            left,
            right,
        }
    }

    /**
        Returns true if this crop leaves the picture untouched.
    */
    pub const fn is_noop(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }

    /**
        Returns the size left after cropping a `width` x `height` picture,
        or None if the crop removes the whole picture or more.
    */
    pub const fn cropped_size(&self, width: u32, height: u32) -> Option<Resolution> {
        let horizontal = self.left as u64 + self.right as u64;
        let vertical = self.top as u64 + self.bottom as u64;
        if horizontal >= width as u64 || vertical >= height as u64 {
            return None;
        }
        Some(Resolution {
            width: width - horizontal as u32,
            height: height - vertical as u32,
        })
    }
}

/**
    A picture size in pixels.

    Zero in both dimensions means no scaling.
*/
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(default)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /**
        Returns true if this resolution requests no scaling.
    */
    pub const fn is_noop(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /**
        Returns true if exactly one dimension is zero, which is never a usable
        scale target.
    */
    pub const fn is_partial(&self) -> bool {
        (self.width == 0) != (self.height == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_noop() {
        assert!(Crop::default().is_noop());
        assert!(Resolution::default().is_noop());
    }

    #[test]
    fn cropped_size_within_bounds() {
        let crop = Crop::new(2, 2, 4, 0);
        assert_eq!(crop.cropped_size(16, 8), Some(Resolution::new(12, 4)));
    }

    #[test]
    fn cropped_size_rejects_whole_picture() {
        assert_eq!(Crop::new(4, 4, 0, 0).cropped_size(16, 8), None);
        assert_eq!(Crop::new(0, 0, 16, 0).cropped_size(16, 8), None);
        assert_eq!(Crop::new(0, 0, u32::MAX, u32::MAX).cropped_size(16, 8), None);
    }

    #[test]
    fn partial_resolution() {
        assert!(Resolution::new(0, 10).is_partial());
        assert!(!Resolution::new(0, 0).is_partial());
        assert!(!Resolution::new(10, 10).is_partial());
    }
}
