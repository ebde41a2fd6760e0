//! In-memory image set for one analysis run.
//!
//! Pixel values are single-precision floats carrying the sensor's native
//! integer range (16-bit reference: 0..=65535, saturation sentinel = 65535).
//! The loading layer is responsible for decoding and orientation; this module
//! only validates that the three channels agree on extent.

use image::{ImageBuffer, Luma};

/// A single grayscale frame of `f32` intensities.
pub type Frame = ImageBuffer<Luma<f32>, Vec<f32>>;

/// An ordered stack of frames sharing one extent.
#[derive(Debug, Clone)]
pub struct ImageStack {
    frames: Vec<Frame>,
}

impl ImageStack {
    /// Build a stack from frames, validating that all extents match.
    pub fn new(frames: Vec<Frame>) -> Result<Self, ImageSetError> {
        let first = frames.first().ok_or(ImageSetError::EmptyStack)?;
        let (w, h) = first.dimensions();
        for frame in &frames[1..] {
            if frame.dimensions() != (w, h) {
                return Err(ImageSetError::FrameExtentMismatch {
                    expected: (w, h),
                    got: frame.dimensions(),
                });
            }
        }
        Ok(Self { frames })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.frames[0].dimensions()
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

/// The three channels of one run.
///
/// * `surface` — button channel, single frame.
/// * `solubilized` — chamber channel; frame 0 drives chamber localization.
/// * `captured` — bound-molecule channel.
#[derive(Debug, Clone)]
pub struct ImageSet {
    surface: Frame,
    solubilized: ImageStack,
    captured: ImageStack,
}

impl ImageSet {
    /// Assemble and validate a set: every channel must share the surface
    /// frame's extent.
    pub fn new(
        surface: Frame,
        solubilized: ImageStack,
        captured: ImageStack,
    ) -> Result<Self, ImageSetError> {
        let extent = surface.dimensions();
        for (channel, got) in [
            ("solubilized", solubilized.dimensions()),
            ("captured", captured.dimensions()),
        ] {
            if got != extent {
                return Err(ImageSetError::ChannelExtentMismatch {
                    channel,
                    expected: extent,
                    got,
                });
            }
        }
        Ok(Self {
            surface,
            solubilized,
            captured,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.surface.dimensions()
    }

    pub fn surface(&self) -> &Frame {
        &self.surface
    }

    pub fn solubilized(&self) -> &ImageStack {
        &self.solubilized
    }

    pub fn captured(&self) -> &ImageStack {
        &self.captured
    }
}

/// Precondition violations detected while assembling an [`ImageSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSetError {
    /// A stack was supplied with zero frames.
    EmptyStack,
    /// Two frames of one stack disagree on extent.
    FrameExtentMismatch {
        expected: (u32, u32),
        got: (u32, u32),
    },
    /// A channel disagrees with the surface frame's extent.
    ChannelExtentMismatch {
        channel: &'static str,
        expected: (u32, u32),
        got: (u32, u32),
    },
}

impl std::fmt::Display for ImageSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyStack => write!(f, "image stack has no frames"),
            Self::FrameExtentMismatch { expected, got } => write!(
                f,
                "frame extent {}x{} does not match stack extent {}x{}",
                got.0, got.1, expected.0, expected.1
            ),
            Self::ChannelExtentMismatch {
                channel,
                expected,
                got,
            } => write!(
                f,
                "{} channel extent {}x{} does not match surface extent {}x{}",
                channel, got.0, got.1, expected.0, expected.1
            ),
        }
    }
}

impl std::error::Error for ImageSetError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: u32, h: u32) -> Frame {
        Frame::new(w, h)
    }

    #[test]
    fn accepts_matching_extents() {
        let set = ImageSet::new(
            frame(64, 48),
            ImageStack::new(vec![frame(64, 48), frame(64, 48)]).unwrap(),
            ImageStack::new(vec![frame(64, 48)]).unwrap(),
        );
        assert!(set.is_ok());
        let set = set.unwrap();
        assert_eq!(set.dimensions(), (64, 48));
        assert_eq!(set.solubilized().n_frames(), 2);
        assert_eq!(set.captured().n_frames(), 1);
    }

    #[test]
    fn rejects_empty_stack() {
        assert_eq!(
            ImageStack::new(Vec::new()).unwrap_err(),
            ImageSetError::EmptyStack
        );
    }

    #[test]
    fn rejects_mismatched_channel() {
        let err = ImageSet::new(
            frame(64, 48),
            ImageStack::new(vec![frame(32, 48)]).unwrap(),
            ImageStack::new(vec![frame(64, 48)]).unwrap(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ImageSetError::ChannelExtentMismatch {
                channel: "solubilized",
                expected: (64, 48),
                got: (32, 48),
            }
        );
    }

    #[test]
    fn rejects_mixed_frame_extents_within_stack() {
        let err = ImageStack::new(vec![frame(64, 48), frame(64, 32)]).unwrap_err();
        assert_eq!(
            err,
            ImageSetError::FrameExtentMismatch {
                expected: (64, 48),
                got: (64, 32),
            }
        );
    }
}
