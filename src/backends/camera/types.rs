// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for capture sources

use crate::constants::stream::BYTES_PER_PIXEL;
use crate::errors::InitializationError;
use std::sync::Arc;
use std::time::Duration;

/// Pixel layout of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    /// 32-bit packed B, G, R, A
    #[default]
    Bgra8,
    /// 32-bit packed R, G, B, A
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        BYTES_PER_PIXEL
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PixelFormat::Bgra8 => write!(f, "BGRA8"),
            PixelFormat::Rgba8 => write!(f, "RGBA8"),
        }
    }
}

/// A single captured frame
///
/// The pixel data is reference counted so a frame can be handed between
/// threads without copying.
#[derive(Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Bytes per row, including any padding
    pub stride: u32,
    pub data: Arc<[u8]>,
    pub format: PixelFormat,
    /// Capture time relative to the start of the stream
    pub timestamp: Duration,
    /// Monotonic frame counter assigned by the source
    pub sequence: u64,
}

impl RawFrame {
    /// Tightly packed frame, stride = width * 4
    pub fn packed(
        width: u32,
        height: u32,
        data: impl Into<Arc<[u8]>>,
        format: PixelFormat,
        timestamp: Duration,
        sequence: u64,
    ) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel(),
            data: data.into(),
            format,
            timestamp,
            sequence,
        }
    }

    /// Bytes needed to hold all rows at the frame's stride. The final row
    /// does not need trailing padding.
    pub fn required_len(&self) -> usize {
        if self.height == 0 {
            return 0;
        }
        self.stride as usize * (self.height as usize - 1)
            + (self.width * self.format.bytes_per_pixel()) as usize
    }

    /// Check that stride and buffer length can describe the frame
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.stride >= self.width * self.format.bytes_per_pixel()
            && self.data.len() >= self.required_len()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .field("timestamp", &self.timestamp)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Frame size and rate requested from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl std::fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{} @ {}fps", self.width, self.height, self.framerate)
    }
}

/// A source of frames, delivered one at a time on the capture thread
pub trait CaptureSource: Send {
    /// Acquire the device. Called once from the pipeline's configuring state.
    fn open(&mut self) -> Result<CaptureFormat, InitializationError>;

    /// Block until the next frame is due and return it.
    ///
    /// `None` ends the stream. Sources that fall behind discard late frames
    /// rather than queueing them.
    fn next_frame(&mut self) -> Option<RawFrame>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packed_frame_is_well_formed() {
        let frame = RawFrame::packed(4, 2, vec![0u8; 32], PixelFormat::Bgra8, Duration::ZERO, 0);
        assert_eq!(frame.stride, 16);
        assert_eq!(frame.required_len(), 32);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn test_padded_last_row_may_be_short() {
        let mut frame = RawFrame::packed(4, 2, vec![0u8; 40], PixelFormat::Bgra8, Duration::ZERO, 0);
        frame.stride = 24;
        assert_eq!(frame.required_len(), 40);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn test_malformed_frames() {
        let short = RawFrame::packed(4, 2, vec![0u8; 31], PixelFormat::Bgra8, Duration::ZERO, 0);
        assert!(!short.is_well_formed());

        let empty = RawFrame::packed(0, 0, Vec::<u8>::new(), PixelFormat::Bgra8, Duration::ZERO, 0);
        assert!(!empty.is_well_formed());

        let mut narrow = RawFrame::packed(4, 2, vec![0u8; 32], PixelFormat::Bgra8, Duration::ZERO, 0);
        narrow.stride = 8;
        assert!(!narrow.is_well_formed());
    }
}
