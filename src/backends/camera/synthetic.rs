// SPDX-License-Identifier: GPL-3.0-only

//! Generated camera frames
//!
//! Produces BGRA frames at a fixed rate without any capture hardware. Used by
//! the `stream` command and by tests.

use super::types::{CaptureFormat, CaptureSource, PixelFormat, RawFrame};
use crate::errors::InitializationError;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// What the generated frames contain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Horizontal and vertical ramps with a sweeping bar
    Gradient,
    /// Every pixel the same B, G, R, A value
    Solid([u8; 4]),
}

pub struct SyntheticCamera {
    format: CaptureFormat,
    pattern: Pattern,
    paced: bool,
    frame_limit: Option<u64>,
    started: Option<Instant>,
    next_index: u64,
    delivered: u64,
    dropped: u64,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, framerate: u32) -> Self {
        Self {
            format: CaptureFormat {
                width,
                height,
                framerate,
            },
            pattern: Pattern::Gradient,
            paced: true,
            frame_limit: None,
            started: None,
            next_index: 0,
            delivered: 0,
            dropped: 0,
        }
    }

    pub fn with_pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// End the stream after `frames` frames
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Deliver frames as fast as they are requested instead of at the framerate
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    /// Frames skipped because the consumer fell behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.format.framerate.max(1)
    }

    /// Index of the newest frame that is due at `elapsed`
    fn due_index(&self, elapsed: Duration) -> u64 {
        (elapsed.as_nanos() / self.frame_interval().as_nanos().max(1)) as u64
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let CaptureFormat { width, height, .. } = self.format;
        match self.pattern {
            Pattern::Solid(bgra) => bgra.repeat((width * height) as usize),
            Pattern::Gradient => {
                let bar = (index * 8 % width.max(1) as u64) as u32;
                let mut data = Vec::with_capacity((width * height * 4) as usize);
                for y in 0..height {
                    for x in 0..width {
                        let on_bar = x.abs_diff(bar) < 4;
                        let b = (x * 255 / width.max(1)) as u8;
                        let g = (y * 255 / height.max(1)) as u8;
                        let r = if on_bar { 255 } else { (index % 256) as u8 };
                        data.extend_from_slice(&[b, g, r, 255]);
                    }
                }
                data
            }
        }
    }
}

impl CaptureSource for SyntheticCamera {
    fn open(&mut self) -> Result<CaptureFormat, InitializationError> {
        let CaptureFormat {
            width,
            height,
            framerate,
        } = self.format;
        if width == 0 || height == 0 || framerate == 0 {
            return Err(InitializationError::Capture(format!(
                "invalid synthetic format {}",
                self.format
            )));
        }
        self.started = Some(Instant::now());
        info!(format = %self.format, pattern = ?self.pattern, "Synthetic camera opened");
        Ok(self.format)
    }

    fn next_frame(&mut self) -> Option<RawFrame> {
        let started = self.started?;
        if self.frame_limit.is_some_and(|limit| self.delivered >= limit) {
            return None;
        }

        if self.paced {
            let due = self.due_index(started.elapsed());
            if due > self.next_index {
                // Consumer fell behind: skip to the newest frame
                self.dropped += due - self.next_index;
                debug!(skipped = due - self.next_index, "Discarding late frames");
                self.next_index = due;
            } else {
                let at = started + self.frame_interval() * self.next_index as u32;
                std::thread::sleep(at.saturating_duration_since(Instant::now()));
            }
        }

        let index = self.next_index;
        self.next_index += 1;
        self.delivered += 1;

        Some(RawFrame::packed(
            self.format.width,
            self.format.height,
            self.render(index),
            PixelFormat::Bgra8,
            self.frame_interval() * index as u32,
            index,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_frames_before_open() {
        let mut camera = SyntheticCamera::new(8, 8, 30).unpaced();
        assert!(camera.next_frame().is_none());
    }

    #[test]
    fn test_frame_limit_and_sequence() {
        let mut camera = SyntheticCamera::new(8, 4, 30).unpaced().with_frame_limit(3);
        camera.open().unwrap();

        let frames: Vec<_> = std::iter::from_fn(|| camera.next_frame()).collect();
        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.sequence, i as u64);
            assert_eq!(frame.format, PixelFormat::Bgra8);
            assert!(frame.is_well_formed());
            assert_eq!(frame.data.len(), 8 * 4 * 4);
        }
        assert!(frames[1].timestamp > frames[0].timestamp);
    }

    #[test]
    fn test_solid_pattern() {
        let mut camera = SyntheticCamera::new(3, 2, 30)
            .unpaced()
            .with_pattern(Pattern::Solid([1, 2, 3, 4]));
        camera.open().unwrap();
        let frame = camera.next_frame().unwrap();
        assert!(frame.data.chunks_exact(4).all(|px| px == [1, 2, 3, 4]));
    }

    #[test]
    fn test_late_frames_are_discarded() {
        let mut camera = SyntheticCamera::new(4, 4, 1000);
        camera.open().unwrap();
        camera.next_frame().unwrap();

        std::thread::sleep(Duration::from_millis(20));
        let frame = camera.next_frame().unwrap();
        assert!(frame.sequence > 1);
        assert!(camera.dropped() > 0);
    }

    #[test]
    fn test_invalid_format_fails_to_open() {
        let mut camera = SyntheticCamera::new(0, 480, 30);
        assert!(matches!(camera.open(), Err(InitializationError::Capture(_))));
    }
}
