// SPDX-License-Identifier: GPL-3.0-only
//! Capture thread lifecycle
//!
//! Frames are delivered to the stream pipeline from one dedicated thread, one
//! at a time. The controller owns that thread and its stop signal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Returned by each loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Wait for the next frame
    Continue,
    /// The source ended; exit the thread
    Stop,
}

/// Owns a capture thread that calls `loop_fn` until told to stop
///
/// ```ignore
/// let mut controller = CaptureLoopController::start("stream-capture", move || {
///     match source.next_frame() {
///         Some(frame) => {
///             renderer.on_frame(&frame);
///             LoopAction::Continue
///         }
///         None => LoopAction::Stop,
///     }
/// });
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl CaptureLoopController {
    /// Spawn the capture thread.
    ///
    /// The stop signal is checked before every iteration, so a stop request
    /// takes effect after at most one more frame.
    pub fn start<F>(name: &str, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %thread_name, "Capture loop thread started");
                while !thread_stop.load(Ordering::SeqCst) {
                    if loop_fn() == LoopAction::Stop {
                        debug!(name = %thread_name, "Source ended");
                        break;
                    }
                }
                info!(name = %thread_name, "Capture loop thread exiting");
            });

        let thread_handle = match thread_handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(name = %name, error = %e, "Failed to spawn capture thread");
                None
            }
        };

        Self {
            thread_handle,
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Whether the thread exists and has not returned
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Ask the loop to exit after its current iteration (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Stop the loop, waiting at most `timeout`.
    ///
    /// Returns false if the thread was still busy when the timeout expired; it
    /// is then detached and exits on its own once the current frame returns.
    pub fn stop_within(&mut self, timeout: Duration) -> bool {
        self.request_stop();
        let deadline = Instant::now() + timeout;
        while self.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        if self.is_running() {
            warn!(name = %self.name, ?timeout, "Capture loop did not stop in time, detaching");
            self.thread_handle.take();
            return false;
        }
        self.join();
        true
    }

    /// Wait for the thread to finish without signalling it
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Capture loop thread finished");
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_loop_runs_until_source_ends() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = CaptureLoopController::start("test-loop", move || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            if count >= 10 {
                LoopAction::Stop
            } else {
                LoopAction::Continue
            }
        });

        controller.join();
        assert_eq!(counter.load(Ordering::SeqCst), 11);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller = CaptureLoopController::start("test-loop", move || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            LoopAction::Continue
        });

        thread::sleep(Duration::from_millis(50));
        assert!(controller.is_running());

        controller.stop();
        assert!(!controller.is_running());
        let after_stop = counter.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_stop_within_detaches_stuck_thread() {
        let release = Arc::new(AtomicBool::new(false));
        let release_clone = Arc::clone(&release);
        let entered = Arc::new(AtomicBool::new(false));
        let entered_clone = Arc::clone(&entered);

        let mut controller = CaptureLoopController::start("test-stuck", move || {
            entered_clone.store(true, Ordering::SeqCst);
            while !release_clone.load(Ordering::SeqCst) {
                thread::sleep(Duration::from_millis(5));
            }
            LoopAction::Continue
        });

        // The loop must be inside a frame before the stop is requested
        while !entered.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(!controller.stop_within(Duration::from_millis(30)));
        assert!(!controller.is_running());
        release.store(true, Ordering::SeqCst);
    }

    #[test]
    fn test_stop_within_joins_responsive_thread() {
        let mut controller = CaptureLoopController::start("test-responsive", || {
            thread::sleep(Duration::from_millis(2));
            LoopAction::Continue
        });
        assert!(controller.stop_within(Duration::from_secs(1)));
    }
}
