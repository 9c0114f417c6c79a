//! Scripted capture devices and QR detectors.

use gatecheck::capture::{CaptureDevice, CaptureError, CaptureStream, Image, QrDetector};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Marker that [`InlinePayloadDetector`] looks for at the start of a frame.
pub const QR_MARKER: &[u8] = b"QR:";

/// Frame whose pixels carry `payload` behind [`QR_MARKER`].
///
/// # Panics
///
/// Panics if the payload is too large for a single-row image.
#[must_use]
#[allow(clippy::expect_used)]
pub fn frame_with_payload(payload: &[u8]) -> Image {
    let mut pixels = QR_MARKER.to_vec();
    pixels.extend_from_slice(payload);
    let width = u32::try_from(pixels.len()).expect("payload fits in a frame");
    Image::from_luma(width, 1, pixels).expect("single-row frame is well formed")
}

/// Frame with no code in it.
///
/// # Panics
///
/// Never; the dimensions are fixed.
#[must_use]
#[allow(clippy::expect_used)]
pub fn blank_frame() -> Image {
    Image::from_luma(4, 4, vec![0; 16]).expect("blank frame is well formed")
}

/// Detector that reads payloads written by [`frame_with_payload`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InlinePayloadDetector;

impl QrDetector for InlinePayloadDetector {
    fn detect(&self, frame: &Image) -> Option<Vec<u8>> {
        frame
            .pixels()
            .strip_prefix(QR_MARKER)
            .map(<[u8]>::to_vec)
    }
}

#[derive(Debug, Default)]
struct CameraState {
    frames: Mutex<VecDeque<Image>>,
    repeat: Mutex<Option<Image>>,
    open_streams: AtomicUsize,
    times_opened: AtomicUsize,
    unavailable: AtomicBool,
    failing: AtomicBool,
}

/// Camera that serves queued frames and counts acquisitions.
///
/// Once the queue is empty it serves the repeat frame if one is set,
/// otherwise "no frame yet". Clones share the queue and counters.
#[derive(Debug, Clone, Default)]
pub struct ScriptedCamera {
    state: Arc<CameraState>,
}

impl ScriptedCamera {
    /// Camera serving `frames` in order
    #[must_use]
    pub fn new(frames: impl IntoIterator<Item = Image>) -> Self {
        let camera = Self::default();
        for frame in frames {
            camera.push_frame(frame);
        }
        camera
    }

    /// Camera that refuses to open
    #[must_use]
    pub fn unavailable() -> Self {
        let camera = Self::default();
        camera.state.unavailable.store(true, Ordering::SeqCst);
        camera
    }

    /// Queue another frame
    pub fn push_frame(&self, frame: Image) {
        if let Ok(mut frames) = self.state.frames.lock() {
            frames.push_back(frame);
        }
    }

    /// Serve `frame` forever once the queue runs dry
    pub fn repeat_frame(&self, frame: Image) {
        if let Ok(mut repeat) = self.state.repeat.lock() {
            *repeat = Some(frame);
        }
    }

    /// Make subsequent frame grabs fail
    pub fn fail_frames(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Streams currently holding the device
    #[must_use]
    pub fn open_streams(&self) -> usize {
        self.state.open_streams.load(Ordering::SeqCst)
    }

    /// Successful `open` calls so far
    #[must_use]
    pub fn times_opened(&self) -> usize {
        self.state.times_opened.load(Ordering::SeqCst)
    }
}

struct ScriptedStream {
    state: Arc<CameraState>,
}

impl CaptureStream for ScriptedStream {
    fn next_frame(&mut self) -> Result<Option<Image>, CaptureError> {
        if self.state.failing.load(Ordering::SeqCst) {
            return Err(CaptureError::Unavailable("device disconnected".to_string()));
        }
        let queued = self
            .state
            .frames
            .lock()
            .map_err(|_| CaptureError::Unavailable("frame queue poisoned".to_string()))?
            .pop_front();
        if queued.is_some() {
            return Ok(queued);
        }
        Ok(self
            .state
            .repeat
            .lock()
            .map_err(|_| CaptureError::Unavailable("frame queue poisoned".to_string()))?
            .clone())
    }
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        self.state.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CaptureDevice for ScriptedCamera {
    fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        if self.state.unavailable.load(Ordering::SeqCst) {
            return Err(CaptureError::Unavailable("permission denied".to_string()));
        }
        self.state.open_streams.fetch_add(1, Ordering::SeqCst);
        self.state.times_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            state: Arc::clone(&self.state),
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn detector_reads_inline_payload() {
        let frame = frame_with_payload(br#"{"ticketId":"T1"}"#);
        assert_eq!(
            InlinePayloadDetector.detect(&frame),
            Some(br#"{"ticketId":"T1"}"#.to_vec())
        );
        assert_eq!(InlinePayloadDetector.detect(&blank_frame()), None);
    }

    #[test]
    fn camera_tracks_open_streams() {
        let camera = ScriptedCamera::new([blank_frame()]);
        let mut stream = camera.open().unwrap();
        assert_eq!(camera.open_streams(), 1);
        assert!(stream.next_frame().unwrap().is_some());
        assert!(stream.next_frame().unwrap().is_none());
        drop(stream);
        assert_eq!(camera.open_streams(), 0);
        assert_eq!(camera.times_opened(), 1);
    }

    #[test]
    fn unavailable_camera_never_opens() {
        let camera = ScriptedCamera::unavailable();
        assert!(camera.open().is_err());
        assert_eq!(camera.open_streams(), 0);
    }
}
