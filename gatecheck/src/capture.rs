//! Camera and image capture.
//!
//! Cameras are scoped resources: [`CaptureDevice::open`] hands out a
//! [`CaptureStream`] that holds the device until it is dropped. Callers never
//! release a camera explicitly, they drop the stream, so every exit path
//! (success, error, cancellation) gives the device back.

use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors raised by capture devices.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The device could not be opened or stopped delivering frames.
    #[error("Camera unavailable: {0}")]
    Unavailable(String),

    /// A frame was requested before the device was opened.
    #[error("Camera is not open")]
    NotOpen,

    /// Raster dimensions do not match the pixel buffer.
    #[error("Invalid image: {width}x{height} needs {expected} bytes, got {actual}")]
    InvalidImage {
        /// Declared width
        width: u32,
        /// Declared height
        height: u32,
        /// `width * height`
        expected: usize,
        /// Buffer length supplied
        actual: usize,
    },
}

/// 8-bit grayscale raster.
#[derive(Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Image {
    /// Wrap a row-major luminance buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidImage`] if `pixels.len() != width * height`.
    pub fn from_luma(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(CaptureError::InvalidImage {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Image width in pixels
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Image height in pixels
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Row-major luminance buffer
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Luminance at `(x, y)`; callers stay within bounds.
    #[must_use]
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

/// An open camera. Dropping the stream releases the device.
pub trait CaptureStream: Send {
    /// Grab the most recent frame, `None` if no frame is ready yet.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Unavailable`] if the device failed.
    fn next_frame(&mut self) -> Result<Option<Image>, CaptureError>;
}

/// Something that can be opened for capture: a camera or an uploaded file.
pub trait CaptureDevice: Send + Sync {
    /// Acquire the device.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Unavailable`] if the device is busy, missing,
    /// or permission was denied.
    fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError>;
}

/// Locates and reads a QR code in a frame.
///
/// QR detection itself is an external concern; implementations wrap a
/// platform scanner or a decoding library.
pub trait QrDetector: Send + Sync {
    /// Raw payload bytes of the first readable code, if any.
    fn detect(&self, frame: &Image) -> Option<Vec<u8>>;
}

/// Uploaded-image mode: a device that yields the same still every poll.
#[derive(Clone, Debug)]
pub struct StillImageDevice {
    image: Image,
}

impl StillImageDevice {
    /// Creates a device serving `image`
    #[must_use]
    pub const fn new(image: Image) -> Self {
        Self { image }
    }
}

struct StillImageStream {
    image: Image,
}

impl CaptureStream for StillImageStream {
    fn next_frame(&mut self) -> Result<Option<Image>, CaptureError> {
        Ok(Some(self.image.clone()))
    }
}

impl CaptureDevice for StillImageDevice {
    fn open(&self) -> Result<Box<dyn CaptureStream>, CaptureError> {
        Ok(Box::new(StillImageStream {
            image: self.image.clone(),
        }))
    }
}

/// Shared holder for a session's open camera.
///
/// The scanner session opens the camera once and polls it from effect
/// futures; `release` drops the stream. Cloning shares the slot.
#[derive(Clone)]
pub struct CaptureSlot {
    device: Arc<dyn CaptureDevice>,
    stream: Arc<Mutex<Option<Box<dyn CaptureStream>>>>,
}

impl CaptureSlot {
    /// Creates an empty slot for `device`
    #[must_use]
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            stream: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the device unless it is already open.
    ///
    /// # Errors
    ///
    /// Propagates [`CaptureDevice::open`] failures.
    pub fn open(&self) -> Result<(), CaptureError> {
        let mut slot = self.lock()?;
        if slot.is_none() {
            *slot = Some(self.device.open()?);
            tracing::debug!("Camera acquired");
        }
        Ok(())
    }

    /// Grab a frame from the open device.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NotOpen`] after a release, or the device error.
    pub fn grab(&self) -> Result<Option<Image>, CaptureError> {
        let mut slot = self.lock()?;
        let stream = slot.as_mut().ok_or(CaptureError::NotOpen)?;
        stream.next_frame()
    }

    /// Drop the open stream, releasing the device. Idempotent.
    pub fn release(&self) {
        let released = match self.stream.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if released.is_some() {
            tracing::debug!("Camera released");
        }
    }

    /// Returns `true` while a stream is held
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.stream.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<Box<dyn CaptureStream>>>, CaptureError> {
        self.stream
            .lock()
            .map_err(|_| CaptureError::Unavailable("capture lock poisoned".to_string()))
    }
}

impl fmt::Debug for CaptureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSlot")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
