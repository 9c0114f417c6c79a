//! Biometric binding for secure tickets.
//!
//! At purchase time a reference photo of the buyer is stored; at the door the
//! operator captures a live photo and the two are compared.
//!
//! # Fingerprints
//!
//! A [`Fingerprint`] is the detected face region downsampled to a 16×16 grid
//! of mean luminance, mean-centred and L2-normalised. Similarity is the
//! cosine of two fingerprints clamped to `[0, 1]`. This is deterministic:
//! identical inputs always produce identical scores. It is an appearance
//! descriptor, not a face-recognition model; the [`FaceDetector`] seam is
//! where a real detector plugs in.

use crate::capture::{CaptureDevice, CaptureError, Image};
use crate::config::BiometricConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use thiserror::Error;

/// Side length of the fingerprint grid.
pub const GRID: u32 = 16;

/// Errors produced while enrolling or resolving face images.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BiometricError {
    /// No face region was found.
    #[error("No face detected")]
    NoFaceDetected,

    /// The detector found a face but is not confident enough.
    #[error("Face detection confidence {confidence:.2} is below {minimum:.2}")]
    LowConfidence {
        /// Detector confidence
        confidence: f32,
        /// Configured minimum
        minimum: f32,
    },

    /// The face is too small, cut off, or off-center.
    #[error("Poor framing: {0}")]
    PoorFraming(String),

    /// The camera could not be used.
    #[error("Camera error: {0}")]
    Camera(#[from] CaptureError),

    /// The reference photo store could not be reached.
    #[error("Reference image unavailable: {0}")]
    ReferenceUnavailable(String),
}

/// Axis-aligned face bounding box in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Region {
    /// Region covering a whole image
    #[must_use]
    pub const fn full(image: &Image) -> Self {
        Self {
            x: 0,
            y: 0,
            width: image.width(),
            height: image.height(),
        }
    }
}

/// Detector output for one face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceDetection {
    /// Bounding box
    pub region: Region,
    /// Detector confidence in `[0, 1]`
    pub confidence: f32,
}

/// Finds the most prominent face in an image.
pub trait FaceDetector: Send + Sync {
    /// The detected face, `None` if there is none.
    fn detect(&self, image: &Image) -> Option<FaceDetection>;
}

/// Detector for photos that are already cropped to the face, such as
/// kiosk captures with a framing overlay.
#[derive(Clone, Copy, Debug, Default)]
pub struct PreCroppedDetector;

impl FaceDetector for PreCroppedDetector {
    fn detect(&self, image: &Image) -> Option<FaceDetection> {
        (image.width() > 0 && image.height() > 0).then(|| FaceDetection {
            region: Region::full(image),
            confidence: 1.0,
        })
    }
}

/// Comparable face descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fingerprint(Vec<f32>);

impl Fingerprint {
    /// Descriptor components
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    fn norm(&self) -> f32 {
        self.0.iter().map(|v| v * v).sum::<f32>().sqrt()
    }
}

/// Enrolls face images and scores fingerprint similarity.
#[derive(Clone)]
pub struct BiometricMatcher {
    detector: Arc<dyn FaceDetector>,
    config: BiometricConfig,
}

impl BiometricMatcher {
    /// Creates a matcher around a face detector
    #[must_use]
    pub fn new(detector: Arc<dyn FaceDetector>, config: BiometricConfig) -> Self {
        Self { detector, config }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &BiometricConfig {
        &self.config
    }

    /// Derive a fingerprint from a captured image.
    ///
    /// # Errors
    ///
    /// - [`BiometricError::NoFaceDetected`] if the detector finds nothing
    /// - [`BiometricError::LowConfidence`] below `min_confidence`
    /// - [`BiometricError::PoorFraming`] if the face is too small, outside
    ///   the frame, or off-center
    pub fn enroll(&self, image: &Image) -> Result<Fingerprint, BiometricError> {
        let detection = self
            .detector
            .detect(image)
            .ok_or(BiometricError::NoFaceDetected)?;

        if detection.confidence < self.config.min_confidence {
            return Err(BiometricError::LowConfidence {
                confidence: detection.confidence,
                minimum: self.config.min_confidence,
            });
        }

        self.check_framing(image, detection.region)?;
        Ok(fingerprint(image, detection.region))
    }

    /// Similarity of two fingerprints in `[0, 1]`.
    #[must_use]
    pub fn compare(a: &Fingerprint, b: &Fingerprint) -> f64 {
        if a.0.len() != b.0.len() {
            return 0.0;
        }
        let (norm_a, norm_b) = (a.norm(), b.norm());
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        let dot: f32 = a.0.iter().zip(&b.0).map(|(x, y)| x * y).sum();
        f64::from(dot / (norm_a * norm_b)).clamp(0.0, 1.0)
    }

    /// Whether a score clears the configured match threshold
    #[must_use]
    pub fn is_match(&self, score: f64) -> bool {
        score >= self.config.match_threshold
    }

    /// Open a camera, enroll the first usable frame, and release the camera.
    ///
    /// Frames with no face or poor framing are skipped, up to
    /// `capture_attempts` frames. The camera is released on every path.
    ///
    /// # Errors
    ///
    /// - [`BiometricError::Camera`] if the device cannot be opened or fails
    /// - the last enrollment error if no frame was usable
    pub fn capture_and_enroll(
        &self,
        camera: &dyn CaptureDevice,
    ) -> Result<Fingerprint, BiometricError> {
        let mut stream = camera.open()?;
        let mut last_error = BiometricError::NoFaceDetected;

        for _ in 0..self.config.capture_attempts {
            let Some(frame) = stream.next_frame()? else {
                continue;
            };
            match self.enroll(&frame) {
                Ok(fingerprint) => return Ok(fingerprint),
                Err(error) => {
                    tracing::debug!(%error, "Frame not usable for enrollment");
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }

    #[allow(clippy::cast_precision_loss)]
    fn check_framing(&self, image: &Image, region: Region) -> Result<(), BiometricError> {
        let right = u64::from(region.x) + u64::from(region.width);
        let bottom = u64::from(region.y) + u64::from(region.height);
        if right > u64::from(image.width()) || bottom > u64::from(image.height()) {
            return Err(BiometricError::PoorFraming(
                "face extends outside the frame".to_string(),
            ));
        }

        if region.width < GRID || region.height < GRID {
            return Err(BiometricError::PoorFraming(format!(
                "face is {}x{} pixels, need at least {GRID}x{GRID}",
                region.width, region.height
            )));
        }

        let short_side = image.width().min(image.height()) as f32;
        let face_side = region.width.min(region.height) as f32;
        if face_side / short_side < self.config.min_face_fraction {
            return Err(BiometricError::PoorFraming("face is too small".to_string()));
        }

        let center_x = region.x as f32 + region.width as f32 / 2.0;
        let center_y = region.y as f32 + region.height as f32 / 2.0;
        let offset_x = (center_x - image.width() as f32 / 2.0).abs() / image.width() as f32;
        let offset_y = (center_y - image.height() as f32 / 2.0).abs() / image.height() as f32;
        if offset_x.max(offset_y) > self.config.max_center_offset {
            return Err(BiometricError::PoorFraming("face is off-center".to_string()));
        }

        Ok(())
    }
}

impl std::fmt::Debug for BiometricMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiometricMatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[allow(clippy::cast_precision_loss)]
fn fingerprint(image: &Image, region: Region) -> Fingerprint {
    let mut cells = Vec::with_capacity((GRID * GRID) as usize);

    for gy in 0..GRID {
        let y0 = region.y + gy * region.height / GRID;
        let y1 = region.y + (gy + 1) * region.height / GRID;
        for gx in 0..GRID {
            let x0 = region.x + gx * region.width / GRID;
            let x1 = region.x + (gx + 1) * region.width / GRID;

            let mut sum = 0_u64;
            for y in y0..y1 {
                for x in x0..x1 {
                    sum += u64::from(image.luma(x, y));
                }
            }
            let count = u64::from((x1 - x0) * (y1 - y0)).max(1);
            cells.push(sum as f32 / count as f32);
        }
    }

    let mean = cells.iter().sum::<f32>() / cells.len() as f32;
    for cell in &mut cells {
        *cell -= mean;
    }
    let norm = cells.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for cell in &mut cells {
            *cell /= norm;
        }
    }

    Fingerprint(cells)
}

/// Resolves a ticket's `buyerImageUrl` to the stored reference photo.
///
/// Uses explicit boxed futures so it can be held as `Arc<dyn ReferenceImages>`.
pub trait ReferenceImages: Send + Sync {
    /// Fetch the photo stored at `url`, `None` if nothing is stored there.
    ///
    /// # Errors
    ///
    /// Returns [`BiometricError::ReferenceUnavailable`] if the photo store
    /// cannot be reached.
    fn fetch(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Image>, BiometricError>> + Send + '_>>;
}

/// In-memory reference photo store.
#[derive(Debug, Clone, Default)]
pub struct MemoryReferenceImages {
    images: Arc<RwLock<HashMap<String, Image>>>,
}

impl MemoryReferenceImages {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a photo under `url`.
    ///
    /// # Errors
    ///
    /// Returns [`BiometricError::ReferenceUnavailable`] if the lock is poisoned.
    pub fn insert(&self, url: impl Into<String>, image: Image) -> Result<(), BiometricError> {
        self.images
            .write()
            .map_err(|_| BiometricError::ReferenceUnavailable("lock poisoned".to_string()))?
            .insert(url.into(), image);
        Ok(())
    }
}

impl ReferenceImages for MemoryReferenceImages {
    fn fetch(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Image>, BiometricError>> + Send + '_>> {
        let url = url.to_string();
        Box::pin(async move {
            let images = self
                .images
                .read()
                .map_err(|_| BiometricError::ReferenceUnavailable("lock poisoned".to_string()))?;
            Ok(images.get(&url).cloned())
        })
    }
}
