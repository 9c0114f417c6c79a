//! Tickets, face photos and wired-up engines for tests.

use crate::camera::{InlinePayloadDetector, ScriptedCamera};
use crate::mocks::test_clock;
use gatecheck::biometric::{
    BiometricMatcher, MemoryReferenceImages, PreCroppedDetector, ReferenceImages,
};
use gatecheck::capture::{CaptureSlot, Image};
use gatecheck::config::{BiometricConfig, ScannerConfig, ValidationConfig};
use gatecheck::engine::ValidationEngine;
use gatecheck::environment::Clock;
use gatecheck::scanner::ScannerEnvironment;
use gatecheck::store::TicketStore;
use gatecheck::types::{BuyerId, EventId, ScanContext, Ticket, TicketId, TicketStatus, TicketType};
use std::sync::Arc;

/// Event every fixture ticket belongs to
pub const EVENT: &str = "E1";

/// Buyer of every fixture ticket
pub const BUYER: &str = "B1";

/// Side length of fixture face photos
pub const FACE_SIZE: u32 = 64;

const CELL: u32 = FACE_SIZE / 16;
const BASE: f64 = 128.0;
const AMPLITUDE: f64 = 80.0;

/// Active ticket for [`EVENT`] and [`BUYER`].
///
/// Secure tickets get a reference photo URL of `photos/{id}.png`.
#[must_use]
pub fn ticket(id: &str, ticket_type: TicketType) -> Ticket {
    let buyer_image_url = ticket_type
        .requires_biometric()
        .then(|| format!("photos/{id}.png"));
    Ticket {
        id: TicketId::from(id),
        event_id: EventId::from(EVENT),
        buyer_id: BuyerId::from(BUYER),
        ticket_type,
        quantity: 1,
        status: TicketStatus::Active,
        buyer_image_url,
        validation_history: Vec::new(),
        purchase_date: test_clock().now(),
    }
}

/// Active regular ticket
#[must_use]
pub fn regular_ticket(id: &str) -> Ticket {
    ticket(id, TicketType::Regular)
}

/// Active secure ticket
#[must_use]
pub fn secure_ticket(id: &str) -> Ticket {
    ticket(id, TicketType::Secure)
}

/// `ticket` with its status replaced
#[must_use]
pub fn with_status(mut ticket: Ticket, status: TicketStatus) -> Ticket {
    ticket.status = status;
    ticket
}

/// Reference photo and live photo whose fingerprints have cosine
/// similarity `similarity` (to within rounding).
///
/// Both are built from two orthogonal zero-mean cell patterns: a
/// checkerboard `P` and a left/right split `Q`. The reference is `P`; the
/// live photo is `s·P + √(1−s²)·Q`.
#[must_use]
pub fn face_pair(similarity: f64) -> (Image, Image) {
    let s = similarity.clamp(0.0, 1.0);
    let reference = face(1.0, 0.0);
    let live = face(s, (1.0 - s * s).sqrt());
    (reference, live)
}

/// Face photo with the given weights on the checkerboard and split patterns.
///
/// # Panics
///
/// Never; the dimensions are fixed.
#[must_use]
#[allow(
    clippy::expect_used,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn face(checker: f64, split: f64) -> Image {
    let mut pixels = Vec::with_capacity((FACE_SIZE * FACE_SIZE) as usize);
    for y in 0..FACE_SIZE {
        for x in 0..FACE_SIZE {
            let (cx, cy) = (x / CELL, y / CELL);
            let p = if (cx + cy) % 2 == 0 { 1.0 } else { -1.0 };
            let q = if cx < 8 { 1.0 } else { -1.0 };
            let value = AMPLITUDE.mul_add(checker * p + split * q, BASE);
            pixels.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }
    Image::from_luma(FACE_SIZE, FACE_SIZE, pixels).expect("face photo is well formed")
}

/// Scan context used by every fixture
#[must_use]
pub fn context() -> ScanContext {
    ScanContext::new("staff-1", "Event Entrance")
}

/// Empty reference photo store
#[must_use]
pub fn references() -> MemoryReferenceImages {
    MemoryReferenceImages::new()
}

/// Engine over `store` and `references` with default configuration and a
/// fixed clock.
#[must_use]
pub fn engine(store: Arc<dyn TicketStore>, references: &MemoryReferenceImages) -> ValidationEngine {
    engine_with(store, references, ValidationConfig::default())
}

/// Engine with a custom [`ValidationConfig`]
#[must_use]
pub fn engine_with(
    store: Arc<dyn TicketStore>,
    references: &MemoryReferenceImages,
    config: ValidationConfig,
) -> ValidationEngine {
    engine_over(store, Arc::new(references.clone()), config)
}

/// Engine over any [`ReferenceImages`] implementation
#[must_use]
pub fn engine_over(
    store: Arc<dyn TicketStore>,
    references: Arc<dyn ReferenceImages>,
    config: ValidationConfig,
) -> ValidationEngine {
    ValidationEngine::new(
        store,
        BiometricMatcher::new(Arc::new(PreCroppedDetector), BiometricConfig::default()),
        references,
        Arc::new(test_clock()),
        config,
    )
}

/// Scanner environment reading frames from `camera` with the inline
/// payload detector and default timings.
#[must_use]
pub fn scanner_environment(engine: Arc<ValidationEngine>, camera: &ScriptedCamera) -> ScannerEnvironment {
    ScannerEnvironment {
        engine,
        capture: CaptureSlot::new(Arc::new(camera.clone())),
        detector: Arc::new(InlinePayloadDetector),
        clock: Arc::new(test_clock()),
        config: ScannerConfig::default(),
        context: context(),
    }
}
