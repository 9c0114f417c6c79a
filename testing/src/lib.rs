//! # Gatecheck Testing
//!
//! Testing utilities for the gatecheck crate.
//!
//! This crate provides:
//! - [`ReducerTest`]: Given-When-Then runner for reducers
//! - Deterministic clocks ([`FixedClock`], [`test_clock`])
//! - Scripted capture devices and QR detectors ([`camera`])
//! - Failure-injecting ticket stores ([`stores`])
//! - Tickets, frames and face images with known similarity ([`fixtures`])
//! - proptest strategies for identifiers ([`properties`])
//!
//! ## Example
//!
//! ```ignore
//! use gatecheck_testing::{fixtures, init_tracing, stores::FlakyTicketStore};
//!
//! #[tokio::test]
//! async fn store_outage_is_not_a_rejection() {
//!     init_tracing();
//!     let store = FlakyTicketStore::new();
//!     store.set_unavailable(true);
//!     let engine = fixtures::engine(Arc::new(store.clone()), &fixtures::references());
//!     let result = engine.validate(b"...", None, &fixtures::context()).await;
//!     assert!(result.is_err());
//! }
//! ```

use chrono::{DateTime, Utc};
use gatecheck::environment::Clock;

pub mod camera;
pub mod fixtures;
pub mod reducer_test;
pub mod stores;

/// Deterministic stand-ins for environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Clock frozen at one instant.
    ///
    /// ```
    /// use gatecheck_testing::mocks::FixedClock;
    /// use gatecheck::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        at: DateTime<Utc>,
    }

    impl FixedClock {
        /// Clock that always reports `at`
        #[must_use]
        pub const fn new(at: DateTime<Utc>) -> Self {
            Self { at }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.at
        }
    }

    /// Clock frozen at 2025-06-01 18:00 UTC, doors-open on a show night.
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_748_800_800, 0).unwrap_or_default())
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// Store-style identifier: short, non-blank, printable
    pub fn identifier() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_-]{1,24}"
    }

    /// Two distinct identifiers
    pub fn distinct_identifiers() -> impl Strategy<Value = (String, String)> {
        (identifier(), identifier()).prop_filter("identifiers must differ", |(a, b)| a != b)
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Filter comes from `RUST_LOG`, defaulting to `gatecheck=debug`. Safe to
/// call from every test; only the first call installs.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("gatecheck=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};
