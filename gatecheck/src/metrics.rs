//! Metric names and descriptions.
//!
//! The library records through the `metrics` facade only. The host
//! application installs an exporter and calls [`register_metrics`] once at
//! startup so descriptions show up in its scrape output.

use metrics::{describe_counter, describe_histogram, Unit};

/// Validation attempts by outcome (`admitted`, `rejected`).
pub const VALIDATIONS_TOTAL: &str = "gatecheck_validations_total";
/// Validation attempts that failed with an infrastructure error, by kind.
pub const VALIDATION_ERRORS_TOTAL: &str = "gatecheck_validation_errors_total";
/// Wall time of one `validate` call.
pub const VALIDATION_DURATION_SECONDS: &str = "gatecheck_validation_duration_seconds";
/// Scanner results by kind (`validated`, `retry`, `timed_out`).
pub const SCANS_TOTAL: &str = "gatecheck_scans_total";
/// Tickets issued, by ticket type.
pub const TICKETS_ISSUED_TOTAL: &str = "gatecheck_tickets_issued_total";

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        VALIDATIONS_TOTAL,
        "Entry validation attempts, labelled by outcome"
    );
    describe_counter!(
        VALIDATION_ERRORS_TOTAL,
        "Validation attempts aborted by store, camera or reference photo failures"
    );
    describe_histogram!(
        VALIDATION_DURATION_SECONDS,
        Unit::Seconds,
        "Time to decide one validation attempt"
    );
    describe_counter!(SCANS_TOTAL, "Scanner session results, labelled by kind");
    describe_counter!(TICKETS_ISSUED_TOTAL, "Tickets issued, labelled by ticket type");
}
