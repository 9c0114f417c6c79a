//! Domain types for ticket issuance and entrance validation.
//!
//! Tickets are persisted as flat documents in an external store, so the
//! serialized form uses camelCase keys (`eventId`, `validationHistory`, ...)
//! and string identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Declares an opaque string identifier.
///
/// Store-assigned ids are arbitrary strings, so identifiers wrap `String`
/// rather than `Uuid`; freshly minted ids are UUID v4 strings.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow the raw identifier
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume into the raw identifier
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a ticket
    TicketId
);
string_id!(
    /// Identifier of the event a ticket admits to
    EventId
);
string_id!(
    /// Identifier of the account that bought the ticket
    BuyerId
);
string_id!(
    /// Unique identifier for one validation attempt
    ValidationId
);
string_id!(
    /// Identity of the staff member operating a scanner
    OperatorId
);

// ============================================================================
// Ticket type and status
// ============================================================================

/// Ticket tier.
///
/// `regular` and `secure` are the built-in tiers; any other name is a custom
/// tier that validates like `regular`. Only `secure` carries a biometric
/// reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TicketType {
    /// QR-only admission
    Regular,
    /// QR plus a face match against the purchase-time photo
    Secure,
    /// Custom-named tier (VIP, early bird, ...)
    Tier(String),
}

impl TicketType {
    /// Wire name of the tier
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Regular => "regular",
            Self::Secure => "secure",
            Self::Tier(name) => name,
        }
    }

    /// Returns `true` for tickets bound to a buyer photo
    #[must_use]
    pub const fn requires_biometric(&self) -> bool {
        matches!(self, Self::Secure)
    }

    /// Fold a [`TicketType::Tier`] named like a built-in tier into that tier.
    ///
    /// Matches what a serde round-trip produces.
    #[must_use]
    pub fn canonical(self) -> Self {
        match self {
            Self::Tier(name) => Self::from(name),
            other => other,
        }
    }
}

impl From<String> for TicketType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "regular" => Self::Regular,
            "secure" => Self::Secure,
            _ => Self::Tier(value),
        }
    }
}

impl From<&str> for TicketType {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<TicketType> for String {
    fn from(value: TicketType) -> Self {
        match value {
            TicketType::Regular => "regular".to_string(),
            TicketType::Secure => "secure".to_string(),
            TicketType::Tier(name) => name,
        }
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ticket.
///
/// Tickets start `active`. The validation engine moves them to `used`;
/// administrative actions move them to `revoked` or `expired`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Valid for entry
    Active,
    /// Already admitted
    Used,
    /// Cancelled by an administrator
    Revoked,
    /// Past its validity window
    Expired,
}

impl TicketStatus {
    /// Wire name of the status
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown ticket status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TicketStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "used" => Ok(Self::Used),
            "revoked" => Ok(Self::Revoked),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Validation records
// ============================================================================

/// How an attempt was checked, determined by the ticket type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationType {
    /// Identity triple only
    QrOnly,
    /// Identity triple plus face comparison
    ImageVerification,
}

/// Who is scanning and where.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanContext {
    /// Scanner operator, recorded as `validatedBy`
    pub operator: OperatorId,
    /// Free-text location, e.g. "Event Entrance"
    pub location: String,
}

impl ScanContext {
    /// Creates a new `ScanContext`
    #[must_use]
    pub fn new(operator: impl Into<OperatorId>, location: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            location: location.into(),
        }
    }
}

/// Immutable audit entry for one entry-scan attempt.
///
/// Records are only ever appended to a ticket's history, never edited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    /// Unique per attempt
    pub id: ValidationId,
    /// Ticket the attempt was made against
    pub ticket_id: TicketId,
    /// Scanner operator
    pub validated_by: OperatorId,
    /// When the attempt was decided
    pub validated_at: DateTime<Utc>,
    /// QR-only or image verification
    pub validation_type: ValidationType,
    /// Outcome of this attempt
    pub is_valid: bool,
    /// Where the scan happened
    pub location: String,
    /// Face similarity score, for image verification attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    /// Rejection reason for failed attempts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationRecord {
    /// Starts a record for an attempt against `ticket`.
    ///
    /// The record is a failed attempt until [`ValidationRecord::admitted`]
    /// is called.
    #[must_use]
    pub fn attempt(ticket: &Ticket, context: &ScanContext, at: DateTime<Utc>) -> Self {
        Self {
            id: ValidationId::new(),
            ticket_id: ticket.id.clone(),
            validated_by: context.operator.clone(),
            validated_at: at,
            validation_type: ticket.validation_type(),
            is_valid: false,
            location: context.location.clone(),
            similarity: None,
            reason: None,
        }
    }

    /// Marks the attempt as successful
    #[must_use]
    pub fn admitted(mut self) -> Self {
        self.is_valid = true;
        self.reason = None;
        self
    }

    /// Marks the attempt as failed with a reason
    #[must_use]
    pub fn rejected(mut self, reason: impl Into<String>) -> Self {
        self.is_valid = false;
        self.reason = Some(reason.into());
        self
    }

    /// Records the face similarity score
    #[must_use]
    pub const fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }
}

// ============================================================================
// Ticket
// ============================================================================

/// A bearer credential granting entry to one event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    /// Immutable, assigned at creation
    pub id: TicketId,
    /// Event this ticket admits to
    pub event_id: EventId,
    /// Purchasing account
    pub buyer_id: BuyerId,
    /// Tier
    pub ticket_type: TicketType,
    /// Admissions granted (validated as single-use regardless)
    pub quantity: u32,
    /// Lifecycle status
    pub status: TicketStatus,
    /// Reference photo, present only for secure tickets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buyer_image_url: Option<String>,
    /// Append-only audit trail
    #[serde(default)]
    pub validation_history: Vec<ValidationRecord>,
    /// Creation timestamp
    pub purchase_date: DateTime<Utc>,
}

impl Ticket {
    /// Returns `true` if the ticket can still be admitted
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TicketStatus::Active
    }

    /// Returns `true` if any recorded attempt succeeded
    #[must_use]
    pub fn has_been_admitted(&self) -> bool {
        self.validation_history.iter().any(|record| record.is_valid)
    }

    /// Validation type implied by the tier
    #[must_use]
    pub const fn validation_type(&self) -> ValidationType {
        if self.ticket_type.requires_biometric() {
            ValidationType::ImageVerification
        } else {
            ValidationType::QrOnly
        }
    }

    /// Returns `true` if the scanned identity matches this ticket
    #[must_use]
    pub fn matches_identity(&self, event_id: &EventId, buyer_id: &BuyerId) -> bool {
        &self.event_id == event_id && &self.buyer_id == buyer_id
    }

    /// Encoded QR payload for this ticket
    #[must_use]
    pub fn qr_payload(&self) -> Vec<u8> {
        crate::codec::encode(&self.id, &self.event_id, &self.buyer_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample_ticket() -> Ticket {
        Ticket {
            id: TicketId::from("T1"),
            event_id: EventId::from("E1"),
            buyer_id: BuyerId::from("B1"),
            ticket_type: TicketType::Regular,
            quantity: 1,
            status: TicketStatus::Active,
            buyer_image_url: None,
            validation_history: Vec::new(),
            purchase_date: Utc::now(),
        }
    }

    #[test]
    fn ticket_serializes_with_document_keys() {
        let json = serde_json::to_value(sample_ticket()).unwrap();
        assert_eq!(json["id"], "T1");
        assert_eq!(json["eventId"], "E1");
        assert_eq!(json["buyerId"], "B1");
        assert_eq!(json["ticketType"], "regular");
        assert_eq!(json["status"], "active");
        assert!(json.get("buyerImageUrl").is_none());
        assert!(json["validationHistory"].as_array().unwrap().is_empty());
    }

    #[test]
    fn custom_tier_round_trips_through_string() {
        let tier: TicketType = serde_json::from_str("\"vip\"").unwrap();
        assert_eq!(tier, TicketType::Tier("vip".to_string()));
        assert_eq!(serde_json::to_string(&tier).unwrap(), "\"vip\"");
        assert!(!tier.requires_biometric());
        assert_eq!(TicketType::from("secure"), TicketType::Secure);
    }

    #[test]
    fn canonical_tier_survives_serde() {
        let spelled = TicketType::Tier("secure".to_string());
        let canonical = spelled.clone().canonical();
        assert_eq!(canonical, TicketType::Secure);
        assert!(canonical.requires_biometric());

        let json = serde_json::to_string(&spelled).unwrap();
        assert_eq!(serde_json::from_str::<TicketType>(&json).unwrap(), canonical);
        assert_eq!(
            TicketType::Tier("vip".to_string()).canonical(),
            TicketType::Tier("vip".to_string())
        );
    }

    #[test]
    fn status_parses_wire_names() {
        assert_eq!("used".parse::<TicketStatus>().unwrap(), TicketStatus::Used);
        assert!("burned".parse::<TicketStatus>().is_err());
        assert_eq!(TicketStatus::Revoked.to_string(), "revoked");
    }

    #[test]
    fn admitted_history_is_detected() {
        let mut ticket = sample_ticket();
        let context = ScanContext::new("staff-1", "Event Entrance");
        let failed =
            ValidationRecord::attempt(&ticket, &context, Utc::now()).rejected("ticket data mismatch");
        ticket.validation_history.push(failed);
        assert!(!ticket.has_been_admitted());

        let record = ValidationRecord::attempt(&ticket, &context, Utc::now()).admitted();
        ticket.validation_history.push(record);
        assert!(ticket.has_been_admitted());
    }

    #[test]
    fn secure_tickets_use_image_verification() {
        let mut ticket = sample_ticket();
        assert_eq!(ticket.validation_type(), ValidationType::QrOnly);
        ticket.ticket_type = TicketType::Secure;
        assert_eq!(ticket.validation_type(), ValidationType::ImageVerification);

        let record = ValidationRecord::attempt(&ticket, &ScanContext::new("op", "Door"), Utc::now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["validationType"], "image_verification");
        assert_eq!(json["validatedBy"], "op");
        assert_eq!(json["isValid"], false);
    }
}
