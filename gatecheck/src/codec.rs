//! QR payload codec.
//!
//! A ticket's QR code carries its identity triple as a flat JSON object:
//!
//! ```text
//! {"ticketId":"T1","eventId":"E1","buyerId":"B1"}
//! ```
//!
//! Both directions are pure. Decoding distinguishes bytes that are not a
//! structured record at all ([`CodecError::Malformed`]) from records that
//! lack one of the three required fields ([`CodecError::Incomplete`]).

use crate::types::{BuyerId, EventId, TicketId};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Upper bound on scanned payload size.
///
/// A legitimate payload is three short ids; anything larger is noise from
/// the camera or a foreign code and is refused before parsing.
pub const MAX_PAYLOAD_BYTES: usize = 4 * 1024;

/// Payload wire keys, in encoding order.
pub const TICKET_ID_KEY: &str = "ticketId";
/// See [`TICKET_ID_KEY`]
pub const EVENT_ID_KEY: &str = "eventId";
/// See [`TICKET_ID_KEY`]
pub const BUYER_ID_KEY: &str = "buyerId";

/// Errors produced while decoding a scanned payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Bytes are not a parseable structured record.
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// A required field is missing or empty.
    #[error("Incomplete payload: missing {field}")]
    Incomplete {
        /// Wire key of the missing field
        field: &'static str,
    },
}

/// Decoded identity triple.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QrPayload {
    /// Ticket to look up
    pub ticket_id: TicketId,
    /// Must match the stored ticket's event
    pub event_id: EventId,
    /// Must match the stored ticket's buyer
    pub buyer_id: BuyerId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WirePayload<'a> {
    ticket_id: &'a str,
    event_id: &'a str,
    buyer_id: &'a str,
}

/// Encode an identity triple into QR payload bytes.
///
/// Deterministic: the same triple always yields the same bytes. The size is
/// not checked here; issuance refuses triples that encode to more than
/// [`MAX_PAYLOAD_BYTES`].
#[must_use]
pub fn encode(ticket_id: &TicketId, event_id: &EventId, buyer_id: &BuyerId) -> Vec<u8> {
    let wire = WirePayload {
        ticket_id: ticket_id.as_str(),
        event_id: event_id.as_str(),
        buyer_id: buyer_id.as_str(),
    };
    // A struct of three &str fields always serializes.
    serde_json::to_vec(&wire).unwrap_or_default()
}

/// Decode scanned bytes into an identity triple.
///
/// Unknown keys are ignored. Surrounding whitespace and a UTF-8 byte order
/// mark are tolerated since some scanner apps add them.
///
/// # Errors
///
/// - [`CodecError::Malformed`] if the bytes are oversized, not JSON, not an
///   object, or a required field is not a string
/// - [`CodecError::Incomplete`] if a required field is missing, `null`, or
///   blank
pub fn decode(bytes: &[u8]) -> Result<QrPayload, CodecError> {
    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(CodecError::Malformed(format!(
            "payload is {} bytes, limit is {MAX_PAYLOAD_BYTES}",
            bytes.len()
        )));
    }

    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| CodecError::Malformed(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(CodecError::Malformed("payload is not an object".to_string()));
    };

    let field = |key: &'static str| -> Result<String, CodecError> {
        match fields.get(key) {
            None | Some(Value::Null) => Err(CodecError::Incomplete { field: key }),
            Some(Value::String(s)) if s.trim().is_empty() => {
                Err(CodecError::Incomplete { field: key })
            }
            Some(Value::String(s)) => Ok(s.clone()),
            Some(_) => Err(CodecError::Malformed(format!("{key} is not a string"))),
        }
    };

    Ok(QrPayload {
        ticket_id: TicketId::from(field(TICKET_ID_KEY)?),
        event_id: EventId::from(field(EVENT_ID_KEY)?),
        buyer_id: BuyerId::from(field(BUYER_ID_KEY)?),
    })
}
