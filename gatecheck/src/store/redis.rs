//! Redis-backed ticket store.
//!
//! # Layout
//!
//! Each ticket occupies three keys under a configurable prefix:
//!
//! - `{prefix}:ticket:{id}` → JSON ticket document (history omitted)
//! - `{prefix}:ticket:{id}:status` → current status string
//! - `{prefix}:ticket:{id}:history` → list of JSON validation records
//!
//! Status lives in its own key so the conditional update can compare it
//! inside a Lua script without decoding JSON. The history is a list, so
//! appends never rewrite earlier records.
//!
//! # Atomicity
//!
//! `create_ticket` and `update_ticket` are Lua scripts: the existence check,
//! status and history preconditions, status write and history append
//! execute as one Redis command. Two scanners admitting the same ticket race
//! inside Redis and exactly one sees `active`.

use super::{StoreError, TicketStore, TicketUpdate};
use crate::config::StoreConfig;
use crate::types::{Ticket, TicketId, TicketStatus};
use ::redis::aio::ConnectionManager;
use ::redis::{Client, Script};
use std::future::Future;
use std::pin::Pin;

const CREATE_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 1 then
        return 0
    end
    redis.call('SET', KEYS[1], ARGV[1])
    redis.call('SET', KEYS[2], ARGV[2])
    redis.call('DEL', KEYS[3])
    for i = 3, #ARGV do
        redis.call('RPUSH', KEYS[3], ARGV[i])
    end
    return 1
";

// ARGV: expected status, new status, record, require-unadmitted flag.
// Empty string means "none".
const UPDATE_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return {'missing'}
    end
    local current = redis.call('GET', KEYS[2])
    if not current then
        return {'corrupt'}
    end
    if ARGV[1] ~= '' and current ~= ARGV[1] then
        return {'conflict', current}
    end
    if ARGV[4] == '1' then
        for _, record in ipairs(redis.call('LRANGE', KEYS[3], 0, -1)) do
            if cjson.decode(record)['isValid'] == true then
                return {'admitted'}
            end
        end
    end
    if ARGV[2] ~= '' then
        redis.call('SET', KEYS[2], ARGV[2])
        current = ARGV[2]
    end
    if ARGV[3] ~= '' then
        redis.call('RPUSH', KEYS[3], ARGV[3])
    end
    local result = {'ok', current, redis.call('GET', KEYS[1])}
    for _, record in ipairs(redis.call('LRANGE', KEYS[3], 0, -1)) do
        table.insert(result, record)
    end
    return result
";

/// Redis ticket store shared by all scanners at a venue.
///
/// Clones share the same `ConnectionManager`.
#[derive(Clone)]
pub struct RedisTicketStore {
    conn_manager: ConnectionManager,
    prefix: String,
}

impl RedisTicketStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the URL is malformed or the
    /// connection fails.
    pub async fn new(redis_url: &str, prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {e}")))?;

        let conn_manager = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
        })?;

        let prefix = prefix.into();
        tracing::info!(prefix = %prefix, "RedisTicketStore initialized");

        Ok(Self {
            conn_manager,
            prefix,
        })
    }

    /// Connect using [`StoreConfig::redis_url`] and [`StoreConfig::key_prefix`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if no URL is configured or the
    /// connection fails.
    pub async fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("no Redis URL configured".to_string()))?;
        Self::new(url, config.key_prefix.clone()).await
    }

    fn doc_key(&self, id: &TicketId) -> String {
        format!("{}:ticket:{id}", self.prefix)
    }

    fn status_key(&self, id: &TicketId) -> String {
        format!("{}:ticket:{id}:status", self.prefix)
    }

    fn history_key(&self, id: &TicketId) -> String {
        format!("{}:ticket:{id}:history", self.prefix)
    }
}

impl std::fmt::Debug for RedisTicketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTicketStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn parse_status(raw: &str) -> Result<TicketStatus, StoreError> {
    raw.parse()
        .map_err(|e: crate::types::UnknownStatus| StoreError::Serialization(e.to_string()))
}

/// Rebuild a ticket from its document, status key and history list.
fn assemble(doc: &str, status: &str, history: &[String]) -> Result<Ticket, StoreError> {
    let mut ticket: Ticket =
        serde_json::from_str(doc).map_err(|e| StoreError::Serialization(e.to_string()))?;
    ticket.status = parse_status(status)?;
    ticket.validation_history = history
        .iter()
        .map(|record| serde_json::from_str(record))
        .collect::<Result<_, _>>()
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(ticket)
}

impl TicketStore for RedisTicketStore {
    fn create_ticket(
        &self,
        ticket: Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();

            let history = ticket
                .validation_history
                .iter()
                .map(to_json)
                .collect::<Result<Vec<_>, _>>()?;
            let mut document = ticket.clone();
            document.validation_history.clear();
            let document = to_json(&document)?;

            let script = Script::new(CREATE_SCRIPT);
            let mut invocation = script.prepare_invoke();
            invocation
                .key(self.doc_key(&ticket.id))
                .key(self.status_key(&ticket.id))
                .key(self.history_key(&ticket.id))
                .arg(document)
                .arg(ticket.status.as_str());
            for record in history {
                invocation.arg(record);
            }

            let created: i64 = invocation
                .invoke_async(&mut conn)
                .await
                .map_err(|e| StoreError::Unavailable(format!("Failed to create ticket: {e}")))?;

            if created == 0 {
                return Err(StoreError::AlreadyExists(ticket.id));
            }

            tracing::debug!(ticket_id = %ticket.id, "Stored ticket in Redis");
            Ok(())
        })
    }

    fn get_ticket(
        &self,
        id: &TicketId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Ticket>, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();

            let (doc, status, history): (Option<String>, Option<String>, Vec<String>) =
                ::redis::pipe()
                    .atomic()
                    .get(self.doc_key(&id))
                    .get(self.status_key(&id))
                    .lrange(self.history_key(&id), 0, -1)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| StoreError::Unavailable(format!("Failed to load ticket: {e}")))?;

            match (doc, status) {
                (Some(doc), Some(status)) => assemble(&doc, &status, &history).map(Some),
                (None, _) => Ok(None),
                (Some(_), None) => Err(StoreError::Serialization(format!(
                    "ticket {id} has no status key"
                ))),
            }
        })
    }

    fn update_ticket(
        &self,
        id: &TicketId,
        update: TicketUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();

            let record = update.append.as_ref().map(to_json).transpose()?;

            let reply: Vec<String> = Script::new(UPDATE_SCRIPT)
                .key(self.doc_key(&id))
                .key(self.status_key(&id))
                .key(self.history_key(&id))
                .arg(update.expected_status.map_or("", TicketStatus::as_str))
                .arg(update.status.map_or("", TicketStatus::as_str))
                .arg(record.unwrap_or_default())
                .arg(if update.require_unadmitted { "1" } else { "" })
                .invoke_async(&mut conn)
                .await
                .map_err(|e| StoreError::Unavailable(format!("Failed to update ticket: {e}")))?;

            match reply.as_slice() {
                [tag, status, doc, history @ ..] if tag == "ok" => {
                    tracing::debug!(ticket_id = %id, status = %status, "Updated ticket in Redis");
                    assemble(doc, status, history)
                }
                [tag, actual] if tag == "conflict" => Err(StoreError::PreconditionFailed {
                    ticket_id: id,
                    expected: update.expected_status.unwrap_or(TicketStatus::Active),
                    actual: parse_status(actual)?,
                }),
                [tag] if tag == "missing" => Err(StoreError::NotFound(id)),
                [tag] if tag == "admitted" => Err(StoreError::AlreadyAdmitted(id)),
                _ => Err(StoreError::Serialization(format!(
                    "unexpected update reply for ticket {id}: {reply:?}"
                ))),
            }
        })
    }
}
