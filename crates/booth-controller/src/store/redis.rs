//! Redis store backend.
//!
//! Documents are JSON strings under per-collection key prefixes, with index
//! sets for listing:
//!
//! - `voucher:{code}` / `vouchers:index`
//! - `session:{id}` / `sessions:index`
//! - `receiver:{identifier}` / `receivers:index`
//! - `voucher:{code}:active` - exclusivity reservation (value: holder session id)
//! - `logs` - append-only audit list
//!
//! # Connection Pattern
//!
//! The redis-rs `MultiplexedConnection` is designed to be cloned cheaply and
//! used concurrently. No locking is needed - just clone the connection for
//! each operation.
//!
//! # Atomicity
//!
//! The exclusivity reservation is a single `SET NX PX`; every other
//! conditional transition runs as a precompiled Lua script (see
//! [`super::lua_scripts`]). Change notifications ride Redis pub/sub: every
//! mutation publishes its collection name, a listener task re-reads the
//! collection and broadcasts a full snapshot to local watchers.

use super::lua_scripts;
use super::{
    BoothStore, ChangeEvent, FinishOutcome, ReserveOutcome, SettleOutcome, CHANGE_FEED_BUFFER,
};
use crate::errors::BoothError;
use crate::models::{AuditLogEntry, Receiver, Session, Voucher};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::types::{SessionId, TerminatedBy, VoucherCode};
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, Script};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, instrument, warn};

/// Pub/sub channel carrying collection names on mutation.
const CHANGES_CHANNEL: &str = "booth:changes";

fn voucher_key(code: &VoucherCode) -> String {
    format!("voucher:{code}")
}

fn reservation_key(code: &VoucherCode) -> String {
    format!("voucher:{code}:active")
}

fn session_key(id: SessionId) -> String {
    format!("session:{id}")
}

fn receiver_key(identifier: &str) -> String {
    format!("receiver:{identifier}")
}

/// Redis-backed [`BoothStore`] implementation.
///
/// Cheaply cloneable - the underlying `MultiplexedConnection` is designed to
/// be shared across tasks without locking.
#[derive(Clone)]
pub struct RedisStore {
    /// Redis client (kept for reconnection scenarios).
    #[allow(dead_code)]
    client: Client,
    /// Multiplexed connection (cheaply cloneable, designed for concurrent use).
    connection: MultiplexedConnection,
    /// Local fan-out of change snapshots.
    events: broadcast::Sender<ChangeEvent>,
    /// Precompiled Lua scripts.
    finish_session_script: Script,
    settle_voucher_script: Script,
    mark_used_script: Script,
    adjust_voucher_script: Script,
    release_reservation_script: Script,
}

impl RedisStore {
    /// Connect to Redis and spawn the change-feed listener.
    ///
    /// # Errors
    ///
    /// Returns `BoothError::Store` if the connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, BoothError> {
        // Do NOT log redis_url, it may contain credentials
        let client = Client::open(redis_url).map_err(|e| {
            error!(target: "booth.store.redis", error = %e, "Failed to open Redis client");
            BoothError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                error!(target: "booth.store.redis", error = %e, "Failed to connect to Redis");
                BoothError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        let (events, _) = broadcast::channel(CHANGE_FEED_BUFFER);

        let store = Self {
            client,
            connection,
            events,
            finish_session_script: Script::new(lua_scripts::FINISH_SESSION),
            settle_voucher_script: Script::new(lua_scripts::SETTLE_VOUCHER),
            mark_used_script: Script::new(lua_scripts::MARK_USED),
            adjust_voucher_script: Script::new(lua_scripts::ADJUST_VOUCHER),
            release_reservation_script: Script::new(lua_scripts::RELEASE_RESERVATION),
        };

        store.spawn_change_listener().await?;

        Ok(store)
    }

    /// Spawn the pub/sub listener that turns mutation notices into
    /// full-collection snapshots for local watchers.
    async fn spawn_change_listener(&self) -> Result<(), BoothError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(|e| {
            error!(target: "booth.store.redis", error = %e, "Failed to open pub/sub connection");
            BoothError::Store(format!("Failed to open pub/sub connection: {e}"))
        })?;
        pubsub.subscribe(CHANGES_CHANNEL).await.map_err(|e| {
            BoothError::Store(format!("Failed to subscribe to change channel: {e}"))
        })?;

        let conn = self.connection.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            use futures::StreamExt;

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let collection: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(target: "booth.store.redis", error = %e, "Bad change notice payload");
                        continue;
                    }
                };

                let mut conn = conn.clone();
                match snapshot(&mut conn, &collection).await {
                    Ok(Some(event)) => {
                        let _ = events.send(event);
                    }
                    Ok(None) => {
                        warn!(
                            target: "booth.store.redis",
                            collection = %collection,
                            "Change notice for unknown collection"
                        );
                    }
                    Err(e) => {
                        warn!(target: "booth.store.redis", error = %e, "Snapshot fetch failed");
                    }
                }
            }

            warn!(target: "booth.store.redis", "Change-feed listener stopped");
        });

        Ok(())
    }

    /// Publish a mutation notice. Best-effort: the change feed is advisory,
    /// a lost notice never fails the mutation that produced it.
    async fn notify(&self, collection: &str) {
        let mut conn = self.connection.clone();
        let result: Result<i64, redis::RedisError> =
            conn.publish(CHANGES_CHANNEL, collection).await;
        if let Err(e) = result {
            warn!(
                target: "booth.store.redis",
                collection = %collection,
                error = %e,
                "Failed to publish change notice"
            );
        }
    }

    async fn put_doc<T: Serialize>(
        &self,
        key: &str,
        index: &str,
        member: &str,
        doc: &T,
    ) -> Result<(), BoothError> {
        let json = encode(doc)?;
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .set(key, json)
            .sadd(index, member)
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("write document", &e))?;
        Ok(())
    }

    async fn get_doc<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, BoothError> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = conn.get(key).await.map_err(|e| store_err("read document", &e))?;
        raw.map(|json| decode(&json)).transpose()
    }

    async fn list_docs<T: DeserializeOwned>(
        &self,
        index: &str,
        prefix: &str,
    ) -> Result<Vec<T>, BoothError> {
        let mut conn = self.connection.clone();
        let members: Vec<String> = conn
            .smembers(index)
            .await
            .map_err(|e| store_err("read index", &e))?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = members.iter().map(|m| format!("{prefix}{m}")).collect();
        let raws: Vec<Option<String>> = conn
            .mget(&keys)
            .await
            .map_err(|e| store_err("read documents", &e))?;

        // Index entries can briefly outlive their documents; skip the holes.
        raws.into_iter()
            .flatten()
            .map(|json| decode(&json))
            .collect()
    }
}

fn store_err(op: &str, e: &redis::RedisError) -> BoothError {
    warn!(target: "booth.store.redis", error = %e, "Redis operation failed: {op}");
    BoothError::Store(format!("{op}: {e}"))
}

fn encode<T: Serialize>(doc: &T) -> Result<String, BoothError> {
    serde_json::to_string(doc)
        .map_err(|e| BoothError::Internal(format!("document serialization failed: {e}")))
}

fn decode<T: DeserializeOwned>(json: &str) -> Result<T, BoothError> {
    serde_json::from_str(json)
        .map_err(|e| BoothError::Store(format!("document deserialization failed: {e}")))
}

/// Fetch a full-collection snapshot for the change feed.
async fn snapshot(
    conn: &mut MultiplexedConnection,
    collection: &str,
) -> Result<Option<ChangeEvent>, BoothError> {
    async fn fetch<T: DeserializeOwned>(
        conn: &mut MultiplexedConnection,
        index: &str,
        prefix: &str,
    ) -> Result<Vec<T>, BoothError> {
        let members: Vec<String> = conn
            .smembers(index)
            .await
            .map_err(|e| store_err("read index", &e))?;
        if members.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = members.iter().map(|m| format!("{prefix}{m}")).collect();
        let raws: Vec<Option<String>> = conn
            .mget(&keys)
            .await
            .map_err(|e| store_err("read documents", &e))?;
        raws.into_iter().flatten().map(|json| decode(&json)).collect()
    }

    match collection {
        "vouchers" => Ok(Some(ChangeEvent::Vouchers(
            fetch(conn, "vouchers:index", "voucher:").await?,
        ))),
        "sessions" => Ok(Some(ChangeEvent::Sessions(
            fetch(conn, "sessions:index", "session:").await?,
        ))),
        "receivers" => Ok(Some(ChangeEvent::Receivers(
            fetch(conn, "receivers:index", "receiver:").await?,
        ))),
        _ => Ok(None),
    }
}

#[async_trait]
impl BoothStore for RedisStore {
    #[instrument(skip_all, fields(code = %voucher.code))]
    async fn put_voucher(&self, voucher: &Voucher) -> Result<(), BoothError> {
        self.put_doc(
            &voucher_key(&voucher.code),
            "vouchers:index",
            voucher.code.as_str(),
            voucher,
        )
        .await?;
        self.notify("vouchers").await;
        Ok(())
    }

    async fn get_voucher(&self, code: &VoucherCode) -> Result<Option<Voucher>, BoothError> {
        self.get_doc(&voucher_key(code)).await
    }

    #[instrument(skip_all, fields(code = %code))]
    async fn delete_voucher(&self, code: &VoucherCode) -> Result<bool, BoothError> {
        let mut conn = self.connection.clone();
        let (deleted, _removed): (i64, i64) = redis::pipe()
            .atomic()
            .del(voucher_key(code))
            .srem("vouchers:index", code.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("delete voucher", &e))?;
        if deleted > 0 {
            self.notify("vouchers").await;
        }
        Ok(deleted > 0)
    }

    async fn list_vouchers(&self) -> Result<Vec<Voucher>, BoothError> {
        self.list_docs("vouchers:index", "voucher:").await
    }

    #[instrument(skip_all, fields(code = %code))]
    async fn mark_voucher_used(&self, code: &VoucherCode) -> Result<bool, BoothError> {
        let mut conn = self.connection.clone();
        let found: i64 = self
            .mark_used_script
            .key(voucher_key(code))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| store_err("mark voucher used", &e))?;
        if found == 1 {
            self.notify("vouchers").await;
        }
        Ok(found == 1)
    }

    #[instrument(skip_all, fields(code = %code, remaining = remaining))]
    async fn settle_voucher(
        &self,
        code: &VoucherCode,
        remaining: u32,
    ) -> Result<SettleOutcome, BoothError> {
        let mut conn = self.connection.clone();
        let (status, current): (i64, i64) = self
            .settle_voucher_script
            .key(voucher_key(code))
            .arg(remaining)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| store_err("settle voucher", &e))?;

        match status {
            1 => {
                self.notify("vouchers").await;
                let voucher = self
                    .get_voucher(code)
                    .await?
                    .ok_or_else(|| BoothError::Store("settled voucher vanished".to_string()))?;
                debug!(
                    target: "booth.store.redis",
                    code = %code,
                    remaining = remaining,
                    "Voucher settled"
                );
                Ok(SettleOutcome::Settled(voucher))
            }
            0 => Ok(SettleOutcome::WouldInflate {
                current: u32::try_from(current).unwrap_or(0),
                requested: remaining,
            }),
            _ => Ok(SettleOutcome::NotFound),
        }
    }

    #[instrument(skip_all, fields(code = %code))]
    async fn adjust_voucher(
        &self,
        code: &VoucherCode,
        new_total: u32,
        new_price: u32,
    ) -> Result<Option<Voucher>, BoothError> {
        let mut conn = self.connection.clone();
        let found: i64 = self
            .adjust_voucher_script
            .key(voucher_key(code))
            .arg(new_total)
            .arg(new_price)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| store_err("adjust voucher", &e))?;

        if found == 0 {
            return Ok(None);
        }
        self.notify("vouchers").await;
        self.get_voucher(code).await
    }

    #[instrument(skip_all, fields(code = %code, session_id = %session_id))]
    async fn try_reserve(
        &self,
        code: &VoucherCode,
        session_id: SessionId,
        ttl: Duration,
    ) -> Result<ReserveOutcome, BoothError> {
        let mut conn = self.connection.clone();
        // Single atomic conditional write: claim iff unclaimed. The PX bound
        // keeps a crashed holder from stranding the voucher.
        let claimed: Option<String> = redis::cmd("SET")
            .arg(reservation_key(code))
            .arg(session_id.to_string())
            .arg("NX")
            .arg("PX")
            .arg(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX))
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("reserve voucher", &e))?;

        if claimed.is_some() {
            Ok(ReserveOutcome::Reserved)
        } else {
            Ok(ReserveOutcome::AlreadyActive)
        }
    }

    #[instrument(skip_all, fields(code = %code, session_id = %session_id))]
    async fn release_reservation(
        &self,
        code: &VoucherCode,
        session_id: SessionId,
    ) -> Result<(), BoothError> {
        let mut conn = self.connection.clone();
        let _released: i64 = self
            .release_reservation_script
            .key(reservation_key(code))
            .arg(session_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| store_err("release reservation", &e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %session.id))]
    async fn insert_session(&self, session: &Session) -> Result<(), BoothError> {
        self.put_doc(
            &session_key(session.id),
            "sessions:index",
            &session.id.to_string(),
            session,
        )
        .await?;
        self.notify("sessions").await;
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, BoothError> {
        self.get_doc(&session_key(id)).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, BoothError> {
        self.list_docs("sessions:index", "session:").await
    }

    #[instrument(skip_all, fields(session_id = %id, terminated_by = ?terminated_by))]
    async fn finish_session(
        &self,
        id: SessionId,
        end_time: DateTime<Utc>,
        terminated_by: TerminatedBy,
        remaining: u32,
    ) -> Result<FinishOutcome, BoothError> {
        // The voucher code (for the reservation key) comes from a plain read;
        // the script re-checks the active flag, so this is not a TOCTOU
        // window: the transition itself stays atomic.
        let Some(current) = self.get_session(id).await? else {
            return Ok(FinishOutcome::NotFound);
        };

        let actor_tag = encode(&terminated_by)?;
        let actor_tag = actor_tag.trim_matches('"').to_string();

        let mut conn = self.connection.clone();
        let (status, seeded): (i64, i64) = self
            .finish_session_script
            .key(session_key(id))
            .key(reservation_key(&current.voucher_code))
            .arg(end_time.to_rfc3339())
            .arg(&actor_tag)
            .arg(remaining)
            .arg(id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| store_err("finish session", &e))?;

        match status {
            1 => {
                self.notify("sessions").await;
                let session = self
                    .get_session(id)
                    .await?
                    .ok_or_else(|| BoothError::Store("finished session vanished".to_string()))?;
                Ok(FinishOutcome::Finished {
                    session,
                    seeded: u32::try_from(seeded).unwrap_or(0),
                })
            }
            0 => {
                let session = self
                    .get_session(id)
                    .await?
                    .ok_or_else(|| BoothError::Store("terminated session vanished".to_string()))?;
                Ok(FinishOutcome::AlreadyFinished(session))
            }
            _ => Ok(FinishOutcome::NotFound),
        }
    }

    #[instrument(skip_all, fields(identifier = %receiver.identifier))]
    async fn put_receiver(&self, receiver: &Receiver) -> Result<(), BoothError> {
        self.put_doc(
            &receiver_key(&receiver.identifier),
            "receivers:index",
            &receiver.identifier,
            receiver,
        )
        .await?;
        self.notify("receivers").await;
        Ok(())
    }

    async fn get_receiver(&self, identifier: &str) -> Result<Option<Receiver>, BoothError> {
        self.get_doc(&receiver_key(identifier)).await
    }

    async fn list_receivers(&self) -> Result<Vec<Receiver>, BoothError> {
        self.list_docs("receivers:index", "receiver:").await
    }

    async fn append_log(&self, entry: &AuditLogEntry) -> Result<(), BoothError> {
        let json = encode(entry)?;
        let mut conn = self.connection.clone();
        let _len: i64 = conn
            .rpush("logs", json)
            .await
            .map_err(|e| store_err("append audit log", &e))?;
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<ChangeEvent> {
        self.events.subscribe()
    }

    async fn ping(&self) -> Result<(), BoothError> {
        let mut conn = self.connection.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| store_err("ping", &e))?;
        Ok(())
    }
}
