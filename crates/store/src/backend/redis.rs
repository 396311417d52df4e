//! Redis backend.
//!
//! Maps the [`KvBackend`](super::KvBackend) surface onto Redis: hashes
//! for records, sets for indexes, a stream for the event log, and
//! MULTI/EXEC pipelines for [`commit`](super::KvBackend::commit).
//! Stream entry ids are parsed into [`EventId`]s unchanged, so cursors
//! handed to watchers stay valid against the raw stream.
//!
//! The connection is a [`ConnectionManager`], which multiplexes and
//! reconnects under the hood; clones share it.

use std::collections::HashMap;

use async_trait::async_trait;
use nodewatch_types::EventId;
use redis::aio::ConnectionManager;

use super::{KvBackend, RawEvent, WriteBatch, WriteOp};
use crate::error::{BackendSnafu, Result, StoreError};
use crate::keys::EVENTS_KEY;

/// Production [`KvBackend`] over a Redis instance.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connects to Redis and verifies liveness with a PING.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Backend` if the address does not parse,
    /// the connection cannot be established, or the ping fails.
    pub async fn connect(addr: &str, db: i64, password: Option<&str>) -> Result<Self> {
        let url = match password {
            Some(password) if !password.is_empty() => {
                format!("redis://:{password}@{addr}/{db}")
            },
            _ => format!("redis://{addr}/{db}"),
        };

        let client = redis::Client::open(url).map_err(backend_err)?;
        let conn = ConnectionManager::new(client).await.map_err(backend_err)?;

        let backend = Self { conn };
        backend.ping().await?;
        Ok(backend)
    }

    fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// Maps a redis error into the store's backend variant.
fn backend_err(err: redis::RedisError) -> StoreError {
    BackendSnafu { message: err.to_string() }.build()
}

/// Parses a stream entry id (`millis-seq`).
fn parse_stream_id(raw: &str) -> Result<EventId> {
    raw.parse::<EventId>().map_err(|_| StoreError::Corrupt {
        key: EVENTS_KEY.to_string(),
        message: format!("unparseable stream id {raw:?}"),
    })
}

/// Appends one batch op to the pipeline, discarding its reply.
fn push_op(pipe: &mut redis::Pipeline, op: &WriteOp) {
    match op {
        WriteOp::HashSet { key, fields } => {
            let cmd = pipe.cmd("HSET").arg(key);
            for (field, value) in fields {
                cmd.arg(field).arg(value);
            }
            cmd.ignore();
        },
        WriteOp::StringSet { key, value } => {
            pipe.cmd("SET").arg(key).arg(value).ignore();
        },
        WriteOp::SetAdd { key, member } => {
            pipe.cmd("SADD").arg(key).arg(member).ignore();
        },
        WriteOp::SetRemove { key, member } => {
            pipe.cmd("SREM").arg(key).arg(member).ignore();
        },
        WriteOp::Delete { key } => {
            pipe.cmd("DEL").arg(key).ignore();
        },
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection();
        let _: () = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn string_set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.connection();
        let claimed: bool = redis::cmd("SETNX")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(claimed)
    }

    async fn string_get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(value)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.connection();
        let fields: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(fields)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.connection();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(members)
    }

    async fn set_intersect(&self, first: &str, second: &str) -> Result<Vec<String>> {
        let mut conn = self.connection();
        let members: Vec<String> = redis::cmd("SINTER")
            .arg(first)
            .arg(second)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(members)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Option<EventId>> {
        let mut conn = self.connection();
        let mut pipe = redis::pipe();
        pipe.atomic();

        for op in &batch.ops {
            push_op(&mut pipe, op);
        }

        match &batch.event {
            Some(fields) => {
                // The XADD reply is the only one not ignored; EXEC hands
                // back exactly the assigned stream id.
                let cmd = pipe.cmd("XADD").arg(EVENTS_KEY).arg("*");
                for (field, value) in fields {
                    cmd.arg(field).arg(value);
                }

                let (id,): (String,) =
                    pipe.query_async(&mut conn).await.map_err(backend_err)?;
                parse_stream_id(&id).map(Some)
            },
            None => {
                let _: () = pipe.query_async(&mut conn).await.map_err(backend_err)?;
                Ok(None)
            },
        }
    }

    async fn events_after(&self, after: Option<EventId>, count: usize) -> Result<Vec<RawEvent>> {
        let mut conn = self.connection();
        // Exclusive start (the "(" prefix) needs Redis 6.2+.
        let start = match after {
            Some(cursor) => format!("({cursor}"),
            None => "-".to_string(),
        };

        let entries: Vec<(String, HashMap<String, String>)> = redis::cmd("XRANGE")
            .arg(EVENTS_KEY)
            .arg(start)
            .arg("+")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;

        entries
            .into_iter()
            .map(|(id, fields)| Ok(RawEvent { id: parse_stream_id(&id)?, fields }))
            .collect()
    }

    async fn last_event_id(&self) -> Result<Option<EventId>> {
        let mut conn = self.connection();
        let entries: Vec<(String, HashMap<String, String>)> = redis::cmd("XREVRANGE")
            .arg(EVENTS_KEY)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;

        match entries.first() {
            Some((id, _)) => parse_stream_id(id).map(Some),
            None => Ok(None),
        }
    }
}
