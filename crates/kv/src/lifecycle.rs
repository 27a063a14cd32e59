//! Global lifecycle event stream: `{mas}:lifecycle`.
//!
//! Publishing is fire-and-forget (failures are logged, never raised) for
//! every event type, `session_end` included — see the open-question
//! resolution this crate implements. Consumption uses named consumer
//! groups with per-event-type handler dispatch and startup pending-drain.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::namespace::NamespaceManager;

/// Approximate stream retention cap. Publishers request `MAXLEN ~` trimming
/// on every append so trimming stays O(1) amortized.
pub const MAX_STREAM_LENGTH: usize = 50_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
  #[serde(rename = "type")]
  pub event_type: String,
  pub session_id: String,
  pub timestamp: DateTime<Utc>,
  pub data: Value,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;
pub type Handler = Box<dyn Fn(LifecycleEvent) -> HandlerFuture + Send + Sync>;

/// Fire-and-forget publisher plus consumer-group reader over the global
/// lifecycle stream.
pub struct LifecycleBus {
  conn: ConnectionManager,
}

impl LifecycleBus {
  pub fn new(conn: ConnectionManager) -> Self {
    Self { conn }
  }

  /// Publish an event. Never propagates a Redis error to the caller: the
  /// wake-up sweep provides eventual consistency for anything this drops.
  pub async fn publish(&self, event_type: &str, session_id: &str, data: Value) {
    let stream_key = NamespaceManager::lifecycle_stream();
    let event = LifecycleEvent {
      event_type: event_type.to_owned(),
      session_id: session_id.to_owned(),
      timestamp: Utc::now(),
      data,
    };

    let mut conn = self.conn.clone();
    let result: Result<String, redis::RedisError> = conn
      .xadd_maxlen(
        stream_key,
        redis::streams::StreamMaxlen::Approx(MAX_STREAM_LENGTH),
        "*",
        &[
          ("type", event.event_type.clone()),
          ("session_id", event.session_id.clone()),
          ("timestamp", event.timestamp.to_rfc3339()),
          (
            "data",
            serde_json::to_string(&event.data).unwrap_or_default(),
          ),
        ],
      )
      .await;

    if let Err(err) = result {
      tracing::error!(
        event_type,
        session_id,
        error = %err,
        "failed to publish lifecycle event; wake-up sweep will reconcile"
      );
    }
  }

  /// Ensure a consumer group exists (idempotent).
  pub async fn ensure_group(&self, group: &str) -> anyhow::Result<()> {
    let stream_key = NamespaceManager::lifecycle_stream();
    let mut conn = self.conn.clone();
    let result: Result<(), redis::RedisError> = conn
      .xgroup_create_mkstream(stream_key, group, "0")
      .await;
    match result {
      Ok(()) => Ok(()),
      Err(err) if err.to_string().contains("BUSYGROUP") => Ok(()),
      Err(err) => Err(err.into()),
    }
  }

  /// Drain this consumer's own pending (read-but-unacknowledged) messages,
  /// dispatching each to the matching handler, then ack on success.
  pub async fn drain_pending(
    &self,
    group: &str,
    consumer: &str,
    handlers: &HashMap<&'static str, Handler>,
  ) -> anyhow::Result<()> {
    self.read_and_dispatch(group, consumer, "0", handlers).await
  }

  /// Block for new messages and dispatch them. Intended to run in a loop.
  pub async fn read_new(
    &self,
    group: &str,
    consumer: &str,
    handlers: &HashMap<&'static str, Handler>,
    block_ms: usize,
  ) -> anyhow::Result<()> {
    let stream_key = NamespaceManager::lifecycle_stream();
    let mut conn = self.conn.clone();
    let opts = StreamReadOptions::default()
      .group(group, consumer)
      .block(block_ms)
      .count(64);

    let reply: StreamReadReply = conn.xread_options(&[stream_key], &[">"], &opts).await?;
    self.dispatch_reply(&mut conn, group, reply, handlers).await
  }

  async fn read_and_dispatch(
    &self,
    group: &str,
    consumer: &str,
    id: &str,
    handlers: &HashMap<&'static str, Handler>,
  ) -> anyhow::Result<()> {
    let stream_key = NamespaceManager::lifecycle_stream();
    let mut conn = self.conn.clone();
    let opts = StreamReadOptions::default().group(group, consumer).count(256);

    let reply: StreamReadReply = conn.xread_options(&[stream_key], &[id], &opts).await?;
    self.dispatch_reply(&mut conn, group, reply, handlers).await
  }

  async fn dispatch_reply(
    &self,
    conn: &mut ConnectionManager,
    group: &str,
    reply: StreamReadReply,
    handlers: &HashMap<&'static str, Handler>,
  ) -> anyhow::Result<()> {
    let stream_key = NamespaceManager::lifecycle_stream();
    for stream_key_entry in reply.keys {
      for stream_id in stream_key_entry.ids {
        let event = match parse_event(&stream_id) {
          Some(event) => event,
          None => {
            tracing::warn!(id = %stream_id.id, "malformed lifecycle event, acking to avoid poison message");
            let _: Result<i64, _> = conn.xack(stream_key, group, &[&stream_id.id]).await;
            continue;
          }
        };

        let outcome = match handlers.get(event.event_type.as_str()) {
          Some(handler) => handler(event.clone()).await,
          None => Ok(()), // unrecognized type: not this consumer's concern
        };

        match outcome {
          Ok(()) => {
            let _: i64 = conn.xack(stream_key, group, &[&stream_id.id]).await?;
          }
          Err(err) => {
            tracing::error!(
              id = %stream_id.id,
              event_type = %event.event_type,
              error = %err,
              "lifecycle handler failed; message remains pending for redelivery"
            );
          }
        }
      }
    }
    Ok(())
  }
}

fn parse_event(entry: &redis::streams::StreamId) -> Option<LifecycleEvent> {
  let event_type = entry.get::<String>("type")?;
  let session_id = entry.get::<String>("session_id")?;
  let timestamp_raw = entry.get::<String>("timestamp")?;
  let data_raw = entry.get::<String>("data")?;

  Some(LifecycleEvent {
    event_type,
    session_id,
    timestamp: DateTime::parse_from_rfc3339(&timestamp_raw)
      .ok()?
      .with_timezone(&Utc),
    data: serde_json::from_str(&data_raw).unwrap_or(Value::Null),
  })
}
