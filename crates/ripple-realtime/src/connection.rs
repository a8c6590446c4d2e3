//! Connection actor: two loops ferrying frames between one WebSocket
//! and the hub.
//!
//! The read loop owns liveness (idle deadline reset on every inbound
//! frame, pongs included); the write loop owns the socket's send half
//! (outbound queue, pings, write deadlines). Whichever loop stops first
//! triggers unregistration, which closes the queue and lets the writer
//! flush the farewell before closing the socket.

use std::time::Duration;

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::hub::{HubHandle, OUTBOUND_QUEUE_CAPACITY};

/// Maximum inbound frame size in bytes, enforced at upgrade time.
pub const MAX_FRAME_SIZE: usize = 512;

/// Timing knobs for liveness detection.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Idle read deadline, reset on every inbound frame.
    pub idle_read_timeout: Duration,
    /// Ping interval. Must be strictly shorter than the idle deadline so
    /// a healthy peer's pong always arrives in time.
    pub ping_period: Duration,
    /// Per-frame write deadline.
    pub write_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        let idle_read_timeout = Duration::from_secs(60);
        Self {
            idle_read_timeout,
            ping_period: idle_read_timeout.mul_f64(0.9),
            write_timeout: Duration::from_secs(10),
        }
    }
}

/// Drives a single socket on behalf of one authenticated user.
pub struct ConnectionActor {
    user_id: i64,
    hub: HubHandle,
    heartbeat: HeartbeatConfig,
}

impl ConnectionActor {
    pub fn new(user_id: i64, hub: HubHandle) -> Self {
        Self {
            user_id,
            hub,
            heartbeat: HeartbeatConfig::default(),
        }
    }

    /// Override the default timing, mainly for tests.
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// Run the connection to completion.
    ///
    /// Registers with the hub, splits the socket, and races the two loops.
    /// Returns once the connection is unregistered and the socket closed.
    pub async fn run<S>(self, socket: S)
    where
        S: Stream<Item = Result<Message, axum::Error>>
            + Sink<Message, Error = axum::Error>
            + Send
            + 'static,
    {
        let connection_id = Uuid::new_v4();
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        if self
            .hub
            .register(connection_id, self.user_id, outbound_tx)
            .await
            .is_err()
        {
            warn!(user_id = self.user_id, "hub unavailable, dropping connection");
            return;
        }
        debug!(user_id = self.user_id, %connection_id, "connection actor started");

        let (sink, stream) = socket.split();
        let mut writer = tokio::spawn(write_loop(sink, outbound_rx, self.heartbeat));

        let mut writer_done = false;
        tokio::select! {
            _ = &mut writer => writer_done = true,
            _ = read_loop(stream, &self.hub, self.heartbeat.idle_read_timeout) => {}
        }

        // Unregistering drops the queue sender, which is the writer's
        // signal to flush the farewell and close the socket.
        let _ = self.hub.unregister(connection_id, self.user_id).await;
        if !writer_done {
            let _ = writer.await;
        }
        debug!(user_id = self.user_id, %connection_id, "connection actor stopped");
    }
}

async fn read_loop<St>(mut stream: St, hub: &HubHandle, idle_read_timeout: Duration)
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let frame = match timeout(idle_read_timeout, stream.next()).await {
            Err(_) => {
                debug!("idle read deadline expired");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                debug!(error = %e, "socket read failed");
                return;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                let text = text.trim();
                if text.is_empty() {
                    continue;
                }
                if hub.broadcast(text).await.is_err() {
                    return;
                }
            }
            Message::Close(_) => return,
            // Control and binary traffic only resets the idle deadline.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
        }
    }
}

async fn write_loop<Si>(mut sink: Si, mut outbound: mpsc::Receiver<String>, heartbeat: HeartbeatConfig)
where
    Si: Sink<Message, Error = axum::Error> + Unpin,
{
    // interval_at so the first ping waits a full period.
    let mut ping = interval_at(Instant::now() + heartbeat.ping_period, heartbeat.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let frame = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => Message::Text(frame),
                None => {
                    // Queue closed by the hub: teardown is underway.
                    let _ = timeout(heartbeat.write_timeout, sink.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Vec::new()),
        };

        match timeout(heartbeat.write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(error = %e, "socket write failed");
                break;
            }
            Err(_) => {
                debug!("write deadline expired");
                break;
            }
        }
    }

    let _ = sink.close().await;
}
