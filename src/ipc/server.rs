//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications for
//! key events and capture state changes to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};
use tracing::{debug, error, info, warn};

use crate::analytics::KeyStats;
use crate::supervisor::{DaemonState, FeedEvent, SupervisorCommand};

use super::protocol::{DaemonStatus, Notification, Request, Response, ServerFrame};

/// Upper bound on a single IPC frame
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    state: Arc<RwLock<DaemonState>>,
    stats: Arc<RwLock<KeyStats>>,
    cmd_tx: mpsc::Sender<SupervisorCommand>,
    feed_tx: broadcast::Sender<FeedEvent>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Per-connection view of the daemon
struct ClientHandler {
    state: Arc<RwLock<DaemonState>>,
    stats: Arc<RwLock<KeyStats>>,
    cmd_tx: mpsc::Sender<SupervisorCommand>,
    feed_tx: broadcast::Sender<FeedEvent>,
}

/// What the client loop selected
enum ClientStep {
    Request(Option<Vec<u8>>),
    Feed(Result<FeedEvent, broadcast::error::RecvError>),
}

impl Server {
    /// Create a new IPC server
    pub fn new(
        socket_path: &Path,
        state: Arc<RwLock<DaemonState>>,
        stats: Arc<RwLock<KeyStats>>,
        cmd_tx: mpsc::Sender<SupervisorCommand>,
        feed_tx: broadcast::Sender<FeedEvent>,
    ) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path)
            .context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener: Some(listener),
            state,
            stats,
            cmd_tx,
            feed_tx,
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        let listener = self.listener.as_ref()
            .context("server not initialized")?;

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let handler = ClientHandler {
                        state: Arc::clone(&self.state),
                        stats: Arc::clone(&self.stats),
                        cmd_tx: self.cmd_tx.clone(),
                        feed_tx: self.feed_tx.clone(),
                    };
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handler.run(stream) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

impl ClientHandler {
    /// Serve one connection until it closes
    async fn run(self, stream: UnixStream) -> Result<()> {
        let (reader, mut writer) = stream.into_split();

        // Frame reads span two awaits, so they must not be dropped
        // mid-frame by the select below. A dedicated task owns the read
        // half and forwards whole frames; channel recv is cancel-safe.
        let (frame_tx, mut frame_rx) = mpsc::channel::<Vec<u8>>(16);
        let mut read_task = tokio::spawn(async move {
            let mut reader = reader;
            while let Some(frame) = read_frame(&mut reader).await? {
                if frame_tx.send(frame).await.is_err() {
                    break;
                }
            }
            Ok::<(), anyhow::Error>(())
        });

        // Populated once the client subscribes
        let mut feed_rx: Option<broadcast::Receiver<FeedEvent>> = None;

        let result = loop {
            let step = tokio::select! {
                frame = frame_rx.recv() => ClientStep::Request(frame),
                event = Self::recv_feed(&mut feed_rx) => ClientStep::Feed(event),
            };

            match step {
                ClientStep::Request(None) => {
                    break match (&mut read_task).await {
                        Ok(Ok(())) => {
                            debug!("client disconnected");
                            Ok(())
                        }
                        Ok(Err(e)) => Err(e),
                        Err(e) => Err(anyhow::anyhow!("client reader task failed: {e}")),
                    };
                }
                ClientStep::Request(Some(bytes)) => {
                    let frame = match serde_json::from_slice::<Request>(&bytes) {
                        Ok(request) => {
                            debug!(?request, "received request");
                            if matches!(request, Request::Subscribe) && feed_rx.is_none() {
                                feed_rx = Some(self.feed_tx.subscribe());
                                debug!("client subscribed to notifications");
                            }
                            ServerFrame::Response(self.process_request(request).await)
                        }
                        Err(e) => {
                            warn!(?e, "failed to parse request");
                            ServerFrame::Response(Response::Error {
                                code: "bad_request".to_string(),
                                message: format!("invalid request: {e}"),
                            })
                        }
                    };
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        break Err(e);
                    }
                }
                ClientStep::Feed(Ok(event)) => {
                    let frame = ServerFrame::Notification(Notification::from(event));
                    if let Err(e) = write_frame(&mut writer, &frame).await {
                        break Err(e);
                    }
                }
                ClientStep::Feed(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    warn!(skipped, "client fell behind on notifications");
                }
                ClientStep::Feed(Err(broadcast::error::RecvError::Closed)) => {
                    debug!("notification feed closed");
                    break Ok(());
                }
            }
        };

        // No-op when the reader already finished
        read_task.abort();
        result
    }

    /// Resolves to the next feed event, or never before the client
    /// subscribes.
    async fn recv_feed(
        feed_rx: &mut Option<broadcast::Receiver<FeedEvent>>,
    ) -> Result<FeedEvent, broadcast::error::RecvError> {
        match feed_rx {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Process a request and return a response
    async fn process_request(&self, request: Request) -> Response {
        match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => {
                let state = self.state.read().await;
                let stats = self.stats.read().await;
                Response::Status(DaemonStatus {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    tracking_enabled: state.tracking_enabled,
                    capture: state.capture,
                    uptime_secs: state.started_at.elapsed().as_secs(),
                    total_keystrokes: stats.total_keystrokes(),
                })
            }

            Request::GetAnalytics => {
                let stats = self.stats.read().await;
                Response::Analytics(stats.snapshot(Instant::now()))
            }

            Request::SetTracking { enabled } => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let cmd = SupervisorCommand::SetTracking { enabled, reply: reply_tx };
                match self.send_command(cmd, reply_rx).await {
                    Ok(Ok(())) => Response::Tracking { enabled },
                    Ok(Err(message)) => Response::Error {
                        code: "tracking_failed".to_string(),
                        message,
                    },
                    Err(response) => response,
                }
            }

            Request::ResetAnalytics => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let cmd = SupervisorCommand::ResetAnalytics { reply: reply_tx };
                match self.send_command(cmd, reply_rx).await {
                    Ok(snapshot) => Response::Analytics(snapshot),
                    Err(response) => response,
                }
            }

            Request::Subscribe => Response::Subscribed,
        }
    }

    /// Hand a command to the supervisor and wait for its reply
    async fn send_command<T>(
        &self,
        cmd: SupervisorCommand,
        reply_rx: oneshot::Receiver<T>,
    ) -> Result<T, Response> {
        if self.cmd_tx.send(cmd).await.is_err() {
            return Err(Response::Error {
                code: "unavailable".to_string(),
                message: "supervisor is not running".to_string(),
            });
        }

        reply_rx.await.map_err(|_| Response::Error {
            code: "unavailable".to_string(),
            message: "supervisor dropped the request".to_string(),
        })
    }
}

/// Read one length-prefixed frame. `None` means the peer closed cleanly.
async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("frame too large: {len} bytes");
    }

    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .await
        .context("failed to read frame body")?;

    Ok(Some(buf))
}

/// Send a length-prefixed JSON message
async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, &ServerFrame::Response(Response::Pong))
            .await
            .unwrap();

        let bytes = read_frame(&mut server).await.unwrap().unwrap();
        let frame: ServerFrame = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(frame, ServerFrame::Response(Response::Pong)));
    }

    #[tokio::test]
    async fn test_read_frame_reports_clean_eof() {
        let (client, mut server) = tokio::io::duplex(64);
        drop(client);

        assert!(read_frame(&mut server).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversize_length() {
        let mut reader = tokio_test::io::Builder::new()
            .read(&(2 * 1024 * 1024u32).to_le_bytes())
            .build();

        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_notification_mid_frame_keeps_the_stream_aligned() {
        use std::time::Duration;

        use crate::event::KeyEvent;

        let (client, server_side) = UnixStream::pair().unwrap();

        let (cmd_tx, _cmd_rx) = mpsc::channel(8);
        let (feed_tx, _) = broadcast::channel(16);
        let handler = ClientHandler {
            state: Arc::new(RwLock::new(DaemonState::new())),
            stats: Arc::new(RwLock::new(KeyStats::new())),
            cmd_tx,
            feed_tx: feed_tx.clone(),
        };
        let connection = tokio::spawn(handler.run(server_side));

        let (mut reader, mut writer) = client.into_split();

        write_frame(&mut writer, &Request::Subscribe).await.unwrap();
        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        let reply: ServerFrame = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(reply, ServerFrame::Response(Response::Subscribed)));

        // Send only half of the next length prefix, then push a feed
        // event while the request is still incomplete.
        let body = serde_json::to_vec(&Request::Ping).unwrap();
        let prefix = (body.len() as u32).to_le_bytes();
        writer.write_all(&prefix[..2]).await.unwrap();
        writer.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        feed_tx.send(FeedEvent::Key(KeyEvent::press("KeyA"))).unwrap();

        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        let pushed: ServerFrame = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(
            pushed,
            ServerFrame::Notification(Notification::Key { .. })
        ));

        // Completing the request must still produce its reply.
        writer.write_all(&prefix[2..]).await.unwrap();
        writer.write_all(&body).await.unwrap();
        writer.flush().await.unwrap();

        let bytes = read_frame(&mut reader).await.unwrap().unwrap();
        let reply: ServerFrame = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(reply, ServerFrame::Response(Response::Pong)));

        drop(writer);
        tokio::time::timeout(Duration::from_secs(2), connection)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
