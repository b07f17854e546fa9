//! The supervisor event loop
//!
//! Selects over IPC commands, helper stdout lines, and the periodic save
//! tick. All analytics writes happen here, so recording never races.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::analytics::{AnalyticsStore, KeyStats};
use crate::config::Config;
use crate::event::{KeyEvent, KeyKind};
use crate::protocol::Line;

use super::process::CaptureProcess;
use super::{CaptureState, DaemonState, FeedEvent, SupervisorCommand};

/// How often dirty analytics get flushed to disk.
const SAVE_INTERVAL: Duration = Duration::from_secs(30);

/// What the main loop selected.
enum Step {
    Command(Option<SupervisorCommand>),
    Line(Option<Line>),
    Save,
}

/// Owns the helper process and drives everything derived from it.
pub struct Supervisor {
    helper_path: PathBuf,
    store: AnalyticsStore,
    state: Arc<RwLock<DaemonState>>,
    stats: Arc<RwLock<KeyStats>>,
    feed_tx: broadcast::Sender<FeedEvent>,
    capture: Option<CaptureProcess>,
}

impl Supervisor {
    pub fn new(
        config: &Config,
        state: Arc<RwLock<DaemonState>>,
        stats: Arc<RwLock<KeyStats>>,
        feed_tx: broadcast::Sender<FeedEvent>,
    ) -> Self {
        Self {
            helper_path: config.helper_path.clone(),
            store: AnalyticsStore::new(config.analytics_path.clone()),
            state,
            stats,
            feed_tx,
            capture: None,
        }
    }

    /// Run the supervisor until the command channel closes.
    pub async fn run(&mut self, mut cmd_rx: mpsc::Receiver<SupervisorCommand>) {
        info!("supervisor started");

        let mut save_tick = tokio::time::interval(SAVE_INTERVAL);
        save_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let step = tokio::select! {
                cmd = cmd_rx.recv() => Step::Command(cmd),
                line = Self::next_helper_line(&mut self.capture) => Step::Line(line),
                _ = save_tick.tick() => Step::Save,
            };

            match step {
                Step::Command(Some(cmd)) => self.handle_command(cmd).await,
                Step::Command(None) => {
                    debug!("command channel closed");
                    break;
                }
                Step::Line(Some(line)) => self.handle_line(line).await,
                Step::Line(None) => self.handle_helper_exit().await,
                Step::Save => self.save_if_dirty().await,
            }
        }

        info!("supervisor stopped");
    }

    /// Resolves to the helper's next line, or never when no helper runs.
    async fn next_helper_line(capture: &mut Option<CaptureProcess>) -> Option<Line> {
        match capture {
            Some(process) => process.next_line().await,
            None => std::future::pending().await,
        }
    }

    async fn handle_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::SetTracking { enabled, reply } => {
                let result = self.set_tracking(enabled).await;
                let _ = reply.send(result.map_err(|e| format!("{e:#}")));
            }
            SupervisorCommand::ResetAnalytics { reply } => {
                let snapshot = {
                    let mut stats = self.stats.write().await;
                    stats.reset();
                    stats.snapshot(Instant::now())
                };
                info!("analytics reset");
                self.save_if_dirty().await;
                let _ = reply.send(snapshot);
            }
        }
    }

    /// Start or stop the capture helper. Requesting the current state is
    /// a no-op.
    pub async fn set_tracking(&mut self, enabled: bool) -> anyhow::Result<()> {
        if enabled == self.capture.is_some() {
            debug!(enabled, "tracking already in requested state");
            self.state.write().await.tracking_enabled = enabled;
            return Ok(());
        }

        if enabled {
            let process = CaptureProcess::spawn(&self.helper_path)?;
            info!(pid = ?process.id(), "capture helper started");
            self.capture = Some(process);
            self.state.write().await.tracking_enabled = true;
            self.set_capture_state(CaptureState::Starting).await;
        } else {
            if let Some(process) = self.capture.take() {
                process.shutdown().await;
                info!("capture helper stopped");
            }
            self.state.write().await.tracking_enabled = false;
            self.set_capture_state(CaptureState::Idle).await;
        }

        Ok(())
    }

    /// Route one protocol line from the helper.
    async fn handle_line(&mut self, line: Line) {
        match line {
            Line::Key(_) | Line::Release(_) => {
                if let Some(event) = line.key_event() {
                    self.record(&event).await;
                    let _ = self.feed_tx.send(FeedEvent::Key(event));
                }
            }
            Line::Ready(message) => {
                info!(%message, "capture helper ready");
                self.set_capture_state(CaptureState::Ready).await;
            }
            Line::Error(message) => {
                warn!(%message, "capture helper reported an error");
                self.set_capture_state(CaptureState::Unavailable).await;
            }
            Line::Shutdown(message) => {
                debug!(%message, "capture helper announced shutdown");
            }
        }
    }

    async fn record(&self, event: &KeyEvent) {
        let mut stats = self.stats.write().await;
        let now = Instant::now();
        match event.kind {
            KeyKind::Press => stats.record_press(&event.name, now),
            KeyKind::Release => stats.record_release(&event.name, now),
        }
    }

    /// The helper's stdout closed without a stop request.
    async fn handle_helper_exit(&mut self) {
        if let Some(process) = self.capture.take() {
            // A closed stdout does not prove the child exited. Reap it
            // through the graceful stop path so a live child cannot
            // block the loop.
            process.shutdown().await;
            warn!("capture helper exited unexpectedly");
        }
        self.state.write().await.tracking_enabled = false;
        self.set_capture_state(CaptureState::Stopped).await;
    }

    async fn set_capture_state(&self, capture: CaptureState) {
        {
            let mut state = self.state.write().await;
            if state.capture == capture {
                return;
            }
            info!(from = %state.capture, to = %capture, "capture state changed");
            state.capture = capture;
        }
        let _ = self.feed_tx.send(FeedEvent::Capture(capture));
    }

    /// Flush counts to disk if they changed since the last save. Failed
    /// saves stay dirty and retry on the next tick.
    async fn save_if_dirty(&self) {
        let mut stats = self.stats.write().await;
        if !stats.is_dirty() {
            return;
        }

        let entries = stats.entries();
        match self.store.save(&entries) {
            Ok(()) => {
                stats.clear_dirty();
                debug!(keys = entries.len(), "analytics saved");
            }
            Err(e) => warn!(?e, "failed to save analytics"),
        }
    }

    /// Stop the helper and flush analytics. Runs once at daemon exit.
    pub async fn shutdown(&mut self) {
        if let Some(process) = self.capture.take() {
            process.shutdown().await;
            info!("capture helper stopped");
        }
        self.state.write().await.tracking_enabled = false;
        self.set_capture_state(CaptureState::Idle).await;
        self.save_if_dirty().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::KeyCountEntry;

    fn test_setup() -> (Supervisor, broadcast::Receiver<FeedEvent>) {
        let data_dir =
            std::env::temp_dir().join(format!("keyscope-supervisor-test-{}", std::process::id()));
        let config = Config::with_paths(data_dir, PathBuf::from("keyscope-capture"));

        let state = Arc::new(RwLock::new(DaemonState::new()));
        let stats = Arc::new(RwLock::new(KeyStats::new()));
        let (feed_tx, feed_rx) = broadcast::channel(16);

        let supervisor = Supervisor::new(&config, state, stats, feed_tx);
        (supervisor, feed_rx)
    }

    #[tokio::test]
    async fn test_key_lines_record_and_broadcast() {
        let (mut supervisor, mut feed_rx) = test_setup();

        supervisor.handle_line(Line::Key("KeyA".into())).await;
        supervisor.handle_line(Line::Release("KeyA".into())).await;

        let stats = supervisor.stats.read().await;
        assert_eq!(stats.total_keystrokes(), 1);
        assert_eq!(
            stats.top_keys(1),
            vec![KeyCountEntry { key: "KeyA".into(), count: 1 }]
        );
        drop(stats);

        assert!(matches!(
            feed_rx.try_recv().unwrap(),
            FeedEvent::Key(KeyEvent { kind: KeyKind::Press, .. })
        ));
        assert!(matches!(
            feed_rx.try_recv().unwrap(),
            FeedEvent::Key(KeyEvent { kind: KeyKind::Release, .. })
        ));
    }

    #[tokio::test]
    async fn test_ready_line_marks_capture_ready() {
        let (mut supervisor, mut feed_rx) = test_setup();

        supervisor
            .handle_line(Line::Ready("Global key monitoring started".into()))
            .await;

        assert_eq!(supervisor.state.read().await.capture, CaptureState::Ready);
        assert!(matches!(
            feed_rx.try_recv().unwrap(),
            FeedEvent::Capture(CaptureState::Ready)
        ));
    }

    #[tokio::test]
    async fn test_error_line_marks_capture_unavailable() {
        let (mut supervisor, _feed_rx) = test_setup();

        supervisor
            .handle_line(Line::Error("Failed to create event tap".into()))
            .await;

        assert_eq!(
            supervisor.state.read().await.capture,
            CaptureState::Unavailable
        );
    }

    #[tokio::test]
    async fn test_repeated_capture_state_is_not_rebroadcast() {
        let (mut supervisor, mut feed_rx) = test_setup();

        supervisor.set_capture_state(CaptureState::Ready).await;
        supervisor.set_capture_state(CaptureState::Ready).await;

        assert!(feed_rx.try_recv().is_ok());
        assert!(feed_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disable_tracking_when_stopped_is_a_no_op() {
        let (mut supervisor, _feed_rx) = test_setup();

        supervisor.set_tracking(false).await.unwrap();
        assert!(!supervisor.state.read().await.tracking_enabled);
        assert!(supervisor.capture.is_none());
    }

    #[tokio::test]
    async fn test_helper_exit_with_live_child_does_not_stall_the_loop() {
        use std::os::unix::fs::PermissionsExt;

        let (mut supervisor, _feed_rx) = test_setup();

        // A helper that drops stdout but keeps running.
        let dir = std::env::temp_dir()
            .join(format!("keyscope-stuck-helper-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let script = dir.join("helper.sh");
        std::fs::write(&script, "#!/bin/sh\nexec >&- 2>&-\nexec sleep 600\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        supervisor.helper_path = script;

        supervisor.set_tracking(true).await.unwrap();
        let eof = supervisor.capture.as_mut().unwrap().next_line().await;
        assert!(eof.is_none());

        tokio::time::timeout(Duration::from_secs(5), supervisor.handle_helper_exit())
            .await
            .unwrap();

        assert!(supervisor.capture.is_none());
        let state = supervisor.state.read().await;
        assert!(!state.tracking_enabled);
        assert_eq!(state.capture, CaptureState::Stopped);
    }
}
