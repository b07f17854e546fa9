//! keyscope-capture: keyboard capture helper
//!
//! Taps the system keyboard stream and prints one protocol line per key
//! transition on stdout. The supervising daemon owns this process and
//! reads the stream; logs go to stderr so they never mix with protocol
//! output.

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use keyscope::capture::TapListener;
use keyscope::lifecycle::ShutdownSignal;
use keyscope::protocol::LineEmitter;

#[tokio::main]
async fn main() -> Result<()> {
    // Protocol lines own stdout; logging goes to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "keyscope-capture starting"
    );

    let mut emitter = LineEmitter::stdout();
    let shutdown = ShutdownSignal::new();

    let (event_tx, mut event_rx) = mpsc::channel(256);
    let listener = TapListener::new(event_tx);

    // A failed tap leaves the process alive with an ERROR line on record;
    // only a signal ends it.
    let mut capturing = match listener.start() {
        Ok(()) => {
            info!("event tap started");
            emitter.ready("Global key monitoring started")?;
            true
        }
        Err(e) => {
            warn!(?e, "capture unavailable");
            emitter.error("Failed to create event tap")?;
            false
        }
    };

    let wait = shutdown.wait();
    tokio::pin!(wait);

    let signal = loop {
        tokio::select! {
            event = event_rx.recv(), if capturing => {
                match event {
                    Some(event) => {
                        debug!(?event, "key event");
                        emitter.key_event(&event)?;
                    }
                    None => {
                        warn!("event channel closed");
                        capturing = false;
                    }
                }
            }
            signal = &mut wait => break signal,
        }
    };

    emitter.shutdown(&format!("Received {signal}"))?;
    listener.stop();

    info!("keyscope-capture stopped");

    Ok(())
}
