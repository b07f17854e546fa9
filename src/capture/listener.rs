//! Global key listener using macOS CGEventTap
//!
//! Monitors system-wide key-down, key-up, and modifier flag events.
//! Runs on a dedicated thread with its own CFRunLoop. The tap is created
//! on that thread, but creation success is reported back before `start()`
//! returns so the caller can announce capture state truthfully.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc;
use tracing::{error, info};
#[cfg(target_os = "macos")]
use tracing::{debug, warn};

use super::CaptureError;
#[cfg(target_os = "macos")]
use super::{EventNormalizer, RawEvent};
use crate::event::KeyEvent;
#[cfg(target_os = "macos")]
use crate::modifier::ModifierMask;

/// Global keyboard listener backed by the platform event tap.
pub struct TapListener {
    event_tx: mpsc::Sender<KeyEvent>,
    running: Arc<AtomicBool>,
}

impl TapListener {
    /// Create a new listener. No thread is spawned until `start()`.
    pub fn new(event_tx: mpsc::Sender<KeyEvent>) -> Self {
        Self {
            event_tx,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start capturing.
    ///
    /// Spawns the dedicated tap thread and blocks until it has confirmed
    /// the event tap exists. On error the listener is left stopped and
    /// can be started again.
    pub fn start(&self) -> Result<(), CaptureError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyRunning);
        }

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<(), CaptureError>>();

        let spawned = thread::Builder::new()
            .name("tap-listener".to_string())
            .spawn(move || {
                info!("tap listener thread started");

                if let Err(e) = run_event_loop(event_tx, running.clone(), ready_tx) {
                    error!(?e, "tap listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("tap listener thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(CaptureError::ThreadSpawn(e.to_string()));
        }

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            // Thread exited without reporting
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::TapCreation)
            }
        }
    }

    /// Stop the listener. The tap thread exits on its next poll interval.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Run the CFRunLoop with the event tap.
#[cfg(target_os = "macos")]
fn run_event_loop(
    event_tx: mpsc::Sender<KeyEvent>,
    running: Arc<AtomicBool>,
    ready_tx: std::sync::mpsc::Sender<Result<(), CaptureError>>,
) -> Result<(), CaptureError> {
    use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
    use core_graphics::event::{
        CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventType, EventField,
    };

    let mut normalizer = EventNormalizer::new();

    // Channel from the tap callback to this thread
    let (callback_tx, callback_rx) = std::sync::mpsc::channel::<RawEvent>();

    // CGEventTap callback - must be fast and non-blocking
    let callback = move |_proxy: core_graphics::event::CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
          -> Option<CGEvent> {
        match event_type {
            CGEventType::KeyDown => {
                let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                let _ = callback_tx.send(RawEvent::KeyDown(code));
            }
            CGEventType::KeyUp => {
                let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                let _ = callback_tx.send(RawEvent::KeyUp(code));
            }
            CGEventType::FlagsChanged => {
                let mask = ModifierMask::from_raw(event.get_flags().bits());
                let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                let _ = callback_tx.send(RawEvent::FlagsChanged { mask, code });
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                warn!("event tap disabled, will re-enable");
                // The tap is re-enabled automatically
            }
            _ => {}
        }
        Some(event.clone())
    };

    // Create the event tap
    let tap = match CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    ) {
        Ok(tap) => tap,
        Err(_) => {
            error!("failed to create event tap - is Accessibility permission granted?");
            let _ = ready_tx.send(Err(CaptureError::TapCreation));
            return Err(CaptureError::TapCreation);
        }
    };

    // Enable the tap
    tap.enable();

    // Create a run loop source and add it to this thread's run loop
    let run_loop_source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(_) => {
            let _ = ready_tx.send(Err(CaptureError::TapCreation));
            return Err(CaptureError::TapCreation);
        }
    };
    let run_loop = CFRunLoop::get_current();

    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    info!("event tap created and enabled");
    let _ = ready_tx.send(Ok(()));

    // Process events in a loop
    while running.load(Ordering::SeqCst) {
        // Run the loop for a short interval, then drain the callback queue
        unsafe {
            CFRunLoop::run_in_mode(
                kCFRunLoopDefaultMode,
                std::time::Duration::from_millis(100),
                true,
            );
        }

        while let Ok(raw) = callback_rx.try_recv() {
            for event in normalizer.process(raw) {
                debug!(kind = ?event.kind, name = %event.name, "key event");
                if event_tx.blocking_send(event).is_err() {
                    warn!("event channel closed, stopping capture");
                    return Ok(());
                }
            }
        }
    }

    // Tap is cleaned up when it goes out of scope

    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn run_event_loop(
    _event_tx: mpsc::Sender<KeyEvent>,
    _running: Arc<AtomicBool>,
    ready_tx: std::sync::mpsc::Sender<Result<(), CaptureError>>,
) -> Result<(), CaptureError> {
    let _ = ready_tx.send(Err(CaptureError::Unsupported));
    Err(CaptureError::Unsupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = TapListener::new(tx);
        assert!(!listener.is_running());
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_start_reports_unsupported() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = TapListener::new(tx);
        assert!(matches!(listener.start(), Err(CaptureError::Unsupported)));
        assert!(!listener.is_running());
    }
}
