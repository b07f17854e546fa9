//! IPC module for daemon-client communication

mod protocol;
mod server;

pub use protocol::{DaemonStatus, Notification, Request, Response, ServerFrame};
pub use server::Server;
