//! hpcview Client - Scheduler Connection
//!
//! Entry point for applications: [`SchedulerConnection`] negotiates the
//! server version, opens rowsets with the matching property compatibility
//! and keeps the change notification channel running for them.

pub mod connection;
pub mod keepalive;

pub use connection::SchedulerConnection;
pub use keepalive::touch_registered;
