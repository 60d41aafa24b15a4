//! hpcview Notify - Change Notification Channel
//!
//! A background thread keeps one connection to the scheduler's notification
//! endpoint (streaming socket or polling), decodes change packets and routes
//! them to a [`Controller`]. [`EventDispatcher`] is the production
//! controller: object events go to typed handlers, rowset changes go to the
//! open rowset they name.

pub mod channel;
pub mod controller;
pub mod dispatcher;
pub mod mock;
pub mod recording;
pub mod transport;

pub use channel::{route_packet, ChannelSettings, ChannelState, NotificationChannel};
pub use controller::{Controller, EventBatch, RemoteControlService};
pub use dispatcher::{EventDispatcher, ObjectEventHandler, SubscriptionId};
pub use mock::{MockControlService, RegistrationCall};
pub use recording::{Recorded, RecordingController};
