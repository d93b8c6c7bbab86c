//! Browser bindings.

mod backend;
mod logger;
mod meeting_client;

pub use backend::{WebBackend, WebMedia, WebPeer};
pub use meeting_client::MeetingClient;
