//! Meeting signaling: the wire model, and behind features the relay server
//! and the call client.

pub use classmeet_core::{ConnectionId, RoomId};

pub mod model {
    pub use classmeet_core::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use classmeet_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use classmeet_client::*;
}
