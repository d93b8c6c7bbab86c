mod broker;
mod broker_command;
mod guard;
mod registry;

pub use broker::*;
pub use broker_command::*;
pub use guard::*;
pub use registry::*;
