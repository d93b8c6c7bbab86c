pub mod error;
pub mod model;

pub use error::IdError;
pub use model::*;
