pub mod payload;
pub mod queue;

pub use payload::*;
pub use queue::{BatchEventOptions, EventQueue};
