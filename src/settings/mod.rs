pub mod inflate;
pub mod manager;
pub mod model;

pub use inflate::compile;
pub use manager::{get_settings, has_settings, set_settings};
pub use model::*;
