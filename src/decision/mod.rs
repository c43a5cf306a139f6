pub mod campaign;
pub mod meg;
pub mod pipeline;

pub use pipeline::{get_flag, GetFlagResult};
