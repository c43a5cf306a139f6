pub mod client;
pub mod constants;
pub mod context;
pub mod decision;
pub mod error;
pub mod events;
pub mod hashing;
pub mod hooks;
pub mod platform;
pub mod segmentation;
pub mod settings;
pub mod storage;
pub mod transport;

pub use client::{Client, ClientOptions, GetFlagResult, VariableValue};
pub use context::UserContext;
pub use error::{CoreError, CoreResult};
